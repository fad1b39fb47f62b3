//! Inserts `Close` (secret-share) and `Open` (reveal) operators at every
//! boundary between the local and MPC regimes, so that after this pass no
//! edge silently crosses a regime change.

use super::{reject_primitive, DagRewriter};
use crate::dag::{OpDag, OpId};
use crate::node::OpNode;
use crate::ops::{OpKind, OpenOp};
use mpc_fusion_common::{RewriteError, RwResult};
use mpc_fusion_model::PartySet;

const PASS: &str = "InsertOpenClose";

/// DagRewriter that materialises the regime boundaries.
#[derive(Debug, Default)]
pub struct InsertOpenClose;

impl InsertOpenClose {
    pub fn new() -> Self {
        Self
    }

    /// A unary MPC node whose stored-with set changes across it sits at a
    /// lower boundary: its result is revealed. The reveal becomes an
    /// explicit `Open` beneath it and the node's own output reverts to the
    /// input's stored-with set.
    fn rewrite_unary(&mut self, dag: &mut OpDag, id: OpId) -> RwResult<()> {
        let in_stored_with = dag.in_rel(id)?.stored_with.clone();
        let out_stored_with = dag.node(id).out_rel.stored_with.clone();
        if in_stored_with == out_stored_with {
            return Ok(());
        }
        if !dag.is_lower_boundary(id) {
            return Err(RewriteError::invariant(
                PASS,
                dag.node(id).name(),
                "stored-with set changes on a non-lower-boundary unary operator",
            ));
        }

        let mut out_rel = dag.node(id).out_rel.clone();
        out_rel.rename(format!("{}_open", out_rel.name));
        dag.node_mut(id).out_rel.stored_with = in_stored_with;

        let mut open = OpNode::new(OpKind::Open(OpenOp { target_party: None }), out_rel);
        open.is_mpc = true;
        let open_id = dag.add_node(open);
        dag.insert_between_children(id, open_id);
        Ok(())
    }

    /// Joins secret-share each plaintext input (`Close` whose stored-with is
    /// the union of both join inputs). A join whose output leaves the MPC
    /// set gets an `Open`: appended when the join is a leaf, spliced before
    /// its children otherwise.
    fn rewrite_join(&mut self, dag: &mut OpDag, id: OpId) -> RwResult<()> {
        let parents = dag.parents(id);
        let (left, right) = match parents.as_slice() {
            [left, right, ..] => (*left, *right),
            _ => {
                return Err(RewriteError::invariant(
                    PASS,
                    dag.node(id).name(),
                    "join requires two inputs",
                ))
            }
        };
        let in_stored_with = dag
            .node(left)
            .out_rel
            .stored_with
            .union(&dag.node(right).out_rel.stored_with);
        let out_stored_with = dag.node(id).out_rel.stored_with.clone();
        let node_is_mpc = dag.node(id).is_mpc;

        for parent in [left, right] {
            let parent_node = dag.node(parent);
            if node_is_mpc && !parent_node.is_mpc && !matches!(parent_node.kind, OpKind::Close) {
                let close_name = format!("{}_close", parent_node.out_rel.name);
                let mut out_rel = parent_node.out_rel.clone();
                out_rel.rename(close_name);
                out_rel.stored_with = in_stored_with.clone();
                let mut close = OpNode::new(OpKind::Close, out_rel);
                close.is_mpc = true;
                let close_id = dag.add_node(close);
                dag.insert_between(parent, Some(id), close_id)?;
            }
        }

        if in_stored_with.is_shared() && out_stored_with.len() == 1 && node_is_mpc {
            let target = out_stored_with.min_party();
            let open_name = format!("{}_open", dag.node(id).out_rel.name);
            let mut out_rel = dag.node(id).out_rel.clone();
            out_rel.rename(open_name);
            dag.node_mut(id).out_rel.stored_with = in_stored_with;

            let mut open = OpNode::new(OpKind::Open(OpenOp { target_party: target }), out_rel);
            open.is_mpc = true;
            let open_id = dag.add_node(open);
            if dag.is_leaf(id) {
                dag.add_edge(id, open_id, 0);
            } else {
                // Pulled up by a downstream local concat: the reveal still
                // has to happen before the local consumers run.
                dag.insert_between_children(id, open_id);
            }
        }
        Ok(())
    }

    /// Every concat parent whose stored-with set differs from the concat's
    /// own is secret-shared into it.
    fn rewrite_concat(&mut self, dag: &mut OpDag, id: OpId) -> RwResult<()> {
        if dag.is_lower_boundary(id) {
            return Err(RewriteError::invariant(
                PASS,
                dag.node(id).name(),
                "concat must not sit at a lower boundary when boundaries are materialised",
            ));
        }
        let out_stored_with = dag.node(id).out_rel.stored_with.clone();
        for parent in dag.parents(id) {
            let parent_node = dag.node(parent);
            if parent_node.out_rel.stored_with != out_stored_with {
                let close_name = format!("{}_close", parent_node.out_rel.name);
                let mut out_rel = parent_node.out_rel.clone();
                out_rel.rename(close_name);
                out_rel.stored_with = out_stored_with.clone();
                let mut close = OpNode::new(OpKind::Close, out_rel);
                close.is_mpc = true;
                let close_id = dag.add_node(close);
                dag.insert_between(parent, Some(id), close_id)?;
            }
        }
        Ok(())
    }

    /// Column-wise concats secret-share every non-`Close` parent; a leaf
    /// whose result is collected by a single party additionally gets an
    /// `Open`.
    fn rewrite_concat_cols(&mut self, dag: &mut OpDag, id: OpId) -> RwResult<()> {
        let in_stored_with = dag.in_stored_with_union(id);
        let out_stored_with = dag.node(id).out_rel.stored_with.clone();

        for parent in dag.parents(id) {
            let parent_node = dag.node(parent);
            if !matches!(parent_node.kind, OpKind::Close) {
                let close_name = format!("{}_close", parent_node.out_rel.name);
                let mut out_rel = parent_node.out_rel.clone();
                out_rel.rename(close_name);
                out_rel.stored_with = in_stored_with.clone();
                let mut close = OpNode::new(OpKind::Close, out_rel);
                close.is_mpc = true;
                let close_id = dag.add_node(close);
                dag.insert_between(parent, Some(id), close_id)?;
            }
        }

        if dag.is_leaf(id) && in_stored_with.is_shared() && out_stored_with.len() == 1 {
            let target = out_stored_with.min_party();
            let open_name = format!("{}_open", dag.node(id).out_rel.name);
            let mut out_rel = dag.node(id).out_rel.clone();
            out_rel.rename(open_name);
            dag.node_mut(id).out_rel.stored_with = in_stored_with;

            let mut open = OpNode::new(OpKind::Open(OpenOp { target_party: target }), out_rel);
            open.is_mpc = true;
            let open_id = dag.add_node(open);
            dag.add_edge(id, open_id, 0);
        }
        Ok(())
    }
}

impl DagRewriter for InsertOpenClose {
    fn name(&self) -> &'static str {
        "InsertOpenClose"
    }

    fn rewrite_node(&mut self, dag: &mut OpDag, id: OpId) -> RwResult<()> {
        match &dag.node(id).kind {
            OpKind::Project(_)
            | OpKind::Filter(_)
            | OpKind::Multiply(_)
            | OpKind::Divide(_)
            | OpKind::Aggregate(_)
            | OpKind::HybridAggregate(_)
            | OpKind::Distinct(_)
            | OpKind::DistinctCount(_) => self.rewrite_unary(dag, id),
            OpKind::Join(_) | OpKind::HybridJoin(_) | OpKind::IndexJoin(_) => {
                self.rewrite_join(dag, id)
            }
            OpKind::Concat(_) => self.rewrite_concat(dag, id),
            OpKind::ConcatCols => self.rewrite_concat_cols(dag, id),
            OpKind::Shuffle
            | OpKind::Persist
            | OpKind::Index(_)
            | OpKind::SortBy(_)
            | OpKind::CompNeighs(_) => Err(reject_primitive(PASS, dag, id)),
            _ => Ok(()),
        }
    }
}
