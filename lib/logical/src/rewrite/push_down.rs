//! Pushes work that must run under MPC down past locally-computable
//! operators, so that each party does as much as possible on its own
//! plaintext data before the joint computation starts.

use super::{reject_primitive, reject_unexpanded, DagRewriter};
use crate::dag::{OpDag, OpId};
use crate::ops::{AggregateOp, OpKind};
use mpc_fusion_common::{RewriteError, RwResult};

const PASS: &str = "MPCPushDown";

/// Commutation policy: may `bottom` be moved above `top` without changing
/// the result? The only entry so far is an aggregation over a division,
/// which holds because scalar division distributes over the partial sums.
fn do_commute(top: &OpKind, bottom: &OpKind) -> bool {
    matches!((top, bottom), (OpKind::Aggregate(_), OpKind::Divide(_)))
}

/// Moves `bottom` out of the MPC region: `bottom` is unhooked from beneath
/// `top`, and a renamed deep copy of it is spliced onto every edge between
/// `top`'s parents and `top`. The original node is dropped.
pub(crate) fn push_op_node_down(dag: &mut OpDag, top: OpId, bottom: OpId) -> RwResult<()> {
    let children = dag.children(bottom);
    if children.len() > 1 {
        return Err(RewriteError::invariant(
            PASS,
            dag.node(bottom).name(),
            "cannot push an operator with more than one child",
        ));
    }
    let child = children.first().copied();
    dag.remove_between(top, child, bottom)?;

    let grand_parents = dag.parents(top);
    let template = dag.node(bottom).clone();
    dag.remove_node(bottom);

    let base_name = template.out_rel.name.clone();
    for (idx, grand_parent) in grand_parents.into_iter().enumerate() {
        let mut clone = template.clone();
        clone.out_rel.rename(format!("{base_name}_{idx}"));
        let clone_id = dag.add_node(clone);
        dag.insert_between(grand_parent, Some(top), clone_id)?;
        dag.update_stored_with(clone_id);
    }
    Ok(())
}

/// Splits an aggregation whose input is a boundary concat into a local
/// aggregation of each party's rows plus an MPC re-aggregation of the
/// partials. The duplicate re-aggregates the original's output schema, so
/// its group column sits at index 0 and its aggregated column at index 1.
pub(crate) fn split_agg(dag: &mut OpDag, id: OpId) -> RwResult<()> {
    let node = dag.node(id).clone();
    let OpKind::Aggregate(op) = &node.kind else {
        return Err(RewriteError::invariant(
            PASS,
            node.name(),
            "split_agg expects an aggregation",
        ));
    };
    if op.group_cols.len() != 1 {
        return Err(RewriteError::invariant(
            PASS,
            node.name(),
            "split_agg supports a single group column",
        ));
    }
    if node.out_rel.columns.len() < 2 {
        return Err(RewriteError::invariant(
            PASS,
            node.name(),
            "aggregation output must have a group and an aggregated column",
        ));
    }
    let children = dag.children(id);
    if children.len() > 1 {
        return Err(RewriteError::invariant(
            PASS,
            node.name(),
            "split_agg supports at most one child",
        ));
    }

    let mut clone = node.clone();
    clone.out_rel.rename(format!("{}_obl", node.out_rel.name));
    let mut group_col = node.out_rel.columns[0].clone();
    group_col.idx = 0;
    let mut agg_col = node.out_rel.columns[1].clone();
    agg_col.idx = 1;
    clone.kind = OpKind::Aggregate(AggregateOp {
        group_cols: vec![group_col],
        agg_col,
        aggregator: op.aggregator,
    });
    clone.is_mpc = true;

    let clone_id = dag.add_node(clone);
    dag.insert_between(id, children.first().copied(), clone_id)
}

/// Forks a boundary concat with several children into one concat per child.
/// The clones share the original's parents; each child keeps exactly one
/// concat. This duplicates upstream MPC work but is semantics-preserving.
pub(crate) fn fork_node(dag: &mut OpDag, id: OpId) -> RwResult<()> {
    let children = dag.children(id);
    let parents = dag.parents(id);
    let template = dag.node(id).clone();

    for (idx, child) in children.into_iter().enumerate().skip(1) {
        tracing::warn!(
            concat = template.name(),
            "forking a boundary concat duplicates upstream MPC work"
        );
        let mut clone = template.clone();
        clone.out_rel.rename(format!("{}_{}", template.out_rel.name, idx));
        let clone_id = dag.add_node(clone);
        for parent in &parents {
            let slot = dag.in_slot(*parent, id).ok_or_else(|| {
                RewriteError::invariant(PASS, template.name(), "fork_node: missing parent edge")
            })?;
            dag.add_edge(*parent, clone_id, slot);
        }
        dag.replace_parent(child, id, clone_id)?;
        dag.update_op_specific_cols(child)?;
    }
    Ok(())
}

/// DagRewriter that moves the MPC boundary downward.
#[derive(Debug, Default)]
pub struct MpcPushDown;

impl MpcPushDown {
    pub fn new() -> Self {
        Self
    }

    /// A unary operator under an MPC boundary concat (or a commuting
    /// aggregation above such a concat) can be relocated beneath it and run
    /// locally; anything else under an MPC parent must itself run under
    /// MPC.
    fn rewrite_unary(&mut self, dag: &mut OpDag, id: OpId) -> RwResult<()> {
        let parent = dag.parent(id).ok_or_else(|| {
            RewriteError::invariant(PASS, dag.node(id).name(), "unary operator has no parent")
        })?;
        if !dag.node(parent).is_mpc {
            return Ok(());
        }
        if dag.is_leaf(id) {
            dag.node_mut(id).is_mpc = true;
            return Ok(());
        }

        if matches!(dag.node(parent).kind, OpKind::Concat(_)) && dag.is_boundary(parent) {
            push_op_node_down(dag, parent, id)?;
            dag.update_out_rel_cols(parent)?;
            return Ok(());
        }

        if do_commute(&dag.node(parent).kind, &dag.node(id).kind) {
            let agg = parent;
            if let Some(agg_parent) = dag.parent(agg) {
                if matches!(dag.node(agg_parent).kind, OpKind::Concat(_))
                    && dag.is_boundary(agg_parent)
                {
                    push_op_node_down(dag, agg, id)?;
                    let moved = dag.parent(agg).ok_or_else(|| {
                        RewriteError::invariant(
                            PASS,
                            dag.node(agg).name(),
                            "pushed operator left no parent behind",
                        )
                    })?;
                    push_op_node_down(dag, agg_parent, moved)?;
                    dag.update_out_rel_cols(agg_parent)?;
                    return Ok(());
                }
            }
        }

        dag.node_mut(id).is_mpc = true;
        Ok(())
    }

    fn rewrite_aggregate(&mut self, dag: &mut OpDag, id: OpId) -> RwResult<()> {
        let parent = dag.parent(id).ok_or_else(|| {
            RewriteError::invariant(PASS, dag.node(id).name(), "aggregation has no parent")
        })?;
        if !dag.node(parent).is_mpc {
            return Ok(());
        }
        if matches!(dag.node(parent).kind, OpKind::Concat(_)) && dag.is_boundary(parent) {
            split_agg(dag, id)?;
            push_op_node_down(dag, parent, id)?;
            dag.update_out_rel_cols(parent)?;
        } else {
            dag.node_mut(id).is_mpc = true;
        }
        Ok(())
    }

    fn rewrite_concat(&mut self, dag: &mut OpDag, id: OpId) -> RwResult<()> {
        if dag.requires_mpc(id) {
            dag.node_mut(id).is_mpc = true;
            if dag.children(id).len() > 1 && dag.is_boundary(id) {
                fork_node(dag, id)?;
            }
        }
        Ok(())
    }

    fn rewrite_default(&mut self, dag: &mut OpDag, id: OpId) -> RwResult<()> {
        let mpc = dag.requires_mpc(id);
        dag.node_mut(id).is_mpc = mpc;
        Ok(())
    }
}

impl DagRewriter for MpcPushDown {
    fn name(&self) -> &'static str {
        "MPCPushDown"
    }

    fn rewrite_node(&mut self, dag: &mut OpDag, id: OpId) -> RwResult<()> {
        match &dag.node(id).kind {
            OpKind::HybridJoin(_) | OpKind::HybridAggregate(_) | OpKind::RevealJoin(_) => {
                Err(reject_unexpanded(PASS, dag, id))
            }
            OpKind::Aggregate(_) => self.rewrite_aggregate(dag, id),
            OpKind::Project(_)
            | OpKind::Filter(_)
            | OpKind::Multiply(_)
            | OpKind::Divide(_)
            | OpKind::DistinctCount(_) => self.rewrite_unary(dag, id),
            OpKind::Join(_)
            | OpKind::IndexJoin(_)
            | OpKind::FlagJoin(_)
            | OpKind::PubJoin(_)
            | OpKind::ConcatCols
            | OpKind::Distinct(_)
            | OpKind::IndexAggregate(_) => self.rewrite_default(dag, id),
            OpKind::Concat(_) => self.rewrite_concat(dag, id),
            OpKind::Create | OpKind::Close | OpKind::Open(_) | OpKind::JoinFlags(_) => Ok(()),
            OpKind::Shuffle
            | OpKind::Persist
            | OpKind::Index(_)
            | OpKind::SortBy(_)
            | OpKind::CompNeighs(_) => Err(reject_primitive(PASS, dag, id)),
        }
    }
}
