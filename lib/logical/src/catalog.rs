//! Graph-dependent operator metadata.
//!
//! These methods complete the per-kind catalog started in
//! [`OpNode`](crate::OpNode): predicates and schema updates that need to see
//! the node's current parents and children. The passes call them after every
//! structural edit to keep `is_mpc`, output schemas and payload column
//! references consistent with the rewritten graph.

use crate::dag::{OpDag, OpId};
use crate::ops::{FilterTarget, OpKind, Operand};
use mpc_fusion_common::{RewriteError, RwResult};
use mpc_fusion_model::{Column, PartySet, Relation};
use std::collections::BTreeSet;

/// Pass name used for column re-resolution failures.
const COLUMN_UPDATE: &str = "column-update";

impl OpDag {
    /// True iff the node's current inputs and operator kind require joint
    /// computation: its inputs span more than one party, or its semantics is
    /// cryptographic regardless of where the inputs live.
    pub fn requires_mpc(&self, id: OpId) -> bool {
        let node = self.node(id);
        if node.is_inherently_mpc() {
            return true;
        }
        match &node.kind {
            OpKind::Create => false,
            OpKind::Join(_)
            | OpKind::IndexJoin(_)
            | OpKind::JoinFlags(_)
            | OpKind::PubJoin(_)
            | OpKind::Concat(_)
            | OpKind::ConcatCols => self.in_stored_with_union(id).is_shared(),
            _ => self
                .in_rels(id)
                .first()
                .is_some_and(|rel| rel.is_shared()),
        }
    }

    /// A concatenation is a boundary when its parents do not all share one
    /// stored-with set; such nodes are where the MPC region begins.
    pub fn is_boundary(&self, id: OpId) -> bool {
        if !matches!(self.node(id).kind, OpKind::Concat(_) | OpKind::ConcatCols) {
            return false;
        }
        let distinct: BTreeSet<PartySet> = self
            .in_rels(id)
            .into_iter()
            .map(|rel| rel.stored_with.clone())
            .collect();
        distinct.len() > 1
    }

    /// True when the node runs under MPC but none of its children do
    /// (vacuously true for MPC leaves). Such nodes sit at the lower edge of
    /// the MPC region.
    pub fn is_lower_boundary(&self, id: OpId) -> bool {
        self.node(id).is_mpc
            && self
                .children(id)
                .into_iter()
                .all(|child| !self.node(child).is_mpc)
    }

    /// Union of the parents' stored-with sets.
    pub fn in_stored_with_union(&self, id: OpId) -> PartySet {
        self.in_rels(id)
            .into_iter()
            .fold(PartySet::new(), |acc, rel| acc.union(&rel.stored_with))
    }

    /// Re-derives the output stored-with set from the current inputs. Used
    /// on clones after they are spliced onto new edges; roots are left
    /// untouched.
    pub fn update_stored_with(&mut self, id: OpId) {
        if self.parent(id).is_none() {
            return;
        }
        let union = self.in_stored_with_union(id);
        self.node_mut(id).out_rel.stored_with = union;
    }

    /// Recomputes the output schema from the current inputs. A `Concat`
    /// takes its columns from the first parent; a `ConcatCols` from all
    /// parents side by side. Every other kind keeps its schema.
    pub fn update_out_rel_cols(&mut self, id: OpId) -> RwResult<()> {
        match self.node(id).kind {
            OpKind::Concat(_) => {
                let columns = self.in_rel(id)?.columns.clone();
                self.node_mut(id).out_rel.set_columns(columns);
            }
            OpKind::ConcatCols => {
                let columns: Vec<Column> = self
                    .in_rels(id)
                    .into_iter()
                    .flat_map(|rel| rel.columns.clone())
                    .collect();
                self.node_mut(id).out_rel.set_columns(columns);
            }
            _ => {}
        }
        Ok(())
    }

    /// Re-resolves every operator-specific column reference by name against
    /// the node's current input relation(s). Fails with
    /// [`RewriteError::InvariantViolation`] if a referenced name no longer
    /// exists.
    pub fn update_op_specific_cols(&mut self, id: OpId) -> RwResult<()> {
        let in_rels: Vec<Relation> = self.in_rels(id).into_iter().cloned().collect();
        let name = self.node(id).name().to_owned();
        let node = self.node_mut(id);

        match &mut node.kind {
            OpKind::Project(op) => {
                let rel = sole_in_rel(&in_rels, &name)?;
                for col in &mut op.selected_cols {
                    *col = resolve(rel, &col.name, &name)?;
                }
            }
            OpKind::Filter(op) => {
                let rel = sole_in_rel(&in_rels, &name)?;
                op.filter_col = resolve(rel, &op.filter_col.name, &name)?;
                if let FilterTarget::Column(col) = &mut op.target {
                    *col = resolve(rel, &col.name, &name)?;
                }
            }
            OpKind::Multiply(op) | OpKind::Divide(op) => {
                let rel = sole_in_rel(&in_rels, &name)?;
                for operand in &mut op.operands {
                    if let Operand::Column(col) = operand {
                        *col = resolve(rel, &col.name, &name)?;
                    }
                }
                // The target column may be introduced by the operator itself,
                // in which case it has no counterpart in the input.
                if let Some(col) = rel.column_by_name(&op.target_col.name) {
                    op.target_col = col.clone();
                }
            }
            OpKind::Aggregate(op)
            | OpKind::IndexAggregate(crate::ops::IndexAggregateOp { agg: op })
            | OpKind::HybridAggregate(crate::ops::HybridAggregateOp { agg: op, .. }) => {
                let rel = sole_in_rel(&in_rels, &name)?;
                for col in &mut op.group_cols {
                    *col = resolve(rel, &col.name, &name)?;
                }
                op.agg_col = resolve(rel, &op.agg_col.name, &name)?;
            }
            OpKind::Distinct(op) => {
                let rel = sole_in_rel(&in_rels, &name)?;
                for col in &mut op.selected_cols {
                    *col = resolve(rel, &col.name, &name)?;
                }
            }
            OpKind::DistinctCount(op) => {
                let rel = sole_in_rel(&in_rels, &name)?;
                op.selected_col = resolve(rel, &op.selected_col.name, &name)?;
            }
            OpKind::SortBy(op) => {
                let rel = sole_in_rel(&in_rels, &name)?;
                op.sort_by_col = resolve(rel, &op.sort_by_col.name, &name)?;
            }
            OpKind::CompNeighs(op) => {
                let rel = sole_in_rel(&in_rels, &name)?;
                op.comp_col = resolve(rel, &op.comp_col.name, &name)?;
            }
            kind => {
                if let Some(join) = kind.as_join_mut() {
                    let (left, right) = binary_in_rels(&in_rels, &name)?;
                    for col in &mut join.left_join_cols {
                        *col = resolve(left, &col.name, &name)?;
                    }
                    for col in &mut join.right_join_cols {
                        *col = resolve(right, &col.name, &name)?;
                    }
                }
            }
        }
        Ok(())
    }
}

fn sole_in_rel<'a>(in_rels: &'a [Relation], node: &str) -> RwResult<&'a Relation> {
    in_rels
        .first()
        .ok_or_else(|| RewriteError::invariant(COLUMN_UPDATE, node, "operator has no input"))
}

fn binary_in_rels<'a>(
    in_rels: &'a [Relation],
    node: &str,
) -> RwResult<(&'a Relation, &'a Relation)> {
    match in_rels {
        [left, right, ..] => Ok((left, right)),
        _ => Err(RewriteError::invariant(
            COLUMN_UPDATE,
            node,
            "operator requires two inputs",
        )),
    }
}

fn resolve(rel: &Relation, col_name: &str, node: &str) -> RwResult<Column> {
    rel.column_by_name(col_name).cloned().ok_or_else(|| {
        RewriteError::invariant(
            COLUMN_UPDATE,
            node,
            format!("no column named '{col_name}' in relation '{}'", rel.name),
        )
    })
}
