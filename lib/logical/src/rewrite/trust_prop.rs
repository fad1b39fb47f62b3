//! Propagates per-column trust sets forward through the DAG.
//!
//! Trust sets are more granular than stored-with sets: they say which
//! parties may see a *column*, independently of who holds the rows. Every
//! rule combines contributor trust sets by intersection, because a value
//! derived from several columns may only be shown to parties trusted by all
//! of them.

use super::{reject_primitive, reject_unexpanded, DagRewriter};
use crate::dag::{OpDag, OpId};
use crate::ops::{FilterTarget, OpKind, Operand};
use mpc_fusion_common::{RewriteError, RwResult};
use mpc_fusion_model::{trust_set_from_columns, Column, PartySet, Relation};

const PASS: &str = "TrustSetPropDown";

/// DagRewriter that derives output trust sets from input trust sets.
#[derive(Debug, Default)]
pub struct TrustSetPropDown;

impl TrustSetPropDown {
    pub fn new() -> Self {
        Self
    }

    fn rewrite_project(&mut self, dag: &mut OpDag, id: OpId) -> RwResult<()> {
        let in_rel = dag.in_rel(id)?.clone();
        let name = dag.node(id).name().to_owned();
        let OpKind::Project(op) = dag.node(id).kind.clone() else {
            return Ok(());
        };
        for (idx, selected) in op.selected_cols.iter().enumerate() {
            let trust = resolved_trust(&in_rel, &selected.name, &name)?;
            dag.node_mut(id).out_rel.columns[idx].trust_set = trust;
        }
        Ok(())
    }

    /// Every output row's presence leaks the predicate columns, so each
    /// output column is additionally bounded by the condition's trust set.
    fn rewrite_filter(&mut self, dag: &mut OpDag, id: OpId) -> RwResult<()> {
        let in_rel = dag.in_rel(id)?.clone();
        let name = dag.node(id).name().to_owned();
        let OpKind::Filter(op) = dag.node(id).kind.clone() else {
            return Ok(());
        };

        let mut condition_trust = resolved_trust(&in_rel, &op.filter_col.name, &name)?;
        if let FilterTarget::Column(other) = &op.target {
            condition_trust =
                condition_trust.intersect(&resolved_trust(&in_rel, &other.name, &name)?);
        }

        for (idx, in_col) in in_rel.columns.iter().enumerate() {
            dag.node_mut(id).out_rel.columns[idx].trust_set =
                condition_trust.intersect(&in_col.trust_set);
        }
        Ok(())
    }

    /// The target column needs every operand, so it gets the intersection of
    /// the operand columns' trust sets; all other columns carry over.
    fn rewrite_linear(&mut self, dag: &mut OpDag, id: OpId) -> RwResult<()> {
        let in_rel = dag.in_rel(id)?.clone();
        let name = dag.node(id).name().to_owned();
        let (OpKind::Multiply(op) | OpKind::Divide(op)) = dag.node(id).kind.clone() else {
            return Ok(());
        };

        let mut operand_trust: Option<PartySet> = None;
        for operand in &op.operands {
            if let Operand::Column(col) = operand {
                let trust = resolved_trust(&in_rel, &col.name, &name)?;
                operand_trust = Some(match operand_trust {
                    Some(acc) => acc.intersect(&trust),
                    None => trust,
                });
            }
        }
        let operand_trust = operand_trust.unwrap_or_default();

        let target_idx = op.target_col.idx;
        let out_len = dag.node(id).out_rel.columns.len();
        for idx in 0..out_len {
            if idx == target_idx {
                dag.node_mut(id).out_rel.columns[idx].trust_set = operand_trust.clone();
            } else if let Some(in_col) = in_rel.columns.get(idx) {
                dag.node_mut(id).out_rel.columns[idx].trust_set = in_col.trust_set.clone();
            }
        }
        Ok(())
    }

    fn rewrite_aggregate(&mut self, dag: &mut OpDag, id: OpId) -> RwResult<()> {
        let in_rel = dag.in_rel(id)?.clone();
        let name = dag.node(id).name().to_owned();
        let op = match &dag.node(id).kind {
            OpKind::Aggregate(op) => op.clone(),
            OpKind::IndexAggregate(op) => op.agg.clone(),
            _ => return Ok(()),
        };

        let group_cols: Vec<Column> = op
            .group_cols
            .iter()
            .map(|col| resolved(&in_rel, &col.name, &name).map(Column::clone))
            .collect::<RwResult<_>>()?;
        let group_trust = trust_set_from_columns(group_cols.iter());
        let agg_trust = resolved_trust(&in_rel, &op.agg_col.name, &name)?.intersect(&group_trust);

        let out_len = dag.node(id).out_rel.columns.len();
        if out_len == 0 {
            return Err(RewriteError::invariant(
                PASS,
                name,
                "aggregation output has no columns",
            ));
        }
        for idx in 0..out_len - 1 {
            dag.node_mut(id).out_rel.columns[idx].trust_set = group_trust.clone();
        }
        dag.node_mut(id).out_rel.columns[out_len - 1].trust_set = agg_trust;
        Ok(())
    }

    /// Key columns merge the two sides' key trust sets pairwise; non-key
    /// columns combine their own trust set with every key pair's.
    fn rewrite_join(&mut self, dag: &mut OpDag, id: OpId) -> RwResult<()> {
        let in_rels: Vec<Relation> = dag.in_rels(id).into_iter().cloned().collect();
        let name = dag.node(id).name().to_owned();
        let [left_rel, right_rel, ..] = in_rels.as_slice() else {
            return Err(RewriteError::invariant(
                PASS,
                name,
                "join requires two inputs",
            ));
        };
        let Some(op) = dag.node(id).kind.as_join().cloned() else {
            return Ok(());
        };

        let mut key_trusts = Vec::new();
        for (left_key, right_key) in op.left_join_cols.iter().zip(&op.right_join_cols) {
            let left_trust = resolved_trust(left_rel, &left_key.name, &name)?;
            let right_trust = resolved_trust(right_rel, &right_key.name, &name)?;
            key_trusts.push(left_trust.intersect(&right_trust));
        }
        let combined_key_trust = key_trusts
            .iter()
            .cloned()
            .reduce(|acc, trust| acc.intersect(&trust))
            .unwrap_or_default();

        let num_keys = key_trusts.len();
        for (idx, trust) in key_trusts.iter().enumerate() {
            dag.node_mut(id).out_rel.columns[idx].trust_set = trust.clone();
        }

        let is_key = |keys: &[Column], col: &Column| keys.iter().any(|key| key.name == col.name);
        let mut abs_idx = num_keys;
        for (rel, keys) in [
            (left_rel, &op.left_join_cols),
            (right_rel, &op.right_join_cols),
        ] {
            for in_col in &rel.columns {
                if !is_key(keys, in_col) {
                    dag.node_mut(id).out_rel.columns[abs_idx].trust_set =
                        combined_key_trust.intersect(&in_col.trust_set);
                    abs_idx += 1;
                }
            }
        }
        Ok(())
    }

    /// Column `k`'s trust set is the intersection of every input's column
    /// `k` trust set.
    fn rewrite_concat(&mut self, dag: &mut OpDag, id: OpId) -> RwResult<()> {
        let in_rels: Vec<Relation> = dag.in_rels(id).into_iter().cloned().collect();
        let out_len = dag.node(id).out_rel.columns.len();
        for idx in 0..out_len {
            let at_idx: Vec<&Column> = in_rels
                .iter()
                .filter_map(|rel| rel.columns.get(idx))
                .collect();
            let trust = trust_set_from_columns(at_idx.into_iter());
            dag.node_mut(id).out_rel.columns[idx].trust_set = trust;
        }
        Ok(())
    }
}

impl DagRewriter for TrustSetPropDown {
    fn name(&self) -> &'static str {
        "TrustSetPropDown"
    }

    fn rewrite_node(&mut self, dag: &mut OpDag, id: OpId) -> RwResult<()> {
        match &dag.node(id).kind {
            OpKind::HybridJoin(_) | OpKind::HybridAggregate(_) => {
                Err(reject_unexpanded(PASS, dag, id))
            }
            OpKind::Project(_) => self.rewrite_project(dag, id),
            OpKind::Filter(_) => self.rewrite_filter(dag, id),
            OpKind::Multiply(_) | OpKind::Divide(_) => self.rewrite_linear(dag, id),
            OpKind::Aggregate(_) | OpKind::IndexAggregate(_) => self.rewrite_aggregate(dag, id),
            OpKind::Join(_) | OpKind::IndexJoin(_) | OpKind::FlagJoin(_) => {
                self.rewrite_join(dag, id)
            }
            OpKind::Concat(_) => self.rewrite_concat(dag, id),
            OpKind::Shuffle
            | OpKind::Persist
            | OpKind::Index(_)
            | OpKind::SortBy(_)
            | OpKind::CompNeighs(_) => Err(reject_primitive(PASS, dag, id)),
            _ => Ok(()),
        }
    }
}

fn resolved<'a>(rel: &'a Relation, col_name: &str, node: &str) -> RwResult<&'a Column> {
    rel.column_by_name(col_name).ok_or_else(|| {
        RewriteError::invariant(
            PASS,
            node,
            format!("no column named '{col_name}' in relation '{}'", rel.name),
        )
    })
}

fn resolved_trust(rel: &Relation, col_name: &str, node: &str) -> RwResult<PartySet> {
    resolved(rel, col_name, node).map(|col| col.trust_set.clone())
}
