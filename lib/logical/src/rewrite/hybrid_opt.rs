//! Specialises MPC joins and aggregations into hybrid forms when a
//! selectively-trusted party exists for the key or group column.

use super::{reject_primitive, reject_unexpanded, DagRewriter};
use crate::dag::{OpDag, OpId};
use crate::ops::{HybridAggregateOp, HybridJoinOp, OpKind};
use mpc_fusion_common::RwResult;

const PASS: &str = "HybridOperatorOpt";

/// DagRewriter that converts eligible MPC operators in place.
///
/// The conversion keeps the node id, its edges and its output relation; only
/// the kind changes, recording the numerically smallest trusted party.
#[derive(Debug, Default)]
pub struct HybridOperatorOpt;

impl HybridOperatorOpt {
    pub fn new() -> Self {
        Self
    }

    fn rewrite_aggregate(&mut self, dag: &mut OpDag, id: OpId) -> RwResult<()> {
        if !dag.node(id).is_mpc {
            return Ok(());
        }
        // By convention the group column comes first in an aggregation's
        // output.
        let first_col = dag.node(id).out_rel.columns.first();
        let Some(trusted_party) = first_col.and_then(|col| col.trust_set.min_party()) else {
            return Ok(());
        };
        let node = dag.node_mut(id);
        if let OpKind::Aggregate(agg) = node.kind.clone() {
            node.kind = OpKind::HybridAggregate(HybridAggregateOp { agg, trusted_party });
        }
        Ok(())
    }

    fn rewrite_join(&mut self, dag: &mut OpDag, id: OpId) -> RwResult<()> {
        if !dag.node(id).is_mpc {
            return Ok(());
        }
        // By convention the join key columns come first in a join's output.
        let first_col = dag.node(id).out_rel.columns.first();
        let Some(trusted_party) = first_col.and_then(|col| col.trust_set.min_party()) else {
            return Ok(());
        };
        let node = dag.node_mut(id);
        if let OpKind::Join(join) = node.kind.clone() {
            node.kind = OpKind::HybridJoin(HybridJoinOp {
                join,
                trusted_party,
            });
        }
        Ok(())
    }
}

impl DagRewriter for HybridOperatorOpt {
    fn name(&self) -> &'static str {
        "HybridOperatorOpt"
    }

    fn rewrite_node(&mut self, dag: &mut OpDag, id: OpId) -> RwResult<()> {
        match &dag.node(id).kind {
            OpKind::HybridJoin(_) | OpKind::HybridAggregate(_) => {
                Err(reject_unexpanded(PASS, dag, id))
            }
            OpKind::Aggregate(_) => self.rewrite_aggregate(dag, id),
            OpKind::Join(_) => self.rewrite_join(dag, id),
            OpKind::Shuffle
            | OpKind::Persist
            | OpKind::Index(_)
            | OpKind::SortBy(_)
            | OpKind::CompNeighs(_) => Err(reject_primitive(PASS, dag, id)),
            _ => Ok(()),
        }
    }
}
