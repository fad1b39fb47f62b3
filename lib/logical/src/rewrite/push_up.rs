//! Moves the MPC boundary back up where downstream work turned out to be
//! local: a reversible operator sitting at the lower edge of the MPC region
//! can instead be re-executed on the revealed result.

use super::{reject_primitive, reject_unexpanded, DagRewriter};
use crate::dag::{OpDag, OpId};
use crate::ops::OpKind;
use mpc_fusion_common::{RewriteError, RwResult};

const PASS: &str = "MPCPushUp";

/// DagRewriter that reverses the MPC boundary upward.
#[derive(Debug, Default)]
pub struct MpcPushUp;

impl MpcPushUp {
    pub fn new() -> Self {
        Self
    }

    /// A reversible unary operator at a lower boundary whose input is not a
    /// root relation becomes local; its output's stored-with set is pushed
    /// backward into its input.
    fn rewrite_unary(&mut self, dag: &mut OpDag, id: OpId) -> RwResult<()> {
        let parent = dag.parent(id).ok_or_else(|| {
            RewriteError::invariant(PASS, dag.node(id).name(), "unary operator has no parent")
        })?;
        if dag.node(id).is_reversible() && dag.is_lower_boundary(id) && !dag.is_root(parent) {
            let stored_with = dag.node(id).out_rel.stored_with.clone();
            dag.node_mut(parent).out_rel.stored_with = stored_with;
            dag.node_mut(id).is_mpc = false;
        }
        Ok(())
    }

    /// Concats are always reversible; at a lower boundary the concat runs
    /// locally and its stored-with set propagates into every non-root
    /// parent.
    fn rewrite_concat(&mut self, dag: &mut OpDag, id: OpId) -> RwResult<()> {
        if dag.is_lower_boundary(id) {
            let stored_with = dag.node(id).out_rel.stored_with.clone();
            for parent in dag.parents(id) {
                if !dag.is_root(parent) {
                    dag.node_mut(parent).out_rel.stored_with = stored_with.clone();
                }
            }
            dag.node_mut(id).is_mpc = false;
        }
        Ok(())
    }
}

impl DagRewriter for MpcPushUp {
    fn name(&self) -> &'static str {
        "MPCPushUp"
    }

    fn reverse(&self) -> bool {
        true
    }

    fn rewrite_node(&mut self, dag: &mut OpDag, id: OpId) -> RwResult<()> {
        match &dag.node(id).kind {
            OpKind::HybridJoin(_) | OpKind::RevealJoin(_) => Err(reject_unexpanded(PASS, dag, id)),
            OpKind::Project(_) | OpKind::Filter(_) | OpKind::Multiply(_) | OpKind::Divide(_) => {
                self.rewrite_unary(dag, id)
            }
            OpKind::Concat(_) => self.rewrite_concat(dag, id),
            // Column-wise concatenation reads all inputs in lockstep, so it
            // is conservatively kept under MPC.
            OpKind::ConcatCols => {
                dag.node_mut(id).is_mpc = true;
                Ok(())
            }
            OpKind::Shuffle
            | OpKind::Persist
            | OpKind::Index(_)
            | OpKind::SortBy(_)
            | OpKind::CompNeighs(_) => Err(reject_primitive(PASS, dag, id)),
            _ => Ok(()),
        }
    }
}
