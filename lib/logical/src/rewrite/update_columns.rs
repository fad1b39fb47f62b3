//! Re-resolves every operator-specific column reference after the
//! structural edits of the push-down pass.

use super::DagRewriter;
use crate::dag::{OpDag, OpId};
use mpc_fusion_common::RwResult;

/// Single forward sweep calling the catalog's column update on every node.
#[derive(Debug, Default)]
pub struct UpdateColumns;

impl UpdateColumns {
    pub fn new() -> Self {
        Self
    }
}

impl DagRewriter for UpdateColumns {
    fn name(&self) -> &'static str {
        "UpdateColumns"
    }

    fn rewrite_node(&mut self, dag: &mut OpDag, id: OpId) -> RwResult<()> {
        dag.update_op_specific_cols(id)
    }
}
