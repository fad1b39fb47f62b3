use crate::ops::OpKind;
use mpc_fusion_model::Relation;

/// A single operator in the DAG.
///
/// The node owns its output schema; parent and child edges live in the
/// [`OpDag`](crate::OpDag) arena, not here. `is_mpc` is false by default and
/// maintained by the rewrite passes; only `Close` and `Open` enter the
/// pipeline pre-tagged.
#[derive(Debug, Clone, PartialEq)]
pub struct OpNode {
    pub kind: OpKind,
    pub out_rel: Relation,
    pub is_mpc: bool,
}

impl OpNode {
    pub fn new(kind: OpKind, out_rel: Relation) -> Self {
        Self {
            kind,
            out_rel,
            is_mpc: false,
        }
    }

    /// Name of the produced relation; unique across the DAG.
    pub fn name(&self) -> &str {
        &self.out_rel.name
    }

    /// True for operators that can be re-executed locally when the MPC
    /// boundary moves back up past them.
    pub fn is_reversible(&self) -> bool {
        matches!(
            self.kind,
            OpKind::Project(_)
                | OpKind::Filter(_)
                | OpKind::Multiply(_)
                | OpKind::Divide(_)
                | OpKind::Concat(_)
        )
    }

    /// True for kinds whose semantics is cryptographic no matter where their
    /// inputs live.
    pub fn is_inherently_mpc(&self) -> bool {
        matches!(
            self.kind,
            OpKind::Close
                | OpKind::Open(_)
                | OpKind::HybridJoin(_)
                | OpKind::HybridAggregate(_)
                | OpKind::RevealJoin(_)
                | OpKind::FlagJoin(_)
                | OpKind::IndexAggregate(_)
        )
    }
}
