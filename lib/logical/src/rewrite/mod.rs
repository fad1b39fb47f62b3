//! The rewrite passes.
//!
//! Each pass is a [`DagRewriter`]: it walks a snapshot of the topological
//! order (reversed for the push-up pass), emits one diagnostic line per
//! visited node, and dispatches on the operator kind. Structural edits made
//! mid-pass are visible to later visits, but nodes created mid-pass are not
//! revisited within the same pass, and nodes removed mid-pass are skipped.

mod expand;
mod hybrid_opt;
mod open_close;
mod push_down;
mod push_up;
mod simplify;
mod trust_prop;
mod update_columns;

pub use expand::ExpandComposite;
pub use hybrid_opt::HybridOperatorOpt;
pub use open_close::InsertOpenClose;
pub use push_down::MpcPushDown;
pub use push_up::MpcPushUp;
pub use simplify::StoredWithSimplifier;
pub use trust_prop::TrustSetPropDown;
pub use update_columns::UpdateColumns;

use crate::dag::{OpDag, OpId};
use mpc_fusion_common::{RewriteError, RwResult};

/// Ordered record of the diagnostic lines emitted while rewriting.
///
/// The format is stable (`<PassName> rewriting <rel_name>`); tests assert on
/// the sequence.
#[derive(Debug, Default)]
pub struct RewriteTrace {
    lines: Vec<String>,
}

impl RewriteTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, pass: &str, relation: &str) {
        tracing::debug!(pass, relation, "rewriting");
        self.lines.push(format!("{pass} rewriting {relation}"));
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

/// A single rewrite pass over the operator DAG.
pub trait DagRewriter {
    /// Name used in diagnostics and error payloads.
    fn name(&self) -> &'static str;

    /// Visit order; reverse topological when true.
    fn reverse(&self) -> bool {
        false
    }

    /// Inspects (and possibly restructures) one node.
    fn rewrite_node(&mut self, dag: &mut OpDag, id: OpId) -> RwResult<()>;

    /// Traverses the DAG in (reverse) topological order and rewrites each
    /// surviving node.
    fn rewrite(&mut self, dag: &mut OpDag, trace: &mut RewriteTrace) -> RwResult<()> {
        let mut order = dag.top_sort()?;
        if self.reverse() {
            order.reverse();
        }
        for id in order {
            if !dag.contains(id) {
                continue;
            }
            trace.record(self.name(), dag.node(id).name());
            self.rewrite_node(dag, id)?;
        }
        Ok(())
    }
}

/// Error for the expansion-only primitives reaching a pre-expansion pass.
pub(crate) fn reject_primitive(pass: &str, dag: &OpDag, id: OpId) -> RewriteError {
    let node = dag.node(id);
    RewriteError::unknown_operator(pass, node.kind.name(), node.name())
}

/// Error for hybrid/reveal operators reaching a pass that must not see them.
pub(crate) fn reject_unexpanded(pass: &str, dag: &OpDag, id: OpId) -> RewriteError {
    let node = dag.node(id);
    RewriteError::unsupported_in_pass(pass, node.kind.name(), node.name())
}
