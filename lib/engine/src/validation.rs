use itertools::Itertools;
use mpc_fusion_common::{RewriteError, RwResult};
use mpc_fusion_logical::ops::OpKind;
use mpc_fusion_logical::OpDag;
use std::collections::BTreeSet;

/// Rejects malformed input before the first pass runs.
///
/// The builder's contract: relation names are unique, stored-with sets are
/// non-empty, column indices are dense, the graph is acyclic, input slots
/// are unambiguous, and only `Close`/`Open` arrive pre-tagged as MPC.
pub fn validate_dag(dag: &OpDag) -> RwResult<()> {
    if dag.node_count() == 0 {
        return Err(RewriteError::malformed("the operator graph is empty"));
    }

    // Also detects cycles.
    dag.top_sort()?;

    let mut names = BTreeSet::new();
    for id in dag.node_ids() {
        let node = dag.node(id);
        let name = node.name();

        if !names.insert(name.to_owned()) {
            return Err(RewriteError::malformed(format!(
                "duplicate relation name '{name}'"
            )));
        }

        if node.out_rel.stored_with.is_empty() {
            return Err(RewriteError::malformed(format!(
                "relation '{name}' has an empty stored-with set"
            )));
        }

        for (idx, col) in node.out_rel.columns.iter().enumerate() {
            if col.idx != idx {
                return Err(RewriteError::malformed(format!(
                    "relation '{name}': column '{}' has index {} but sits at position {idx}",
                    col.name, col.idx
                )));
            }
        }

        if node.is_mpc && !matches!(node.kind, OpKind::Close | OpKind::Open(_)) {
            return Err(RewriteError::malformed(format!(
                "relation '{name}': only Close and Open may enter the pipeline tagged MPC"
            )));
        }

        let slots: Vec<usize> = dag
            .parents(id)
            .into_iter()
            .filter_map(|parent| dag.in_slot(parent, id))
            .collect();
        if slots.iter().duplicates().next().is_some() {
            return Err(RewriteError::malformed(format!(
                "relation '{name}' has two inputs on the same slot"
            )));
        }
    }

    Ok(())
}
