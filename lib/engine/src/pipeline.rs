use crate::validation::validate_dag;
use mpc_fusion_common::RwResult;
use mpc_fusion_logical::rewrite::{
    DagRewriter, ExpandComposite, HybridOperatorOpt, InsertOpenClose, MpcPushDown, MpcPushUp,
    RewriteTrace, StoredWithSimplifier, TrustSetPropDown, UpdateColumns,
};
use mpc_fusion_logical::OpDag;
use mpc_fusion_model::PartySet;

/// Runs the full rewrite pipeline over `dag`.
///
/// The DAG is validated, then rewritten in place by the fixed pass sequence:
/// push-down, column update, push-up, trust propagation, hybrid
/// specialisation, boundary insertion, composite expansion and stored-with
/// simplification. `all_parties` is the universe used to canonicalise shared
/// stored-with sets; `use_leaky_ops` selects the size-leaking hybrid
/// expansion templates (the only ones implemented).
///
/// On success the returned [`RewriteTrace`] holds one line per node visit in
/// pass order; on error the pipeline stops at the first failing pass.
pub fn rewrite_dag(
    dag: &mut OpDag,
    all_parties: &PartySet,
    use_leaky_ops: bool,
) -> RwResult<RewriteTrace> {
    validate_dag(dag)?;

    let mut trace = RewriteTrace::new();
    MpcPushDown::new().rewrite(dag, &mut trace)?;
    UpdateColumns::new().rewrite(dag, &mut trace)?;
    MpcPushUp::new().rewrite(dag, &mut trace)?;
    TrustSetPropDown::new().rewrite(dag, &mut trace)?;
    HybridOperatorOpt::new().rewrite(dag, &mut trace)?;
    InsertOpenClose::new().rewrite(dag, &mut trace)?;
    ExpandComposite::new(use_leaky_ops).rewrite(dag, &mut trace)?;
    StoredWithSimplifier::new(all_parties.clone()).rewrite(dag, &mut trace)?;

    tracing::debug!(nodes = dag.node_count(), "rewrite pipeline finished");
    Ok(trace)
}
