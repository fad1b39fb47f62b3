use mpc_fusion_logical::rewrite::{
    DagRewriter, ExpandComposite, HybridOperatorOpt, InsertOpenClose, MpcPushDown, MpcPushUp,
    RewriteTrace, StoredWithSimplifier, TrustSetPropDown, UpdateColumns,
};
use mpc_fusion_logical::{OpDag, OpId};
use mpc_fusion_model::{ColType, Column, PartySet};

pub fn int_col(name: &str, trust: PartySet) -> Column {
    Column::def(name, ColType::Integer, trust)
}

pub fn find(dag: &OpDag, name: &str) -> OpId {
    dag.node_ids()
        .find(|id| dag.node(*id).name() == name)
        .unwrap_or_else(|| panic!("no node named '{name}'"))
}

pub fn names_of(dag: &OpDag, ids: &[OpId]) -> Vec<String> {
    ids.iter().map(|id| dag.node(*id).name().to_owned()).collect()
}

/// Runs the passes in driver order over an already-validated DAG.
pub fn run_pipeline(dag: &mut OpDag, all_parties: PartySet) -> RewriteTrace {
    let mut trace = RewriteTrace::new();
    MpcPushDown::new().rewrite(dag, &mut trace).unwrap();
    UpdateColumns::new().rewrite(dag, &mut trace).unwrap();
    MpcPushUp::new().rewrite(dag, &mut trace).unwrap();
    TrustSetPropDown::new().rewrite(dag, &mut trace).unwrap();
    HybridOperatorOpt::new().rewrite(dag, &mut trace).unwrap();
    InsertOpenClose::new().rewrite(dag, &mut trace).unwrap();
    ExpandComposite::new(true).rewrite(dag, &mut trace).unwrap();
    StoredWithSimplifier::new(all_parties)
        .rewrite(dag, &mut trace)
        .unwrap();
    trace
}
