//! End-to-end tests of the validated driver pipeline.

use mpc_fusion_common::RewriteError;
use mpc_fusion_engine::rewrite_dag;
use mpc_fusion_logical::ops::{Aggregator, OpKind};
use mpc_fusion_logical::{OpDag, OpId};
use mpc_fusion_model::{ColType, Column, PartySet};

fn int_col(name: &str, trust: PartySet) -> Column {
    Column::def(name, ColType::Integer, trust)
}

fn find(dag: &OpDag, name: &str) -> OpId {
    dag.node_ids()
        .find(|id| dag.node(*id).name() == name)
        .unwrap_or_else(|| panic!("no node named '{name}'"))
}

fn concat_aggregate_workflow() -> OpDag {
    let mut dag = OpDag::new();
    let in1 = dag.create(
        "in1",
        vec![
            int_col("a", PartySet::singleton(1)),
            int_col("b", PartySet::singleton(1)),
        ],
        PartySet::singleton(1),
    );
    let in2 = dag.create(
        "in2",
        vec![
            int_col("a", PartySet::singleton(2)),
            int_col("b", PartySet::singleton(2)),
        ],
        PartySet::singleton(2),
    );
    let rel = dag.concat(&[in1, in2], "rel").unwrap();
    let agg = dag
        .aggregate(rel, "agg", &["a"], "b", Aggregator::Sum, "total")
        .unwrap();
    dag.collect(agg, 1);
    dag
}

#[test]
fn diagnostic_trace_is_stable() {
    let mut dag = concat_aggregate_workflow();
    let trace = rewrite_dag(&mut dag, &PartySet::from([1, 2]), true).unwrap();

    let lines: Vec<&str> = trace.lines().iter().map(String::as_str).collect();
    assert_eq!(
        lines[..4],
        [
            "MPCPushDown rewriting in1",
            "MPCPushDown rewriting in2",
            "MPCPushDown rewriting rel",
            "MPCPushDown rewriting agg",
        ]
    );
    assert_eq!(
        lines[4..10],
        [
            "UpdateColumns rewriting in1",
            "UpdateColumns rewriting in2",
            "UpdateColumns rewriting agg_0",
            "UpdateColumns rewriting agg_1",
            "UpdateColumns rewriting rel",
            "UpdateColumns rewriting agg_obl",
        ]
    );
    // Every later pass visits the same surviving nodes; the last pass is the
    // stored-with simplifier.
    assert!(lines.last().unwrap().starts_with("StoredWithSimplifier rewriting"));
}

#[test]
fn rewritten_workflow_carries_explicit_boundaries() {
    let mut dag = concat_aggregate_workflow();
    rewrite_dag(&mut dag, &PartySet::from([1, 2]), true).unwrap();

    let obl = find(&dag, "agg_obl");
    assert!(dag.node(obl).is_mpc);
    let open = find(&dag, "agg_obl_open");
    assert!(matches!(dag.node(open).kind, OpKind::Open(_)));
    assert_eq!(dag.node(open).out_rel.stored_with, PartySet::singleton(1));
    for name in ["agg_0_close", "agg_1_close"] {
        assert!(matches!(dag.node(find(&dag, name)).kind, OpKind::Close));
    }
}

#[test]
fn duplicate_relation_names_abort_before_any_pass() {
    let mut dag = OpDag::new();
    let in1 = dag.create(
        "rel",
        vec![int_col("a", PartySet::new())],
        PartySet::singleton(1),
    );
    let _dup = dag.project(in1, "rel", &["a"]).unwrap();

    let err = rewrite_dag(&mut dag, &PartySet::from([1, 2]), true).unwrap_err();
    assert!(matches!(err, RewriteError::MalformedInput { .. }));
}

#[test]
fn preset_mpc_flags_are_rejected() {
    let mut dag = OpDag::new();
    let in1 = dag.create(
        "rel",
        vec![int_col("a", PartySet::new())],
        PartySet::singleton(1),
    );
    let proj = dag.project(in1, "proj", &["a"]).unwrap();
    dag.node_mut(proj).is_mpc = true;

    let err = rewrite_dag(&mut dag, &PartySet::from([1, 2]), true).unwrap_err();
    assert!(matches!(err, RewriteError::MalformedInput { .. }));
}

#[test]
fn oblivious_expansion_request_fails_cleanly() {
    let mut dag = OpDag::new();
    let in_a = dag.create(
        "inA",
        vec![
            int_col("k", PartySet::singleton(3)),
            int_col("v", PartySet::new()),
        ],
        PartySet::singleton(1),
    );
    let in_b = dag.create(
        "inB",
        vec![
            int_col("k2", PartySet::singleton(3)),
            int_col("w", PartySet::new()),
        ],
        PartySet::singleton(2),
    );
    let joined = dag.join(in_a, in_b, "joined", &["k"], &["k2"]).unwrap();
    dag.collect(joined, 1);

    let err = rewrite_dag(&mut dag, &PartySet::from([1, 2, 3]), false).unwrap_err();
    assert!(matches!(err, RewriteError::UnsupportedInPass { .. }));
}

#[test]
fn single_party_pipeline_is_a_no_op() {
    let mut dag = OpDag::new();
    let in1 = dag.create(
        "in1",
        vec![int_col("a", PartySet::new()), int_col("b", PartySet::new())],
        PartySet::singleton(1),
    );
    let proj = dag.project(in1, "proj", &["a"]).unwrap();
    dag.collect(proj, 1);

    let before = dag.node_count();
    rewrite_dag(&mut dag, &PartySet::from([1, 2]), true).unwrap();

    assert_eq!(dag.node_count(), before);
    assert!(dag.node_ids().all(|id| !dag.node(id).is_mpc));
}
