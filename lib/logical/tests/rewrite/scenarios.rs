//! End-to-end structural scenarios over the pass pipeline.

use crate::test_utils::{find, int_col, names_of, run_pipeline};
use mpc_fusion_logical::ops::{Aggregator, FilterPredicate, OpKind};
use mpc_fusion_logical::rewrite::{DagRewriter, MpcPushDown, RewriteTrace};
use mpc_fusion_logical::{OpDag, OpId};
use mpc_fusion_model::PartySet;

fn two_party_inputs(dag: &mut OpDag) -> (OpId, OpId) {
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
    (in1, in2)
}

/// A projection below a two-party concat is relocated beneath it, one local
/// copy per party; the concat itself stays MPC.
#[test]
fn concat_then_project_pushes_local_projections() {
    let mut dag = OpDag::new();
    let (in1, in2) = two_party_inputs(&mut dag);
    let rel = dag.concat(&[in1, in2], "rel").unwrap();
    let proj = dag.project(rel, "projA", &["a", "b"]).unwrap();
    let sink = dag.distinct_count(proj, "counted", "a").unwrap();

    MpcPushDown::new()
        .rewrite(&mut dag, &mut RewriteTrace::new())
        .unwrap();

    assert!(!dag.contains(proj));
    let proj_left = find(&dag, "projA_0");
    let proj_right = find(&dag, "projA_1");
    assert!(!dag.node(proj_left).is_mpc);
    assert!(!dag.node(proj_right).is_mpc);
    assert_eq!(
        dag.node(proj_left).out_rel.stored_with,
        PartySet::singleton(1)
    );
    assert_eq!(
        dag.node(proj_right).out_rel.stored_with,
        PartySet::singleton(2)
    );

    assert_eq!(dag.parents(rel), vec![proj_left, proj_right]);
    assert!(dag.node(rel).is_mpc);
    assert_eq!(dag.node(rel).out_rel.stored_with, PartySet::from([1, 2]));
    assert!(dag.node(sink).is_mpc);
}

/// The concat-into-aggregate workflow ends as per-party partial
/// aggregations, secret-shared into the MPC concat, re-aggregated
/// obliviously and opened at the collecting party.
#[test]
fn concat_then_aggregate_splits_and_opens() {
    let mut dag = OpDag::new();
    let (in1, in2) = two_party_inputs(&mut dag);
    let rel = dag.concat(&[in1, in2], "rel").unwrap();
    let agg = dag
        .aggregate(rel, "agg", &["a"], "b", Aggregator::Sum, "total")
        .unwrap();
    dag.collect(agg, 1);

    run_pipeline(&mut dag, PartySet::from([1, 2]));

    insta::assert_snapshot!(dag.dbg_str(), @r"
    Create in1([a {1}, b {1}]) {1} <- []
    Create in2([a {2}, b {2}]) {2} <- []
    Aggregate agg_0([a {1}, total {1}]) {1} <- [in1]
    Aggregate agg_1([a {2}, total {2}]) {2} <- [in2]
    Close MPC agg_0_close([a {1}, total {1}]) {1, 2} <- [agg_0]
    Close MPC agg_1_close([a {2}, total {2}]) {1, 2} <- [agg_1]
    Concat MPC rel([a {}, total {}]) {1, 2} <- [agg_0_close, agg_1_close]
    Aggregate MPC agg_obl([a {}, total {}]) {1, 2} <- [rel]
    Open MPC agg_obl_open([a {}, total {}]) {1} <- [agg_obl]
    ");
}

/// Joins of two single-party inputs: the per-party projections stay local,
/// both join inputs are closed, the join and everything after it is MPC, and
/// the collected aggregate is opened at party 1.
#[test]
fn projected_join_closes_inputs_and_opens_result() {
    let mut dag = OpDag::new();
    let in_a = dag.create(
        "inA",
        vec![int_col("k", PartySet::new()), int_col("v", PartySet::new())],
        PartySet::singleton(1),
    );
    let in_b = dag.create(
        "inB",
        vec![int_col("k2", PartySet::new()), int_col("w", PartySet::new())],
        PartySet::singleton(2),
    );
    let proj_a = dag.project(in_a, "projA", &["k", "v"]).unwrap();
    let proj_b = dag.project(in_b, "projB", &["k2", "w"]).unwrap();
    let joined = dag.join(proj_a, proj_b, "joined", &["k"], &["k2"]).unwrap();
    let proj = dag.project(joined, "proj", &["k", "v"]).unwrap();
    let agg = dag
        .aggregate(proj, "agg", &["k"], "v", Aggregator::Sum, "total")
        .unwrap();
    dag.collect(agg, 1);

    run_pipeline(&mut dag, PartySet::from([1, 2]));

    assert!(!dag.node(proj_a).is_mpc);
    assert!(!dag.node(proj_b).is_mpc);
    for id in [joined, proj, agg] {
        assert!(dag.node(id).is_mpc);
    }

    let closes = vec![find(&dag, "projA_close"), find(&dag, "projB_close")];
    assert_eq!(dag.parents(joined), closes);
    for close in closes {
        assert!(matches!(dag.node(close).kind, OpKind::Close));
        assert_eq!(
            dag.node(close).out_rel.stored_with,
            PartySet::from([1, 2])
        );
    }

    let open = find(&dag, "agg_open");
    assert!(matches!(dag.node(open).kind, OpKind::Open(_)));
    assert_eq!(dag.node(open).out_rel.stored_with, PartySet::singleton(1));
    assert_eq!(dag.parents(open), vec![agg]);
}

/// A trusted key column turns the MPC join into a hybrid join, which the
/// expander replaces by its eleven-node subgraph.
#[test]
fn trusted_join_key_expands_to_flag_join() {
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

    run_pipeline(&mut dag, PartySet::from([1, 2, 3]));

    // The original hybrid node is gone and nothing hybrid survives.
    assert!(dag
        .node_ids()
        .all(|id| !matches!(
            dag.node(id).kind,
            OpKind::HybridJoin(_) | OpKind::HybridAggregate(_)
        )));

    let result = find(&dag, "joined");
    assert!(matches!(dag.node(result).kind, OpKind::FlagJoin(_)));
    assert!(dag.node(result).is_mpc);
    assert_eq!(
        names_of(&dag, &dag.parents(result)),
        vec![
            "left_persisted_hybrid_join_1",
            "right_persisted_hybrid_join_1",
            "flags_closed_hybrid_join_1"
        ]
    );

    // The revealed keys go to the selectively-trusted party 3.
    let left_open = find(&dag, "left_keys_open_hybrid_join_1");
    assert_eq!(
        dag.node(left_open).out_rel.stored_with,
        PartySet::singleton(3)
    );
    let flags = find(&dag, "flags_hybrid_join_1");
    assert!(!dag.node(flags).is_mpc);

    // The collected result is still opened at party 1.
    let open = find(&dag, "joined_open");
    assert_eq!(names_of(&dag, &dag.children(result)), vec!["joined_open"]);
    assert_eq!(dag.node(open).out_rel.stored_with, PartySet::singleton(1));

    // Eleven expansion nodes carry the per-instance suffix.
    let expanded = dag
        .node_ids()
        .filter(|id| dag.node(*id).name().ends_with("_hybrid_join_1"))
        .count();
    assert_eq!(expanded, 10);
    // ...plus the flag join itself, which keeps the original relation name.
}

/// Filtering on untrusted columns wipes the trust a bystander column had.
#[test]
fn filter_condition_erases_unrelated_trust() {
    let mut dag = OpDag::new();
    let input = dag.create(
        "rel",
        vec![
            int_col("a", PartySet::singleton(1)),
            int_col("b", PartySet::singleton(1)),
            int_col("c", PartySet::singleton(3)),
        ],
        PartySet::singleton(1),
    );
    let filt = dag
        .filter(input, "filt", "a", FilterPredicate::Eq, "b")
        .unwrap();

    run_pipeline(&mut dag, PartySet::from([1, 3]));

    let out_rel = &dag.node(filt).out_rel;
    assert_eq!(out_rel.columns[2].name, "c");
    assert!(out_rel.columns[2].trust_set.is_empty());
}

/// A workflow held entirely by one party is never touched: no node goes
/// MPC and no boundary operators appear.
#[test]
fn single_party_workflow_is_structurally_untouched() {
    let mut dag = OpDag::new();
    let in1 = dag.create(
        "in1",
        vec![int_col("a", PartySet::new()), int_col("b", PartySet::new())],
        PartySet::singleton(1),
    );
    let in2 = dag.create(
        "in2",
        vec![int_col("a", PartySet::new()), int_col("b", PartySet::new())],
        PartySet::singleton(1),
    );
    let rel = dag.concat(&[in1, in2], "rel").unwrap();
    let agg = dag
        .aggregate(rel, "agg", &["a"], "b", Aggregator::Sum, "total")
        .unwrap();
    dag.collect(agg, 1);

    let before = dag.node_count();
    run_pipeline(&mut dag, PartySet::from([1, 2]));

    assert_eq!(dag.node_count(), before);
    assert!(dag.node_ids().all(|id| !dag.node(id).is_mpc));
}
