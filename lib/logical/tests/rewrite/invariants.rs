//! Cross-cutting invariants checked on rewritten DAGs.

use crate::test_utils::{int_col, run_pipeline};
use mpc_fusion_logical::ops::{Aggregator, OpKind};
use mpc_fusion_logical::{OpDag, OpId};
use mpc_fusion_model::PartySet;

fn boundary_edges_are_materialised(dag: &OpDag) {
    for id in dag.node_ids() {
        for child in dag.children(id) {
            let parent_mpc = dag.node(id).is_mpc;
            let child_mpc = dag.node(child).is_mpc;
            if parent_mpc != child_mpc {
                let endpoint_is_boundary = matches!(
                    dag.node(id).kind,
                    OpKind::Close | OpKind::Open(_)
                ) || matches!(
                    dag.node(child).kind,
                    OpKind::Close | OpKind::Open(_)
                );
                assert!(
                    endpoint_is_boundary,
                    "edge {} -> {} crosses the regime without a Close/Open",
                    dag.node(id).name(),
                    dag.node(child).name()
                );
            }
        }
    }
}

fn stored_with_is_canonical(dag: &OpDag, universe: &PartySet) {
    for id in dag.node_ids() {
        let stored_with = &dag.node(id).out_rel.stored_with;
        if stored_with.is_shared() {
            assert_eq!(stored_with, universe);
        }
    }
}

fn column_indices_are_dense(dag: &OpDag) {
    for id in dag.node_ids() {
        for (idx, col) in dag.node(id).out_rel.columns.iter().enumerate() {
            assert_eq!(col.idx, idx, "{}: column '{}'", dag.node(id).name(), col.name);
        }
    }
}

fn column_references_resolve(dag: &mut OpDag) {
    for id in dag.node_ids().collect::<Vec<OpId>>() {
        dag.update_op_specific_cols(id).unwrap();
    }
}

fn rewritten_fixture() -> (OpDag, PartySet) {
    let universe = PartySet::from([1, 2, 3]);
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
    let in3 = dag.create(
        "in3",
        vec![
            int_col("k", PartySet::singleton(3)),
            int_col("w", PartySet::new()),
        ],
        PartySet::singleton(3),
    );
    let rel = dag.concat(&[in1, in2], "rel").unwrap();
    let agg = dag
        .aggregate(rel, "agg", &["a"], "b", Aggregator::Sum, "total")
        .unwrap();
    let joined = dag.join(agg, in3, "joined", &["a"], &["k"]).unwrap();
    dag.collect(joined, 1);

    run_pipeline(&mut dag, universe.clone());
    (dag, universe)
}

#[test]
fn rewritten_dag_is_acyclic_and_boundary_complete() {
    let (dag, universe) = rewritten_fixture();

    assert!(dag.top_sort().is_ok());
    boundary_edges_are_materialised(&dag);
    stored_with_is_canonical(&dag, &universe);
    column_indices_are_dense(&dag);
    assert!(dag
        .node_ids()
        .all(|id| !matches!(
            dag.node(id).kind,
            OpKind::HybridJoin(_) | OpKind::HybridAggregate(_)
        )));
}

#[test]
fn rewritten_dag_still_resolves_every_column_reference() {
    let (mut dag, _) = rewritten_fixture();
    column_references_resolve(&mut dag);
}

#[test]
fn trust_sets_shrink_monotonically_through_an_aggregate() {
    let mut dag = OpDag::new();
    let input = dag.create(
        "rel",
        vec![
            int_col("a", PartySet::from([1, 2])),
            int_col("b", PartySet::singleton(1)),
        ],
        PartySet::singleton(1),
    );
    let agg = dag
        .aggregate(input, "agg", &["a"], "b", Aggregator::Sum, "total")
        .unwrap();

    run_pipeline(&mut dag, PartySet::from([1, 2]));

    let in_cols = dag.node(input).out_rel.columns.clone();
    let out_cols = dag.node(agg).out_rel.columns.clone();
    assert_eq!(
        out_cols[0].trust_set,
        out_cols[0].trust_set.intersect(&in_cols[0].trust_set),
        "output trust must be a subset of the contributing input trust"
    );
    assert_eq!(
        out_cols[1].trust_set,
        out_cols[1].trust_set.intersect(&in_cols[1].trust_set),
    );
}
