//! Canonicalises multi-party stored-with sets to the all-parties universe,
//! for backends that want a single label on the whole MPC region.

use super::{DagRewriter, RewriteTrace};
use crate::dag::{OpDag, OpId};
use mpc_fusion_common::RwResult;
use mpc_fusion_model::PartySet;

/// DagRewriter that normalises shared stored-with sets.
#[derive(Debug)]
pub struct StoredWithSimplifier {
    all_parties: PartySet,
}

impl StoredWithSimplifier {
    pub fn new(all_parties: PartySet) -> Self {
        Self { all_parties }
    }
}

impl DagRewriter for StoredWithSimplifier {
    fn name(&self) -> &'static str {
        "StoredWithSimplifier"
    }

    fn rewrite_node(&mut self, dag: &mut OpDag, id: OpId) -> RwResult<()> {
        if dag.node(id).out_rel.stored_with.is_shared() {
            dag.node_mut(id).out_rel.stored_with = self.all_parties.clone();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mpc_fusion_model::{ColType, Column};

    #[test]
    fn shared_sets_become_the_universe_and_singletons_survive() {
        let mut dag = OpDag::new();
        let shared = dag.create(
            "shared",
            vec![Column::def("a", ColType::Integer, PartySet::new())],
            PartySet::from([2, 3]),
        );
        let local = dag.create(
            "local",
            vec![Column::def("a", ColType::Integer, PartySet::new())],
            PartySet::singleton(2),
        );

        StoredWithSimplifier::new(PartySet::from([1, 2, 3]))
            .rewrite(&mut dag, &mut RewriteTrace::new())
            .unwrap();

        assert_eq!(
            dag.node(shared).out_rel.stored_with,
            PartySet::from([1, 2, 3])
        );
        assert_eq!(dag.node(local).out_rel.stored_with, PartySet::singleton(2));
    }
}
