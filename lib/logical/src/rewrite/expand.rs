//! Expands composite hybrid operators into subgraphs of primitive
//! operators.
//!
//! Only the size-leaking templates exist: the trusted party learns the
//! (shuffled) key material and the input sizes, and uses them to direct the
//! MPC computation through index/flag relations. Relation names inside each
//! subgraph carry a per-instance suffix so several hybrids never collide.

use super::{reject_primitive, DagRewriter};
use crate::dag::{OpDag, OpId};
use crate::ops::OpKind;
use mpc_fusion_common::{RewriteError, RwResult};

const PASS: &str = "ExpandComposite";

/// DagRewriter that replaces hybrid operators by their primitive subgraphs.
#[derive(Debug)]
pub struct ExpandComposite {
    use_leaky_ops: bool,
    agg_counter: usize,
    join_counter: usize,
}

impl ExpandComposite {
    /// `use_leaky_ops` selects the size-leaking templates; the oblivious
    /// variants are not implemented and requesting them is an error.
    pub fn new(use_leaky_ops: bool) -> Self {
        Self {
            use_leaky_ops,
            agg_counter: 0,
            join_counter: 0,
        }
    }

    fn next_agg_suffix(&mut self) -> String {
        self.agg_counter += 1;
        format!("_hybrid_agg_{}", self.agg_counter)
    }

    fn next_join_suffix(&mut self) -> String {
        self.join_counter += 1;
        format!("_hybrid_join_{}", self.join_counter)
    }

    /// Replaces a hybrid aggregation by:
    ///
    /// ```text
    /// parent -> Shuffle -> Persist ----------------------------+
    ///              \-> Project(group) -> Open(STP) ->          |
    ///                    Index -> SortBy -> CompNeighs ->      +-> IndexAggregate -> children
    ///                    Close -------------------------------+|
    ///                    Project(row_index, group) -> Close --+
    /// ```
    ///
    /// The shuffle, persist, projections under MPC, both closes and the
    /// final index aggregation are MPC; the index/sort/compare stage runs at
    /// the trusted party on the revealed keys.
    fn expand_hybrid_agg(&mut self, dag: &mut OpDag, id: OpId) -> RwResult<()> {
        let suffix = self.next_agg_suffix();
        let node = dag.node(id).clone();
        let OpKind::HybridAggregate(op) = &node.kind else {
            return Err(RewriteError::invariant(
                PASS,
                node.name(),
                "hybrid aggregation expected",
            ));
        };
        let agg = op.agg.clone();
        let trusted_party = op.trusted_party;
        let group_col_name = agg
            .group_cols
            .first()
            .map(|col| col.name.clone())
            .ok_or_else(|| {
                RewriteError::invariant(PASS, node.name(), "hybrid aggregation has no group column")
            })?;
        let parent = dag.parent(id).ok_or_else(|| {
            RewriteError::invariant(PASS, node.name(), "hybrid aggregation has no parent")
        })?;
        let in_stored_with = dag.node(parent).out_rel.stored_with.clone();

        dag.remove_edge_between(parent, id)?;

        let shuffled = dag.shuffle(parent, &format!("shuffled{suffix}"));
        dag.node_mut(shuffled).is_mpc = true;

        let persisted = dag.persist(shuffled, &format!("persisted{suffix}"));
        dag.node_mut(persisted).is_mpc = true;

        let keys_closed =
            dag.project(shuffled, &format!("keys_closed{suffix}"), &[&group_col_name])?;
        dag.node_mut(keys_closed).is_mpc = true;

        let keys = dag.open(keys_closed, &format!("keys{suffix}"), Some(trusted_party));

        let indexed = dag.index(keys, &format!("indexed{suffix}"), "row_index");
        let sorted_by_key = dag.sort_by(
            indexed,
            &format!("sorted_by_key{suffix}"),
            &group_col_name,
        )?;
        let eq_flags =
            dag.comp_neighs(sorted_by_key, &format!("eq_flags{suffix}"), &group_col_name)?;
        let sorted_dummy = dag.project(
            sorted_by_key,
            &format!("sorted_by_key_dummy{suffix}"),
            &["row_index", &group_col_name],
        )?;

        let closed_eq_flags = dag.close(
            eq_flags,
            &format!("closed_eq_flags{suffix}"),
            in_stored_with.clone(),
        );
        let closed_sorted = dag.close(
            sorted_dummy,
            &format!("closed_sorted_by_key{suffix}"),
            in_stored_with,
        );

        let result =
            dag.index_aggregate(persisted, closed_eq_flags, closed_sorted, agg, node.out_rel);
        dag.node_mut(result).is_mpc = true;

        for child in dag.children(id) {
            dag.replace_parent(child, id, result)?;
        }
        dag.remove_node(id);
        Ok(())
    }

    /// Replaces a hybrid join by, per side, `Shuffle -> Persist` plus
    /// `Shuffle -> Project(keys) -> Open(STP)`; the revealed key relations
    /// feed a local `JoinFlags` at the trusted party, whose match-indicator
    /// vector is closed and drives the final MPC `FlagJoin` over the two
    /// persisted inputs.
    fn expand_hybrid_join(&mut self, dag: &mut OpDag, id: OpId) -> RwResult<()> {
        let suffix = self.next_join_suffix();
        let node = dag.node(id).clone();
        let OpKind::HybridJoin(op) = &node.kind else {
            return Err(RewriteError::invariant(
                PASS,
                node.name(),
                "hybrid join expected",
            ));
        };
        let join = op.join.clone();
        let trusted_party = op.trusted_party;

        let parents = dag.parents(id);
        let (left, right) = match parents.as_slice() {
            [left, right, ..] => (*left, *right),
            _ => {
                return Err(RewriteError::invariant(
                    PASS,
                    node.name(),
                    "hybrid join requires two inputs",
                ))
            }
        };
        let in_stored_with = dag
            .node(left)
            .out_rel
            .stored_with
            .union(&dag.node(right).out_rel.stored_with);

        let left_keys: Vec<String> = join
            .left_join_cols
            .iter()
            .map(|col| col.name.clone())
            .collect();
        let right_keys: Vec<String> = join
            .right_join_cols
            .iter()
            .map(|col| col.name.clone())
            .collect();
        let left_key_refs: Vec<&str> = left_keys.iter().map(String::as_str).collect();
        let right_key_refs: Vec<&str> = right_keys.iter().map(String::as_str).collect();

        dag.remove_edge_between(left, id)?;
        dag.remove_edge_between(right, id)?;

        let left_shuffled = dag.shuffle(left, &format!("left_shuffled{suffix}"));
        dag.node_mut(left_shuffled).is_mpc = true;
        let right_shuffled = dag.shuffle(right, &format!("right_shuffled{suffix}"));
        dag.node_mut(right_shuffled).is_mpc = true;

        let left_persisted = dag.persist(left_shuffled, &format!("left_persisted{suffix}"));
        dag.node_mut(left_persisted).is_mpc = true;
        let right_persisted = dag.persist(right_shuffled, &format!("right_persisted{suffix}"));
        dag.node_mut(right_persisted).is_mpc = true;

        let left_keys_closed = dag.project(
            left_shuffled,
            &format!("left_keys_closed{suffix}"),
            &left_key_refs,
        )?;
        dag.node_mut(left_keys_closed).is_mpc = true;
        let right_keys_closed = dag.project(
            right_shuffled,
            &format!("right_keys_closed{suffix}"),
            &right_key_refs,
        )?;
        dag.node_mut(right_keys_closed).is_mpc = true;

        let left_keys_open = dag.open(
            left_keys_closed,
            &format!("left_keys_open{suffix}"),
            Some(trusted_party),
        );
        let right_keys_open = dag.open(
            right_keys_closed,
            &format!("right_keys_open{suffix}"),
            Some(trusted_party),
        );

        let flags = dag.join_flags(
            left_keys_open,
            right_keys_open,
            &format!("flags{suffix}"),
            &left_key_refs,
            &right_key_refs,
        )?;

        let flags_closed = dag.close(flags, &format!("flags_closed{suffix}"), in_stored_with);

        let joined = dag.flag_join(left_persisted, right_persisted, flags_closed, join, node.out_rel);
        dag.node_mut(joined).is_mpc = true;

        for child in dag.children(id) {
            dag.replace_parent(child, id, joined)?;
        }
        dag.remove_node(id);
        Ok(())
    }
}

impl DagRewriter for ExpandComposite {
    fn name(&self) -> &'static str {
        "ExpandComposite"
    }

    fn rewrite_node(&mut self, dag: &mut OpDag, id: OpId) -> RwResult<()> {
        match &dag.node(id).kind {
            OpKind::HybridAggregate(_) => {
                if self.use_leaky_ops {
                    self.expand_hybrid_agg(dag, id)
                } else {
                    Err(RewriteError::unsupported_in_pass(
                        PASS,
                        "HybridAggregate (oblivious variant)",
                        dag.node(id).name(),
                    ))
                }
            }
            OpKind::HybridJoin(_) => {
                if self.use_leaky_ops {
                    self.expand_hybrid_join(dag, id)
                } else {
                    Err(RewriteError::unsupported_in_pass(
                        PASS,
                        "HybridJoin (oblivious variant)",
                        dag.node(id).name(),
                    ))
                }
            }
            OpKind::Shuffle
            | OpKind::Persist
            | OpKind::Index(_)
            | OpKind::SortBy(_)
            | OpKind::CompNeighs(_) => Err(reject_primitive(PASS, dag, id)),
            _ => Ok(()),
        }
    }
}
