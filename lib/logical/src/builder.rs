//! Programmatic construction of operator DAGs.
//!
//! Front ends and tests assemble workflows through these `append`-style
//! constructors; the composite expander uses the internal ones (`shuffle`,
//! `persist`, `open`, `close`, ...) to emit its subgraphs. Each constructor
//! derives the new node's output relation from its inputs, so the DAG is
//! schema-consistent by construction.

use crate::dag::{OpDag, OpId};
use crate::node::OpNode;
use crate::ops::{
    AggregateOp, Aggregator, CompNeighsOp, ConcatOp, DistinctCountOp, DistinctOp, FilterOp,
    FilterPredicate, FilterTarget, FlagJoinOp, HybridJoinOp, IndexAggregateOp, IndexJoinOp,
    IndexOp, JoinFlagsOp, JoinOp, LinearOp, OpKind, Operand, OpenOp, ProjectOp, PubJoinOp,
    RevealJoinOp, SortByOp,
};
use mpc_fusion_common::{RewriteError, RwResult};
use mpc_fusion_model::{ColType, Column, PartyId, PartySet, Relation};

/// Operand reference used when constructing linear operators: a column of
/// the input relation or a constant.
#[derive(Debug, Clone, Copy)]
pub enum OperandRef<'a> {
    Col(&'a str),
    Scalar(i64),
}

impl OpDag {
    /// Root input relation held by `stored_with`.
    pub fn create(
        &mut self,
        name: &str,
        columns: Vec<Column>,
        stored_with: PartySet,
    ) -> OpId {
        self.add_node(OpNode::new(
            OpKind::Create,
            Relation::new(name, columns, stored_with),
        ))
    }

    pub fn project(&mut self, parent: OpId, name: &str, cols: &[&str]) -> RwResult<OpId> {
        let in_rel = self.node(parent).out_rel.clone();
        let selected: Vec<Column> = cols
            .iter()
            .map(|col| lookup(&in_rel, col))
            .collect::<RwResult<_>>()?;
        let out_rel = Relation::new(name, selected.clone(), in_rel.stored_with.clone());
        Ok(self.unary(parent, OpKind::Project(ProjectOp { selected_cols: selected }), out_rel))
    }

    /// Keeps rows whose `col` satisfies the predicate against another
    /// column.
    pub fn filter(
        &mut self,
        parent: OpId,
        name: &str,
        col: &str,
        predicate: FilterPredicate,
        other_col: &str,
    ) -> RwResult<OpId> {
        let in_rel = self.node(parent).out_rel.clone();
        let filter_col = lookup(&in_rel, col)?;
        let target = FilterTarget::Column(lookup(&in_rel, other_col)?);
        let out_rel = Relation::new(name, in_rel.columns.clone(), in_rel.stored_with.clone());
        Ok(self.unary(
            parent,
            OpKind::Filter(FilterOp {
                filter_col,
                predicate,
                target,
            }),
            out_rel,
        ))
    }

    /// Keeps rows whose `col` satisfies the predicate against a constant.
    pub fn filter_scalar(
        &mut self,
        parent: OpId,
        name: &str,
        col: &str,
        predicate: FilterPredicate,
        scalar: i64,
    ) -> RwResult<OpId> {
        let in_rel = self.node(parent).out_rel.clone();
        let filter_col = lookup(&in_rel, col)?;
        let out_rel = Relation::new(name, in_rel.columns.clone(), in_rel.stored_with.clone());
        Ok(self.unary(
            parent,
            OpKind::Filter(FilterOp {
                filter_col,
                predicate,
                target: FilterTarget::Scalar(scalar),
            }),
            out_rel,
        ))
    }

    pub fn multiply(
        &mut self,
        parent: OpId,
        name: &str,
        target_col: &str,
        operands: &[OperandRef<'_>],
    ) -> RwResult<OpId> {
        let op = self.linear_op(parent, target_col, operands)?;
        let out_rel = self.linear_out_rel(parent, name, &op);
        Ok(self.unary(parent, OpKind::Multiply(op), out_rel))
    }

    pub fn divide(
        &mut self,
        parent: OpId,
        name: &str,
        target_col: &str,
        operands: &[OperandRef<'_>],
    ) -> RwResult<OpId> {
        let op = self.linear_op(parent, target_col, operands)?;
        let out_rel = self.linear_out_rel(parent, name, &op);
        Ok(self.unary(parent, OpKind::Divide(op), out_rel))
    }

    /// Groups by `group_cols` and combines `agg_col` with `aggregator`; the
    /// aggregated output column is named `out_col`.
    pub fn aggregate(
        &mut self,
        parent: OpId,
        name: &str,
        group_cols: &[&str],
        agg_col: &str,
        aggregator: Aggregator,
        out_col: &str,
    ) -> RwResult<OpId> {
        let in_rel = self.node(parent).out_rel.clone();
        let group: Vec<Column> = group_cols
            .iter()
            .map(|col| lookup(&in_rel, col))
            .collect::<RwResult<_>>()?;
        let agg = lookup(&in_rel, agg_col)?;

        let mut out_cols = group.clone();
        let mut out_agg = agg.clone();
        out_agg.name = out_col.to_owned();
        out_cols.push(out_agg);
        let out_rel = Relation::new(name, out_cols, in_rel.stored_with.clone());

        Ok(self.unary(
            parent,
            OpKind::Aggregate(AggregateOp {
                group_cols: group,
                agg_col: agg,
                aggregator,
            }),
            out_rel,
        ))
    }

    /// Inner equi-join; the output schema is the key columns (named after
    /// the left side), then the left non-keys, then the right non-keys.
    pub fn join(
        &mut self,
        left: OpId,
        right: OpId,
        name: &str,
        left_cols: &[&str],
        right_cols: &[&str],
    ) -> RwResult<OpId> {
        let op = self.join_op(left, right, left_cols, right_cols)?;
        let out_rel = self.join_out_rel(left, right, name, &op);
        Ok(self.binary(left, right, OpKind::Join(op), out_rel))
    }

    pub fn concat(&mut self, parents: &[OpId], name: &str) -> RwResult<OpId> {
        let first = parents.first().ok_or_else(|| {
            RewriteError::malformed("concat requires at least one input")
        })?;
        let arity = self.node(*first).out_rel.columns.len();
        for parent in parents {
            if self.node(*parent).out_rel.columns.len() != arity {
                return Err(RewriteError::malformed(format!(
                    "concat '{name}' inputs disagree on column count"
                )));
            }
        }

        let columns = self.node(*first).out_rel.columns.clone();
        let stored_with = parents.iter().fold(PartySet::new(), |acc, parent| {
            acc.union(&self.node(*parent).out_rel.stored_with)
        });
        let out_rel = Relation::new(name, columns, stored_with);
        let id = self.add_node(OpNode::new(
            OpKind::Concat(ConcatOp { ordered: false }),
            out_rel,
        ));
        for (slot, parent) in parents.iter().enumerate() {
            self.add_edge(*parent, id, slot);
        }
        Ok(id)
    }

    /// Concatenates relations column-wise.
    pub fn concat_cols(&mut self, parents: &[OpId], name: &str) -> RwResult<OpId> {
        if parents.is_empty() {
            return Err(RewriteError::malformed(
                "concat_cols requires at least one input",
            ));
        }
        let columns: Vec<Column> = parents
            .iter()
            .flat_map(|parent| self.node(*parent).out_rel.columns.clone())
            .collect();
        let stored_with = parents.iter().fold(PartySet::new(), |acc, parent| {
            acc.union(&self.node(*parent).out_rel.stored_with)
        });
        let out_rel = Relation::new(name, columns, stored_with);
        let id = self.add_node(OpNode::new(OpKind::ConcatCols, out_rel));
        for (slot, parent) in parents.iter().enumerate() {
            self.add_edge(*parent, id, slot);
        }
        Ok(id)
    }

    pub fn distinct(&mut self, parent: OpId, name: &str, cols: &[&str]) -> RwResult<OpId> {
        let in_rel = self.node(parent).out_rel.clone();
        let selected: Vec<Column> = cols
            .iter()
            .map(|col| lookup(&in_rel, col))
            .collect::<RwResult<_>>()?;
        let out_rel = Relation::new(name, selected.clone(), in_rel.stored_with.clone());
        Ok(self.unary(
            parent,
            OpKind::Distinct(DistinctOp {
                selected_cols: selected,
            }),
            out_rel,
        ))
    }

    pub fn distinct_count(&mut self, parent: OpId, name: &str, col: &str) -> RwResult<OpId> {
        let in_rel = self.node(parent).out_rel.clone();
        let selected = lookup(&in_rel, col)?;
        let count = Column::def("count", ColType::Integer, PartySet::new());
        let out_rel = Relation::new(
            name,
            vec![selected.clone(), count],
            in_rel.stored_with.clone(),
        );
        Ok(self.unary(
            parent,
            OpKind::DistinctCount(DistinctCountOp {
                selected_col: selected,
            }),
            out_rel,
        ))
    }

    /// Marks the node's output as collected by a single party. No operator
    /// is created; the final stored-with set is what triggers `Open`
    /// insertion later.
    pub fn collect(&mut self, node: OpId, target: PartyId) {
        self.node_mut(node).out_rel.stored_with = PartySet::singleton(target);
    }

    //
    // Internal constructors used by the composite expander.
    //

    pub fn shuffle(&mut self, parent: OpId, name: &str) -> OpId {
        let out_rel = self.renamed_in_rel(parent, name);
        self.unary(parent, OpKind::Shuffle, out_rel)
    }

    pub fn persist(&mut self, parent: OpId, name: &str) -> OpId {
        let out_rel = self.renamed_in_rel(parent, name);
        self.unary(parent, OpKind::Persist, out_rel)
    }

    /// Prepends a materialised row-index column named `idx_col`.
    pub fn index(&mut self, parent: OpId, name: &str, idx_col: &str) -> OpId {
        let in_rel = self.node(parent).out_rel.clone();
        let mut columns = vec![Column::def(idx_col, ColType::Integer, PartySet::new())];
        columns.extend(in_rel.columns.clone());
        let out_rel = Relation::new(name, columns, in_rel.stored_with.clone());
        self.unary(
            parent,
            OpKind::Index(IndexOp {
                idx_col_name: idx_col.to_owned(),
            }),
            out_rel,
        )
    }

    pub fn sort_by(&mut self, parent: OpId, name: &str, col: &str) -> RwResult<OpId> {
        let in_rel = self.node(parent).out_rel.clone();
        let sort_by_col = lookup(&in_rel, col)?;
        let out_rel = Relation::new(name, in_rel.columns.clone(), in_rel.stored_with.clone());
        Ok(self.unary(parent, OpKind::SortBy(SortByOp { sort_by_col }), out_rel))
    }

    /// Per-row flag comparing `col` against the previous row.
    pub fn comp_neighs(&mut self, parent: OpId, name: &str, col: &str) -> RwResult<OpId> {
        let in_rel = self.node(parent).out_rel.clone();
        let comp_col = lookup(&in_rel, col)?;
        let flag = Column::def("eq_flag", ColType::Integer, PartySet::new());
        let out_rel = Relation::new(name, vec![flag], in_rel.stored_with.clone());
        Ok(self.unary(parent, OpKind::CompNeighs(CompNeighsOp { comp_col }), out_rel))
    }

    /// Reveals the input, optionally to a designated party. `Open` nodes are
    /// MPC: the reveal itself is a joint step.
    pub fn open(&mut self, parent: OpId, name: &str, target: Option<PartyId>) -> OpId {
        let mut out_rel = self.renamed_in_rel(parent, name);
        if let Some(party) = target {
            out_rel.stored_with = PartySet::singleton(party);
        }
        let id = self.unary(parent, OpKind::Open(OpenOp { target_party: target }), out_rel);
        self.node_mut(id).is_mpc = true;
        id
    }

    /// Secret-shares the input among `stored_with`.
    pub fn close(&mut self, parent: OpId, name: &str, stored_with: PartySet) -> OpId {
        let mut out_rel = self.renamed_in_rel(parent, name);
        out_rel.stored_with = stored_with;
        let id = self.unary(parent, OpKind::Close, out_rel);
        self.node_mut(id).is_mpc = true;
        id
    }

    /// Aggregation directed by neighbour-equality flags (slot 1) and sorted
    /// row indices (slot 2); the output relation is supplied by the caller
    /// because it replaces a composite node.
    pub fn index_aggregate(
        &mut self,
        input: OpId,
        flags: OpId,
        sorted_keys: OpId,
        agg: AggregateOp,
        out_rel: Relation,
    ) -> OpId {
        let id = self.add_node(OpNode::new(
            OpKind::IndexAggregate(IndexAggregateOp { agg }),
            out_rel,
        ));
        self.add_edge(input, id, 0);
        self.add_edge(flags, id, 1);
        self.add_edge(sorted_keys, id, 2);
        id
    }

    /// Match-indicator vector of an equi-join, computed without producing
    /// the joined rows.
    pub fn join_flags(
        &mut self,
        left: OpId,
        right: OpId,
        name: &str,
        left_cols: &[&str],
        right_cols: &[&str],
    ) -> RwResult<OpId> {
        let join = self.join_op(left, right, left_cols, right_cols)?;
        let flag = Column::def("flags", ColType::Integer, PartySet::new());
        let stored_with = self
            .node(left)
            .out_rel
            .stored_with
            .union(&self.node(right).out_rel.stored_with);
        let out_rel = Relation::new(name, vec![flag], stored_with);
        Ok(self.binary(left, right, OpKind::JoinFlags(JoinFlagsOp { join }), out_rel))
    }

    /// Join directed by a secret-shared match-indicator vector (slot 2); the
    /// output relation is supplied by the caller because it replaces a
    /// composite node.
    pub fn flag_join(
        &mut self,
        left: OpId,
        right: OpId,
        flags: OpId,
        join: JoinOp,
        out_rel: Relation,
    ) -> OpId {
        let id = self.add_node(OpNode::new(OpKind::FlagJoin(FlagJoinOp { join }), out_rel));
        self.add_edge(left, id, 0);
        self.add_edge(right, id, 1);
        self.add_edge(flags, id, 2);
        id
    }

    pub fn index_join(
        &mut self,
        left: OpId,
        right: OpId,
        name: &str,
        left_cols: &[&str],
        right_cols: &[&str],
    ) -> RwResult<OpId> {
        let join = self.join_op(left, right, left_cols, right_cols)?;
        let out_rel = self.join_out_rel(left, right, name, &join);
        Ok(self.binary(left, right, OpKind::IndexJoin(IndexJoinOp { join }), out_rel))
    }

    pub fn reveal_join(
        &mut self,
        left: OpId,
        right: OpId,
        name: &str,
        left_cols: &[&str],
        right_cols: &[&str],
        target_party: PartyId,
    ) -> RwResult<OpId> {
        let join = self.join_op(left, right, left_cols, right_cols)?;
        let mut out_rel = self.join_out_rel(left, right, name, &join);
        out_rel.stored_with = PartySet::singleton(target_party);
        Ok(self.binary(
            left,
            right,
            OpKind::RevealJoin(RevealJoinOp { join, target_party }),
            out_rel,
        ))
    }

    pub fn pub_join(
        &mut self,
        left: OpId,
        right: OpId,
        name: &str,
        left_cols: &[&str],
        right_cols: &[&str],
    ) -> RwResult<OpId> {
        let join = self.join_op(left, right, left_cols, right_cols)?;
        let out_rel = self.join_out_rel(left, right, name, &join);
        Ok(self.binary(left, right, OpKind::PubJoin(PubJoinOp { join }), out_rel))
    }

    /// Converts an MPC join into its hybrid form in place, recording the
    /// selectively-trusted party. Used by the hybrid-operator pass.
    pub fn to_hybrid_join(&mut self, id: OpId, trusted_party: PartyId) {
        let node = self.node_mut(id);
        if let OpKind::Join(join) = node.kind.clone() {
            node.kind = OpKind::HybridJoin(HybridJoinOp {
                join,
                trusted_party,
            });
        }
    }

    fn unary(&mut self, parent: OpId, kind: OpKind, out_rel: Relation) -> OpId {
        let id = self.add_node(OpNode::new(kind, out_rel));
        self.add_edge(parent, id, 0);
        id
    }

    fn binary(&mut self, left: OpId, right: OpId, kind: OpKind, out_rel: Relation) -> OpId {
        let id = self.add_node(OpNode::new(kind, out_rel));
        self.add_edge(left, id, 0);
        self.add_edge(right, id, 1);
        id
    }

    fn renamed_in_rel(&self, parent: OpId, name: &str) -> Relation {
        let mut out_rel = self.node(parent).out_rel.clone();
        out_rel.rename(name);
        out_rel
    }

    fn linear_op(
        &self,
        parent: OpId,
        target_col: &str,
        operands: &[OperandRef<'_>],
    ) -> RwResult<LinearOp> {
        let in_rel = &self.node(parent).out_rel;
        let operands: Vec<Operand> = operands
            .iter()
            .map(|operand| match operand {
                OperandRef::Col(col) => lookup(in_rel, col).map(Operand::Column),
                OperandRef::Scalar(value) => Ok(Operand::Scalar(*value)),
            })
            .collect::<RwResult<_>>()?;
        // The target may name an existing column or introduce a new one.
        let target_col = match in_rel.column_by_name(target_col) {
            Some(col) => col.clone(),
            None => Column::new(
                target_col,
                ColType::Integer,
                in_rel.columns.len(),
                PartySet::new(),
            ),
        };
        Ok(LinearOp {
            target_col,
            operands,
        })
    }

    fn linear_out_rel(&self, parent: OpId, name: &str, op: &LinearOp) -> Relation {
        let in_rel = &self.node(parent).out_rel;
        let mut columns = in_rel.columns.clone();
        if in_rel.column_by_name(&op.target_col.name).is_none() {
            columns.push(op.target_col.clone());
        }
        Relation::new(name, columns, in_rel.stored_with.clone())
    }

    fn join_op(
        &self,
        left: OpId,
        right: OpId,
        left_cols: &[&str],
        right_cols: &[&str],
    ) -> RwResult<JoinOp> {
        if left_cols.len() != right_cols.len() || left_cols.is_empty() {
            return Err(RewriteError::malformed(
                "join requires matching, non-empty key column lists",
            ));
        }
        let left_rel = &self.node(left).out_rel;
        let right_rel = &self.node(right).out_rel;
        let left_join_cols: Vec<Column> = left_cols
            .iter()
            .map(|col| lookup(left_rel, col))
            .collect::<RwResult<_>>()?;
        let right_join_cols: Vec<Column> = right_cols
            .iter()
            .map(|col| lookup(right_rel, col))
            .collect::<RwResult<_>>()?;
        Ok(JoinOp {
            left_join_cols,
            right_join_cols,
        })
    }

    fn join_out_rel(&self, left: OpId, right: OpId, name: &str, op: &JoinOp) -> Relation {
        let left_rel = &self.node(left).out_rel;
        let right_rel = &self.node(right).out_rel;

        let mut columns = Vec::new();
        for (left_key, right_key) in op.left_join_cols.iter().zip(&op.right_join_cols) {
            let mut key = left_key.clone();
            key.trust_set = left_key.trust_set.intersect(&right_key.trust_set);
            columns.push(key);
        }
        let is_key = |cols: &[Column], name: &str| cols.iter().any(|col| col.name == name);
        for col in &left_rel.columns {
            if !is_key(&op.left_join_cols, &col.name) {
                columns.push(col.clone());
            }
        }
        for col in &right_rel.columns {
            if !is_key(&op.right_join_cols, &col.name) {
                columns.push(col.clone());
            }
        }

        Relation::new(
            name,
            columns,
            left_rel.stored_with.union(&right_rel.stored_with),
        )
    }
}

fn lookup(rel: &Relation, col_name: &str) -> RwResult<Column> {
    rel.column_by_name(col_name).cloned().ok_or_else(|| {
        RewriteError::malformed(format!(
            "no column named '{col_name}' in relation '{}'",
            rel.name
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_col(name: &str, trust: PartySet) -> Column {
        Column::def(name, ColType::Integer, trust)
    }

    #[test]
    fn join_schema_is_keys_then_left_then_right() {
        let mut dag = OpDag::new();
        let left = dag.create(
            "left",
            vec![
                int_col("a", PartySet::singleton(1)),
                int_col("b", PartySet::singleton(1)),
            ],
            PartySet::singleton(1),
        );
        let right = dag.create(
            "right",
            vec![
                int_col("c", PartySet::from([1, 2])),
                int_col("d", PartySet::singleton(2)),
            ],
            PartySet::singleton(2),
        );
        let joined = dag.join(left, right, "joined", &["a"], &["c"]).unwrap();

        let out_rel = &dag.node(joined).out_rel;
        let names: Vec<&str> = out_rel.columns.iter().map(|col| col.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "d"]);
        assert_eq!(out_rel.stored_with, PartySet::from([1, 2]));
        assert_eq!(out_rel.columns[0].trust_set, PartySet::singleton(1));
    }

    #[test]
    fn concat_requires_matching_arity() {
        let mut dag = OpDag::new();
        let one = dag.create(
            "one",
            vec![int_col("a", PartySet::new())],
            PartySet::singleton(1),
        );
        let two = dag.create(
            "two",
            vec![
                int_col("a", PartySet::new()),
                int_col("b", PartySet::new()),
            ],
            PartySet::singleton(2),
        );
        assert!(dag.concat(&[one, two], "rel").is_err());
    }

    #[test]
    fn linear_op_accepts_scalars_and_new_targets() {
        let mut dag = OpDag::new();
        let input = dag.create(
            "in1",
            vec![
                int_col("a", PartySet::singleton(1)),
                int_col("b", PartySet::singleton(1)),
            ],
            PartySet::singleton(1),
        );
        let div = dag
            .divide(input, "div1", "a", &[OperandRef::Col("a"), OperandRef::Scalar(5)])
            .unwrap();
        assert_eq!(dag.node(div).out_rel.columns.len(), 2);

        let mult = dag
            .multiply(
                div,
                "mult1",
                "product",
                &[OperandRef::Col("a"), OperandRef::Col("b")],
            )
            .unwrap();
        let out_rel = &dag.node(mult).out_rel;
        assert_eq!(out_rel.columns.len(), 3);
        assert_eq!(out_rel.columns[2].name, "product");
        assert_eq!(out_rel.columns[2].idx, 2);
    }

    #[test]
    fn collect_retargets_stored_with() {
        let mut dag = OpDag::new();
        let input = dag.create(
            "in1",
            vec![int_col("a", PartySet::new())],
            PartySet::from([1, 2]),
        );
        dag.collect(input, 1);
        assert_eq!(dag.node(input).out_rel.stored_with, PartySet::singleton(1));
    }

    #[test]
    fn open_adopts_target_party() {
        let mut dag = OpDag::new();
        let input = dag.create(
            "in1",
            vec![int_col("a", PartySet::new())],
            PartySet::from([1, 2]),
        );
        let open = dag.open(input, "in1_open", Some(2));
        let node = dag.node(open);
        assert!(node.is_mpc);
        assert_eq!(node.out_rel.stored_with, PartySet::singleton(2));
    }
}
