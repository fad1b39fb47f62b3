//! Operator kinds and their kind-specific payloads.
//!
//! The operator universe is a closed sum type ([`OpKind`]); pass dispatch
//! matches on it exhaustively instead of going through a class hierarchy.
//! Payload structs hold copies of the input columns they reference; after a
//! structural edit those copies are re-resolved by name against the current
//! input relation (see the column-update entries of the catalog).

use mpc_fusion_model::{Column, PartyId};
use std::fmt;

/// How grouped values are combined by an aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregator {
    Sum,
    Count,
    Min,
    Max,
    Mean,
}

impl fmt::Display for Aggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregator::Sum => write!(f, "+"),
            Aggregator::Count => write!(f, "count"),
            Aggregator::Min => write!(f, "min"),
            Aggregator::Max => write!(f, "max"),
            Aggregator::Mean => write!(f, "mean"),
        }
    }
}

/// Comparison applied by a [`FilterOp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterPredicate {
    Eq,
    Lt,
    Gt,
}

impl fmt::Display for FilterPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterPredicate::Eq => write!(f, "=="),
            FilterPredicate::Lt => write!(f, "<"),
            FilterPredicate::Gt => write!(f, ">"),
        }
    }
}

/// Right-hand side of a filter predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterTarget {
    Column(Column),
    Scalar(i64),
}

/// An operand of a linear operator: a column of the input or a constant.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Column(Column),
    Scalar(i64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectOp {
    pub selected_cols: Vec<Column>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterOp {
    pub filter_col: Column,
    pub predicate: FilterPredicate,
    pub target: FilterTarget,
}

/// Payload shared by `Multiply` and `Divide`: the target column is derived
/// from the operands in order.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearOp {
    pub target_col: Column,
    pub operands: Vec<Operand>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateOp {
    pub group_cols: Vec<Column>,
    pub agg_col: Column,
    pub aggregator: Aggregator,
}

/// Aggregation directed by precomputed neighbour-equality flags and sorted
/// row indices (parents: input, flags, sorted keys).
#[derive(Debug, Clone, PartialEq)]
pub struct IndexAggregateOp {
    pub agg: AggregateOp,
}

/// An MPC aggregation specialised to reveal its group column to a
/// selectively-trusted party.
#[derive(Debug, Clone, PartialEq)]
pub struct HybridAggregateOp {
    pub agg: AggregateOp,
    pub trusted_party: PartyId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinOp {
    pub left_join_cols: Vec<Column>,
    pub right_join_cols: Vec<Column>,
}

/// Join driven by a precomputed index relation.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexJoinOp {
    pub join: JoinOp,
}

/// Computes the match-indicator vector of a join without producing the
/// joined rows; runs locally at the trusted party during hybrid joins.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinFlagsOp {
    pub join: JoinOp,
}

/// Join directed by a secret-shared match-indicator vector (third parent).
#[derive(Debug, Clone, PartialEq)]
pub struct FlagJoinOp {
    pub join: JoinOp,
}

/// An MPC join specialised to reveal its key columns to a
/// selectively-trusted party.
#[derive(Debug, Clone, PartialEq)]
pub struct HybridJoinOp {
    pub join: JoinOp,
    pub trusted_party: PartyId,
}

/// Join whose result is revealed to a single recipient.
#[derive(Debug, Clone, PartialEq)]
pub struct RevealJoinOp {
    pub join: JoinOp,
    pub target_party: PartyId,
}

/// Join against a public relation.
#[derive(Debug, Clone, PartialEq)]
pub struct PubJoinOp {
    pub join: JoinOp,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConcatOp {
    /// Preserve input order when materialising the concatenation.
    pub ordered: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DistinctOp {
    pub selected_cols: Vec<Column>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DistinctCountOp {
    pub selected_col: Column,
}

/// Reveals a secret-shared relation, optionally to a designated party.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenOp {
    pub target_party: Option<PartyId>,
}

/// Prepends a materialised row-index column to the input.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexOp {
    pub idx_col_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortByOp {
    pub sort_by_col: Column,
}

/// Emits, per row, a flag comparing the given column against the previous
/// row; runs locally at the trusted party during hybrid aggregations.
#[derive(Debug, Clone, PartialEq)]
pub struct CompNeighsOp {
    pub comp_col: Column,
}

/// The closed universe of operator kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum OpKind {
    Create,
    Project(ProjectOp),
    Filter(FilterOp),
    Multiply(LinearOp),
    Divide(LinearOp),
    Aggregate(AggregateOp),
    IndexAggregate(IndexAggregateOp),
    HybridAggregate(HybridAggregateOp),
    Join(JoinOp),
    IndexJoin(IndexJoinOp),
    JoinFlags(JoinFlagsOp),
    FlagJoin(FlagJoinOp),
    HybridJoin(HybridJoinOp),
    RevealJoin(RevealJoinOp),
    PubJoin(PubJoinOp),
    Concat(ConcatOp),
    ConcatCols,
    Distinct(DistinctOp),
    DistinctCount(DistinctCountOp),
    Close,
    Open(OpenOp),
    Persist,
    Shuffle,
    Index(IndexOp),
    SortBy(SortByOp),
    CompNeighs(CompNeighsOp),
}

impl OpKind {
    /// Stable kind name used in diagnostics and error payloads.
    pub fn name(&self) -> &'static str {
        match self {
            OpKind::Create => "Create",
            OpKind::Project(_) => "Project",
            OpKind::Filter(_) => "Filter",
            OpKind::Multiply(_) => "Multiply",
            OpKind::Divide(_) => "Divide",
            OpKind::Aggregate(_) => "Aggregate",
            OpKind::IndexAggregate(_) => "IndexAggregate",
            OpKind::HybridAggregate(_) => "HybridAggregate",
            OpKind::Join(_) => "Join",
            OpKind::IndexJoin(_) => "IndexJoin",
            OpKind::JoinFlags(_) => "JoinFlags",
            OpKind::FlagJoin(_) => "FlagJoin",
            OpKind::HybridJoin(_) => "HybridJoin",
            OpKind::RevealJoin(_) => "RevealJoin",
            OpKind::PubJoin(_) => "PubJoin",
            OpKind::Concat(_) => "Concat",
            OpKind::ConcatCols => "ConcatCols",
            OpKind::Distinct(_) => "Distinct",
            OpKind::DistinctCount(_) => "DistinctCount",
            OpKind::Close => "Close",
            OpKind::Open(_) => "Open",
            OpKind::Persist => "Persist",
            OpKind::Shuffle => "Shuffle",
            OpKind::Index(_) => "Index",
            OpKind::SortBy(_) => "SortBy",
            OpKind::CompNeighs(_) => "CompNeighs",
        }
    }

    /// The join payload shared by every join-family kind.
    pub fn as_join(&self) -> Option<&JoinOp> {
        match self {
            OpKind::Join(op) => Some(op),
            OpKind::IndexJoin(op) => Some(&op.join),
            OpKind::JoinFlags(op) => Some(&op.join),
            OpKind::FlagJoin(op) => Some(&op.join),
            OpKind::HybridJoin(op) => Some(&op.join),
            OpKind::RevealJoin(op) => Some(&op.join),
            OpKind::PubJoin(op) => Some(&op.join),
            _ => None,
        }
    }

    /// Mutable access to the join payload shared by every join-family kind.
    pub fn as_join_mut(&mut self) -> Option<&mut JoinOp> {
        match self {
            OpKind::Join(op) => Some(op),
            OpKind::IndexJoin(op) => Some(&mut op.join),
            OpKind::JoinFlags(op) => Some(&mut op.join),
            OpKind::FlagJoin(op) => Some(&mut op.join),
            OpKind::HybridJoin(op) => Some(&mut op.join),
            OpKind::RevealJoin(op) => Some(&mut op.join),
            OpKind::PubJoin(op) => Some(&mut op.join),
            _ => None,
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
