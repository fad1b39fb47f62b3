use crate::PartySet;
use std::fmt;

/// Data type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColType {
    Integer,
    Float,
    Text,
}

impl fmt::Display for ColType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColType::Integer => write!(f, "INTEGER"),
            ColType::Float => write!(f, "FLOAT"),
            ColType::Text => write!(f, "TEXT"),
        }
    }
}

/// A single column of a [`Relation`](crate::Relation).
///
/// `idx` is the positional offset within the owning relation; relations keep
/// indices dense (`0..n`). The trust set names the parties to whom the
/// column's values could safely be revealed and may be a strict superset of
/// the relation's stored-with set.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub col_type: ColType,
    pub idx: usize,
    pub trust_set: PartySet,
}

impl Column {
    pub fn new(
        name: impl Into<String>,
        col_type: ColType,
        idx: usize,
        trust_set: PartySet,
    ) -> Self {
        Self {
            name: name.into(),
            col_type,
            idx,
            trust_set,
        }
    }

    /// Defines a column before it is placed in a relation; the owning
    /// relation assigns the index.
    pub fn def(name: impl Into<String>, col_type: ColType, trust_set: PartySet) -> Self {
        Self::new(name, col_type, 0, trust_set)
    }

    /// Debug rendering used in tests and diagnostics, e.g. `a {1, 2}`.
    pub fn dbg_str(&self) -> String {
        format!("{} {}", self.name, self.trust_set)
    }
}

/// Intersection of the trust sets of the given columns: the parties trusted
/// by *every* contributor. Empty input yields the empty set.
pub fn trust_set_from_columns<'a>(columns: impl IntoIterator<Item = &'a Column>) -> PartySet {
    let mut iter = columns.into_iter();
    let Some(first) = iter.next() else {
        return PartySet::new();
    };
    iter.fold(first.trust_set.clone(), |acc, col| {
        acc.intersect(&col.trust_set)
    })
}
