use crate::{Column, PartySet};
use itertools::Itertools;

/// A named, ordered collection of columns together with the set of parties
/// that physically hold its rows.
///
/// Column indices are kept dense: `columns[i].idx == i`. Constructors and
/// [`Relation::set_columns`] re-derive the indices, so callers never manage
/// them by hand.
#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    pub name: String,
    pub columns: Vec<Column>,
    pub stored_with: PartySet,
}

impl Relation {
    pub fn new(name: impl Into<String>, columns: Vec<Column>, stored_with: PartySet) -> Self {
        let mut rel = Self {
            name: name.into(),
            columns,
            stored_with,
        };
        rel.reindex_columns();
        rel
    }

    /// Renames the relation, e.g. when a pass clones a node and needs a
    /// fresh, unique output name.
    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// True if the rows are secret-shared among more than one party.
    pub fn is_shared(&self) -> bool {
        self.stored_with.is_shared()
    }

    pub fn column_by_name(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|col| col.name == name)
    }

    /// Replaces the column list, re-deriving dense indices.
    pub fn set_columns(&mut self, columns: Vec<Column>) {
        self.columns = columns;
        self.reindex_columns();
    }

    /// Restores `columns[i].idx == i`.
    pub fn reindex_columns(&mut self) {
        for (idx, col) in self.columns.iter_mut().enumerate() {
            col.idx = idx;
        }
    }

    /// Debug rendering used in tests and diagnostics, e.g.
    /// `rel([a {1}, b {}]) {1, 2}`.
    pub fn dbg_str(&self) -> String {
        format!(
            "{}([{}]) {}",
            self.name,
            self.columns.iter().map(Column::dbg_str).join(", "),
            self.stored_with
        )
    }
}
