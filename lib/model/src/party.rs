use itertools::Itertools;
use std::collections::BTreeSet;
use std::fmt;

/// Identifier of a single participant in the protocol.
///
/// The universe of parties is fixed per compiler run and supplied to the
/// driver; identifiers are small positive integers.
pub type PartyId = u32;

/// An ordered set of parties.
///
/// The same representation serves two purposes with different meanings:
///
/// - as a relation's *stored-with* set it names the parties that jointly
///   hold the rows (cardinality 1 means plaintext local data, anything
///   larger means the relation is secret-shared), and
/// - as a column's *trust set* it names the parties to whom the column
///   could safely be revealed.
///
/// Iteration order is ascending by party id, which the passes rely on for
/// deterministic output (e.g. picking the smallest trusted party).
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartySet(BTreeSet<PartyId>);

impl PartySet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Creates a set containing a single party.
    pub fn singleton(party: PartyId) -> Self {
        Self(BTreeSet::from([party]))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True if more than one party holds the data, i.e. it is secret-shared.
    pub fn is_shared(&self) -> bool {
        self.0.len() > 1
    }

    pub fn contains(&self, party: PartyId) -> bool {
        self.0.contains(&party)
    }

    pub fn insert(&mut self, party: PartyId) {
        self.0.insert(party);
    }

    /// The numerically smallest party in the set, if any.
    pub fn min_party(&self) -> Option<PartyId> {
        self.0.first().copied()
    }

    /// Set union.
    pub fn union(&self, other: &Self) -> Self {
        Self(self.0.union(&other.0).copied().collect())
    }

    /// Set intersection. For trust sets this is the "merge" operation: the
    /// parties trusted by *all* contributors.
    pub fn intersect(&self, other: &Self) -> Self {
        Self(self.0.intersection(&other.0).copied().collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = PartyId> + '_ {
        self.0.iter().copied()
    }
}

impl fmt::Display for PartySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.0.iter().join(", "))
    }
}

impl FromIterator<PartyId> for PartySet {
    fn from_iter<I: IntoIterator<Item = PartyId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[PartyId; N]> for PartySet {
    fn from(parties: [PartyId; N]) -> Self {
        Self(parties.into_iter().collect())
    }
}
