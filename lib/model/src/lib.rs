//! Relation and security-metadata model.
//!
//! A workflow operates on [`Relation`]s whose rows are physically held by a
//! [`PartySet`] (the *stored-with* set) and whose [`Column`]s each carry a
//! per-column *trust set*: the parties to whom that column could safely be
//! revealed. The rewrite passes in `mpc-fusion-logical` only ever read and
//! update this metadata; no row data exists at compile time.

mod column;
mod party;
mod relation;

pub use column::{trust_set_from_columns, ColType, Column};
pub use party::{PartyId, PartySet};
pub use relation::Relation;
