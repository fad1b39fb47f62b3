//! Operator DAG and rewrite passes for multi-party relational workflows.
//!
//! A workflow enters as a DAG of relational operators annotated with
//! stored-with and per-column trust metadata. The passes in [`rewrite`]
//! re-tag every operator as local or MPC, move the MPC boundary down and
//! back up, specialise joins and aggregations into hybrid forms where a
//! selectively-trusted party exists, insert explicit `Close`/`Open`
//! operators on every regime boundary, and expand the hybrid composites into
//! subgraphs of primitive operators. Downstream partitioning and code
//! generation consume the result.

mod builder;
mod catalog;
mod dag;
mod node;
pub mod ops;
pub mod rewrite;

pub use builder::OperandRef;
pub use dag::{InputSlot, OpDag, OpId};
pub use node::OpNode;
