//! Driver for the mpc-fusion rewrite pipeline.
//!
//! The engine validates an incoming operator DAG, runs the rewrite passes in
//! their fixed order and hands the rewritten DAG (plus the diagnostic trace)
//! back to the caller. Partitioning and per-backend code generation live
//! downstream of this crate.

mod pipeline;
mod validation;

pub use pipeline::rewrite_dag;
pub use validation::validate_dag;
