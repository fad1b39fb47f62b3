//! Shared infrastructure for the mpc-fusion compiler crates.

pub mod error;

pub use error::RewriteError;

/// Result alias used throughout the rewrite pipeline.
pub type RwResult<T> = Result<T, RewriteError>;
