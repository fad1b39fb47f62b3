//! Query-plan compiler for secure multi-party relational workflows.
//!
//! A workflow is a DAG of relational operators annotated with which parties
//! hold each relation and which parties are trusted with each column. The
//! compiler rewrites it into an equivalent DAG in which every operator is
//! tagged local or MPC, every regime boundary is an explicit `Close`/`Open`,
//! and composite hybrid operators are expanded into primitive subgraphs.
//!
//! ```
//! use mpc_fusion::engine::rewrite_dag;
//! use mpc_fusion::logical::ops::Aggregator;
//! use mpc_fusion::logical::OpDag;
//! use mpc_fusion::model::{ColType, Column, PartySet};
//!
//! let mut dag = OpDag::new();
//! let in1 = dag.create(
//!     "in1",
//!     vec![
//!         Column::def("a", ColType::Integer, PartySet::singleton(1)),
//!         Column::def("b", ColType::Integer, PartySet::singleton(1)),
//!     ],
//!     PartySet::singleton(1),
//! );
//! let in2 = dag.create(
//!     "in2",
//!     vec![
//!         Column::def("a", ColType::Integer, PartySet::singleton(2)),
//!         Column::def("b", ColType::Integer, PartySet::singleton(2)),
//!     ],
//!     PartySet::singleton(2),
//! );
//! let rel = dag.concat(&[in1, in2], "rel").unwrap();
//! let agg = dag
//!     .aggregate(rel, "agg", &["a"], "b", Aggregator::Sum, "total")
//!     .unwrap();
//! dag.collect(agg, 1);
//!
//! rewrite_dag(&mut dag, &PartySet::from([1, 2]), true).unwrap();
//! ```

pub mod common {
    pub use mpc_fusion_common::*;
}

pub mod model {
    pub use mpc_fusion_model::*;
}

pub mod logical {
    pub use mpc_fusion_logical::*;
}

pub mod engine {
    pub use mpc_fusion_engine::*;
}
