//! The stage graph for lode.
//!
//! [`StageGraph`] is the in-memory view of every stage recorded in a
//! workspace, rebuilt from manifests on demand and explicitly invalidated
//! after each mutation. [`GraphValidator`] checks a proposed set of new
//! stages against it before anything is saved.
//!
//! # Invariants
//!
//! - No output is a strict ancestor directory of another stage's output.
//! - No output path is declared by two stages.

pub mod error;
pub mod graph;
pub mod validate;

pub use error::{GraphError, GraphResult};
pub use graph::StageGraph;
pub use validate::GraphValidator;
