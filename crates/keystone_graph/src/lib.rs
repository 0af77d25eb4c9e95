//! KEYSTONE Execution Graph
//!
//! Dependency graph over recovery steps with deterministic topological
//! batching, plus a generic stage pipeline ordered by the same graph.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod graph;
pub mod pipeline;

pub use graph::{build_graph, Edge, ExecutionGraph, GraphError, GraphResult};
pub use pipeline::{PipelineError, PipelineResult, Stage, StageError, StagePipeline};
