pub mod graph;
pub mod template;
pub mod types;

pub use graph::{AgentGraph, EdgeGroup, GroupKind, edge_groups};
pub use types::*;
