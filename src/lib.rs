//! Blueprint graph compiler: flattens nested blueprint documents into a
//! canonical dependency graph, then expands that graph into concrete
//! per-instance nodes, edges, producer input bindings and fan-in groups
//! for an external planner to schedule.

pub mod compiler;
pub mod dsl;

pub use compiler::expander::{expand_blueprint_graph, ExpandError, ExpandedGraph};
pub use compiler::graph::{build_blueprint_graph, CanonicalGraph};
pub use compiler::schema::decompose_json_schema;
pub use compiler::sources::InputSourceMap;
