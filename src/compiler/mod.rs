pub mod expander;
pub mod graph;
pub mod schema;
pub mod selector;
pub mod sources;
