//! File formats for graph inputs.

pub mod csv;

pub use self::csv::{load_graph, Csv, EdgeList};
