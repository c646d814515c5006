//! Error types for gcnode-core.

use thiserror::Error;

/// Error type for graph construction and preprocessing.
#[derive(Error, Debug)]
pub enum Error {
    /// Graph has no nodes.
    #[error("graph must contain at least one node")]
    EmptyGraph,

    /// Edge endpoint outside `0..num_nodes`.
    #[error("edge {edge} references node {node}, but graph has {num_nodes} nodes")]
    NodeOutOfRange {
        edge: usize,
        node: usize,
        num_nodes: usize,
    },

    /// Array length does not match the declared shape.
    #[error("shape mismatch for {what}: expected {expected}, got {got}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    /// Invalid split or preprocessing parameters.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Malformed input file.
    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for graph operations.
pub type Result<T> = std::result::Result<T, Error>;
