#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::doc_markdown)]

//! Graph data for node classification.
//!
//! This crate packages an edge list together with per-node and per-edge
//! feature arrays into a validated [`GraphData`], and provides the
//! preprocessing a GCN needs before any tensor work happens:
//!
//! - [`GraphData`] / [`GraphBuilder`] - COO edge index, node features, edge
//!   features, labels and split masks
//! - [`norm::gcn_norm`] - symmetric `D^{-1/2} (A + I) D^{-1/2}` weights
//! - [`split`] - train/val/test masks (random or per-class)
//! - [`datasets`] - the toy path graph and Zachary's karate club
//! - [`formats::csv`] - edge lists, feature matrices and labels from CSV
//!
//! # Example
//!
//! ```rust
//! use gcnode_core::{datasets, norm::{gcn_norm, NormConfig}};
//!
//! let graph = datasets::karate_club().unwrap();
//! assert_eq!(graph.num_nodes(), 34);
//!
//! let adj = gcn_norm(&graph, &NormConfig::default()).unwrap();
//! // every friendship in both directions plus one self-loop per member
//! assert_eq!(adj.num_messages(), 156 + 34);
//! ```

pub mod datasets;
mod error;
pub mod formats;
mod graph;
pub mod norm;
pub mod split;

pub use error::{Error, Result};
pub use graph::{identity_features, GraphBuilder, GraphData, GraphStats};
pub use norm::{gcn_norm, EdgeWeight, NormConfig, NormalizedAdjacency};
pub use split::{mask_to_index, Split, SplitConfig};

// Re-export petgraph for callers working with `GraphData::to_petgraph`
pub use petgraph;
