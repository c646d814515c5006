//! GCN adjacency normalization.
//!
//! Computes the propagation weights of Kipf & Welling's GCN:
//!
//! ```text
//! A_hat = D^{-1/2} (A + I) D^{-1/2}
//! ```
//!
//! The result is kept in COO form (one weight per message) so it can drive
//! both sparse scatter-based propagation and a dense matrix product.

use crate::{Error, GraphData, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Where per-edge weights come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeWeight {
    /// Every edge has weight 1.
    #[default]
    Unit,
    /// Use the single edge feature column as the weight.
    EdgeFeature,
}

/// Normalization options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormConfig {
    /// Add a unit self-loop to every node lacking one.
    pub add_self_loops: bool,
    /// Apply symmetric degree normalization.
    pub normalize: bool,
    pub edge_weight: EdgeWeight,
}

impl Default for NormConfig {
    fn default() -> Self {
        Self {
            add_self_loops: true,
            normalize: true,
            edge_weight: EdgeWeight::Unit,
        }
    }
}

/// Normalized adjacency in COO form. Message `i` flows `src[i] -> dst[i]`
/// scaled by `weight[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedAdjacency {
    pub num_nodes: usize,
    pub src: Vec<usize>,
    pub dst: Vec<usize>,
    pub weight: Vec<f32>,
}

impl NormalizedAdjacency {
    pub fn num_messages(&self) -> usize {
        self.src.len()
    }

    /// Dense `N x N` row-major matrix with `A[dst][src] += weight`.
    pub fn to_dense(&self) -> Vec<f32> {
        let n = self.num_nodes;
        let mut dense = vec![0.0; n * n];
        for ((&s, &d), &w) in self.src.iter().zip(&self.dst).zip(&self.weight) {
            dense[d * n + s] += w;
        }
        dense
    }
}

/// Build the GCN propagation weights for `graph`.
///
/// Degrees are weighted in-degrees (including self-loops). Nodes with zero
/// degree contribute weight 0 rather than an infinite scale.
pub fn gcn_norm(graph: &GraphData, config: &NormConfig) -> Result<NormalizedAdjacency> {
    let n = graph.num_nodes();
    let mut src = graph.src().to_vec();
    let mut dst = graph.dst().to_vec();
    let mut weight: Vec<f32> = match config.edge_weight {
        EdgeWeight::Unit => vec![1.0; graph.num_edges()],
        EdgeWeight::EdgeFeature => match graph.edge_attr() {
            Some(attr) if graph.num_edge_features() == 1 => attr.to_vec(),
            _ => {
                return Err(Error::InvalidConfig(format!(
                    "edge weights need exactly one edge feature column, graph has {}",
                    graph.num_edge_features()
                )))
            }
        },
    };

    if config.add_self_loops {
        let mut has_loop = vec![false; n];
        for (s, d) in graph.edges() {
            if s == d {
                has_loop[s] = true;
            }
        }
        for node in (0..n).filter(|&i| !has_loop[i]) {
            src.push(node);
            dst.push(node);
            weight.push(1.0);
        }
    }

    if config.normalize {
        let mut deg = vec![0.0f32; n];
        for (&d, &w) in dst.iter().zip(&weight) {
            deg[d] += w;
        }
        let deg_inv_sqrt: Vec<f32> = deg
            .iter()
            .map(|&d| if d > 0.0 { d.powf(-0.5) } else { 0.0 })
            .collect();
        for ((w, &s), &d) in weight.iter_mut().zip(&src).zip(&dst) {
            *w *= deg_inv_sqrt[s] * deg_inv_sqrt[d];
        }
    }

    debug!(
        num_nodes = n,
        num_messages = src.len(),
        self_loops = config.add_self_loops,
        "built gcn adjacency"
    );

    Ok(NormalizedAdjacency {
        num_nodes: n,
        src,
        dst,
        weight,
    })
}
