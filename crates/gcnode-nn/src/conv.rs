//! Graph convolution.
//!
//! [`GCNConv`] follows the message-passing paradigm:
//!
//! 1. **Message**: transform every node, `h_j = x_j W`
//! 2. **Aggregate**: weighted sum over incoming edges, `sum_j A_hat[i][j] h_j`
//! 3. **Update**: add the bias
//!
//! ```text
//! H' = D^{-1/2} (A + I) D^{-1/2} X W + b
//! ```
//!
//! The normalized structure is computed once per graph and cached in an
//! [`Adjacency`]; propagation is a gather of source rows followed by a
//! scatter-add into destinations, both differentiable in candle.

use crate::metrics::index_tensor;
use candle_core::{DType, Device, Result, Tensor};
use candle_nn::{linear_no_bias, Init, Linear, Module, VarBuilder};
use gcnode_core::{gcn_norm, GraphData, NormConfig, NormalizedAdjacency};

/// Normalized adjacency as tensors, ready for propagation.
#[derive(Debug, Clone)]
pub struct Adjacency {
    norm: NormalizedAdjacency,
    src: Tensor,
    dst: Tensor,
    /// (messages, 1), broadcast over feature columns.
    weight: Tensor,
    device: Device,
}

impl Adjacency {
    /// Upload precomputed propagation weights.
    pub fn new(norm: NormalizedAdjacency, device: &Device) -> Result<Self> {
        let m = norm.num_messages();
        let src = index_tensor(&norm.src, device)?;
        let dst = index_tensor(&norm.dst, device)?;
        let weight = Tensor::from_slice(&norm.weight, (m, 1), device)?;
        Ok(Self {
            norm,
            src,
            dst,
            weight,
            device: device.clone(),
        })
    }

    /// Normalize `graph` and upload the result.
    pub fn from_graph(graph: &GraphData, config: &NormConfig, device: &Device) -> crate::Result<Self> {
        let norm = gcn_norm(graph, config)?;
        Ok(Self::new(norm, device)?)
    }

    pub fn num_nodes(&self) -> usize {
        self.norm.num_nodes
    }

    pub fn num_messages(&self) -> usize {
        self.norm.num_messages()
    }

    /// The COO weights this adjacency was built from.
    pub fn normalized(&self) -> &NormalizedAdjacency {
        &self.norm
    }

    /// Dense `N x N` matrix, for [`GCNConv::forward_dense`] or inspection.
    pub fn to_dense(&self) -> Result<Tensor> {
        let n = self.num_nodes();
        Tensor::from_vec(self.norm.to_dense(), (n, n), &self.device)
    }

    /// `out[dst] += weight * h[src]` for every message.
    pub fn propagate(&self, h: &Tensor) -> Result<Tensor> {
        let (_, dim) = h.dims2()?;
        let messages = h
            .index_select(&self.src, 0)?
            .broadcast_mul(&self.weight.to_dtype(h.dtype())?)?;
        let out = Tensor::zeros((self.num_nodes(), dim), h.dtype(), h.device())?;
        out.index_add(&self.dst, &messages, 0)
    }
}

/// Graph Convolutional Network layer.
///
/// Implements: H' = D^{-1/2} A D^{-1/2} H W + b
///
/// Where:
/// - A is the adjacency matrix (with self-loops)
/// - D is the degree matrix
/// - H is the node feature matrix
/// - W is the learnable weight matrix, b the optional bias
///
/// # Reference
///
/// Kipf & Welling, "Semi-Supervised Classification with Graph Convolutional
/// Networks", ICLR 2017.
pub struct GCNConv {
    linear: Linear,
    bias: Option<Tensor>,
}

impl GCNConv {
    /// Create a new GCN layer.
    ///
    /// # Arguments
    /// - `in_features`: Input feature dimension
    /// - `out_features`: Output feature dimension
    /// - `bias`: Whether to include bias term (added after aggregation)
    /// - `vb`: Variable builder for parameter initialization
    pub fn new(in_features: usize, out_features: usize, bias: bool, vb: VarBuilder) -> Result<Self> {
        let linear = linear_no_bias(in_features, out_features, vb.pp("lin"))?;
        let bias = if bias {
            Some(vb.get_with_hints(out_features, "bias", Init::Const(0.0))?)
        } else {
            None
        };
        Ok(Self { linear, bias })
    }

    pub fn in_features(&self) -> usize {
        self.linear.weight().dims()[1]
    }

    pub fn out_features(&self) -> usize {
        self.linear.weight().dims()[0]
    }

    /// Forward pass over a cached adjacency.
    ///
    /// # Arguments
    /// - `x`: Node features (N x in_features)
    /// - `adj`: Normalized adjacency for the same N nodes
    ///
    /// # Returns
    /// - Node embeddings (N x out_features)
    pub fn forward(&self, x: &Tensor, adj: &Adjacency) -> Result<Tensor> {
        // Linear transform first: aggregation then runs on the smaller width
        let h = self.linear.forward(x)?;
        let h = adj.propagate(&h)?;
        self.add_bias(h)
    }

    /// Forward pass with a dense normalized adjacency matrix (N x N).
    pub fn forward_dense(&self, x: &Tensor, adj: &Tensor) -> Result<Tensor> {
        let h = self.linear.forward(x)?;
        let h = adj.matmul(&h)?;
        self.add_bias(h)
    }

    fn add_bias(&self, h: Tensor) -> Result<Tensor> {
        match &self.bias {
            Some(b) => h.broadcast_add(b),
            None => Ok(h),
        }
    }
}

/// Identity adjacency: every node only hears itself.
pub fn self_loop_adjacency(num_nodes: usize, device: &Device) -> Result<Adjacency> {
    let norm = NormalizedAdjacency {
        num_nodes,
        src: (0..num_nodes).collect(),
        dst: (0..num_nodes).collect(),
        weight: vec![1.0; num_nodes],
    };
    Adjacency::new(norm, device)
}

/// Stack node features into an `(N, F)` f32 tensor.
pub fn features_tensor(graph: &GraphData, device: &Device) -> Result<Tensor> {
    Tensor::from_slice(graph.x(), (graph.num_nodes(), graph.num_node_features()), device)?
        .to_dtype(DType::F32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_nn::VarMap;
    use gcnode_core::datasets;

    fn max_abs_diff(a: &Tensor, b: &Tensor) -> f32 {
        (a - b)
            .unwrap()
            .abs()
            .unwrap()
            .max_all()
            .unwrap()
            .to_scalar::<f32>()
            .unwrap()
    }

    #[test]
    fn test_gcn_forward_shape() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let gcn = GCNConv::new(64, 32, true, vb).unwrap();
        assert_eq!(gcn.in_features(), 64);
        assert_eq!(gcn.out_features(), 32);

        // 10 nodes, 64 features
        let x = Tensor::randn(0f32, 1f32, (10, 64), &device).unwrap();
        let adj = self_loop_adjacency(10, &device).unwrap();

        let out = gcn.forward(&x, &adj).unwrap();
        assert_eq!(out.dims(), &[10, 32]);
    }

    #[test]
    fn test_self_loops_only_is_linear() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let gcn = GCNConv::new(8, 4, true, vb).unwrap();

        let x = Tensor::randn(0f32, 1f32, (5, 8), &device).unwrap();
        let adj = self_loop_adjacency(5, &device).unwrap();

        let out = gcn.forward(&x, &adj).unwrap();
        let expected = gcn.linear.forward(&x).unwrap();
        assert!(max_abs_diff(&out, &expected) < 1e-5);
    }

    #[test]
    fn test_sparse_matches_dense() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let graph = datasets::karate_club().unwrap();
        let adj = Adjacency::from_graph(&graph, &NormConfig::default(), &device).unwrap();
        let x = features_tensor(&graph, &device).unwrap();
        let gcn = GCNConv::new(34, 6, true, vb).unwrap();

        let sparse = gcn.forward(&x, &adj).unwrap();
        let dense = gcn.forward_dense(&x, &adj.to_dense().unwrap()).unwrap();
        assert_eq!(sparse.dims(), &[34, 6]);
        assert!(max_abs_diff(&sparse, &dense) < 1e-5);
    }

    #[test]
    fn test_propagate_path_graph() {
        let device = Device::Cpu;
        let graph = datasets::toy_path().unwrap();
        let adj = Adjacency::from_graph(&graph, &NormConfig::default(), &device).unwrap();
        assert_eq!(adj.num_messages(), 7);

        // features [-1, 0, 1]; the middle node averages to 0 by symmetry
        let x = features_tensor(&graph, &device).unwrap();
        let out = adj.propagate(&x).unwrap().flatten_all().unwrap();
        let out = out.to_vec1::<f32>().unwrap();
        assert!((out[0] + 0.5).abs() < 1e-6);
        assert!(out[1].abs() < 1e-6);
        assert!((out[2] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_gradients_flow_through_propagation() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let graph = datasets::toy_path().unwrap();
        let adj = Adjacency::from_graph(&graph, &NormConfig::default(), &device).unwrap();
        let x = features_tensor(&graph, &device).unwrap();
        let gcn = GCNConv::new(1, 2, true, vb).unwrap();

        let loss = gcn.forward(&x, &adj).unwrap().sqr().unwrap().sum_all().unwrap();
        let grads = loss.backward().unwrap();
        let vars = varmap.all_vars();
        assert_eq!(vars.len(), 2);
        for var in &vars {
            assert!(grads.get(var.as_tensor()).is_some());
        }
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_adjacency_rejects_wide_node_ids() {
        let norm = NormalizedAdjacency {
            num_nodes: 2,
            src: vec![0, u32::MAX as usize + 1],
            dst: vec![0, 1],
            weight: vec![1.0, 1.0],
        };
        assert!(Adjacency::new(norm, &Device::Cpu).is_err());
    }

    #[test]
    fn test_no_bias() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let _gcn = GCNConv::new(4, 4, false, vb).unwrap();
        assert_eq!(varmap.all_vars().len(), 1);
    }
}
