//! Sparse propagation must agree with the dense normalized adjacency.

use candle_core::{DType, Device, Tensor};
use gcnode_core::{GraphData, NormConfig};
use gcnode_nn::Adjacency;
use proptest::prelude::*;

fn arb_case() -> impl Strategy<Value = (usize, Vec<(usize, usize)>, Vec<f32>)> {
    (1usize..12).prop_flat_map(|n| {
        (
            Just(n),
            prop::collection::vec((0..n, 0..n), 0..40),
            prop::collection::vec(-1.0f32..1.0, n * 3),
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn sparse_matches_dense((n, edges, feats) in arb_case(), undirected in any::<bool>()) {
        let device = Device::Cpu;
        let mut graph = GraphData::builder(n).edges(edges).build().unwrap();
        if undirected {
            graph = graph.to_undirected();
        }
        let adj = Adjacency::from_graph(&graph, &NormConfig::default(), &device).unwrap();
        let h = Tensor::from_vec(feats, (n, 3), &device).unwrap();

        let sparse = adj.propagate(&h).unwrap().to_vec2::<f32>().unwrap();
        let dense = adj.to_dense().unwrap().matmul(&h).unwrap().to_vec2::<f32>().unwrap();
        for (a, b) in sparse.iter().flatten().zip(dense.iter().flatten()) {
            prop_assert!((a - b).abs() < 1e-4, "{} vs {}", a, b);
        }
    }

    #[test]
    fn self_loops_keep_every_node_reachable((n, edges, _) in arb_case()) {
        let device = Device::Cpu;
        let graph = GraphData::builder(n).edges(edges).build().unwrap().to_undirected();
        let adj = Adjacency::from_graph(&graph, &NormConfig::default(), &device).unwrap();
        let ones = Tensor::ones((n, 1), DType::F32, &device).unwrap();
        let out = adj.propagate(&ones).unwrap().to_vec2::<f32>().unwrap();
        prop_assert!(out.iter().flatten().all(|v| v.is_finite() && *v > 0.0));
    }
}
