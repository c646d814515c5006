//! Train/validation/test masks.

use crate::{Error, GraphData, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xorshift::XorShiftRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Boolean mask with `true` at every listed index.
pub fn index_to_mask(indices: &[usize], num_nodes: usize) -> Result<Vec<bool>> {
    let mut mask = vec![false; num_nodes];
    for &i in indices {
        if i >= num_nodes {
            return Err(Error::InvalidConfig(format!(
                "mask index {i} out of range for {num_nodes} nodes"
            )));
        }
        mask[i] = true;
    }
    Ok(mask)
}

/// Indices of `true` entries, ascending.
pub fn mask_to_index(mask: &[bool]) -> Vec<usize> {
    mask.iter()
        .enumerate()
        .filter_map(|(i, &m)| m.then_some(i))
        .collect()
}

/// Ratios for [`random_split`]. The test set gets whatever remains.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    pub train_ratio: f32,
    pub val_ratio: f32,
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            train_ratio: 0.6,
            val_ratio: 0.2,
            seed: 42,
        }
    }
}

/// Disjoint node masks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Split {
    pub train: Vec<bool>,
    pub val: Vec<bool>,
    pub test: Vec<bool>,
}

impl Split {
    fn from_indices(num_nodes: usize, train: &[usize], val: &[usize], test: &[usize]) -> Result<Self> {
        Ok(Self {
            train: index_to_mask(train, num_nodes)?,
            val: index_to_mask(val, num_nodes)?,
            test: index_to_mask(test, num_nodes)?,
        })
    }

    /// Attach these masks to `graph`.
    pub fn apply(self, graph: GraphData) -> Result<GraphData> {
        graph.with_masks(Some(self.train), Some(self.val), Some(self.test))
    }
}

/// Shuffle nodes and cut them into train/val/test by ratio.
pub fn random_split(num_nodes: usize, config: &SplitConfig) -> Result<Split> {
    let SplitConfig {
        train_ratio,
        val_ratio,
        seed,
    } = *config;
    if !(0.0..=1.0).contains(&train_ratio)
        || !(0.0..=1.0).contains(&val_ratio)
        || train_ratio + val_ratio > 1.0
    {
        return Err(Error::InvalidConfig(format!(
            "split ratios must lie in [0, 1] and sum to at most 1, got train={train_ratio} val={val_ratio}"
        )));
    }

    let mut rng = XorShiftRng::seed_from_u64(seed);
    let mut nodes: Vec<usize> = (0..num_nodes).collect();
    nodes.shuffle(&mut rng);

    let n_train = ((num_nodes as f32 * train_ratio).round() as usize).min(num_nodes);
    let n_val = ((num_nodes as f32 * val_ratio).round() as usize).min(num_nodes - n_train);
    let (train, rest) = nodes.split_at(n_train);
    let (val, test) = rest.split_at(n_val);
    Split::from_indices(num_nodes, train, val, test)
}

/// Planetoid-style split: `per_class` random training nodes from every
/// class, then `num_val` validation nodes from the remainder; everything
/// left is test.
pub fn per_class_split(labels: &[usize], per_class: usize, num_val: usize, seed: u64) -> Result<Split> {
    if per_class == 0 {
        return Err(Error::InvalidConfig("per_class must be at least 1".into()));
    }
    let mut rng = XorShiftRng::seed_from_u64(seed);

    let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (node, &label) in labels.iter().enumerate() {
        by_class.entry(label).or_default().push(node);
    }

    let mut train = Vec::new();
    let mut rest = Vec::new();
    for nodes in by_class.values_mut() {
        nodes.shuffle(&mut rng);
        let take = per_class.min(nodes.len());
        train.extend_from_slice(&nodes[..take]);
        rest.extend_from_slice(&nodes[take..]);
    }
    rest.shuffle(&mut rng);
    let n_val = num_val.min(rest.len());
    let (val, test) = rest.split_at(n_val);
    Split::from_indices(labels.len(), &train, val, test)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_disjoint_cover(split: &Split) {
        for i in 0..split.train.len() {
            let count = [split.train[i], split.val[i], split.test[i]]
                .iter()
                .filter(|&&b| b)
                .count();
            assert_eq!(count, 1, "node {i} must be in exactly one split");
        }
    }

    #[test]
    fn test_mask_index_roundtrip() {
        let mask = index_to_mask(&[3, 0], 5).unwrap();
        assert_eq!(mask, vec![true, false, false, true, false]);
        assert_eq!(mask_to_index(&mask), vec![0, 3]);
        assert!(index_to_mask(&[5], 5).is_err());
    }

    #[test]
    fn test_random_split_sizes() {
        let split = random_split(10, &SplitConfig::default()).unwrap();
        assert_eq!(mask_to_index(&split.train).len(), 6);
        assert_eq!(mask_to_index(&split.val).len(), 2);
        assert_eq!(mask_to_index(&split.test).len(), 2);
        assert_disjoint_cover(&split);
    }

    #[test]
    fn test_random_split_deterministic() {
        let config = SplitConfig {
            seed: 7,
            ..SplitConfig::default()
        };
        assert_eq!(random_split(20, &config).unwrap(), random_split(20, &config).unwrap());
    }

    #[test]
    fn test_random_split_rejects_bad_ratios() {
        let config = SplitConfig {
            train_ratio: 0.8,
            val_ratio: 0.5,
            seed: 0,
        };
        assert!(random_split(10, &config).is_err());
    }

    #[test]
    fn test_per_class_split() {
        let labels = vec![0, 0, 0, 1, 1, 1, 2, 2, 2, 2];
        let split = per_class_split(&labels, 2, 1, 42).unwrap();
        let train = mask_to_index(&split.train);
        assert_eq!(train.len(), 6);
        for class in 0..3 {
            let count = train.iter().filter(|&&n| labels[n] == class).count();
            assert_eq!(count, 2);
        }
        assert_eq!(mask_to_index(&split.val).len(), 1);
        assert_eq!(mask_to_index(&split.test).len(), 3);
        assert_disjoint_cover(&split);
    }

    #[test]
    fn test_per_class_split_small_class() {
        let labels = vec![0, 1, 1, 1];
        let split = per_class_split(&labels, 2, 0, 1).unwrap();
        assert!(split.train[0]);
        assert_eq!(mask_to_index(&split.train).len(), 3);
        assert!(per_class_split(&labels, 0, 0, 1).is_err());
    }
}
