//! Small built-in graphs.

use crate::split::index_to_mask;
use crate::{GraphData, Result};

/// Undirected edges of Zachary's karate club (0-indexed).
const KARATE_EDGES: [(usize, usize); 78] = [
    (0, 1), (0, 2), (0, 3), (0, 4), (0, 5), (0, 6), (0, 7), (0, 8),
    (0, 10), (0, 11), (0, 12), (0, 13), (0, 17), (0, 19), (0, 21), (0, 31),
    (1, 2), (1, 3), (1, 7), (1, 13), (1, 17), (1, 19), (1, 21), (1, 30),
    (2, 3), (2, 7), (2, 8), (2, 9), (2, 13), (2, 27), (2, 28), (2, 32),
    (3, 7), (3, 12), (3, 13),
    (4, 6), (4, 10),
    (5, 6), (5, 10), (5, 16),
    (6, 16),
    (8, 30), (8, 32), (8, 33),
    (9, 33),
    (13, 33),
    (14, 32), (14, 33),
    (15, 32), (15, 33),
    (18, 32), (18, 33),
    (19, 33),
    (20, 32), (20, 33),
    (22, 32), (22, 33),
    (23, 25), (23, 27), (23, 29), (23, 32), (23, 33),
    (24, 25), (24, 27), (24, 31),
    (25, 31),
    (26, 29), (26, 33),
    (27, 33),
    (28, 31), (28, 33),
    (29, 32), (29, 33),
    (30, 32), (30, 33),
    (31, 32), (31, 33),
    (32, 33),
];

/// Community assignment (4 groups, obtained via modularity clustering).
const KARATE_LABELS: [usize; 34] = [
    1, 1, 1, 1, 3, 3, 3, 1, 0, 1, 3, 1, 1, 1, 0, 0, 3, 1, 0, 1, 0, 1, 0, 0, 2, 2, 0, 0, 2, 0, 0,
    2, 0, 0,
];

/// The three-node path `0 - 1 - 2` with one scalar feature per node.
pub fn toy_path() -> Result<GraphData> {
    GraphData::builder(3)
        .edge_index(vec![0, 1, 1, 2], vec![1, 0, 2, 1])
        .node_features(vec![vec![-1.0], vec![0.0], vec![1.0]])
        .build()
}

/// Zachary's karate club.
///
/// 34 members, 78 friendships stored in both directions, one-hot identity
/// features and four community labels. The training mask holds the first
/// member of each community; every other member is in the test mask.
pub fn karate_club() -> Result<GraphData> {
    let n = KARATE_LABELS.len();
    let labels = KARATE_LABELS.to_vec();
    let num_classes = labels.iter().max().map_or(0, |m| m + 1);

    let train: Vec<usize> = (0..num_classes)
        .filter_map(|class| labels.iter().position(|&l| l == class))
        .collect();
    let train_mask = index_to_mask(&train, n)?;
    let test_mask = train_mask.iter().map(|t| !t).collect();

    GraphData::builder(n)
        .undirected_edges(KARATE_EDGES)
        .labels(labels)
        .train_mask(train_mask)
        .test_mask(test_mask)
        .build()
}
