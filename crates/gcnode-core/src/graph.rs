use crate::{Error, Result};
use petgraph::graph::{DiGraph, NodeIndex, UnGraph};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Read;

/// A graph packaged for node-level learning.
///
/// Edges are stored in COO form (`src[i] -> dst[i]`), node and edge features
/// as dense row-major matrices. Labels and split masks are optional and hold
/// one entry per node.
///
/// # Example
///
/// ```rust
/// use gcnode_core::GraphData;
///
/// // 0 - 1 - 2, both directions, one scalar feature per node
/// let graph = GraphData::builder(3)
///     .edge_index(vec![0, 1, 1, 2], vec![1, 0, 2, 1])
///     .node_features(vec![vec![-1.0], vec![0.0], vec![1.0]])
///     .build()
///     .unwrap();
///
/// assert_eq!(graph.num_nodes(), 3);
/// assert_eq!(graph.num_edges(), 4);
/// assert_eq!(graph.num_node_features(), 1);
/// assert!(graph.is_undirected());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphData {
    num_nodes: usize,
    src: Vec<usize>,
    dst: Vec<usize>,
    x: Vec<f32>,
    num_node_features: usize,
    #[serde(default)]
    edge_attr: Option<Vec<f32>>,
    #[serde(default)]
    num_edge_features: usize,
    #[serde(default)]
    y: Option<Vec<usize>>,
    #[serde(default)]
    train_mask: Option<Vec<bool>>,
    #[serde(default)]
    val_mask: Option<Vec<bool>>,
    #[serde(default)]
    test_mask: Option<Vec<bool>>,
}

/// Summary of a [`GraphData`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    pub num_nodes: usize,
    pub num_edges: usize,
    pub num_node_features: usize,
    pub num_edge_features: usize,
    pub num_classes: usize,
    pub avg_degree: f64,
    pub has_self_loops: bool,
    pub has_isolated_nodes: bool,
    pub is_undirected: bool,
    pub num_components: usize,
    pub num_train: usize,
    pub num_val: usize,
    pub num_test: usize,
}

impl GraphData {
    /// Package an edge list and a flat node feature matrix.
    pub fn new(
        num_nodes: usize,
        src: Vec<usize>,
        dst: Vec<usize>,
        x: Vec<f32>,
        num_node_features: usize,
    ) -> Result<Self> {
        let graph = Self {
            num_nodes,
            src,
            dst,
            x,
            num_node_features,
            edge_attr: None,
            num_edge_features: 0,
            y: None,
            train_mask: None,
            val_mask: None,
            test_mask: None,
        };
        graph.validate()?;
        Ok(graph)
    }

    /// Start a [`GraphBuilder`].
    pub fn builder(num_nodes: usize) -> GraphBuilder {
        GraphBuilder::new(num_nodes)
    }

    /// Load a serialized graph from JSON and validate it.
    pub fn from_json<R: Read>(reader: R) -> Result<Self> {
        let graph: Self = serde_json::from_reader(reader)?;
        graph.validate()?;
        Ok(graph)
    }

    /// Check every shape and range invariant.
    pub fn validate(&self) -> Result<()> {
        if self.num_nodes == 0 {
            return Err(Error::EmptyGraph);
        }
        if self.src.len() != self.dst.len() {
            return Err(Error::ShapeMismatch {
                what: "edge_index",
                expected: self.src.len(),
                got: self.dst.len(),
            });
        }
        for (edge, (&s, &d)) in self.src.iter().zip(&self.dst).enumerate() {
            for node in [s, d] {
                if node >= self.num_nodes {
                    return Err(Error::NodeOutOfRange {
                        edge,
                        node,
                        num_nodes: self.num_nodes,
                    });
                }
            }
        }
        if self.num_node_features == 0 {
            return Err(Error::InvalidConfig(
                "node features need at least one column".into(),
            ));
        }
        let x_len = checked_area("x", self.num_nodes, self.num_node_features)?;
        check_len("x", x_len, self.x.len())?;
        let attr_len = checked_area("edge_attr", self.num_edges(), self.num_edge_features)?;
        match &self.edge_attr {
            Some(attr) => check_len("edge_attr", attr_len, attr.len())?,
            None if self.num_edge_features != 0 => {
                return Err(Error::ShapeMismatch {
                    what: "edge_attr",
                    expected: attr_len,
                    got: 0,
                })
            }
            None => {}
        }
        if let Some(y) = &self.y {
            check_len("y", self.num_nodes, y.len())?;
        }
        for (what, mask) in [
            ("train_mask", &self.train_mask),
            ("val_mask", &self.val_mask),
            ("test_mask", &self.test_mask),
        ] {
            if let Some(mask) = mask {
                check_len(what, self.num_nodes, mask.len())?;
            }
        }
        Ok(())
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn num_edges(&self) -> usize {
        self.src.len()
    }

    pub fn num_node_features(&self) -> usize {
        self.num_node_features
    }

    pub fn num_edge_features(&self) -> usize {
        self.num_edge_features
    }

    /// Number of classes, `max(y) + 1`, or 0 without labels.
    pub fn num_classes(&self) -> usize {
        self.y
            .as_ref()
            .and_then(|y| y.iter().max())
            .map_or(0, |&max| max + 1)
    }

    /// Source row of the edge index.
    pub fn src(&self) -> &[usize] {
        &self.src
    }

    /// Destination row of the edge index.
    pub fn dst(&self) -> &[usize] {
        &self.dst
    }

    /// Row-major node feature matrix.
    pub fn x(&self) -> &[f32] {
        &self.x
    }

    /// Row-major edge feature matrix, if any.
    pub fn edge_attr(&self) -> Option<&[f32]> {
        self.edge_attr.as_deref()
    }

    pub fn y(&self) -> Option<&[usize]> {
        self.y.as_deref()
    }

    pub fn train_mask(&self) -> Option<&[bool]> {
        self.train_mask.as_deref()
    }

    pub fn val_mask(&self) -> Option<&[bool]> {
        self.val_mask.as_deref()
    }

    pub fn test_mask(&self) -> Option<&[bool]> {
        self.test_mask.as_deref()
    }

    /// Iterate over `(src, dst)` pairs.
    pub fn edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.src.iter().copied().zip(self.dst.iter().copied())
    }

    /// Feature row of node `node`.
    pub fn node_features(&self, node: usize) -> Option<&[f32]> {
        if node >= self.num_nodes {
            return None;
        }
        let start = node * self.num_node_features;
        Some(&self.x[start..start + self.num_node_features])
    }

    /// Feature row of edge `edge`.
    pub fn edge_features(&self, edge: usize) -> Option<&[f32]> {
        let attr = self.edge_attr.as_ref()?;
        if edge >= self.num_edges() {
            return None;
        }
        let start = edge * self.num_edge_features;
        Some(&attr[start..start + self.num_edge_features])
    }

    /// Attach labels.
    pub fn with_labels(mut self, y: Vec<usize>) -> Result<Self> {
        check_len("y", self.num_nodes, y.len())?;
        self.y = Some(y);
        Ok(self)
    }

    /// Attach train/val/test masks. `None` leaves a mask unset.
    pub fn with_masks(
        mut self,
        train: Option<Vec<bool>>,
        val: Option<Vec<bool>>,
        test: Option<Vec<bool>>,
    ) -> Result<Self> {
        for (what, mask) in [("train_mask", &train), ("val_mask", &val), ("test_mask", &test)] {
            if let Some(mask) = mask {
                check_len(what, self.num_nodes, mask.len())?;
            }
        }
        self.train_mask = train;
        self.val_mask = val;
        self.test_mask = test;
        Ok(self)
    }

    /// Number of incoming edges per node.
    pub fn in_degree(&self) -> Vec<usize> {
        let mut deg = vec![0; self.num_nodes];
        for &d in &self.dst {
            deg[d] += 1;
        }
        deg
    }

    /// Number of outgoing edges per node.
    pub fn out_degree(&self) -> Vec<usize> {
        let mut deg = vec![0; self.num_nodes];
        for &s in &self.src {
            deg[s] += 1;
        }
        deg
    }

    pub fn has_self_loops(&self) -> bool {
        self.edges().any(|(s, d)| s == d)
    }

    /// True if some node touches no edge other than a self-loop.
    pub fn has_isolated_nodes(&self) -> bool {
        let mut touched = vec![false; self.num_nodes];
        for (s, d) in self.edges().filter(|(s, d)| s != d) {
            touched[s] = true;
            touched[d] = true;
        }
        touched.iter().any(|t| !t)
    }

    /// True if the edge multiset equals its reverse.
    pub fn is_undirected(&self) -> bool {
        let mut forward: Vec<(usize, usize)> = self.edges().collect();
        let mut backward: Vec<(usize, usize)> = self.edges().map(|(s, d)| (d, s)).collect();
        forward.sort_unstable();
        backward.sort_unstable();
        forward == backward
    }

    /// Number of weakly connected components.
    pub fn connected_components(&self) -> usize {
        let mut graph: UnGraph<(), ()> = UnGraph::with_capacity(self.num_nodes, self.num_edges());
        for _ in 0..self.num_nodes {
            graph.add_node(());
        }
        for (s, d) in self.edges() {
            graph.add_edge(NodeIndex::new(s), NodeIndex::new(d), ());
        }
        petgraph::algo::connected_components(&graph)
    }

    /// Directed petgraph view. Node weights are node ids, edge weights edge ids.
    pub fn to_petgraph(&self) -> DiGraph<usize, usize> {
        let mut graph = DiGraph::with_capacity(self.num_nodes, self.num_edges());
        for node in 0..self.num_nodes {
            graph.add_node(node);
        }
        for (edge, (s, d)) in self.edges().enumerate() {
            graph.add_edge(NodeIndex::new(s), NodeIndex::new(d), edge);
        }
        graph
    }

    /// Coalesce duplicate edges and add the reverse of every edge that lacks one.
    ///
    /// The first occurrence of each edge is kept in its original order;
    /// reverse edges are appended and copy the features of the edge they
    /// mirror.
    pub fn to_undirected(&self) -> Self {
        let mut seen: HashSet<(usize, usize)> = HashSet::with_capacity(self.num_edges() * 2);
        let unique: Vec<(usize, usize, usize)> = self
            .edges()
            .enumerate()
            .filter(|&(_, e)| seen.insert(e))
            .map(|(edge, (s, d))| (s, d, edge))
            .collect();
        let reverse: Vec<(usize, usize, usize)> = unique
            .iter()
            .filter(|&&(s, d, _)| seen.insert((d, s)))
            .map(|&(s, d, edge)| (d, s, edge))
            .collect();

        let mut out = self.clone();
        out.src.clear();
        out.dst.clear();
        let mut attr = self.edge_attr.as_ref().map(|_| Vec::new());
        for (s, d, edge) in unique.into_iter().chain(reverse) {
            out.src.push(s);
            out.dst.push(d);
            if let (Some(attr), Some(row)) = (attr.as_mut(), self.edge_features(edge)) {
                attr.extend_from_slice(row);
            }
        }
        out.edge_attr = attr;
        out
    }

    /// Append a self-loop `(i, i)` for every node that has none.
    ///
    /// Self-loop edge features are zero.
    pub fn add_self_loops(&self) -> Self {
        let mut has_loop = vec![false; self.num_nodes];
        for (s, d) in self.edges() {
            if s == d {
                has_loop[s] = true;
            }
        }
        let mut out = self.clone();
        for node in (0..self.num_nodes).filter(|&n| !has_loop[n]) {
            out.src.push(node);
            out.dst.push(node);
            if let Some(attr) = out.edge_attr.as_mut() {
                attr.extend(std::iter::repeat(0.0).take(self.num_edge_features));
            }
        }
        out
    }

    pub fn stats(&self) -> GraphStats {
        let count = |mask: Option<&[bool]>| mask.map_or(0, |m| m.iter().filter(|&&b| b).count());
        GraphStats {
            num_nodes: self.num_nodes,
            num_edges: self.num_edges(),
            num_node_features: self.num_node_features,
            num_edge_features: self.num_edge_features,
            num_classes: self.num_classes(),
            avg_degree: self.num_edges() as f64 / self.num_nodes as f64,
            has_self_loops: self.has_self_loops(),
            has_isolated_nodes: self.has_isolated_nodes(),
            is_undirected: self.is_undirected(),
            num_components: self.connected_components(),
            num_train: count(self.train_mask()),
            num_val: count(self.val_mask()),
            num_test: count(self.test_mask()),
        }
    }
}

fn check_len(what: &'static str, expected: usize, got: usize) -> Result<()> {
    if expected == got {
        Ok(())
    } else {
        Err(Error::ShapeMismatch {
            what,
            expected,
            got,
        })
    }
}

/// `rows * cols`, or an error when the product does not fit in `usize`.
fn checked_area(what: &'static str, rows: usize, cols: usize) -> Result<usize> {
    rows.checked_mul(cols).ok_or_else(|| {
        Error::InvalidConfig(format!("{what} of {rows} x {cols} entries overflows"))
    })
}

fn flatten_rows(what: &'static str, rows: Vec<Vec<f32>>, expected_rows: usize) -> Result<(Vec<f32>, usize)> {
    check_len(what, expected_rows, rows.len())?;
    let dim = rows.first().map_or(0, Vec::len);
    let mut flat = Vec::with_capacity(rows.len() * dim);
    for row in rows {
        check_len(what, dim, row.len())?;
        flat.extend(row);
    }
    Ok((flat, dim))
}

/// Identity (one-hot) feature matrix for `n` nodes.
pub fn identity_features(n: usize) -> Vec<f32> {
    let mut x = vec![0.0; n * n];
    for i in 0..n {
        x[i * n + i] = 1.0;
    }
    x
}

#[derive(Debug, Clone)]
enum Features {
    Rows(Vec<Vec<f32>>),
    Flat(Vec<f32>, usize),
}

/// Fluent construction of a [`GraphData`].
///
/// Nodes without explicit features get one-hot identity features.
#[derive(Debug, Clone, Default)]
pub struct GraphBuilder {
    num_nodes: usize,
    src: Vec<usize>,
    dst: Vec<usize>,
    node_features: Option<Features>,
    edge_features: Option<Features>,
    y: Option<Vec<usize>>,
    train_mask: Option<Vec<bool>>,
    val_mask: Option<Vec<bool>>,
    test_mask: Option<Vec<bool>>,
}

impl GraphBuilder {
    pub fn new(num_nodes: usize) -> Self {
        Self {
            num_nodes,
            ..Self::default()
        }
    }

    /// Add one directed edge.
    pub fn edge(mut self, src: usize, dst: usize) -> Self {
        self.src.push(src);
        self.dst.push(dst);
        self
    }

    /// Add directed edges.
    pub fn edges(mut self, edges: impl IntoIterator<Item = (usize, usize)>) -> Self {
        for (s, d) in edges {
            self.src.push(s);
            self.dst.push(d);
        }
        self
    }

    /// Add each pair in both directions.
    pub fn undirected_edges(mut self, edges: impl IntoIterator<Item = (usize, usize)>) -> Self {
        for (a, b) in edges {
            self.src.extend([a, b]);
            self.dst.extend([b, a]);
        }
        self
    }

    /// Append a two-row edge index.
    pub fn edge_index(mut self, src: Vec<usize>, dst: Vec<usize>) -> Self {
        self.src.extend(src);
        self.dst.extend(dst);
        self
    }

    /// One feature row per node.
    pub fn node_features(mut self, rows: Vec<Vec<f32>>) -> Self {
        self.node_features = Some(Features::Rows(rows));
        self
    }

    /// Row-major node features with `dim` columns.
    pub fn node_features_flat(mut self, data: Vec<f32>, dim: usize) -> Self {
        self.node_features = Some(Features::Flat(data, dim));
        self
    }

    /// One feature row per edge, in insertion order.
    pub fn edge_features(mut self, rows: Vec<Vec<f32>>) -> Self {
        self.edge_features = Some(Features::Rows(rows));
        self
    }

    /// Row-major edge features with `dim` columns.
    pub fn edge_features_flat(mut self, data: Vec<f32>, dim: usize) -> Self {
        self.edge_features = Some(Features::Flat(data, dim));
        self
    }

    pub fn labels(mut self, y: Vec<usize>) -> Self {
        self.y = Some(y);
        self
    }

    pub fn train_mask(mut self, mask: Vec<bool>) -> Self {
        self.train_mask = Some(mask);
        self
    }

    pub fn val_mask(mut self, mask: Vec<bool>) -> Self {
        self.val_mask = Some(mask);
        self
    }

    pub fn test_mask(mut self, mask: Vec<bool>) -> Self {
        self.test_mask = Some(mask);
        self
    }

    /// Validate and package.
    pub fn build(self) -> Result<GraphData> {
        let num_edges = self.src.len();
        let (x, num_node_features) = match self.node_features {
            Some(Features::Rows(rows)) => flatten_rows("x", rows, self.num_nodes)?,
            Some(Features::Flat(data, dim)) => (data, dim),
            None => {
                checked_area("x", self.num_nodes, self.num_nodes)?;
                (identity_features(self.num_nodes), self.num_nodes)
            }
        };
        let (edge_attr, num_edge_features) = match self.edge_features {
            Some(Features::Rows(rows)) => {
                let (flat, dim) = flatten_rows("edge_attr", rows, num_edges)?;
                (Some(flat), dim)
            }
            Some(Features::Flat(data, dim)) => (Some(data), dim),
            None => (None, 0),
        };
        let graph = GraphData {
            num_nodes: self.num_nodes,
            src: self.src,
            dst: self.dst,
            x,
            num_node_features,
            edge_attr,
            num_edge_features,
            y: self.y,
            train_mask: self.train_mask,
            val_mask: self.val_mask,
            test_mask: self.test_mask,
        };
        graph.validate()?;
        Ok(graph)
    }
}
