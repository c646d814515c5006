//! Node classifier: stacked GCN layers followed by a linear read-out.

use crate::conv::{Adjacency, GCNConv};
use crate::{Error, Result};
use candle_core::Tensor;
use candle_nn::{linear, Linear, Module, VarBuilder};
use gcnode_core::GraphData;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Nonlinearity applied after every GCN layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Tanh,
    Relu,
}

impl Activation {
    pub fn apply(self, x: &Tensor) -> candle_core::Result<Tensor> {
        match self {
            Self::Tanh => x.tanh(),
            Self::Relu => x.relu(),
        }
    }
}

impl FromStr for Activation {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tanh" => Ok(Self::Tanh),
            "relu" => Ok(Self::Relu),
            other => Err(format!("unknown activation `{other}` (expected tanh or relu)")),
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tanh => f.write_str("tanh"),
            Self::Relu => f.write_str("relu"),
        }
    }
}

/// Classifier architecture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Input feature dimension.
    pub in_features: usize,
    /// Output width of each GCN layer, in order (default: `[4, 4]`).
    pub hidden: Vec<usize>,
    /// Number of output classes.
    pub num_classes: usize,
    pub activation: Activation,
    /// Dropout after each GCN layer during training (default: 0).
    pub dropout: f32,
    /// Bias on GCN layers (default: true).
    pub bias: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            in_features: 0,
            hidden: vec![4, 4],
            num_classes: 0,
            activation: Activation::Tanh,
            dropout: 0.0,
            bias: true,
        }
    }
}

impl ModelConfig {
    /// Default architecture sized for `graph`'s features and labels.
    pub fn for_graph(graph: &GraphData) -> Self {
        Self {
            in_features: graph.num_node_features(),
            num_classes: graph.num_classes(),
            ..Self::default()
        }
    }

    pub fn with_hidden(mut self, hidden: Vec<usize>) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_dropout(mut self, dropout: f32) -> Self {
        self.dropout = dropout;
        self
    }

    pub fn with_bias(mut self, bias: bool) -> Self {
        self.bias = bias;
        self
    }

    /// Width of the embedding the classifier reads from.
    pub fn embedding_dim(&self) -> usize {
        self.hidden.last().copied().unwrap_or(self.in_features)
    }

    pub fn validate(&self) -> Result<()> {
        if self.in_features == 0 {
            return Err(Error::InvalidConfig("in_features must be positive".into()));
        }
        if self.num_classes == 0 {
            return Err(Error::InvalidConfig("num_classes must be positive".into()));
        }
        if self.hidden.is_empty() {
            return Err(Error::InvalidConfig("need at least one GCN layer".into()));
        }
        if self.hidden.contains(&0) {
            return Err(Error::InvalidConfig(format!(
                "hidden sizes must be positive, got {:?}",
                self.hidden
            )));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(Error::InvalidConfig(format!(
                "dropout must lie in [0, 1), got {}",
                self.dropout
            )));
        }
        Ok(())
    }
}

/// Logits plus the representation they were computed from.
#[derive(Debug, Clone)]
pub struct ClassifierOutput {
    /// (N, num_classes)
    pub logits: Tensor,
    /// (N, embedding_dim), output of the last GCN layer after activation.
    pub embedding: Tensor,
}

/// GCN node classifier.
///
/// ```text
/// x -> GCNConv -> act -> ... -> GCNConv -> act -> Linear -> logits
/// ```
pub struct GcnClassifier {
    convs: Vec<GCNConv>,
    classifier: Linear,
    activation: Activation,
    dropout: f32,
}

impl GcnClassifier {
    pub fn new(config: &ModelConfig, vb: VarBuilder) -> Result<Self> {
        config.validate()?;

        let mut convs = Vec::with_capacity(config.hidden.len());
        let mut in_dim = config.in_features;
        for (i, &out_dim) in config.hidden.iter().enumerate() {
            convs.push(GCNConv::new(in_dim, out_dim, config.bias, vb.pp(format!("conv{i}")))?);
            in_dim = out_dim;
        }
        let classifier = linear(in_dim, config.num_classes, vb.pp("classifier"))?;

        Ok(Self {
            convs,
            classifier,
            activation: config.activation,
            dropout: config.dropout,
        })
    }

    pub fn num_layers(&self) -> usize {
        self.convs.len()
    }

    /// Forward pass; dropout is only active when `train` is set.
    pub fn forward_t(&self, x: &Tensor, adj: &Adjacency, train: bool) -> Result<ClassifierOutput> {
        let (n, f) = x.dims2()?;
        if n != adj.num_nodes() {
            return Err(Error::DimensionMismatch {
                what: "node count",
                expected: adj.num_nodes(),
                got: n,
            });
        }
        let expected = self.convs[0].in_features();
        if f != expected {
            return Err(Error::DimensionMismatch {
                what: "node features",
                expected,
                got: f,
            });
        }

        let mut h = x.clone();
        for conv in &self.convs {
            h = conv.forward(&h, adj)?;
            h = self.activation.apply(&h)?;
            if train && self.dropout > 0.0 {
                h = candle_nn::ops::dropout(&h, self.dropout)?;
            }
        }
        let logits = self.classifier.forward(&h)?;
        Ok(ClassifierOutput {
            logits,
            embedding: h,
        })
    }

    /// Inference forward pass.
    pub fn forward(&self, x: &Tensor, adj: &Adjacency) -> Result<ClassifierOutput> {
        self.forward_t(x, adj, false)
    }
}
