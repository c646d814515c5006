//! Supervised training loop for node classification.
//!
//! Each epoch runs the standard sequence:
//! 1. Forward pass over the whole graph (training mode)
//! 2. Cross-entropy on the nodes in the training mask
//! 3. Backward pass and optimizer step
//! 4. Accuracy on train/val/test masks in inference mode
//!
//! # Example
//!
//! ```rust,ignore
//! use gcnode_core::datasets;
//! use gcnode_nn::{ModelConfig, Trainer, TrainingConfig};
//!
//! let graph = datasets::karate_club()?;
//! let config = TrainingConfig::default().with_epochs(400).with_learning_rate(0.01);
//! let mut trainer = Trainer::new(&graph, ModelConfig::for_graph(&graph), config, &Device::Cpu)?;
//! let report = trainer.fit()?;
//! println!("final loss {:.4}", report.final_metrics.loss);
//! ```

use crate::conv::{features_tensor, Adjacency};
use crate::init::seeded_init;
use crate::metrics::{accuracy, index_tensor, label_tensor, masked_cross_entropy};
use crate::model::{GcnClassifier, ModelConfig};
use crate::{Error, Result};
use candle_core::{DType, Device, Tensor, Var, D};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarBuilder, VarMap, SGD};
use gcnode_core::{mask_to_index, GraphData, NormConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Which optimizer drives the parameter updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    /// Adam with decoupled weight decay.
    #[default]
    Adam,
    /// Plain SGD; weight decay is added to the loss as an L2 penalty.
    Sgd,
}

impl FromStr for OptimizerKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "adam" | "adamw" => Ok(Self::Adam),
            "sgd" => Ok(Self::Sgd),
            other => Err(format!("unknown optimizer `{other}` (expected adam or sgd)")),
        }
    }
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Adam => f.write_str("adam"),
            Self::Sgd => f.write_str("sgd"),
        }
    }
}

/// Training configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Number of training epochs (default: 200).
    pub epochs: usize,
    /// Learning rate (default: 0.01).
    pub learning_rate: f64,
    /// Weight decay (default: 5e-4).
    pub weight_decay: f64,
    /// Optimizer (default: Adam).
    pub optimizer: OptimizerKind,
    /// Seed for parameter initialization (default: 42).
    pub seed: u64,
    /// Log every n epochs, 0 disables (default: 10).
    pub log_every: usize,
    /// Stop after this many epochs without validation improvement
    /// (None = no early stopping). Needs a validation mask.
    pub early_stopping: Option<usize>,
    /// Adjacency preprocessing.
    pub norm: NormConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 200,
            learning_rate: 0.01,
            weight_decay: 5e-4,
            optimizer: OptimizerKind::Adam,
            seed: 42,
            log_every: 10,
            early_stopping: None,
            norm: NormConfig::default(),
        }
    }
}

impl TrainingConfig {
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    pub fn with_weight_decay(mut self, weight_decay: f64) -> Self {
        self.weight_decay = weight_decay;
        self
    }

    pub fn with_optimizer(mut self, optimizer: OptimizerKind) -> Self {
        self.optimizer = optimizer;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_log_every(mut self, log_every: usize) -> Self {
        self.log_every = log_every;
        self
    }

    pub fn with_early_stopping(mut self, patience: Option<usize>) -> Self {
        self.early_stopping = patience;
        self
    }

    pub fn with_norm(mut self, norm: NormConfig) -> Self {
        self.norm = norm;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(Error::InvalidConfig("epochs must be positive".into()));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "learning rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !(self.weight_decay.is_finite() && self.weight_decay >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "weight decay must be non-negative, got {}",
                self.weight_decay
            )));
        }
        if self.early_stopping == Some(0) {
            return Err(Error::InvalidConfig("early stopping patience must be positive".into()));
        }
        Ok(())
    }
}

/// Metrics recorded after one epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    /// Training objective of this epoch's step.
    pub loss: f32,
    pub train_acc: f32,
    pub val_acc: Option<f32>,
    pub test_acc: Option<f32>,
}

/// Outcome of [`Trainer::fit`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub history: Vec<EpochMetrics>,
    /// Epoch with the best validation accuracy, or the lowest loss when
    /// there is no validation mask.
    pub best_epoch: usize,
    pub final_metrics: EpochMetrics,
    pub stopped_early: bool,
}

/// Accuracy on each mask in inference mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub train_acc: f32,
    pub val_acc: Option<f32>,
    pub test_acc: Option<f32>,
}

enum OptimizerWrapper {
    Adam(AdamW),
    Sgd(SGD),
}

impl OptimizerWrapper {
    fn new(config: &TrainingConfig, vars: Vec<Var>) -> Result<Self> {
        Ok(match config.optimizer {
            OptimizerKind::Adam => {
                let params = ParamsAdamW {
                    lr: config.learning_rate,
                    weight_decay: config.weight_decay,
                    ..Default::default()
                };
                Self::Adam(AdamW::new(vars, params)?)
            }
            OptimizerKind::Sgd => Self::Sgd(SGD::new(vars, config.learning_rate)?),
        })
    }

    fn backward_step(&mut self, loss: &Tensor) -> candle_core::Result<()> {
        match self {
            Self::Adam(opt) => opt.backward_step(loss),
            Self::Sgd(opt) => opt.backward_step(loss),
        }
    }
}

/// Owns a graph's tensors, a [`GcnClassifier`] and its optimizer.
pub struct Trainer {
    config: TrainingConfig,
    model_config: ModelConfig,
    model: GcnClassifier,
    varmap: VarMap,
    optimizer: OptimizerWrapper,
    x: Tensor,
    y: Tensor,
    adj: Adjacency,
    train_idx: Tensor,
    val_idx: Option<Tensor>,
    test_idx: Option<Tensor>,
    epoch: usize,
}

impl Trainer {
    /// Prepare tensors and a freshly initialized model for `graph`.
    ///
    /// The graph needs labels and a non-empty training mask.
    pub fn new(
        graph: &GraphData,
        model_config: ModelConfig,
        config: TrainingConfig,
        device: &Device,
    ) -> Result<Self> {
        config.validate()?;

        let labels = graph
            .y()
            .ok_or_else(|| Error::Training("graph has no labels".into()))?;
        let train = graph
            .train_mask()
            .map(mask_to_index)
            .unwrap_or_default();
        if train.is_empty() {
            return Err(Error::Training("training mask is missing or empty".into()));
        }
        model_config.validate()?;
        if model_config.in_features != graph.num_node_features() {
            return Err(Error::DimensionMismatch {
                what: "node features",
                expected: model_config.in_features,
                got: graph.num_node_features(),
            });
        }
        if model_config.num_classes < graph.num_classes() {
            return Err(Error::DimensionMismatch {
                what: "classes",
                expected: graph.num_classes(),
                got: model_config.num_classes,
            });
        }

        let subset = |mask: Option<&[bool]>| -> candle_core::Result<Option<Tensor>> {
            match mask.map(mask_to_index) {
                Some(idx) if !idx.is_empty() => Ok(Some(index_tensor(&idx, device)?)),
                _ => Ok(None),
            }
        };
        let val_idx = subset(graph.val_mask())?;
        let test_idx = subset(graph.test_mask())?;
        let train_idx = index_tensor(&train, device)?;

        let x = features_tensor(graph, device)?;
        let y = label_tensor(labels, device)?;
        let adj = Adjacency::from_graph(graph, &config.norm, device)?;

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let model = GcnClassifier::new(&model_config, vb)?;
        seeded_init(&varmap, config.seed)?;
        let optimizer = OptimizerWrapper::new(&config, varmap.all_vars())?;

        debug!(
            nodes = graph.num_nodes(),
            messages = adj.num_messages(),
            train = train.len(),
            layers = model.num_layers(),
            optimizer = %config.optimizer,
            "trainer ready"
        );

        Ok(Self {
            config,
            model_config,
            model,
            varmap,
            optimizer,
            x,
            y,
            adj,
            train_idx,
            val_idx,
            test_idx,
            epoch: 0,
        })
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn model_config(&self) -> &ModelConfig {
        &self.model_config
    }

    pub fn model(&self) -> &GcnClassifier {
        &self.model
    }

    /// Number of epochs trained so far.
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    fn l2_penalty(&self) -> candle_core::Result<Option<Tensor>> {
        if self.config.optimizer != OptimizerKind::Sgd || self.config.weight_decay == 0.0 {
            return Ok(None);
        }
        let mut total: Option<Tensor> = None;
        for var in self.varmap.all_vars() {
            let sq = var.as_tensor().sqr()?.sum_all()?;
            total = Some(match total {
                Some(t) => (t + sq)?,
                None => sq,
            });
        }
        total
            .map(|t| t * (0.5 * self.config.weight_decay))
            .transpose()
    }

    /// One optimization step over the full graph.
    ///
    /// A non-finite loss is an error and leaves the parameters and the
    /// epoch counter untouched.
    pub fn train_epoch(&mut self) -> Result<EpochMetrics> {
        let out = self.model.forward_t(&self.x, &self.adj, true)?;
        let mut objective = masked_cross_entropy(&out.logits, &self.y, &self.train_idx)?;
        if let Some(penalty) = self.l2_penalty()? {
            objective = (objective + penalty)?;
        }

        let loss = objective.to_scalar::<f32>()?;
        if !loss.is_finite() {
            return Err(Error::Training(format!(
                "loss diverged at epoch {} ({loss})",
                self.epoch + 1
            )));
        }
        self.optimizer.backward_step(&objective)?;
        self.epoch += 1;

        let eval = self.evaluate()?;
        Ok(EpochMetrics {
            epoch: self.epoch,
            loss,
            train_acc: eval.train_acc,
            val_acc: eval.val_acc,
            test_acc: eval.test_acc,
        })
    }

    /// Accuracy on every available mask, without dropout.
    pub fn evaluate(&self) -> Result<Evaluation> {
        let logits = self.model.forward(&self.x, &self.adj)?.logits;
        let on = |idx: &Option<Tensor>| -> candle_core::Result<Option<f32>> {
            idx.as_ref()
                .map(|i| accuracy(&logits, &self.y, i))
                .transpose()
        };
        Ok(Evaluation {
            train_acc: accuracy(&logits, &self.y, &self.train_idx)?,
            val_acc: on(&self.val_idx)?,
            test_acc: on(&self.test_idx)?,
        })
    }

    /// Train for the configured number of epochs.
    pub fn fit(&mut self) -> Result<TrainingReport> {
        self.fit_with(|_| {})
    }

    /// Train, calling `on_epoch` after every epoch.
    pub fn fit_with<F: FnMut(&EpochMetrics)>(&mut self, mut on_epoch: F) -> Result<TrainingReport> {
        let patience = match (self.config.early_stopping, &self.val_idx) {
            (Some(p), Some(_)) => Some(p),
            (Some(_), None) => {
                warn!("early stopping requested but graph has no validation mask; ignoring");
                None
            }
            (None, _) => None,
        };

        let mut history: Vec<EpochMetrics> = Vec::with_capacity(self.config.epochs);
        let mut best_epoch = 0;
        let mut best_val = f32::NEG_INFINITY;
        let mut best_loss = f32::INFINITY;
        let mut since_best = 0;
        let mut stopped_early = false;

        for _ in 0..self.config.epochs {
            let metrics = self.train_epoch()?;

            let improved = match metrics.val_acc {
                Some(val) => val > best_val,
                None => metrics.loss < best_loss,
            };
            if improved {
                best_val = metrics.val_acc.unwrap_or(best_val);
                best_loss = metrics.loss;
                best_epoch = metrics.epoch;
                since_best = 0;
            } else {
                since_best += 1;
            }

            let every = self.config.log_every;
            if every > 0 && (metrics.epoch == 1 || metrics.epoch % every == 0) {
                info!(
                    epoch = metrics.epoch,
                    loss = metrics.loss,
                    train_acc = metrics.train_acc,
                    val_acc = ?metrics.val_acc,
                    test_acc = ?metrics.test_acc,
                    "epoch"
                );
            }

            on_epoch(&metrics);
            history.push(metrics);

            if patience.is_some_and(|p| since_best >= p) {
                info!(epoch = self.epoch, best_epoch, "early stopping");
                stopped_early = true;
                break;
            }
        }

        let final_metrics = history
            .last()
            .cloned()
            .ok_or_else(|| Error::Training("no epochs were run".into()))?;
        info!(
            epochs = history.len(),
            loss = final_metrics.loss,
            train_acc = final_metrics.train_acc,
            test_acc = ?final_metrics.test_acc,
            "training finished"
        );

        Ok(TrainingReport {
            history,
            best_epoch,
            final_metrics,
            stopped_early,
        })
    }

    /// Predicted class for every node.
    pub fn predict(&self) -> Result<Vec<usize>> {
        let logits = self.model.forward(&self.x, &self.adj)?.logits;
        let pred = logits.argmax(D::Minus1)?.to_vec1::<u32>()?;
        Ok(pred.into_iter().map(|p| p as usize).collect())
    }

    /// Output of the last GCN layer, one row per node.
    pub fn embeddings(&self) -> Result<Vec<Vec<f32>>> {
        let embedding = self.model.forward(&self.x, &self.adj)?.embedding;
        Ok(embedding.to_vec2::<f32>()?)
    }

    /// Write all parameters as safetensors.
    pub fn save_weights(&self, path: impl AsRef<Path>) -> Result<()> {
        self.varmap.save(path)?;
        Ok(())
    }

    /// Load parameters saved by [`Trainer::save_weights`] for the same
    /// architecture.
    pub fn load_weights(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.varmap.load(path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_training_config_builder() {
        let config = TrainingConfig::default()
            .with_epochs(50)
            .with_learning_rate(0.1)
            .with_weight_decay(0.0)
            .with_optimizer(OptimizerKind::Sgd)
            .with_seed(3)
            .with_early_stopping(Some(5));

        assert_eq!(config.epochs, 50);
        assert_eq!(config.learning_rate, 0.1);
        assert_eq!(config.weight_decay, 0.0);
        assert_eq!(config.optimizer, OptimizerKind::Sgd);
        assert_eq!(config.seed, 3);
        assert_eq!(config.early_stopping, Some(5));
        config.validate().unwrap();
    }

    #[test]
    fn test_training_config_validation() {
        assert!(TrainingConfig::default().with_epochs(0).validate().is_err());
        assert!(TrainingConfig::default().with_learning_rate(0.0).validate().is_err());
        assert!(TrainingConfig::default().with_learning_rate(f64::NAN).validate().is_err());
        assert!(TrainingConfig::default().with_weight_decay(-1.0).validate().is_err());
        assert!(TrainingConfig::default().with_early_stopping(Some(0)).validate().is_err());
    }

    #[test]
    fn test_training_config_json_defaults() {
        let config: TrainingConfig = serde_json::from_str(r#"{"epochs": 20, "optimizer": "sgd"}"#).unwrap();
        assert_eq!(config.epochs, 20);
        assert_eq!(config.optimizer, OptimizerKind::Sgd);
        assert_eq!(config.learning_rate, 0.01);
        assert!(config.norm.add_self_loops);
    }

    #[test]
    fn test_optimizer_parse() {
        assert_eq!("Adam".parse::<OptimizerKind>().unwrap(), OptimizerKind::Adam);
        assert_eq!("sgd".parse::<OptimizerKind>().unwrap(), OptimizerKind::Sgd);
        assert!("lbfgs".parse::<OptimizerKind>().is_err());
    }
}
