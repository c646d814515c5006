//! Graph Convolutional Networks for node classification.
//!
//! `gcnode-nn` turns a [`gcnode_core::GraphData`] into candle tensors and
//! trains a GCN classifier on it. It sits between the data layer
//! (`gcnode-core`) and application code.
//!
//! # Modules
//!
//! - [`conv`]: [`GCNConv`] and the cached normalized [`Adjacency`]
//! - [`model`]: [`GcnClassifier`], stacked GCN layers plus a linear read-out
//! - [`training`]: [`Trainer`], the forward/loss/backward/step loop
//! - [`metrics`]: masked cross-entropy, accuracy, confusion matrix
//! - [`init`]: seeded Glorot initialization
//!
//! # Example: Karate Club
//!
//! ```rust,ignore
//! use candle_core::Device;
//! use gcnode_core::datasets;
//! use gcnode_nn::{ModelConfig, Trainer, TrainingConfig};
//!
//! let graph = datasets::karate_club()?;
//! let model = ModelConfig::for_graph(&graph).with_hidden(vec![4, 4]);
//! let mut trainer = Trainer::new(&graph, model, TrainingConfig::default(), &Device::Cpu)?;
//!
//! let report = trainer.fit()?;
//! let predictions = trainer.predict()?;   // one class per member
//! let embeddings = trainer.embeddings()?; // 34 x 4
//! ```

pub mod conv;
pub mod error;
pub mod init;
pub mod metrics;
pub mod model;
pub mod training;

pub use conv::{Adjacency, GCNConv};
pub use error::{Error, Result};
pub use model::{Activation, ClassifierOutput, GcnClassifier, ModelConfig};
pub use training::{EpochMetrics, Evaluation, OptimizerKind, Trainer, TrainingConfig, TrainingReport};
