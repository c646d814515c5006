//! gcnode CLI - GCN node classification from the command line.
//!
//! # Usage
//!
//! ```bash
//! # Structure of a built-in dataset
//! gcnode stats karate
//!
//! # Train the default two-layer GCN and export embeddings
//! gcnode train karate --epochs 400 -o karate.json
//!
//! # Train on CSV inputs with 5 training nodes per class
//! gcnode train csv --edges edges.csv --features x.csv --labels y.csv --train-per-class 5
//!
//! # Settings from a JSON file, flags win
//! gcnode train karate --config run.json --lr 0.05
//! ```

use anyhow::{bail, Context, Result};
use candle_core::Device;
use clap::{Args, Parser, Subcommand, ValueEnum};
use gcnode_core::formats::{load_graph, Csv};
use gcnode_core::split::{per_class_split, random_split};
use gcnode_core::{datasets, GraphData, SplitConfig};
use gcnode_nn::metrics::confusion_matrix;
use gcnode_nn::{
    Activation, EpochMetrics, ModelConfig, OptimizerKind, Trainer, TrainingConfig,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "gcnode")]
#[command(about = "Graph convolutional networks for node classification", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show structural statistics of a graph
    Stats {
        #[command(flatten)]
        source: Source,
    },

    /// Train a GCN classifier and report accuracy
    Train {
        #[command(flatten)]
        source: Source,

        #[command(flatten)]
        opts: TrainOpts,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Dataset {
    /// Three-node path graph with scalar features (unlabeled)
    Toy,
    /// Zachary's karate club
    Karate,
    /// Edge list, features and labels from CSV files
    Csv,
    /// Serialized graph object (JSON)
    Json,
}

#[derive(Args)]
struct Source {
    /// Dataset to load
    dataset: Dataset,

    /// Edge list (`src,dst[,feature...]`), for `csv`
    #[arg(long)]
    edges: Option<PathBuf>,

    /// Node feature matrix, one row per node, for `csv`
    #[arg(long)]
    features: Option<PathBuf>,

    /// Node labels (`label` or `node,label`), for `csv`
    #[arg(long)]
    labels: Option<PathBuf>,

    /// Graph file, for `json`
    #[arg(long)]
    graph: Option<PathBuf>,

    /// Add reverse edges before use
    #[arg(long)]
    undirected: bool,
}

#[derive(Args)]
struct TrainOpts {
    /// JSON run configuration (`{"model": {...}, "training": {...}}`)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of epochs
    #[arg(long)]
    epochs: Option<usize>,

    /// Learning rate
    #[arg(long)]
    lr: Option<f64>,

    /// Weight decay
    #[arg(long)]
    weight_decay: Option<f64>,

    /// GCN layer widths, comma separated
    #[arg(long, value_delimiter = ',')]
    hidden: Option<Vec<usize>>,

    /// Optimizer (adam, sgd)
    #[arg(long)]
    optimizer: Option<OptimizerKind>,

    /// Activation after each GCN layer (tanh, relu)
    #[arg(long)]
    activation: Option<Activation>,

    /// Dropout probability during training
    #[arg(long)]
    dropout: Option<f32>,

    /// Seed for initialization and splits
    #[arg(long)]
    seed: Option<u64>,

    /// Stop after this many epochs without validation improvement
    #[arg(long)]
    patience: Option<usize>,

    /// Resample masks with this many training nodes per class
    #[arg(long)]
    train_per_class: Option<usize>,

    /// Validation nodes for --train-per-class
    #[arg(long, default_value = "0")]
    num_val: usize,

    /// Write predictions, embeddings and history as JSON
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write trained parameters as safetensors
    #[arg(long)]
    save_weights: Option<PathBuf>,

    /// Only print warnings and the final summary
    #[arg(short, long)]
    quiet: bool,
}

/// Contents of a `--config` file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RunConfig {
    model: ModelConfig,
    training: TrainingConfig,
}

#[derive(Serialize)]
struct RunOutput<'a> {
    num_nodes: usize,
    num_classes: usize,
    predictions: &'a [usize],
    embeddings: &'a [Vec<f32>],
    best_epoch: usize,
    stopped_early: bool,
    final_metrics: &'a EpochMetrics,
    history: &'a [EpochMetrics],
    /// `[true][predicted]` counts over the test mask.
    confusion: Option<Vec<Vec<usize>>>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let quiet = matches!(&cli.command, Commands::Train { opts, .. } if opts.quiet);
    init_tracing(quiet);

    match cli.command {
        Commands::Stats { source } => cmd_stats(&source),
        Commands::Train { source, opts } => cmd_train(&source, &opts),
    }
}

fn init_tracing(quiet: bool) {
    let default = if quiet { "warn" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn open(path: &Path) -> Result<File> {
    File::open(path).with_context(|| format!("Failed to open {}", path.display()))
}

fn load_dataset(source: &Source) -> Result<GraphData> {
    let graph = match source.dataset {
        Dataset::Toy => datasets::toy_path()?,
        Dataset::Karate => datasets::karate_club()?,
        Dataset::Csv => {
            let Some(edges_path) = &source.edges else {
                bail!("dataset `csv` needs --edges");
            };
            let edges = Csv::read_edges(open(edges_path)?)
                .with_context(|| format!("Failed to parse edges {}", edges_path.display()))?;
            let features = source
                .features
                .as_deref()
                .map(|p| {
                    Csv::read_matrix(open(p)?)
                        .with_context(|| format!("Failed to parse features {}", p.display()))
                })
                .transpose()?;
            let labels = source
                .labels
                .as_deref()
                .map(|p| {
                    Csv::read_labels(open(p)?)
                        .with_context(|| format!("Failed to parse labels {}", p.display()))
                })
                .transpose()?;
            load_graph(edges, features, labels).context("Invalid graph")?
        }
        Dataset::Json => {
            let Some(path) = &source.graph else {
                bail!("dataset `json` needs --graph");
            };
            GraphData::from_json(open(path)?)
                .with_context(|| format!("Failed to load graph {}", path.display()))?
        }
    };

    Ok(if source.undirected {
        graph.to_undirected()
    } else {
        graph
    })
}

fn yes_no(b: bool) -> &'static str {
    if b {
        "yes"
    } else {
        "no"
    }
}

fn cmd_stats(source: &Source) -> Result<()> {
    let graph = load_dataset(source)?;
    let stats = graph.stats();

    println!("Graph Statistics");
    println!("================");
    println!("Nodes:          {}", stats.num_nodes);
    println!("Edges:          {}", stats.num_edges);
    println!("Node features:  {}", stats.num_node_features);
    println!("Edge features:  {}", stats.num_edge_features);
    println!("Classes:        {}", stats.num_classes);
    println!("Avg degree:     {:.2}", stats.avg_degree);
    println!("Self loops:     {}", yes_no(stats.has_self_loops));
    println!("Isolated nodes: {}", yes_no(stats.has_isolated_nodes));
    println!("Undirected:     {}", yes_no(stats.is_undirected));
    println!("Components:     {}", stats.num_components);
    println!(
        "Train/val/test: {}/{}/{}",
        stats.num_train, stats.num_val, stats.num_test
    );

    Ok(())
}

/// Config file first, then command line overrides.
fn resolve_config(graph: &GraphData, opts: &TrainOpts) -> Result<(ModelConfig, TrainingConfig)> {
    let run: RunConfig = match &opts.config {
        Some(path) => serde_json::from_reader(open(path)?)
            .with_context(|| format!("Failed to parse config {}", path.display()))?,
        None => RunConfig::default(),
    };

    let mut model = ModelConfig {
        in_features: graph.num_node_features(),
        num_classes: run.model.num_classes.max(graph.num_classes()),
        ..run.model
    };
    if let Some(hidden) = &opts.hidden {
        model = model.with_hidden(hidden.clone());
    }
    if let Some(activation) = opts.activation {
        model = model.with_activation(activation);
    }
    if let Some(dropout) = opts.dropout {
        model = model.with_dropout(dropout);
    }

    let mut training = run.training;
    if let Some(epochs) = opts.epochs {
        training = training.with_epochs(epochs);
    }
    if let Some(lr) = opts.lr {
        training = training.with_learning_rate(lr);
    }
    if let Some(wd) = opts.weight_decay {
        training = training.with_weight_decay(wd);
    }
    if let Some(optimizer) = opts.optimizer {
        training = training.with_optimizer(optimizer);
    }
    if let Some(seed) = opts.seed {
        training = training.with_seed(seed);
    }
    if opts.patience.is_some() {
        training = training.with_early_stopping(opts.patience);
    }
    if opts.quiet {
        training = training.with_log_every(0);
    }

    Ok((model, training))
}

/// Resample masks when asked to, or draw a default split for labeled
/// graphs that come without one.
fn prepare_masks(graph: GraphData, opts: &TrainOpts, seed: u64) -> Result<GraphData> {
    let Some(labels) = graph.y() else {
        return Ok(graph);
    };
    if let Some(per_class) = opts.train_per_class {
        let split = per_class_split(labels, per_class, opts.num_val, seed)?;
        return Ok(split.apply(graph)?);
    }
    if graph.train_mask().is_none() {
        warn!("graph has no masks; using a random 60/20/20 split");
        let split = random_split(
            graph.num_nodes(),
            &SplitConfig {
                seed,
                ..SplitConfig::default()
            },
        )?;
        return Ok(split.apply(graph)?);
    }
    Ok(graph)
}

fn cmd_train(source: &Source, opts: &TrainOpts) -> Result<()> {
    let graph = load_dataset(source)?;
    let (model_config, training_config) = resolve_config(&graph, opts)?;
    let graph = prepare_masks(graph, opts, training_config.seed)?;

    let epochs = training_config.epochs;
    let mut trainer = Trainer::new(&graph, model_config, training_config, &Device::Cpu)
        .context("Failed to set up training")?;

    info!(
        nodes = graph.num_nodes(),
        edges = graph.num_edges(),
        hidden = ?trainer.model_config().hidden,
        epochs,
        "training"
    );

    let pb = if opts.quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(epochs as u64)
    };
    pb.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} epochs {msg}")
            .context("Invalid progress template")?,
    );

    let start = Instant::now();
    let report = trainer.fit_with(|m| {
        pb.inc(1);
        pb.set_message(format!("loss {:.4}", m.loss));
    })?;
    pb.finish_and_clear();

    let last = &report.final_metrics;
    println!("Trained {} epochs in {:.2?}", report.history.len(), start.elapsed());
    if report.stopped_early {
        println!("Stopped early (best epoch {})", report.best_epoch);
    }
    println!("Final loss:     {:.4}", last.loss);
    println!("Train accuracy: {:.4}", last.train_acc);
    if let Some(acc) = last.val_acc {
        println!("Val accuracy:   {:.4}", acc);
    }
    if let Some(acc) = last.test_acc {
        println!("Test accuracy:  {:.4}", acc);
    }

    if let Some(path) = &opts.output {
        let predictions = trainer.predict()?;
        let embeddings = trainer.embeddings()?;
        let num_classes = trainer.model_config().num_classes;
        let confusion = match (graph.y(), graph.test_mask()) {
            (Some(y), Some(mask)) => Some(confusion_matrix(&predictions, y, mask, num_classes)),
            _ => None,
        };
        let output = RunOutput {
            num_nodes: graph.num_nodes(),
            num_classes,
            predictions: &predictions,
            embeddings: &embeddings,
            best_epoch: report.best_epoch,
            stopped_early: report.stopped_early,
            final_metrics: last,
            history: &report.history,
            confusion,
        };
        let json = serde_json::to_string_pretty(&output)?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Wrote {}", path.display());
    }

    if let Some(path) = &opts.save_weights {
        trainer
            .save_weights(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Saved weights to {}", path.display());
    }

    Ok(())
}
