//! End-to-end training on the built-in graphs.

use candle_core::Device;
use gcnode_core::split::{random_split, SplitConfig};
use gcnode_core::{datasets, GraphData};
use gcnode_nn::{Error, ModelConfig, OptimizerKind, Trainer, TrainingConfig};

fn karate() -> GraphData {
    datasets::karate_club().unwrap()
}

fn trainer(graph: &GraphData, config: TrainingConfig) -> Trainer {
    Trainer::new(graph, ModelConfig::for_graph(graph), config, &Device::Cpu).unwrap()
}

#[test]
fn test_karate_fits_training_nodes() {
    let graph = karate();
    let config = TrainingConfig::default()
        .with_epochs(300)
        .with_learning_rate(0.02)
        .with_log_every(0);
    let mut trainer = trainer(&graph, config);

    let report = trainer.fit().unwrap();
    assert_eq!(report.history.len(), 300);
    assert!(!report.stopped_early);

    let first = report.history[0].loss;
    let last = report.final_metrics.loss;
    assert!(first > 1.0, "initial loss {first} should be near ln(4)");
    assert!(last < first * 0.5, "loss did not drop: {first} -> {last}");
    assert_eq!(report.final_metrics.train_acc, 1.0);
    assert!(report.final_metrics.test_acc.is_some());
    assert!(report.final_metrics.val_acc.is_none());
    assert_eq!(trainer.epoch(), 300);
}

#[test]
fn test_same_seed_same_history() {
    let graph = karate();
    let config = TrainingConfig::default().with_epochs(20).with_log_every(0);

    let a = trainer(&graph, config.clone()).fit().unwrap();
    let b = trainer(&graph, config).fit().unwrap();
    for (x, y) in a.history.iter().zip(&b.history) {
        assert!((x.loss - y.loss).abs() < 1e-5);
    }
}

#[test]
fn test_sgd_reduces_loss() {
    let graph = karate();
    let config = TrainingConfig::default()
        .with_epochs(100)
        .with_learning_rate(0.2)
        .with_optimizer(OptimizerKind::Sgd)
        .with_log_every(0);
    let report = trainer(&graph, config).fit().unwrap();
    assert!(report.final_metrics.loss < report.history[0].loss);
}

#[test]
fn test_sgd_weight_decay_enters_objective() {
    let graph = karate();
    let first_loss = |config: TrainingConfig| trainer(&graph, config).fit().unwrap().history[0].loss;
    let sgd = TrainingConfig::default()
        .with_epochs(1)
        .with_optimizer(OptimizerKind::Sgd)
        .with_log_every(0);

    let plain = first_loss(sgd.clone().with_weight_decay(0.0));
    let decayed = first_loss(sgd.with_weight_decay(0.1));
    assert!(decayed > plain + 1e-3, "L2 penalty missing: {plain} vs {decayed}");

    // AdamW decays the weights directly, the reported objective is unchanged
    let adam = TrainingConfig::default().with_epochs(1).with_log_every(0);
    let plain = first_loss(adam.clone().with_weight_decay(0.0));
    let decayed = first_loss(adam.with_weight_decay(0.1));
    assert!((plain - decayed).abs() < 1e-6);
}

#[test]
fn test_diverged_loss_leaves_model_untouched() {
    let graph = karate();
    let config = TrainingConfig::default()
        .with_optimizer(OptimizerKind::Sgd)
        .with_learning_rate(1e30)
        .with_log_every(0);
    let mut trainer = trainer(&graph, config);

    let mut completed = 0;
    let (err, before) = loop {
        let before = trainer.embeddings().unwrap();
        match trainer.train_epoch() {
            Ok(_) => {
                completed += 1;
                assert!(completed < 10, "training never diverged");
            }
            Err(err) => break (err, before),
        }
    };

    assert!(matches!(err, Error::Training(_)));
    assert_eq!(trainer.epoch(), completed);
    let after = trainer.embeddings().unwrap();
    assert!(after.iter().flatten().all(|v| v.is_finite()));
    assert_eq!(after, before);
    assert!(trainer.fit().is_err());
}

#[test]
fn test_early_stopping_on_validation() {
    let split = random_split(
        34,
        &SplitConfig {
            train_ratio: 0.5,
            val_ratio: 0.25,
            seed: 1,
        },
    )
    .unwrap();
    let num_val = split.val.iter().filter(|&&v| v).count();
    let graph = split.apply(karate()).unwrap();

    let config = TrainingConfig::default()
        .with_epochs(100)
        .with_early_stopping(Some(1))
        .with_log_every(0);
    let report = trainer(&graph, config).fit().unwrap();

    // validation accuracy can strictly improve at most num_val + 1 times
    assert!(report.stopped_early);
    assert!(report.history.len() <= num_val + 2);
    assert!(report.best_epoch >= 1 && report.best_epoch <= report.history.len());
    assert!(report.final_metrics.val_acc.is_some());
}

#[test]
fn test_callback_sees_every_epoch() {
    let graph = karate();
    let config = TrainingConfig::default().with_epochs(7).with_log_every(0);
    let mut seen = Vec::new();
    let report = trainer(&graph, config)
        .fit_with(|m| seen.push(m.epoch))
        .unwrap();
    assert_eq!(seen, (1..=7).collect::<Vec<_>>());
    assert_eq!(report.history.len(), 7);
}

#[test]
fn test_predictions_and_embeddings() {
    let graph = karate();
    let mut trainer = trainer(&graph, TrainingConfig::default().with_epochs(5).with_log_every(0));
    trainer.fit().unwrap();

    let pred = trainer.predict().unwrap();
    assert_eq!(pred.len(), 34);
    assert!(pred.iter().all(|&p| p < 4));

    let emb = trainer.embeddings().unwrap();
    assert_eq!(emb.len(), 34);
    assert!(emb.iter().all(|row| row.len() == 4));
}

#[test]
fn test_weights_roundtrip() {
    let graph = karate();
    let mut trained = trainer(&graph, TrainingConfig::default().with_epochs(30).with_log_every(0));
    trained.fit().unwrap();

    let path = std::env::temp_dir().join(format!("gcnode-weights-{}.safetensors", std::process::id()));
    trained.save_weights(&path).unwrap();

    let mut fresh = trainer(&graph, TrainingConfig::default().with_seed(999));
    fresh.load_weights(&path).unwrap();
    assert_eq!(fresh.predict().unwrap(), trained.predict().unwrap());
    assert_eq!(fresh.embeddings().unwrap(), trained.embeddings().unwrap());

    std::fs::remove_file(path).unwrap();
}

#[test]
fn test_requires_labels_and_train_mask() {
    let toy = datasets::toy_path().unwrap();
    let config = ModelConfig {
        in_features: 1,
        num_classes: 2,
        ..ModelConfig::default()
    };
    let err = Trainer::new(&toy, config.clone(), TrainingConfig::default(), &Device::Cpu);
    assert!(matches!(err, Err(Error::Training(_))));

    let labeled = toy.with_labels(vec![0, 1, 0]).unwrap();
    let err = Trainer::new(&labeled, config.clone(), TrainingConfig::default(), &Device::Cpu);
    assert!(matches!(err, Err(Error::Training(_))));

    let masked = labeled
        .with_masks(Some(vec![true, true, false]), None, None)
        .unwrap();
    assert!(Trainer::new(&masked, config, TrainingConfig::default(), &Device::Cpu).is_ok());
}

#[test]
fn test_rejects_mismatched_model() {
    let graph = karate();
    let config = ModelConfig {
        in_features: 10,
        num_classes: 4,
        ..ModelConfig::default()
    };
    let err = Trainer::new(&graph, config, TrainingConfig::default(), &Device::Cpu);
    assert!(matches!(
        err,
        Err(Error::DimensionMismatch { what: "node features", expected: 10, got: 34 })
    ));

    let config = ModelConfig {
        num_classes: 2,
        ..ModelConfig::for_graph(&graph)
    };
    let err = Trainer::new(&graph, config, TrainingConfig::default(), &Device::Cpu);
    assert!(matches!(err, Err(Error::DimensionMismatch { what: "classes", .. })));
}
