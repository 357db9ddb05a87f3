use anyhow::Result;
use candle_core::Device;
use model::{EmbeddingSources, IanConfig};
use training::{
    ensemble::read_scores, geometric_fusion, DataConfig, EnsembleConfig, OptimizerConfig,
    PairDataset, PairExample, RuntimeConfig, Trainer, TrainingConfig,
};

const MAX_LEN: usize = 4;

fn toy_config(epochs: usize) -> TrainingConfig {
    TrainingConfig {
        model: IanConfig {
            max_len: MAX_LEN,
            word_vocab_size: 6,
            word_embedding_dim: 4,
            word_trainable: true,
            hidden_size: 4,
            fusion_dim: 4,
            second_hidden_size: 4,
            gru_dropout: 0.0,
            head_dropout: 0.0,
            dense_units: vec![8],
            seed: 3,
            ..IanConfig::default()
        },
        data: DataConfig {
            train: "unused.csv".into(),
            validation: None,
            test: None,
            word_embeddings: None,
            char_embeddings: None,
            batch_size: 4,
            shuffle: true,
        },
        optimizer: OptimizerConfig {
            learning_rate: 1e-2,
            ..OptimizerConfig::default()
        },
        runtime: RuntimeConfig {
            epochs,
            progress: false,
            ..RuntimeConfig::default()
        },
    }
}

/// Pairs whose first sentence contains token 1 are matches.
fn separable_pairs(count: usize) -> Vec<PairExample> {
    (0..count)
        .map(|i| {
            let positive = i % 2 == 0;
            let first = if positive { 1 } else { 2 };
            PairExample {
                qid1: format!("a{i}"),
                qid2: format!("b{i}"),
                q1: vec![first, 3 + (i % 3) as u32],
                q2: vec![4, 5],
                label: Some(u8::from(positive)),
            }
        })
        .collect()
}

fn toy_trainer(epochs: usize, validation: bool) -> Result<Trainer> {
    let train = PairDataset::from_examples(separable_pairs(16), MAX_LEN, 0)?;
    let validation = if validation {
        Some(PairDataset::from_examples(separable_pairs(8), MAX_LEN, 0)?)
    } else {
        None
    };
    Ok(Trainer::from_parts(
        toy_config(epochs),
        Device::Cpu,
        EmbeddingSources::default(),
        train,
        validation,
    )?)
}

#[test]
fn loss_decreases_on_separable_pairs() -> Result<()> {
    let mut trainer = toy_trainer(30, false)?;
    let summaries = trainer.train()?;

    assert_eq!(summaries.len(), 30);
    assert_eq!(trainer.epochs_completed(), 30);
    let first = summaries[0].train_loss;
    let last = summaries[summaries.len() - 1].train_loss;
    assert!(last < first, "loss went from {first} to {last}");
    Ok(())
}

#[test]
fn validation_runs_every_epoch_and_writes_reports() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut config = toy_config(2);
    config.runtime.save_dir = Some(dir.path().to_path_buf());
    let mut trainer = Trainer::from_parts(
        config,
        Device::Cpu,
        EmbeddingSources::default(),
        PairDataset::from_examples(separable_pairs(8), MAX_LEN, 0)?,
        Some(PairDataset::from_examples(separable_pairs(4), MAX_LEN, 0)?),
    )?;

    let summaries = trainer.train()?;
    for summary in &summaries {
        let validation = summary.validation.as_ref().expect("validation summary");
        assert_eq!(validation.examples, 4);
        assert_eq!(validation.report.matrix[2][2], 4);
        assert!(validation.loss.is_finite());
    }
    let log = std::fs::read_to_string(dir.path().join("val_logs.log"))?;
    assert_eq!(log.matches("val_loss").count(), 2);
    Ok(())
}

#[test]
fn stop_request_ends_training_before_the_next_batch() -> Result<()> {
    let mut trainer = toy_trainer(5, true)?;
    let mut calls = 0;
    let summaries = trainer.train_with_shutdown(|| {
        calls += 1;
        calls > 2
    })?;

    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].batches, 2);
    assert!(summaries[0].validation.is_none());
    assert_eq!(trainer.epochs_completed(), 0);
    Ok(())
}

#[test]
fn unlabeled_training_data_is_rejected() -> Result<()> {
    let mut pairs = separable_pairs(4);
    pairs[1].label = None;
    let result = Trainer::from_parts(
        toy_config(1),
        Device::Cpu,
        EmbeddingSources::default(),
        PairDataset::from_examples(pairs, MAX_LEN, 0)?,
        None,
    );
    assert!(result.is_err());
    Ok(())
}

#[test]
fn exported_predictions_feed_the_ensemble() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let trainer = toy_trainer(1, false)?;
    let test = PairDataset::from_examples(separable_pairs(6), MAX_LEN, 0)?;

    let first = dir.path().join("run1.csv");
    let second = dir.path().join("run2.csv");
    assert_eq!(trainer.write_predictions(&test, &first)?, 6);
    trainer.write_predictions(&test, &second)?;

    let scores = read_scores(&first)?;
    assert_eq!(scores.ids[0], ("a0".to_string(), "b0".to_string()));
    assert!(scores.scores.iter().all(|s| (0.0..=1.0).contains(s)));

    let output = dir.path().join("fused.csv");
    let labels = geometric_fusion(&EnsembleConfig::new(vec![first, second], &output))?;
    assert_eq!(labels.len(), 6);
    assert!(output.exists());
    Ok(())
}
