use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use clap::Parser;
use serde_json::{Map, Value};
use training::{print_metrics, PairDataset, Trainer, TrainingConfig, TrainingError};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = run() {
        eprintln!("training failed: {}", err);
        std::process::exit(1);
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Train the IAN sentence-pair matcher", long_about = None)]
struct Args {
    #[arg(
        short,
        long,
        value_name = "PATH",
        help = "Path to a TOML or JSON training config"
    )]
    config: PathBuf,

    #[arg(
        long = "override",
        value_name = "KEY=VALUE",
        value_parser = parse_override,
        help = "Replace a config field by dotted key, e.g. model.hidden_size=128"
    )]
    overrides: Vec<(String, Value)>,

    #[arg(
        long,
        value_name = "PATH",
        help = "After training, write qid1,qid2,score predictions for data.test to PATH"
    )]
    predict: Option<PathBuf>,
}

/// Splits `section.field=value`; the value is read as JSON when it parses, else as a string.
fn parse_override(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() || key.split('.').any(str::is_empty) {
        return Err(format!("malformed config key '{key}'"));
    }
    let value = value.trim();
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn run() -> Result<(), TrainingError> {
    let args = Args::parse();

    let mut config = TrainingConfig::load(&args.config)?;
    if !args.overrides.is_empty() {
        config = apply_overrides(config, &args.overrides)?;
    }
    config.validate()?;

    let test_path = match (&args.predict, &config.data.test) {
        (Some(_), None) => {
            return Err(TrainingError::initialization(
                "--predict requires data.test in the config",
            ))
        }
        (_, test) => test.clone(),
    };

    let mut trainer = Trainer::new(config)?;

    let shutdown_flag = Arc::new(AtomicBool::new(false));
    let handler_flag = shutdown_flag.clone();
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::Relaxed);
    })
    .map_err(|err| TrainingError::runtime(format!("failed to install signal handler: {err}")))?;

    let summaries = trainer.train_with_shutdown(|| shutdown_flag.load(Ordering::Relaxed))?;
    if let Some(last) = summaries.last() {
        log::info!(
            "finished after {} epoch(s), last train loss {:.4}",
            trainer.epochs_completed(),
            last.train_loss
        );
    }

    let Some(test_path) = test_path else {
        return Ok(());
    };
    let model_config = &trainer.config().model;
    let test = PairDataset::from_csv(&test_path, model_config.max_len, model_config.pad_id)?;
    if test.is_labeled() {
        let summary = trainer.evaluate(&test)?;
        print_metrics(
            &summary.report,
            trainer.epochs_completed(),
            summary.loss,
            "test",
            trainer.config().runtime.save_dir.as_deref(),
        )?;
    }
    if let Some(output) = &args.predict {
        trainer.write_predictions(&test, output)?;
    }

    Ok(())
}

/// Round-trips the config through JSON so any field can be replaced by key.
fn apply_overrides(
    config: TrainingConfig,
    overrides: &[(String, Value)],
) -> Result<TrainingConfig, TrainingError> {
    let mut tree = serde_json::to_value(config)
        .map_err(|err| TrainingError::runtime(format!("config is not serialisable: {err}")))?;
    for (key, value) in overrides {
        let mut node = &mut tree;
        for field in key.split('.') {
            if node.is_null() {
                *node = Value::Object(Map::new());
            }
            node = node
                .as_object_mut()
                .ok_or_else(|| {
                    TrainingError::runtime(format!("override {key}: '{field}' is inside a scalar"))
                })?
                .entry(field)
                .or_insert(Value::Null);
        }
        log::info!("config override {key} = {value}");
        *node = value.clone();
    }
    serde_json::from_value(tree)
        .map_err(|err| TrainingError::runtime(format!("overridden config is invalid: {err}")))
}
