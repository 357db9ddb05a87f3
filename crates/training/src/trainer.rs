use std::path::Path;

use candle_core::{
    utils::{cuda_is_available, metal_is_available},
    DType, Device, Tensor,
};
use candle_nn::{AdamW, Optimizer, ParamsAdamW};
use indicatif::{ProgressBar, ProgressStyle};
use model::{EmbeddingSources, Ian};
use rand::{rngs::StdRng, SeedableRng};

use crate::{
    config::DeviceChoice,
    data::PairDataset,
    loss::{BinaryCrossEntropy, LossOutput},
    metrics::{prf, threshold_scores, ExponentialMovingAverage, PrfReport},
    report::print_metrics,
    TrainingConfig, TrainingError,
};

const LOSS_EMA_ALPHA: f64 = 0.1;

/// Loss and classification report over one labelled dataset.
#[derive(Debug, Clone)]
pub struct EvaluationSummary {
    pub loss: f32,
    pub report: PrfReport,
    pub examples: usize,
}

#[derive(Debug, Clone)]
pub struct EpochSummary {
    pub epoch: usize,
    /// Example-weighted mean training loss over the batches that ran.
    pub train_loss: f32,
    pub batches: usize,
    pub validation: Option<EvaluationSummary>,
}

/// Owns the model, the optimizer and the datasets for one training run.
pub struct Trainer {
    config: TrainingConfig,
    device: Device,
    model: Ian,
    optimizer: AdamW,
    loss: BinaryCrossEntropy,
    train_data: PairDataset,
    validation: Option<PairDataset>,
    rng: StdRng,
    loss_ema: ExponentialMovingAverage,
    epochs_completed: usize,
}

impl Trainer {
    /// Selects the device, reads embeddings and datasets named by `config`, and builds the model.
    pub fn new(config: TrainingConfig) -> Result<Self, TrainingError> {
        config.validate()?;
        let device = select_device(&config.runtime.device, config.runtime.seed);

        let sources = EmbeddingSources {
            word: load_matrix(config.data.word_embeddings.as_deref(), &device)?,
            char: load_matrix(config.data.char_embeddings.as_deref(), &device)?,
        };

        let max_len = config.model.max_len;
        let pad_id = config.model.pad_id;
        let train_data = PairDataset::from_csv(&config.data.train, max_len, pad_id)?;
        let validation = config
            .data
            .validation
            .as_ref()
            .map(|path| PairDataset::from_csv(path, max_len, pad_id))
            .transpose()?;

        Self::from_parts(config, device, sources, train_data, validation)
    }

    /// Builds a trainer around datasets that are already in memory.
    pub fn from_parts(
        mut config: TrainingConfig,
        device: Device,
        sources: EmbeddingSources,
        train_data: PairDataset,
        validation: Option<PairDataset>,
    ) -> Result<Self, TrainingError> {
        config.validate()?;
        if train_data.is_empty() {
            return Err(TrainingError::initialization("training set is empty"));
        }
        if !train_data.is_labeled() {
            return Err(TrainingError::initialization(
                "every training example needs a label",
            ));
        }
        if let Some(validation) = &validation {
            if !validation.is_labeled() {
                return Err(TrainingError::initialization(
                    "every validation example needs a label",
                ));
            }
        }

        config.model.device = device.clone();
        let model = Ian::new(config.model.clone(), sources)?;

        let parameters = model.parameters();
        if parameters.is_empty() {
            return Err(TrainingError::initialization(
                "model produced no trainable parameters",
            ));
        }
        log::info!("optimizer will track {} tensor(s)", parameters.len());

        let opt = &config.optimizer;
        let optimizer = AdamW::new(
            parameters,
            ParamsAdamW {
                lr: opt.learning_rate,
                beta1: opt.beta1,
                beta2: opt.beta2,
                eps: opt.epsilon,
                weight_decay: opt.weight_decay,
            },
        )?;

        let rng = StdRng::seed_from_u64(config.runtime.seed);
        Ok(Self {
            config,
            device,
            model,
            optimizer,
            loss: BinaryCrossEntropy::new(),
            train_data,
            validation,
            rng,
            loss_ema: ExponentialMovingAverage::new(LOSS_EMA_ALPHA),
            epochs_completed: 0,
        })
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn model(&self) -> &Ian {
        &self.model
    }

    pub fn epochs_completed(&self) -> usize {
        self.epochs_completed
    }

    pub fn train(&mut self) -> Result<Vec<EpochSummary>, TrainingError> {
        self.train_with_shutdown(|| false)
    }

    /// Runs `runtime.epochs` epochs, checking `should_stop` before every batch.
    ///
    /// An interrupted epoch is still reported, without validation.
    pub fn train_with_shutdown<F>(&mut self, mut should_stop: F) -> Result<Vec<EpochSummary>, TrainingError>
    where
        F: FnMut() -> bool,
    {
        log::info!(
            "starting training on {:?}: {} pairs, batch size {}, {} epoch(s)",
            self.device,
            self.train_data.len(),
            self.config.data.batch_size,
            self.config.runtime.epochs
        );

        let mut summaries = Vec::new();
        for epoch in 1..=self.config.runtime.epochs {
            let (train_loss, batches, interrupted) = self.run_epoch(epoch, &mut should_stop)?;
            if interrupted {
                log::warn!("stop requested during epoch {epoch} after {batches} batch(es)");
                if batches > 0 {
                    summaries.push(EpochSummary {
                        epoch,
                        train_loss,
                        batches,
                        validation: None,
                    });
                }
                break;
            }
            self.epochs_completed = epoch;

            let validation = match &self.validation {
                Some(dataset) => {
                    let summary = self.evaluate(dataset)?;
                    print_metrics(
                        &summary.report,
                        epoch,
                        summary.loss,
                        "val",
                        self.config.runtime.save_dir.as_deref(),
                    )?;
                    Some(summary)
                }
                None => None,
            };
            log::info!("epoch {epoch}: train loss {train_loss:.4}");
            summaries.push(EpochSummary {
                epoch,
                train_loss,
                batches,
                validation,
            });
        }
        Ok(summaries)
    }

    fn run_epoch<F>(&mut self, epoch: usize, should_stop: &mut F) -> Result<(f32, usize, bool), TrainingError>
    where
        F: FnMut() -> bool,
    {
        let rng = if self.config.data.shuffle {
            Some(&mut self.rng)
        } else {
            None
        };
        let batches = self
            .train_data
            .batch_indices(self.config.data.batch_size, rng);
        let progress = self.progress_bar(batches.len(), epoch)?;

        let mut loss_sum = 0.0f64;
        let mut examples = 0usize;
        let mut completed = 0usize;
        let mut interrupted = false;
        for indices in &batches {
            if should_stop() {
                interrupted = true;
                break;
            }
            let batch = self.train_data.batch(indices, &self.device)?;
            let labels = batch
                .labels
                .ok_or_else(|| TrainingError::runtime("training batch is missing labels"))?;
            let scores = self.model.forward(&batch.pair, true)?;
            let LossOutput { loss, metrics } = self.loss.compute(&scores, &labels)?;
            if !metrics.value.is_finite() {
                return Err(TrainingError::runtime(format!(
                    "loss became non-finite in epoch {epoch} batch {}",
                    completed + 1
                )));
            }
            self.optimizer.backward_step(&loss)?;

            loss_sum += metrics.value as f64 * metrics.examples as f64;
            examples += metrics.examples;
            completed += 1;
            let smoothed = self.loss_ema.update(metrics.value as f64);
            progress.set_message(format!("loss {smoothed:.4}"));
            progress.inc(1);
        }
        progress.finish_and_clear();

        let mean = if examples == 0 {
            0.0
        } else {
            (loss_sum / examples as f64) as f32
        };
        Ok((mean, completed, interrupted))
    }

    fn progress_bar(&self, batches: usize, epoch: usize) -> Result<ProgressBar, TrainingError> {
        if !self.config.runtime.progress {
            return Ok(ProgressBar::hidden());
        }
        let style = ProgressStyle::with_template(
            "epoch {prefix} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}",
        )
        .map_err(|err| TrainingError::runtime(format!("invalid progress template: {err}")))?
        .progress_chars("=>-");
        let bar = ProgressBar::new(batches as u64);
        bar.set_style(style);
        bar.set_prefix(format!("{epoch}/{}", self.config.runtime.epochs));
        Ok(bar)
    }

    /// Mean loss and classification report of the current model on `dataset`.
    pub fn evaluate(&self, dataset: &PairDataset) -> Result<EvaluationSummary, TrainingError> {
        let labels = dataset
            .labels()
            .ok_or_else(|| TrainingError::runtime("evaluation requires a fully labelled dataset"))?;
        if labels.is_empty() {
            return Err(TrainingError::runtime("evaluation dataset is empty"));
        }

        let mut scores = Vec::with_capacity(dataset.len());
        let mut loss_sum = 0.0f64;
        for indices in dataset.batch_indices(self.config.data.batch_size, None) {
            let batch = dataset.batch(&indices, &self.device)?;
            let output = self.model.forward(&batch.pair, false)?;
            if let Some(targets) = &batch.labels {
                let LossOutput { metrics, .. } = self.loss.compute(&output, targets)?;
                loss_sum += metrics.value as f64 * metrics.examples as f64;
            }
            scores.extend(scores_to_vec(&output)?);
        }

        let predictions = threshold_scores(&scores, self.config.runtime.threshold);
        let report = prf(&labels, &predictions)?;
        Ok(EvaluationSummary {
            loss: (loss_sum / labels.len() as f64) as f32,
            report,
            examples: labels.len(),
        })
    }

    /// Match probabilities for every pair of `dataset`, in file order.
    pub fn predict(&self, dataset: &PairDataset) -> Result<Vec<f32>, TrainingError> {
        let mut scores = Vec::with_capacity(dataset.len());
        for indices in dataset.batch_indices(self.config.data.batch_size, None) {
            let batch = dataset.batch(&indices, &self.device)?;
            let output = self.model.forward(&batch.pair, false)?;
            scores.extend(scores_to_vec(&output)?);
        }
        Ok(scores)
    }

    /// Writes `qid1,qid2,score` rows for `dataset`; returns the row count.
    pub fn write_predictions(
        &self,
        dataset: &PairDataset,
        path: impl AsRef<Path>,
    ) -> Result<usize, TrainingError> {
        let path = path.as_ref();
        let scores = self.predict(dataset)?;
        let csv_err =
            |err: csv::Error| TrainingError::runtime(format!("{}: {err}", path.display()));

        if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
        writer
            .write_record(["qid1", "qid2", "score"])
            .map_err(csv_err)?;
        for (example, score) in dataset.examples().iter().zip(&scores) {
            let score = score.to_string();
            writer
                .write_record([example.qid1.as_str(), example.qid2.as_str(), score.as_str()])
                .map_err(csv_err)?;
        }
        writer.flush()?;
        log::info!("wrote {} prediction(s) to {}", scores.len(), path.display());
        Ok(scores.len())
    }
}

fn scores_to_vec(scores: &Tensor) -> Result<Vec<f32>, TrainingError> {
    Ok(scores.to_dtype(DType::F32)?.flatten_all()?.to_vec1::<f32>()?)
}

fn load_matrix(path: Option<&Path>, device: &Device) -> Result<Option<Tensor>, TrainingError> {
    let Some(path) = path else {
        return Ok(None);
    };
    let matrix = Tensor::read_npy(path).map_err(|err| {
        TrainingError::initialization(format!(
            "failed to read embedding matrix {}: {err}",
            path.display()
        ))
    })?;
    log::info!(
        "loaded embedding matrix {:?} from {}",
        matrix.dims(),
        path.display()
    );
    Ok(Some(matrix.to_device(device)?))
}

/// Resolves the configured device; unavailable accelerators fall back to CPU.
fn select_device(requested: &str, seed: u64) -> Device {
    let choice = DeviceChoice::parse(requested).unwrap_or(DeviceChoice::Cpu);
    let attempt = match choice {
        DeviceChoice::Cpu => Ok(Device::Cpu),
        DeviceChoice::Cuda(ordinal) => Device::new_cuda(ordinal),
        DeviceChoice::Metal(ordinal) => Device::new_metal(ordinal),
        DeviceChoice::Auto if cuda_is_available() => Device::new_cuda(0),
        DeviceChoice::Auto if metal_is_available() => Device::new_metal(0),
        DeviceChoice::Auto => Ok(Device::Cpu),
    };
    let device = attempt.unwrap_or_else(|err| {
        log::warn!("device '{requested}' unavailable, falling back to CPU: {err}");
        Device::Cpu
    });
    // Candle's CPU backend cannot be seeded, so CPU initialisation is not reproducible.
    if !device.is_cpu() {
        if let Err(err) = device.set_seed(seed) {
            log::warn!("failed to seed device RNG: {err}");
        }
    }
    device
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_is_always_selectable() {
        assert!(select_device("cpu", 1).is_cpu());
        assert!(select_device("not-a-device", 1).is_cpu());
    }
}
