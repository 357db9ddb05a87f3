//! Training, evaluation and ensembling around the [`model::Ian`] matcher.

pub mod config;
pub mod data;
pub mod ensemble;
pub mod loss;
pub mod metrics;
pub mod report;
pub mod trainer;

pub use config::{
    DataConfig, DeviceChoice, OptimizerConfig, RuntimeConfig, TrainingConfig, TrainingError,
};
pub use data::{LabeledBatch, PairDataset, PairExample};
pub use ensemble::{geometric_fusion, majority_vote, EnsembleConfig, EnsembleError};
pub use loss::{BinaryCrossEntropy, LossMetrics, LossOutput};
pub use metrics::{prf, threshold_scores, PrfReport};
pub use report::{format_report, print_metrics};
pub use trainer::{EpochSummary, EvaluationSummary, Trainer};
