//! Attention-fusion sentence-pair matching on candle.
//!
//! The workspace crates are re-exported under their own names; the most used
//! types are also available at the root.

pub use attention;
pub use embedding;
pub use layers;
pub use model;
pub use training;

pub use model::{EmbeddingSources, Ian, IanConfig, PairBatch};
pub use training::{
    geometric_fusion, majority_vote, prf, print_metrics, EnsembleConfig, PrfReport, Trainer,
    TrainingConfig,
};
