//! Sentence-pair matching model.
//!
//! [`Ian`] embeds both sentences, encodes them with one shared bidirectional
//! GRU, pools each into a sentence vector, fuses each vector into the other
//! sentence, runs a shared second-pass GRU, aggregates with mean and max
//! pooling and scores the pair with [`head::ComparisonHead`].

pub mod config;
pub mod head;
pub mod model;

use attention::AttentionError;
use layers::LayerError;
use thiserror::Error;

pub use config::{ConfigError, IanConfig, Precision};
pub use head::ComparisonHead;
pub use model::{EmbeddingSources, Ian, PairBatch};

/// Failures raised while assembling or running the model.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Layer(#[from] LayerError),
    #[error(transparent)]
    Attention(#[from] AttentionError),
    #[error("invalid input: {0}")]
    Input(String),
    #[error(transparent)]
    Candle(#[from] candle_core::Error),
}
