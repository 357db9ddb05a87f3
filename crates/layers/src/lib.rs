//! Building blocks for the sentence-pair matching network.
//!
//! Everything here is assembled from Candle primitives: dense projections,
//! activations, dropout, the bidirectional GRU encoder, sequence pooling and
//! the small set of named tensor ops the attention stages are written in.
//! Tensors follow the `(batch, seq, features)` convention throughout.

use thiserror::Error;

pub mod activations;
pub mod checks;
pub mod dropout;
pub mod dtypes;
pub mod linear;
pub mod ops;
pub mod pooling;
pub mod recurrent;

pub use activations::{builtin, Activation, ActivationKind};
pub use dropout::Dropout;
pub use dtypes::PrecisionPolicy;
pub use linear::{Dense, Linear, LinearConfig, LinearInit, LinearLayer};
pub use pooling::{MultiPooling, PoolKind};
pub use recurrent::{BiGru, GruCell, GruConfig};

/// Errors raised while assembling layers.
#[derive(Debug, Error)]
pub enum LayerError {
    /// Hyper-parameters that cannot describe a working layer.
    #[error("invalid layer configuration: {0}")]
    InvalidConfig(String),
    /// Failure from the tensor backend while creating parameters.
    #[error(transparent)]
    Candle(#[from] candle_core::Error),
}

impl From<LayerError> for candle_core::Error {
    fn from(value: LayerError) -> Self {
        match value {
            LayerError::Candle(err) => err,
            other => candle_core::Error::Msg(other.to_string()),
        }
    }
}
