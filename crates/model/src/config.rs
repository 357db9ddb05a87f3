use candle_core::{DType, Device};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Problems detected while validating an [`IanConfig`] or assembling the model.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("dimension mismatch: {expected_name} has width {expected} but {found_name} has width {found}")]
    DimensionMismatch {
        expected_name: String,
        expected: usize,
        found_name: String,
        found: usize,
    },
    #[error("at least one of word_level or char_level must be enabled")]
    NoInputLevel,
}

/// Parameter storage precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    #[default]
    F32,
    F16,
    Bf16,
}

impl Precision {
    pub fn dtype(self) -> DType {
        match self {
            Precision::F32 => DType::F32,
            Precision::F16 => DType::F16,
            Precision::Bf16 => DType::BF16,
        }
    }
}

/// Hyper-parameters of the attention-fusion matcher.
///
/// Embedding sizes left at `0` are taken from the pre-trained matrix passed
/// to [`crate::Ian::new`]; without a matrix they must be set explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IanConfig {
    /// Sequence length the data pipeline pads or truncates to.
    pub max_len: usize,
    pub word_level: bool,
    pub char_level: bool,
    pub word_vocab_size: usize,
    pub word_embedding_dim: usize,
    pub word_trainable: bool,
    pub char_vocab_size: usize,
    pub char_embedding_dim: usize,
    pub char_trainable: bool,
    /// Per-direction state width of the context encoder.
    pub hidden_size: usize,
    /// Width of the cross-sentence fusion projection.
    pub fusion_dim: usize,
    /// Per-direction state width of the second-pass encoder.
    pub second_hidden_size: usize,
    pub gru_dropout: f32,
    pub recurrent_dropout: f32,
    pub head_dropout: f32,
    /// Hidden tanh layers of the classification head, in order.
    pub dense_units: Vec<usize>,
    /// Mask `pad_id` positions out of sentence-vector attention.
    pub mask_padding: bool,
    pub pad_id: u32,
    /// Seeds the dropout masks of every layer. Parameter initialisation draws
    /// from the device RNG instead, which stays unseeded on CPU.
    pub seed: u64,
    pub precision: Precision,
    #[serde(skip, default = "default_device")]
    pub device: Device,
}

fn default_device() -> Device {
    Device::Cpu
}

impl Default for IanConfig {
    fn default() -> Self {
        Self {
            max_len: 43,
            word_level: true,
            char_level: false,
            word_vocab_size: 0,
            word_embedding_dim: 0,
            word_trainable: false,
            char_vocab_size: 0,
            char_embedding_dim: 0,
            char_trainable: false,
            hidden_size: 300,
            fusion_dim: 600,
            second_hidden_size: 300,
            gru_dropout: 0.2,
            recurrent_dropout: 0.0,
            head_dropout: 0.2,
            dense_units: vec![512, 256],
            mask_padding: false,
            pad_id: 0,
            seed: 42,
            precision: Precision::F32,
            device: default_device(),
        }
    }
}

impl IanConfig {
    /// Context encoder output width (both directions).
    pub fn encoded_dim(&self) -> usize {
        2 * self.hidden_size
    }

    /// Width of `concat(second_pass, fused)` fed to pooling.
    pub fn compare_dim(&self) -> usize {
        2 * self.second_hidden_size + self.fusion_dim
    }

    /// Pooled representation width per sentence (mean + max).
    pub fn pooled_dim(&self) -> usize {
        2 * self.compare_dim()
    }

    /// Width of `[rep1, rep2, rep1 * rep2, rep1 - rep2]`.
    pub fn head_input_dim(&self) -> usize {
        4 * self.pooled_dim()
    }

    /// Validate structural invariants before any parameter is allocated.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.word_level && !self.char_level {
            return Err(ConfigError::NoInputLevel);
        }
        for (field, value) in [
            ("max_len", self.max_len),
            ("hidden_size", self.hidden_size),
            ("fusion_dim", self.fusion_dim),
            ("second_hidden_size", self.second_hidden_size),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "must be greater than zero".into(),
                });
            }
        }
        for (field, p) in [
            ("gru_dropout", self.gru_dropout),
            ("recurrent_dropout", self.recurrent_dropout),
            ("head_dropout", self.head_dropout),
        ] {
            if !(0.0..1.0).contains(&p) {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: format!("must be in [0, 1), got {p}"),
                });
            }
        }
        if self.dense_units.iter().any(|&units| units == 0) {
            return Err(ConfigError::InvalidValue {
                field: "dense_units",
                reason: format!("entries must be non-zero, got {:?}", self.dense_units),
            });
        }
        Ok(())
    }
}

/// Fails with [`ConfigError::DimensionMismatch`] unless `expected == found`.
pub fn expect_width(
    expected_name: &str,
    expected: usize,
    found_name: &str,
    found: usize,
) -> Result<(), ConfigError> {
    if expected == found {
        Ok(())
    } else {
        Err(ConfigError::DimensionMismatch {
            expected_name: expected_name.to_string(),
            expected,
            found_name: found_name.to_string(),
            found,
        })
    }
}
