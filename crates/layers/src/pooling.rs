//! Global pooling over the sequence axis.
//!
//! Inputs are `(batch, seq, features)`. Each [`PoolKind`] reduces the seq
//! axis to `(batch, features)`; [`MultiPooling`] concatenates several
//! reductions so the output width is `kinds.len() * features`, independent of
//! the sequence length.

use candle_core::{Result, Tensor};

use crate::{checks, dtypes::PrecisionPolicy, LayerError};

/// Sequence-axis reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    /// Arithmetic mean over positions.
    Mean,
    /// Elementwise maximum over positions.
    Max,
}

impl PoolKind {
    /// Reduces `(batch, seq, features)` to `(batch, features)`.
    pub fn apply(self, sequence: &Tensor, policy: &PrecisionPolicy) -> Result<Tensor> {
        checks::non_empty_sequence("pooling.input", sequence)?;
        let promoted = policy.cast_for_reduction(sequence)?;
        let reduced = match self {
            PoolKind::Mean => promoted.mean(1)?,
            PoolKind::Max => promoted.max(1)?,
        };
        policy.cast_to_storage(&reduced)
    }
}

/// Applies several poolings to one sequence and concatenates the results.
#[derive(Debug, Clone)]
pub struct MultiPooling {
    kinds: Vec<PoolKind>,
}

impl MultiPooling {
    /// Builds an aggregator; at least two reductions are required.
    pub fn new(kinds: Vec<PoolKind>) -> std::result::Result<Self, LayerError> {
        if kinds.len() < 2 {
            return Err(LayerError::InvalidConfig(format!(
                "multi-pooling needs more than one pooling layer, got {}",
                kinds.len()
            )));
        }
        Ok(Self { kinds })
    }

    /// Mean then max, the aggregator used by the matching head.
    pub fn mean_max() -> Self {
        Self {
            kinds: vec![PoolKind::Mean, PoolKind::Max],
        }
    }

    /// Output width for an input with `features` channels.
    pub fn output_dim(&self, features: usize) -> usize {
        self.kinds.len() * features
    }

    /// `(batch, seq, features)` -> `(batch, kinds.len() * features)`.
    pub fn forward(&self, sequence: &Tensor, policy: &PrecisionPolicy) -> Result<Tensor> {
        let pooled = self
            .kinds
            .iter()
            .map(|kind| kind.apply(sequence, policy))
            .collect::<Result<Vec<_>>>()?;
        Tensor::cat(&pooled, 1)
    }
}
