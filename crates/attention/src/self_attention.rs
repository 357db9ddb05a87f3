//! Parameter-free self-attention over one sequence.
//!
//! `weights = softmax(x · xᵀ)` over the key axis, `context = weights · x`.
//! Weights are `[batch, seq_len, seq_len]` and the context keeps the input
//! shape.

use candle_core::Tensor;
use layers::{ops, PrecisionPolicy};

use crate::core::{
    errors::invalid_shape, resolve_mask, Attention, AttentionError, AttentionOutput, Config,
};

/// Dot-product self-attention without projections or scaling.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelfAttention;

impl Attention for SelfAttention {
    fn attend(
        &self,
        sequence: &Tensor,
        mask: Option<&Tensor>,
        config: &Config,
        policy: &PrecisionPolicy,
    ) -> Result<AttentionOutput, AttentionError> {
        let (batch, seq_len, _) = sequence.dims3().map_err(|_| {
            invalid_shape("self-attention input must have shape [batch, seq_len, hidden]")
        })?;
        if seq_len == 0 {
            return Err(invalid_shape("self-attention requires a non-empty sequence"));
        }

        let work = policy.cast_for_reduction(sequence)?;
        let mut scores = ops::batch_dot(&work, &work.transpose(1, 2)?)?;
        if let Some(mask) = resolve_mask(mask, config, batch, seq_len, policy.reduction())? {
            scores = scores.broadcast_add(&mask.unsqueeze(1)?)?;
        }
        let weights = policy.cast_to_storage(&ops::softmax_over_axis(&scores, 2)?)?;
        let context = ops::batch_dot(&weights, sequence)?;
        Ok(AttentionOutput { weights, context })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn every_row_is_a_distribution() -> candle_core::Result<()> {
        let device = Device::Cpu;
        let sequence = Tensor::randn(0f32, 1.0, (2, 7, 3), &device)?;
        let out = SelfAttention
            .attend(&sequence, None, &Config::default(), &PrecisionPolicy::default())
            .map_err(|e| candle_core::Error::Msg(e.to_string()))?;
        assert_eq!(out.weights.dims(), &[2, 7, 7]);
        assert_eq!(out.context.dims(), &[2, 7, 3]);
        let sums = out.weights.sum(2)?.flatten_all()?.to_vec1::<f32>()?;
        assert!(sums.iter().all(|s| (s - 1.0).abs() < 1e-5));
        Ok(())
    }
}
