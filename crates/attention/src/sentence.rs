//! Sentence-vector attention.
//!
//! Collapses `[batch, seq_len, hidden]` into one `[batch, hidden]` vector per
//! sentence: a learned `hidden -> 1` projection scores every position, the
//! scores are normalised with a softmax over the sequence axis, and the
//! sequence is summed under those weights.

use candle_core::{DType, Device, Tensor, Var};
use layers::{
    linear::{Linear, LinearConfig, LinearInit, LinearLayer},
    ops, PrecisionPolicy,
};

use crate::core::{
    errors::invalid_shape, resolve_mask, Attention, AttentionError, AttentionOutput, Config,
};

/// Learned pooling attention producing a sentence vector.
#[derive(Debug, Clone)]
pub struct SentenceVectorAttention {
    hidden_dim: usize,
    scorer: Linear,
}

impl SentenceVectorAttention {
    pub fn new(hidden_dim: usize, device: &Device, dtype: DType) -> Result<Self, AttentionError> {
        if hidden_dim == 0 {
            return Err(invalid_shape("sentence attention requires hidden_dim > 0"));
        }
        let scorer = Linear::with_init(
            LinearConfig::new(hidden_dim, 1),
            &LinearInit::XavierUniform,
            device,
            dtype,
        )?;
        Ok(Self { hidden_dim, scorer })
    }

    /// Direct access to the scoring projection.
    pub fn scorer(&self) -> &Linear {
        &self.scorer
    }

    pub fn named_parameters(&self, scope: &str) -> Vec<(String, Var)> {
        self.scorer.named_parameters(&format!("{scope}.scorer"))
    }
}

impl Attention for SentenceVectorAttention {
    fn attend(
        &self,
        sequence: &Tensor,
        mask: Option<&Tensor>,
        config: &Config,
        policy: &PrecisionPolicy,
    ) -> Result<AttentionOutput, AttentionError> {
        let (batch, seq_len, hidden) = sequence.dims3().map_err(|_| {
            invalid_shape("sentence attention input must have shape [batch, seq_len, hidden]")
        })?;
        if hidden != self.hidden_dim {
            return Err(invalid_shape(format!(
                "sentence attention expected hidden {} but received {hidden}",
                self.hidden_dim
            )));
        }
        if batch == 0 || seq_len == 0 {
            return Err(invalid_shape(
                "sentence attention requires non-empty batch and sequence",
            ));
        }

        // [batch, seq_len, 1]
        let mut scores = policy.cast_for_reduction(&self.scorer.forward(sequence, policy)?)?;
        if let Some(mask) = resolve_mask(mask, config, batch, seq_len, policy.reduction())? {
            scores = scores.broadcast_add(&mask.unsqueeze(2)?)?;
        }
        let weights = ops::squeeze_last_axis(&ops::softmax_over_axis(&scores, 1)?)?;
        let weights = policy.cast_to_storage(&weights)?;

        let context = ops::batch_dot(&weights.unsqueeze(1)?, sequence)?.squeeze(1)?;
        Ok(AttentionOutput { weights, context })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::masks::padding_mask_from_lengths;

    fn to_candle(err: AttentionError) -> candle_core::Error {
        candle_core::Error::Msg(err.to_string())
    }

    #[test]
    fn weights_are_distributions_and_width_is_stable() -> candle_core::Result<()> {
        let device = Device::Cpu;
        let attention = SentenceVectorAttention::new(6, &device, DType::F32).map_err(to_candle)?;
        for seq_len in [1usize, 5, 43] {
            let sequence = Tensor::randn(0f32, 1.0, (3, seq_len, 6), &device)?;
            let out = attention
                .attend(&sequence, None, &Config::default(), &PrecisionPolicy::default())
                .map_err(to_candle)?;
            assert_eq!(out.context.dims(), &[3, 6]);
            assert_eq!(out.weights.dims(), &[3, seq_len]);
            let sums = out.weights.sum(1)?.to_vec1::<f32>()?;
            assert!(sums.iter().all(|s| (s - 1.0).abs() < 1e-6));
            assert!(out.weights.min_all()?.to_vec0::<f32>()? >= 0.0);
        }
        Ok(())
    }

    #[test]
    fn constant_scores_average_the_sequence() -> candle_core::Result<()> {
        let device = Device::Cpu;
        let attention = SentenceVectorAttention::new(2, &device, DType::F32).map_err(to_candle)?;
        attention
            .scorer()
            .copy_weight_from(&Tensor::zeros((1, 2), DType::F32, &device)?)?;
        let sequence = Tensor::from_slice(&[1f32, 2.0, 3.0, 4.0], (1, 2, 2), &device)?;
        let out = attention
            .attend(&sequence, None, &Config::default(), &PrecisionPolicy::default())
            .map_err(to_candle)?;
        assert_eq!(out.context.to_vec2::<f32>()?, vec![vec![2.0, 3.0]]);
        Ok(())
    }

    #[test]
    fn mask_removes_padding_mass_only_when_enabled() -> candle_core::Result<()> {
        let device = Device::Cpu;
        let attention = SentenceVectorAttention::new(4, &device, DType::F32).map_err(to_candle)?;
        let sequence = Tensor::randn(0f32, 1.0, (2, 5, 4), &device)?;
        let mask = padding_mask_from_lengths(&device, &[3, 5], 5)?;
        let policy = PrecisionPolicy::default();

        let masked = attention
            .attend(&sequence, Some(&mask), &Config::masked(), &policy)
            .map_err(to_candle)?;
        let padded_mass = masked.weights.get(0)?.narrow(0, 3, 2)?.sum_all()?.to_vec0::<f32>()?;
        assert!(padded_mass < 1e-6);

        let ignored = attention
            .attend(&sequence, Some(&mask), &Config::default(), &policy)
            .map_err(to_candle)?;
        let padded_mass = ignored.weights.get(0)?.narrow(0, 3, 2)?.sum_all()?.to_vec0::<f32>()?;
        assert!(padded_mass > 0.0);
        Ok(())
    }

    #[test]
    fn mask_fill_sets_the_discard_score() -> candle_core::Result<()> {
        let device = Device::Cpu;
        let attention = SentenceVectorAttention::new(4, &device, DType::F32).map_err(to_candle)?;
        let sequence = Tensor::randn(0f32, 1.0, (2, 5, 4), &device)?;
        let mask = padding_mask_from_lengths(&device, &[3, 5], 5)?;
        let policy = PrecisionPolicy::default();

        let zero_fill = Config {
            use_padding_mask: true,
            mask_fill: 0.0,
        };
        let kept = attention
            .attend(&sequence, Some(&mask), &zero_fill, &policy)
            .map_err(to_candle)?;
        let unmasked = attention
            .attend(&sequence, None, &Config::default(), &policy)
            .map_err(to_candle)?;
        let gap = kept.weights.sub(&unmasked.weights)?.abs()?.max_all()?.to_vec0::<f32>()?;
        assert!(gap < 1e-6);
        let padded_mass = kept.weights.get(0)?.narrow(0, 3, 2)?.sum_all()?.to_vec0::<f32>()?;
        assert!(padded_mass > 0.0);

        // Any non-zero entry counts as discarded, whatever its magnitude.
        let marks = Tensor::from_slice(&[0f32, 0.0, 0.0, 1.0, 1.0], (1, 5), &device)?;
        let marks = marks.broadcast_as((2, 5))?.contiguous()?;
        let custom = Config {
            use_padding_mask: true,
            mask_fill: -1e4,
        };
        let dropped = attention
            .attend(&sequence, Some(&marks), &custom, &policy)
            .map_err(to_candle)?;
        let padded_mass = dropped.weights.narrow(1, 3, 2)?.sum_all()?.to_vec0::<f32>()?;
        assert!(padded_mass < 1e-6);
        Ok(())
    }

    #[test]
    fn rejects_wrong_width() -> candle_core::Result<()> {
        let device = Device::Cpu;
        let attention = SentenceVectorAttention::new(4, &device, DType::F32).map_err(to_candle)?;
        let sequence = Tensor::zeros((1, 3, 5), DType::F32, &device)?;
        let err = attention
            .attend(&sequence, None, &Config::default(), &PrecisionPolicy::default())
            .unwrap_err();
        assert!(matches!(err, AttentionError::InvalidShape { .. }));
        Ok(())
    }
}
