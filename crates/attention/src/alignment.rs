//! Soft alignment between two sequences.
//!
//! With `e = a · bᵀ` (`[batch, len_a, len_b]`), every position of `a` is
//! re-expressed as a weighted sum of `b` (softmax over `len_b`) and every
//! position of `b` as a weighted sum of `a` (softmax over `len_a`).

use candle_core::Tensor;
use layers::{ops, PrecisionPolicy};

use crate::core::{errors::invalid_shape, resolve_mask, AttentionError, Config};

/// Result of [`soft_align`].
#[derive(Debug, Clone)]
pub struct Alignment {
    /// `a` described by `b`: `[batch, len_a, hidden]`.
    pub aligned_a: Tensor,
    /// `b` described by `a`: `[batch, len_b, hidden]`.
    pub aligned_b: Tensor,
    /// `[batch, len_a, len_b]`, rows sum to one.
    pub weights_a: Tensor,
    /// `[batch, len_b, len_a]`, rows sum to one.
    pub weights_b: Tensor,
}

/// Aligns `a` and `b`; the key masks apply to the sequence being attended over.
pub fn soft_align(
    a: &Tensor,
    b: &Tensor,
    mask_a: Option<&Tensor>,
    mask_b: Option<&Tensor>,
    config: &Config,
    policy: &PrecisionPolicy,
) -> Result<Alignment, AttentionError> {
    let (batch, len_a, hidden) = a
        .dims3()
        .map_err(|_| invalid_shape("alignment input a must have shape [batch, len_a, hidden]"))?;
    let (bb, len_b, bh) = b
        .dims3()
        .map_err(|_| invalid_shape("alignment input b must have shape [batch, len_b, hidden]"))?;
    if bb != batch || bh != hidden {
        return Err(invalid_shape(format!(
            "alignment inputs disagree: a is [{batch}, {len_a}, {hidden}], b is [{bb}, {len_b}, {bh}]"
        )));
    }

    let a_work = policy.cast_for_reduction(a)?;
    let b_work = policy.cast_for_reduction(b)?;
    let energy = ops::batch_dot(&a_work, &b_work.transpose(1, 2)?)?;
    let mut energy_t = energy.transpose(1, 2)?.contiguous()?;
    let mut energy = energy;

    if let Some(mask) = resolve_mask(mask_b, config, batch, len_b, policy.reduction())? {
        energy = energy.broadcast_add(&mask.unsqueeze(1)?)?;
    }
    if let Some(mask) = resolve_mask(mask_a, config, batch, len_a, policy.reduction())? {
        energy_t = energy_t.broadcast_add(&mask.unsqueeze(1)?)?;
    }

    let weights_a = policy.cast_to_storage(&ops::softmax_over_axis(&energy, 2)?)?;
    let weights_b = policy.cast_to_storage(&ops::softmax_over_axis(&energy_t, 2)?)?;
    Ok(Alignment {
        aligned_a: ops::batch_dot(&weights_a, b)?,
        aligned_b: ops::batch_dot(&weights_b, a)?,
        weights_a,
        weights_b,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn alignment_shapes_follow_the_other_sequence() -> candle_core::Result<()> {
        let device = Device::Cpu;
        let a = Tensor::randn(0f32, 1.0, (2, 4, 3), &device)?;
        let b = Tensor::randn(0f32, 1.0, (2, 6, 3), &device)?;
        let out = soft_align(&a, &b, None, None, &Config::default(), &PrecisionPolicy::default())
            .map_err(|e| candle_core::Error::Msg(e.to_string()))?;
        assert_eq!(out.aligned_a.dims(), &[2, 4, 3]);
        assert_eq!(out.aligned_b.dims(), &[2, 6, 3]);
        assert_eq!(out.weights_a.dims(), &[2, 4, 6]);
        let sums = out.weights_b.sum(2)?.flatten_all()?.to_vec1::<f32>()?;
        assert!(sums.iter().all(|s| (s - 1.0).abs() < 1e-5));
        Ok(())
    }

    #[test]
    fn mismatched_hidden_is_rejected() -> candle_core::Result<()> {
        let device = Device::Cpu;
        let a = Tensor::zeros((1, 2, 3), candle_core::DType::F32, &device)?;
        let b = Tensor::zeros((1, 2, 4), candle_core::DType::F32, &device)?;
        assert!(soft_align(&a, &b, None, None, &Config::default(), &PrecisionPolicy::default()).is_err());
        Ok(())
    }
}
