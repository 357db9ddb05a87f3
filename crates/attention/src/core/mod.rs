//! Core traits and types shared across attention implementations.
//!
//! Implementations operate on batch-first sequences shaped
//! `[batch, seq_len, hidden]`. Attention weights are probability
//! distributions over the key axis; scores are normalised in the reduction
//! dtype of the supplied [`PrecisionPolicy`] and cast back to storage.

pub mod config;
pub mod errors;

use candle_core::Tensor;
use layers::PrecisionPolicy;

pub use config::Config;
pub use errors::AttentionError;

/// Weights and attended values produced by one attention call.
#[derive(Debug, Clone)]
pub struct AttentionOutput {
    /// `[batch, seq_len]` for pooling attention, `[batch, q_len, k_len]` otherwise.
    pub weights: Tensor,
    /// `[batch, hidden]` for pooling attention, `[batch, q_len, hidden]` otherwise.
    pub context: Tensor,
}

/// Unified interface for attention over a single sequence.
///
/// * `sequence` is shaped `[batch, seq_len, hidden]`.
/// * `mask`, when present, is an additive `[batch, seq_len]` key mask
///   (see [`crate::masks`]); it is only applied when
///   [`Config::use_padding_mask`] is set.
pub trait Attention {
    fn attend(
        &self,
        sequence: &Tensor,
        mask: Option<&Tensor>,
        config: &Config,
        policy: &PrecisionPolicy,
    ) -> Result<AttentionOutput, AttentionError>;
}

/// Validates a `[batch, seq_len]` key mask against a sequence and returns the
/// additive mask in `dtype`, or `None` when masking is disabled.
///
/// Zero entries stay zero; every other entry becomes [`Config::mask_fill`].
pub(crate) fn resolve_mask(
    mask: Option<&Tensor>,
    config: &Config,
    batch: usize,
    seq_len: usize,
    dtype: candle_core::DType,
) -> Result<Option<Tensor>, AttentionError> {
    let mask = match (config.use_padding_mask, mask) {
        (true, Some(mask)) => mask,
        _ => return Ok(None),
    };
    let (mb, mk) = mask
        .dims2()
        .map_err(|_| errors::invalid_shape("mask must have shape [batch, seq_len]"))?;
    if mb != batch || mk != seq_len {
        return Err(errors::invalid_shape(format!(
            "mask shape mismatch: expected [{batch}, {seq_len}] got [{mb}, {mk}]"
        )));
    }
    let discarded = mask.to_dtype(candle_core::DType::F32)?.ne(0f32)?;
    let fill = discarded
        .to_dtype(dtype)?
        .affine(f64::from(config.mask_fill), 0.0)?;
    Ok(Some(fill))
}
