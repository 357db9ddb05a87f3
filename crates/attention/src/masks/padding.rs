//! Builders for padding masks used to drop padded keys.
//!
//! All padding masks share the dtype and layout described in
//! [`super::MASK_DTYPE`](super::MASK_DTYPE).

use candle_core::{bail, DType, Device, Result, Tensor};

use super::{MASK_DTYPE, MASK_FILL};

/// Construct padding masks from per-batch valid key lengths.
pub fn padding_mask_from_lengths(
    device: &Device,
    key_lengths: &[usize],
    seq_len: usize,
) -> Result<Tensor> {
    let batch = key_lengths.len();
    let mut data = vec![0f32; batch * seq_len];
    for (b, &valid) in key_lengths.iter().enumerate() {
        let row = &mut data[b * seq_len..(b + 1) * seq_len];
        for value in row.iter_mut().skip(valid.min(seq_len)) {
            *value = MASK_FILL;
        }
    }
    Tensor::from_vec(data, (batch, seq_len), device)
}

/// Construct padding masks from `[batch, seq_len]` token ids.
///
/// Positions holding `pad_id` are discarded.
pub fn padding_mask_from_ids(token_ids: &Tensor, pad_id: u32) -> Result<Tensor> {
    if token_ids.rank() != 2 {
        bail!(
            "padding mask expects ids shaped [batch, seq_len], got {:?}",
            token_ids.dims()
        );
    }
    if !token_ids.dtype().is_int() {
        bail!(
            "padding mask expects integer ids, got {:?}",
            token_ids.dtype()
        );
    }
    let ids = token_ids.to_dtype(DType::I64)?;
    let is_pad = ids.eq(pad_id as i64)?.to_dtype(MASK_DTYPE)?;
    is_pad.affine(MASK_FILL as f64, 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lengths_mask_trailing_positions() -> Result<()> {
        let mask = padding_mask_from_lengths(&Device::Cpu, &[2, 4, 0], 3)?;
        let rows = mask.to_vec2::<f32>()?;
        assert_eq!(rows[0], vec![0.0, 0.0, MASK_FILL]);
        assert_eq!(rows[1], vec![0.0, 0.0, 0.0]);
        assert_eq!(rows[2], vec![MASK_FILL; 3]);
        Ok(())
    }

    #[test]
    fn ids_mask_marks_pad_tokens() -> Result<()> {
        let ids = Tensor::from_slice(&[5u32, 0, 7, 0], (2, 2), &Device::Cpu)?;
        let rows = padding_mask_from_ids(&ids, 0)?.to_vec2::<f32>()?;
        assert_eq!(rows, vec![vec![0.0, MASK_FILL], vec![0.0, MASK_FILL]]);
        Ok(())
    }

    #[test]
    fn ids_mask_rejects_float_ids() -> Result<()> {
        let ids = Tensor::zeros((1, 3), DType::F32, &Device::Cpu)?;
        assert!(padding_mask_from_ids(&ids, 0).is_err());
        Ok(())
    }
}
