//! Cross-sentence fusion.
//!
//! Injects one sentence's vector into every position of the other sentence:
//! the `[batch, hidden]` vector is repeated to the other sequence's length,
//! concatenated with it on the feature axis (`[other, repeated]`) and
//! projected to `fusion_dim` with a linear layer.

use candle_core::{DType, Device, Tensor, Var};
use layers::{
    linear::{Linear, LinearConfig, LinearInit, LinearLayer},
    ops, PrecisionPolicy,
};

use crate::core::{errors::invalid_shape, AttentionError};

/// Linear fusion of a sentence vector into another sequence.
#[derive(Debug, Clone)]
pub struct CrossSentenceFusion {
    sequence_dim: usize,
    vector_dim: usize,
    projection: Linear,
}

impl CrossSentenceFusion {
    pub fn new(
        sequence_dim: usize,
        vector_dim: usize,
        fusion_dim: usize,
        device: &Device,
        dtype: DType,
    ) -> Result<Self, AttentionError> {
        if sequence_dim == 0 || vector_dim == 0 || fusion_dim == 0 {
            return Err(invalid_shape(format!(
                "fusion widths must be non-zero, got sequence={sequence_dim} vector={vector_dim} fusion={fusion_dim}"
            )));
        }
        let projection = Linear::with_init(
            LinearConfig::new(sequence_dim + vector_dim, fusion_dim),
            &LinearInit::XavierUniform,
            device,
            dtype,
        )?;
        log::debug!(
            "attention::fusion init in={}+{} out={fusion_dim}",
            sequence_dim,
            vector_dim
        );
        Ok(Self {
            sequence_dim,
            vector_dim,
            projection,
        })
    }

    pub fn fusion_dim(&self) -> usize {
        self.projection.config().output_dim
    }

    /// `other: [batch, len, sequence_dim]`, `vector: [batch, vector_dim]`
    /// -> `[batch, len, fusion_dim]`.
    pub fn forward(
        &self,
        other: &Tensor,
        vector: &Tensor,
        policy: &PrecisionPolicy,
    ) -> Result<Tensor, AttentionError> {
        let (batch, len, width) = other
            .dims3()
            .map_err(|_| invalid_shape("fusion sequence must have shape [batch, len, hidden]"))?;
        let (vb, vw) = vector
            .dims2()
            .map_err(|_| invalid_shape("fusion vector must have shape [batch, hidden]"))?;
        if width != self.sequence_dim || vw != self.vector_dim || vb != batch {
            return Err(invalid_shape(format!(
                "fusion expected sequence [{batch}, {len}, {}] and vector [{batch}, {}], got [{batch}, {len}, {width}] and [{vb}, {vw}]",
                self.sequence_dim, self.vector_dim
            )));
        }
        if len == 0 {
            return Err(invalid_shape("fusion sequence must be non-empty"));
        }

        let repeated = ops::repeat_vector(vector, len)?;
        let merged = Tensor::cat(&[other, &repeated], 2)?;
        Ok(self.projection.forward(&merged, policy)?)
    }

    pub fn named_parameters(&self, scope: &str) -> Vec<(String, Var)> {
        self.projection.named_parameters(&format!("{scope}.projection"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_length_follows_the_other_sequence() -> candle_core::Result<()> {
        let device = Device::Cpu;
        let fusion = CrossSentenceFusion::new(4, 4, 5, &device, DType::F32)
            .map_err(|e| candle_core::Error::Msg(e.to_string()))?;
        let vector = Tensor::randn(0f32, 1.0, (2, 4), &device)?;
        for len in [1usize, 9] {
            let other = Tensor::randn(0f32, 1.0, (2, len, 4), &device)?;
            let fused = fusion
                .forward(&other, &vector, &PrecisionPolicy::default())
                .map_err(|e| candle_core::Error::Msg(e.to_string()))?;
            assert_eq!(fused.dims(), &[2, len, 5]);
        }
        Ok(())
    }

    #[test]
    fn batch_mismatch_is_rejected() -> candle_core::Result<()> {
        let device = Device::Cpu;
        let fusion = CrossSentenceFusion::new(3, 3, 2, &device, DType::F32)
            .map_err(|e| candle_core::Error::Msg(e.to_string()))?;
        let other = Tensor::zeros((2, 4, 3), DType::F32, &device)?;
        let vector = Tensor::zeros((3, 3), DType::F32, &device)?;
        assert!(fusion
            .forward(&other, &vector, &PrecisionPolicy::default())
            .is_err());
        Ok(())
    }
}
