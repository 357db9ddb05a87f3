//! Precision policy shared by every layer in the matching network.
//!
//! Parameters may be stored in `f16`/`bf16` while matmuls, gate activations
//! and pooling statistics run in `f32`. Layers receive a [`PrecisionPolicy`]
//! on each forward call and use it to promote inputs before computing and to
//! cast the result back to the storage dtype.

use candle_core::{DType, Result, Tensor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrecisionPolicy {
    storage: DType,
    compute: DType,
    reduction: DType,
}

impl Default for PrecisionPolicy {
    fn default() -> Self {
        Self::from_parameter_dtype(DType::F32)
    }
}

impl PrecisionPolicy {
    /// Half-precision storage computes in `f32`; reductions always run in `f32`.
    pub fn from_parameter_dtype(storage: DType) -> Self {
        let compute = match storage {
            DType::F16 | DType::BF16 => DType::F32,
            other => other,
        };
        Self {
            storage,
            compute,
            reduction: DType::F32,
        }
    }

    pub fn storage(&self) -> DType {
        self.storage
    }

    pub fn compute(&self) -> DType {
        self.compute
    }

    /// Dtype of softmax scores, masks and pooling statistics.
    pub fn reduction(&self) -> DType {
        self.reduction
    }

    pub fn cast_for_matmul(&self, tensor: &Tensor) -> Result<Tensor> {
        cast(tensor, self.compute)
    }

    pub fn cast_for_reduction(&self, tensor: &Tensor) -> Result<Tensor> {
        cast(tensor, self.reduction)
    }

    pub fn cast_to_storage(&self, tensor: &Tensor) -> Result<Tensor> {
        cast(tensor, self.storage)
    }
}

fn cast(tensor: &Tensor, dtype: DType) -> Result<Tensor> {
    if tensor.dtype() == dtype {
        Ok(tensor.clone())
    } else {
        tensor.to_dtype(dtype)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn half_precision_storage_computes_in_f32() {
        for storage in [DType::F16, DType::BF16] {
            let policy = PrecisionPolicy::from_parameter_dtype(storage);
            assert_eq!(policy.storage(), storage);
            assert_eq!(policy.compute(), DType::F32);
            assert_eq!(policy.reduction(), DType::F32);
        }
        let full = PrecisionPolicy::default();
        assert_eq!((full.storage(), full.compute()), (DType::F32, DType::F32));
    }

    #[test]
    fn gate_outputs_survive_bf16_storage() -> Result<()> {
        let device = Device::Cpu;
        let policy = PrecisionPolicy::from_parameter_dtype(DType::BF16);
        let gates = Tensor::from_vec(vec![0.125f32, 0.5, 0.875], (1, 3), &device)?;

        let stored = policy.cast_to_storage(&gates)?;
        assert_eq!(stored.dtype(), DType::BF16);
        let promoted = policy.cast_for_reduction(&stored)?;
        assert_eq!(promoted.dtype(), DType::F32);
        // Multiples of 1/8 are exact in bf16.
        assert_eq!(promoted.to_vec2::<f32>()?, gates.to_vec2::<f32>()?);
        Ok(())
    }
}
