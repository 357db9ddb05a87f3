use candle_core::{Tensor, D};

use crate::TrainingError;

/// Binary cross entropy on probabilities, clamped away from 0 and 1.
#[derive(Debug, Clone)]
pub struct BinaryCrossEntropy {
    epsilon: f64,
}

impl Default for BinaryCrossEntropy {
    fn default() -> Self {
        Self { epsilon: 1e-7 }
    }
}

impl BinaryCrossEntropy {
    pub fn new() -> Self {
        Self::default()
    }

    /// `scores` and `targets` are `(batch, 1)`; returns the batch-mean loss.
    pub fn compute(&self, scores: &Tensor, targets: &Tensor) -> Result<LossOutput, TrainingError> {
        if scores.dims() != targets.dims() {
            return Err(TrainingError::runtime(format!(
                "scores {:?} and targets {:?} must share a shape",
                scores.dims(),
                targets.dims()
            )));
        }
        let count = scores.elem_count();
        if count == 0 {
            return Err(TrainingError::runtime("no examples available for loss computation"));
        }

        let targets = targets.to_dtype(scores.dtype())?.to_device(scores.device())?;
        let probs = scores.clamp(self.epsilon, 1.0 - self.epsilon)?;
        let positive = targets.mul(&probs.log()?)?;
        let negative = targets
            .affine(-1.0, 1.0)?
            .mul(&probs.affine(-1.0, 1.0)?.log()?)?;
        let per_example = positive.add(&negative)?.neg()?.sum(D::Minus1)?;
        let loss = per_example.mean_all()?;
        let value = loss.to_dtype(candle_core::DType::F32)?.to_vec0::<f32>()?;

        Ok(LossOutput {
            loss,
            metrics: LossMetrics {
                value,
                examples: count,
            },
        })
    }
}

#[derive(Debug, Clone)]
pub struct LossOutput {
    pub loss: Tensor,
    pub metrics: LossMetrics,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossMetrics {
    pub value: f32,
    pub examples: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn matches_closed_form() -> Result<(), TrainingError> {
        let device = Device::Cpu;
        let scores = Tensor::from_slice(&[0.9f32, 0.2], (2, 1), &device)?;
        let targets = Tensor::from_slice(&[1f32, 0.0], (2, 1), &device)?;
        let out = BinaryCrossEntropy::new().compute(&scores, &targets)?;
        let expected = -((0.9f32).ln() + (0.8f32).ln()) / 2.0;
        assert!((out.metrics.value - expected).abs() < 1e-5);
        assert_eq!(out.metrics.examples, 2);
        Ok(())
    }

    #[test]
    fn saturated_scores_stay_finite() -> Result<(), TrainingError> {
        let device = Device::Cpu;
        let scores = Tensor::from_slice(&[0f32, 1.0], (2, 1), &device)?;
        let targets = Tensor::from_slice(&[1f32, 0.0], (2, 1), &device)?;
        let out = BinaryCrossEntropy::new().compute(&scores, &targets)?;
        assert!(out.metrics.value.is_finite());
        Ok(())
    }

    #[test]
    fn shape_mismatch_is_an_error() -> Result<(), TrainingError> {
        let device = Device::Cpu;
        let scores = Tensor::zeros((2, 1), candle_core::DType::F32, &device)?;
        let targets = Tensor::zeros((3, 1), candle_core::DType::F32, &device)?;
        assert!(BinaryCrossEntropy::new().compute(&scores, &targets).is_err());
        Ok(())
    }
}
