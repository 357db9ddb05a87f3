//! Train-only dropout with deterministic, seedable masks.
//!
//! Masks are sampled from a small LCG so tests can reproduce them exactly.
//! Kept units are scaled by `1 / (1 - p)` (inverted dropout), so evaluation
//! needs no rescaling and simply returns the input.

use std::{fmt, sync::Mutex};

use candle_core::{DType, Device, Error, Result, Tensor};

/// Dropout policy.
#[derive(Debug)]
pub enum DropoutMode {
    /// Dropout is disabled (probability is zero).
    Disabled,
    /// Dropout is active and uses the supplied probability and RNG state.
    Enabled { probability: f32, rng: Mutex<Lcg64> },
}

impl Clone for DropoutMode {
    fn clone(&self) -> Self {
        match self {
            DropoutMode::Disabled => DropoutMode::Disabled,
            DropoutMode::Enabled { probability, rng } => {
                let state = match rng.lock() {
                    Ok(guard) => guard.clone(),
                    Err(poisoned) => poisoned.into_inner().clone(),
                };
                DropoutMode::Enabled {
                    probability: *probability,
                    rng: Mutex::new(state),
                }
            }
        }
    }
}

impl DropoutMode {
    /// Builds a mode from a probability; `0.0` disables dropout.
    pub fn from_probability(probability: f32, seed: u64) -> Result<Self> {
        if !(0.0..1.0).contains(&probability) {
            return Err(Error::Msg(format!(
                "dropout probability must be in [0, 1), got {probability}"
            )));
        }
        if probability == 0.0 {
            Ok(DropoutMode::Disabled)
        } else {
            Ok(DropoutMode::Enabled {
                probability,
                rng: Mutex::new(Lcg64::new(seed)),
            })
        }
    }
}

/// Inverted dropout layer.
#[derive(Clone)]
pub struct Dropout {
    mode: DropoutMode,
}

impl fmt::Debug for Dropout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dropout")
            .field("probability", &self.probability())
            .finish()
    }
}

impl Dropout {
    /// Creates a dropout layer with a deterministic mask seed.
    pub fn new(probability: f32, seed: u64) -> Result<Self> {
        Ok(Self {
            mode: DropoutMode::from_probability(probability, seed)?,
        })
    }

    /// Configured drop probability.
    pub fn probability(&self) -> f32 {
        match &self.mode {
            DropoutMode::Disabled => 0.0,
            DropoutMode::Enabled { probability, .. } => *probability,
        }
    }

    /// Samples a scaled keep-mask shaped `dims`, or `None` when nothing would be dropped.
    ///
    /// Recurrent layers sample one mask per sequence and reuse it at every step.
    pub fn sample_mask(
        &self,
        dims: &[usize],
        dtype: DType,
        device: &Device,
        train: bool,
    ) -> Result<Option<Tensor>> {
        let (probability, rng) = match (&self.mode, train) {
            (DropoutMode::Enabled { probability, rng }, true) => (*probability, rng),
            _ => return Ok(None),
        };
        let keep_prob = 1.0 - probability;
        let total: usize = dims.iter().product();
        let mut rng = rng
            .lock()
            .map_err(|_| Error::Msg("dropout RNG mutex poisoned".into()))?;
        let scale = 1.0 / keep_prob;
        let mask_data: Vec<f32> = (0..total)
            .map(|_| if rng.next_f32() < keep_prob { scale } else { 0.0 })
            .collect();
        let mask = Tensor::from_vec(mask_data, dims.to_vec(), device)?;
        Ok(Some(mask.to_dtype(dtype)?))
    }

    /// Applies dropout during training; identity otherwise.
    pub fn forward(&self, input: &Tensor, train: bool) -> Result<Tensor> {
        match self.sample_mask(input.dims(), input.dtype(), input.device(), train)? {
            Some(mask) => input.mul(&mask),
            None => Ok(input.clone()),
        }
    }
}

/// Simple 64-bit linear congruential generator for deterministic dropout masks.
#[derive(Debug, Clone)]
pub struct Lcg64 {
    state: u64,
}

impl Lcg64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        // Parameters from Numerical Recipes.
        self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1);
        self.state
    }

    fn next_f32(&mut self) -> f32 {
        const SCALE: f64 = 1.0 / ((1u64 << 53) as f64);
        let bits = self.next_u64() >> 11;
        (bits as f64 * SCALE) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropout_preserves_expectation() -> Result<()> {
        let device = Device::Cpu;
        let dropout = Dropout::new(0.25, 123)?;
        let input = Tensor::ones((4, 8, 16), DType::F32, &device)?;
        let values = dropout.forward(&input, true)?.flatten_all()?.to_vec1::<f32>()?;
        let mean = values.iter().sum::<f32>() / values.len() as f32;
        assert!((mean - 1.0).abs() < 0.1);
        assert!(values.iter().any(|v| *v == 0.0));
        Ok(())
    }

    #[test]
    fn dropout_is_identity_at_inference() -> Result<()> {
        let device = Device::Cpu;
        let dropout = Dropout::new(0.5, 0)?;
        let input = Tensor::randn(0f32, 1.0, (2, 2, 4), &device)?;
        let out = dropout.forward(&input, false)?;
        let diff = input.sub(&out)?.abs()?.max_all()?.to_vec0::<f32>()?;
        assert_eq!(diff, 0.0);
        Ok(())
    }

    #[test]
    fn same_seed_gives_same_mask() -> Result<()> {
        let device = Device::Cpu;
        let a = Dropout::new(0.2, 7)?;
        let b = Dropout::new(0.2, 7)?;
        let ma = a.sample_mask(&[3, 5], DType::F32, &device, true)?.unwrap();
        let mb = b.sample_mask(&[3, 5], DType::F32, &device, true)?.unwrap();
        assert_eq!(ma.to_vec2::<f32>()?, mb.to_vec2::<f32>()?);
        Ok(())
    }

    #[test]
    fn rejects_out_of_range_probability() {
        assert!(Dropout::new(1.0, 0).is_err());
        assert!(Dropout::new(-0.1, 0).is_err());
    }
}
