//! Comparison features and the classification stack.

use candle_core::{DType, Device, Result, Tensor, Var};
use layers::{checks, dropout::Dropout, linear::Dense, ops, ActivationKind, PrecisionPolicy};

/// `[r1, r2, r1 * r2, r1 - r2]` -> dropout -> tanh layers -> sigmoid score.
#[derive(Debug, Clone)]
pub struct ComparisonHead {
    rep_dim: usize,
    dropout: Dropout,
    hidden: Vec<Dense>,
    output: Dense,
}

impl ComparisonHead {
    pub fn new(
        rep_dim: usize,
        dense_units: &[usize],
        dropout: f32,
        seed: u64,
        device: &Device,
        dtype: DType,
    ) -> Result<Self> {
        let mut hidden = Vec::with_capacity(dense_units.len());
        let mut width = 4 * rep_dim;
        for &units in dense_units {
            hidden.push(Dense::new(width, units, ActivationKind::Tanh, device, dtype)?);
            width = units;
        }
        let output = Dense::new(width, 1, ActivationKind::Sigmoid, device, dtype)?;
        Ok(Self {
            rep_dim,
            dropout: Dropout::new(dropout, seed)?,
            hidden,
            output,
        })
    }

    pub fn input_dim(&self) -> usize {
        4 * self.rep_dim
    }

    /// Concatenated comparison features, `(batch, 4 * rep_dim)`.
    pub fn features(&self, rep1: &Tensor, rep2: &Tensor) -> Result<Tensor> {
        checks::expect_same_shape("head.rep1", rep1, "head.rep2", rep2)?;
        let (_, width) = rep1.dims2()?;
        if width != self.rep_dim {
            candle_core::bail!(
                "comparison head expected representations of width {} but received {width}",
                self.rep_dim
            );
        }
        let product = rep1.mul(rep2)?;
        let difference = ops::subtract(rep1, rep2)?;
        Tensor::cat(&[rep1, rep2, &product, &difference], 1)
    }

    /// Match probabilities, `(batch, 1)`.
    pub fn forward(
        &self,
        rep1: &Tensor,
        rep2: &Tensor,
        train: bool,
        policy: &PrecisionPolicy,
    ) -> Result<Tensor> {
        let mut hidden = self.dropout.forward(&self.features(rep1, rep2)?, train)?;
        for layer in &self.hidden {
            hidden = layer.forward(&hidden, policy)?;
        }
        self.output.forward(&hidden, policy)
    }

    pub fn named_parameters(&self, scope: &str) -> Vec<(String, Var)> {
        let mut params = Vec::new();
        for (idx, layer) in self.hidden.iter().enumerate() {
            params.extend(layer.named_parameters(&format!("{scope}.dense{idx}")));
        }
        params.extend(self.output.named_parameters(&format!("{scope}.output")));
        params
    }
}
