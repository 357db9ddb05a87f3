//! Activation catalogue for the recurrent gates and the classification head.
//!
//! Activations preserve the input layout. Each implementation promotes inputs
//! to the compute dtype requested by [`PrecisionPolicy`] before evaluating the
//! non-linearity, then casts the result back to the storage dtype.
//!
//! # Built-in formulas
//!
//! * **Tanh** uses Candle's `tanh` kernel (hidden dense layers, GRU candidate).
//! * **Sigmoid** computes `1 / (1 + exp(-x))` from differentiable primitives
//!   (GRU gates, final match probability).
//! * **Identity** leaves values unchanged (linear fusion projection).
//! * **Relu** clamps negatives to zero.

use std::sync::Arc;

use candle_core::{Result, Tensor};

use crate::dtypes::PrecisionPolicy;

/// Identifies which non-linearity is implemented by an [`Activation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationKind {
    /// Identity function, used by linear projections.
    Identity,
    /// Hyperbolic tangent.
    Tanh,
    /// Logistic sigmoid.
    Sigmoid,
    /// ReLU.
    Relu,
}

/// Common interface shared by activation functions.
pub trait Activation: Send + Sync {
    /// Returns the [`ActivationKind`] for introspection.
    fn kind(&self) -> ActivationKind;

    /// Applies the activation to `input` using the precision rules in `policy`.
    fn forward(&self, input: &Tensor, policy: &PrecisionPolicy) -> Result<Tensor>;
}

/// Built-in activation backed by Candle kernels.
struct BuiltinActivation {
    kind: ActivationKind,
}

impl Activation for BuiltinActivation {
    fn kind(&self) -> ActivationKind {
        self.kind
    }

    fn forward(&self, input: &Tensor, policy: &PrecisionPolicy) -> Result<Tensor> {
        match self.kind {
            ActivationKind::Identity => policy.cast_to_storage(input),
            ActivationKind::Tanh => {
                let compute = policy.cast_for_matmul(input)?;
                policy.cast_to_storage(&compute.tanh()?)
            }
            ActivationKind::Sigmoid => {
                let compute = policy.cast_for_matmul(input)?;
                policy.cast_to_storage(&sigmoid(&compute)?)
            }
            ActivationKind::Relu => {
                let compute = policy.cast_for_matmul(input)?;
                policy.cast_to_storage(&compute.relu()?)
            }
        }
    }
}

/// Returns a shared built-in activation implementation.
pub fn builtin(kind: ActivationKind) -> Arc<dyn Activation> {
    Arc::new(BuiltinActivation { kind })
}

/// Logistic sigmoid built from ops that all carry gradients.
pub fn sigmoid(input: &Tensor) -> Result<Tensor> {
    input.neg()?.exp()?.affine(1.0, 1.0)?.recip()
}
