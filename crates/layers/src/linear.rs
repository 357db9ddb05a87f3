//! Linear and affine projection helpers.
//!
//! Linear layers accept inputs shaped `(batch, seq, in_dim)` or
//! `(rows, in_dim)` and return the same leading layout with `out_dim`
//! features. Fused variants pack `fused_projections` outputs side by side
//! (`(.., num_projections * output_dim)`) so recurrent cells can compute all
//! gate pre-activations with a single matmul and split them with `narrow`.
//! Parameters live in [`Var`]s so the optimizer can update them in place;
//! matmuls run in [`PrecisionPolicy::compute`] and results are cast back with
//! [`PrecisionPolicy::cast_to_storage`].

use std::{fmt, sync::Arc};

use candle_core::{DType, Device, Error, Result, Tensor, Var};

use crate::{
    activations::{builtin, Activation, ActivationKind},
    checks,
    dtypes::PrecisionPolicy,
};

/// Configuration shared by dense projection layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinearConfig {
    /// Incoming feature dimension.
    pub input_dim: usize,
    /// Output feature dimension per projection shard.
    pub output_dim: usize,
    /// Whether a learnable bias vector should be applied.
    pub bias: bool,
    /// Number of projections fused together (1 for standard linear).
    pub fused_projections: usize,
}

impl LinearConfig {
    /// Creates a configuration for a single projection layer.
    pub fn new(input_dim: usize, output_dim: usize) -> Self {
        Self {
            input_dim,
            output_dim,
            bias: true,
            fused_projections: 1,
        }
    }

    /// Total number of output features produced by the layer.
    pub fn total_output_dim(&self) -> usize {
        self.output_dim * self.fused_projections
    }
}

/// Shared interface for affine projections.
pub trait LinearLayer: Send + Sync {
    /// Returns the static configuration used to validate inputs.
    fn config(&self) -> &LinearConfig;

    /// Applies the linear projection, promoting to the compute dtype when needed.
    fn forward(&self, hidden: &Tensor, policy: &PrecisionPolicy) -> Result<Tensor>;
}

/// Supported weight initialisation policies.
#[derive(Debug, Clone)]
pub enum LinearInit {
    /// Xavier/Glorot uniform initialisation (the dense-kernel default).
    XavierUniform,
    /// Uniform in `[-bound, bound]`, used for recurrent kernels.
    Uniform { bound: f64 },
}

impl LinearInit {
    fn sample(&self, shape: (usize, usize), device: &Device, dtype: DType) -> Result<Tensor> {
        let (out_dim, in_dim) = shape;
        let bound = match self {
            LinearInit::XavierUniform => (6.0f64 / (in_dim + out_dim) as f64).sqrt(),
            LinearInit::Uniform { bound } => *bound,
        };
        Tensor::rand(-bound as f32, bound as f32, shape, device)?.to_dtype(dtype)
    }
}

/// Dense affine projection with optional bias and a mixed-precision aware forward pass.
#[derive(Debug, Clone)]
pub struct Linear {
    config: LinearConfig,
    weight: Var,
    bias: Option<Var>,
}

impl Linear {
    /// Constructs a linear layer from pre-existing parameters.
    pub fn new(config: LinearConfig, weight: Tensor, bias: Option<Tensor>) -> Result<Self> {
        Self::validate_weight(&config, &weight)?;
        Self::validate_bias(&config, bias.as_ref())?;
        Ok(Self {
            config,
            weight: Var::from_tensor(&weight)?,
            bias: bias.as_ref().map(Var::from_tensor).transpose()?,
        })
    }

    /// Builds a linear layer with randomly initialised weights following `init`.
    pub fn with_init(
        config: LinearConfig,
        init: &LinearInit,
        device: &Device,
        dtype: DType,
    ) -> Result<Self> {
        let weight = init.sample((config.total_output_dim(), config.input_dim), device, dtype)?;
        let bias = if config.bias {
            Some(Tensor::zeros(config.total_output_dim(), dtype, device)?)
        } else {
            None
        };
        Self::new(config, weight, bias)
    }

    /// Returns a clone of the underlying weight tensor, shaped `(out, in)`.
    pub fn weight(&self) -> Tensor {
        self.weight.as_tensor().clone()
    }

    /// Overwrites the weight in place; shape and dtype must match.
    pub fn copy_weight_from(&self, value: &Tensor) -> Result<()> {
        Self::validate_weight(&self.config, value)?;
        checks::expect_same_dtype("linear.weight", value, "linear.weight", self.weight.as_tensor())?;
        self.weight.set(value)
    }

    /// Trainable parameters under `scope` (`<scope>.weight`, `<scope>.bias`).
    pub fn named_parameters(&self, scope: &str) -> Vec<(String, Var)> {
        let mut params = vec![(format!("{scope}.weight"), self.weight.clone())];
        if let Some(bias) = &self.bias {
            params.push((format!("{scope}.bias"), bias.clone()));
        }
        params
    }

    fn validate_weight(config: &LinearConfig, weight: &Tensor) -> Result<()> {
        checks::expect_rank("linear.weight", weight, 2)?;
        checks::expect_shape(
            "linear.weight",
            weight,
            &[config.total_output_dim(), config.input_dim],
        )?;
        checks::expect_dtype_in(
            "linear.weight",
            weight,
            &[DType::F16, DType::BF16, DType::F32, DType::F64],
        )
    }

    fn validate_bias(config: &LinearConfig, bias: Option<&Tensor>) -> Result<()> {
        match (config.bias, bias) {
            (true, Some(tensor)) => {
                checks::expect_rank("linear.bias", tensor, 1)?;
                checks::expect_shape("linear.bias", tensor, &[config.total_output_dim()])
            }
            (false, Some(_)) => Err(Error::Msg("bias provided but config disables bias".into())),
            (true, None) => Err(Error::Msg("config expects bias but none supplied".into())),
            (false, None) => Ok(()),
        }
    }

    fn validate_input(&self, hidden: &Tensor) -> Result<()> {
        match hidden.dims() {
            [_, _, _] => checks::expect_batch_seq_hidden("linear.input", hidden, self.config.input_dim),
            [_, width] if *width == self.config.input_dim => Ok(()),
            dims => Err(Error::Msg(format!(
                "linear.input: expected (batch, seq, {in_dim}) or (rows, {in_dim}), got {dims:?}",
                in_dim = self.config.input_dim
            ))),
        }
    }
}

impl LinearLayer for Linear {
    fn config(&self) -> &LinearConfig {
        &self.config
    }

    fn forward(&self, hidden: &Tensor, policy: &PrecisionPolicy) -> Result<Tensor> {
        self.validate_input(hidden)?;

        let input = policy.cast_for_matmul(hidden)?;
        let weight_t = policy.cast_for_matmul(self.weight.as_tensor())?.t()?;

        let mut output = match input.dims() {
            [batch, seq, _] => {
                let (batch, seq) = (*batch, *seq);
                input
                    .reshape((batch * seq, self.config.input_dim))?
                    .matmul(&weight_t)?
                    .reshape((batch, seq, self.config.total_output_dim()))?
            }
            _ => input.matmul(&weight_t)?,
        };

        if let Some(bias) = &self.bias {
            let bias = policy.cast_for_matmul(bias.as_tensor())?;
            output = output.broadcast_add(&bias)?;
        }

        policy.cast_to_storage(&output)
    }
}

/// Linear projection followed by an activation.
#[derive(Clone)]
pub struct Dense {
    linear: Linear,
    activation: Arc<dyn Activation>,
}

impl fmt::Debug for Dense {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dense")
            .field("config", self.linear.config())
            .field("activation", &self.activation.kind())
            .finish()
    }
}

impl Dense {
    /// Glorot-uniform kernel with a zero bias.
    pub fn new(
        input_dim: usize,
        output_dim: usize,
        activation: ActivationKind,
        device: &Device,
        dtype: DType,
    ) -> Result<Self> {
        let linear = Linear::with_init(
            LinearConfig::new(input_dim, output_dim),
            &LinearInit::XavierUniform,
            device,
            dtype,
        )?;
        Ok(Self::from_linear(linear, activation))
    }

    pub fn from_linear(linear: Linear, activation: ActivationKind) -> Self {
        Self {
            linear,
            activation: builtin(activation),
        }
    }

    pub fn linear(&self) -> &Linear {
        &self.linear
    }

    pub fn activation(&self) -> ActivationKind {
        self.activation.kind()
    }

    pub fn forward(&self, input: &Tensor, policy: &PrecisionPolicy) -> Result<Tensor> {
        let projected = self.linear.forward(input, policy)?;
        self.activation.forward(&projected, policy)
    }

    pub fn named_parameters(&self, scope: &str) -> Vec<(String, Var)> {
        self.linear.named_parameters(scope)
    }
}
