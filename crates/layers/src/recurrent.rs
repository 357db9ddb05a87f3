//! Gated recurrent encoders.
//!
//! [`BiGru`] turns `(batch, seq, input_dim)` into `(batch, seq, 2 * hidden)`
//! by running a forward and a backward [`GruCell`] over the sequence and
//! concatenating their states at every position. Backward states are written
//! back at their original positions, so position `t` of the output always
//! describes token `t`.
//!
//! Gate equations (reset applied before the recurrent matmul):
//!
//! ```text
//! z  = sigmoid(W_z x + U_z h + b_z)
//! r  = sigmoid(W_r x + U_r h + b_r)
//! n  = tanh(W_n x + U_n (r * h) + b_n)
//! h' = z * h + (1 - z) * n
//! ```
//!
//! Dropout is only active in training. The input mask is sampled once per
//! sequence and reused at every time step; the optional recurrent mask is
//! applied to `h` where it feeds the gates.

use candle_core::{DType, Device, Result, Tensor, Var};

use crate::{
    activations::sigmoid,
    checks,
    dropout::Dropout,
    dtypes::PrecisionPolicy,
    linear::{Linear, LinearConfig, LinearInit, LinearLayer},
    LayerError,
};

/// Hyper-parameters of a bidirectional GRU layer.
#[derive(Debug, Clone, PartialEq)]
pub struct GruConfig {
    /// Width of each input position.
    pub input_dim: usize,
    /// State width per direction; the layer outputs `2 * hidden_size`.
    pub hidden_size: usize,
    /// Dropout on the inputs to the gate transforms.
    pub dropout: f32,
    /// Dropout on the recurrent state feeding the gates.
    pub recurrent_dropout: f32,
}

impl GruConfig {
    pub fn new(input_dim: usize, hidden_size: usize) -> Self {
        Self {
            input_dim,
            hidden_size,
            dropout: 0.0,
            recurrent_dropout: 0.0,
        }
    }

    /// Width of the concatenated bidirectional output.
    pub fn output_dim(&self) -> usize {
        2 * self.hidden_size
    }

    fn validate(&self) -> std::result::Result<(), LayerError> {
        if self.input_dim == 0 || self.hidden_size == 0 {
            return Err(LayerError::InvalidConfig(format!(
                "gru needs non-zero input_dim and hidden_size, got {} and {}",
                self.input_dim, self.hidden_size
            )));
        }
        for (label, p) in [
            ("dropout", self.dropout),
            ("recurrent_dropout", self.recurrent_dropout),
        ] {
            if !(0.0..1.0).contains(&p) {
                return Err(LayerError::InvalidConfig(format!(
                    "gru {label} must be in [0, 1), got {p}"
                )));
            }
        }
        Ok(())
    }
}

/// One direction of a GRU.
#[derive(Debug, Clone)]
pub struct GruCell {
    hidden_size: usize,
    /// `x -> [z | r | n]` pre-activations, fused.
    input_proj: Linear,
    /// `h -> [z | r]`.
    recurrent_gates: Linear,
    /// `(r * h) -> n`.
    recurrent_candidate: Linear,
}

impl GruCell {
    pub fn new(input_dim: usize, hidden_size: usize, device: &Device, dtype: DType) -> Result<Self> {
        let mut input_cfg = LinearConfig::new(input_dim, hidden_size);
        input_cfg.fused_projections = 3;
        let input_proj = Linear::with_init(input_cfg, &LinearInit::XavierUniform, device, dtype)?;

        let recurrent_init = LinearInit::Uniform {
            bound: (1.0 / hidden_size as f64).sqrt(),
        };
        let mut gates_cfg = LinearConfig::new(hidden_size, hidden_size);
        gates_cfg.bias = false;
        gates_cfg.fused_projections = 2;
        let recurrent_gates = Linear::with_init(gates_cfg, &recurrent_init, device, dtype)?;

        let mut candidate_cfg = LinearConfig::new(hidden_size, hidden_size);
        candidate_cfg.bias = false;
        let recurrent_candidate = Linear::with_init(candidate_cfg, &recurrent_init, device, dtype)?;

        Ok(Self {
            hidden_size,
            input_proj,
            recurrent_gates,
            recurrent_candidate,
        })
    }

    /// One time step on pre-projected inputs `(batch, 3 * hidden)`.
    pub fn step(
        &self,
        projected: &Tensor,
        h_prev: &Tensor,
        recurrent_mask: Option<&Tensor>,
        policy: &PrecisionPolicy,
    ) -> Result<Tensor> {
        let hidden = self.hidden_size;
        let h_in = match recurrent_mask {
            Some(mask) => h_prev.mul(mask)?,
            None => h_prev.clone(),
        };
        let gates = self.recurrent_gates.forward(&h_in, policy)?;

        let z = sigmoid(&projected.narrow(1, 0, hidden)?.add(&gates.narrow(1, 0, hidden)?)?)?;
        let r = sigmoid(
            &projected
                .narrow(1, hidden, hidden)?
                .add(&gates.narrow(1, hidden, hidden)?)?,
        )?;
        let candidate = self.recurrent_candidate.forward(&r.mul(&h_in)?, policy)?;
        let n = projected
            .narrow(1, 2 * hidden, hidden)?
            .add(&candidate)?
            .tanh()?;

        // h' = n + z * (h - n)
        n.add(&z.mul(&h_prev.sub(&n)?)?)
    }

    /// Runs the cell over `(batch, seq, input_dim)`, returning every state.
    pub fn run(
        &self,
        inputs: &Tensor,
        reverse: bool,
        recurrent_mask: Option<&Tensor>,
        policy: &PrecisionPolicy,
    ) -> Result<Tensor> {
        let (batch, seq, _) = checks::non_empty_sequence("gru.input", inputs)?;
        let projected = self.input_proj.forward(inputs, policy)?;

        let mut h = Tensor::zeros((batch, self.hidden_size), projected.dtype(), projected.device())?;
        let mut states: Vec<Option<Tensor>> = vec![None; seq];
        let order: Vec<usize> = if reverse {
            (0..seq).rev().collect()
        } else {
            (0..seq).collect()
        };
        for t in order {
            let x_t = projected.narrow(1, t, 1)?.squeeze(1)?;
            h = self.step(&x_t, &h, recurrent_mask, policy)?;
            states[t] = Some(h.clone());
        }
        let states = states.into_iter().flatten().collect::<Vec<_>>();
        Tensor::stack(&states, 1)
    }

    pub fn named_parameters(&self, scope: &str) -> Vec<(String, Var)> {
        let mut params = self.input_proj.named_parameters(&format!("{scope}.input"));
        params.extend(self.recurrent_gates.named_parameters(&format!("{scope}.recurrent_gates")));
        params.extend(
            self.recurrent_candidate
                .named_parameters(&format!("{scope}.recurrent_candidate")),
        );
        params
    }
}

/// Bidirectional GRU returning the full sequence of concatenated states.
///
/// A single instance can be applied to several inputs; every call uses the
/// same parameters.
#[derive(Debug, Clone)]
pub struct BiGru {
    config: GruConfig,
    forward_cell: GruCell,
    backward_cell: GruCell,
    input_dropout: Dropout,
    recurrent_dropout: Dropout,
}

impl BiGru {
    pub fn new(
        config: GruConfig,
        device: &Device,
        dtype: DType,
        seed: u64,
    ) -> std::result::Result<Self, LayerError> {
        config.validate()?;
        let forward_cell = GruCell::new(config.input_dim, config.hidden_size, device, dtype)?;
        let backward_cell = GruCell::new(config.input_dim, config.hidden_size, device, dtype)?;
        let input_dropout = Dropout::new(config.dropout, seed)?;
        let recurrent_dropout = Dropout::new(config.recurrent_dropout, seed.wrapping_add(1))?;
        Ok(Self {
            config,
            forward_cell,
            backward_cell,
            input_dropout,
            recurrent_dropout,
        })
    }

    pub fn config(&self) -> &GruConfig {
        &self.config
    }

    /// `(batch, seq, input_dim)` -> `(batch, seq, 2 * hidden_size)`.
    pub fn forward(&self, inputs: &Tensor, train: bool, policy: &PrecisionPolicy) -> Result<Tensor> {
        checks::expect_batch_seq_hidden("bigru.input", inputs, self.config.input_dim)?;
        let (batch, _, _) = checks::non_empty_sequence("bigru.input", inputs)?;

        let mut directions = Vec::with_capacity(2);
        for (cell, reverse) in [(&self.forward_cell, false), (&self.backward_cell, true)] {
            let input_mask = self.input_dropout.sample_mask(
                &[batch, 1, self.config.input_dim],
                inputs.dtype(),
                inputs.device(),
                train,
            )?;
            let dropped = match &input_mask {
                Some(mask) => inputs.broadcast_mul(mask)?,
                None => inputs.clone(),
            };
            let recurrent_mask = self.recurrent_dropout.sample_mask(
                &[batch, self.config.hidden_size],
                inputs.dtype(),
                inputs.device(),
                train,
            )?;
            directions.push(cell.run(&dropped, reverse, recurrent_mask.as_ref(), policy)?);
        }
        Tensor::cat(&directions, 2)
    }

    pub fn named_parameters(&self, scope: &str) -> Vec<(String, Var)> {
        let mut params = self.forward_cell.named_parameters(&format!("{scope}.forward"));
        params.extend(self.backward_cell.named_parameters(&format!("{scope}.backward")));
        params
    }
}
