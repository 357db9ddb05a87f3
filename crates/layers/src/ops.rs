//! Named tensor operations used by the attention and comparison stages.
//!
//! Each function states its shape contract and validates it up front; a
//! violated contract is reported as an error naming the operation.

use candle_core::{Error, Result, Tensor};

use crate::checks;

/// Elementwise negation, any shape.
pub fn negate(input: &Tensor) -> Result<Tensor> {
    input.neg()
}

/// `left + negate(right)`; both operands must share a shape.
pub fn subtract(left: &Tensor, right: &Tensor) -> Result<Tensor> {
    checks::expect_same_shape("subtract.left", left, "subtract.right", right)?;
    left.add(&negate(right)?)
}

/// Softmax normalised along `axis`; the output has the input's shape.
pub fn softmax_over_axis(input: &Tensor, axis: usize) -> Result<Tensor> {
    let rank = input.rank();
    if axis >= rank {
        return Err(Error::Msg(format!(
            "softmax_over_axis: axis {axis} out of range for rank {rank}"
        )));
    }
    candle_nn::ops::softmax(input, axis)
}

/// Drops a trailing axis of size one: `(.., n, 1)` -> `(.., n)`.
pub fn squeeze_last_axis(input: &Tensor) -> Result<Tensor> {
    match input.dims().last() {
        Some(1) => input.squeeze(input.rank() - 1),
        _ => Err(Error::Msg(format!(
            "squeeze_last_axis: expected trailing axis of size 1, got {:?}",
            input.dims()
        ))),
    }
}

/// Batched contraction `(b, m, k) x (b, k, n) -> (b, m, n)`.
pub fn batch_dot(left: &Tensor, right: &Tensor) -> Result<Tensor> {
    let (lb, _, lk) = left.dims3()?;
    let (rb, rk, _) = right.dims3()?;
    if lb != rb || lk != rk {
        return Err(Error::Msg(format!(
            "batch_dot: cannot contract {:?} with {:?}",
            left.dims(),
            right.dims()
        )));
    }
    left.contiguous()?.matmul(&right.contiguous()?)
}

/// Repeats a `(batch, features)` vector `times` times: `(batch, times, features)`.
pub fn repeat_vector(vector: &Tensor, times: usize) -> Result<Tensor> {
    checks::expect_rank("repeat_vector.input", vector, 2)?;
    if times == 0 {
        return Err(Error::Msg("repeat_vector: times must be non-zero".into()));
    }
    let (batch, features) = vector.dims2()?;
    vector
        .unsqueeze(1)?
        .broadcast_as((batch, times, features))?
        .contiguous()
}
