//! Lightweight validation helpers shared across layer components.
//!
//! These routines provide concise shape and dtype assertions that can be wired
//! into constructors or forward paths. They return `candle_core::Result<()>`
//! so call sites can propagate errors without panicking. Every helper takes a
//! `name` that ends up in the error message, which keeps mismatches traceable
//! to the tensor that caused them.

use candle_core::{DType, Error, Result, Tensor};

/// Ensures a tensor has exactly `rank` dimensions.
pub fn expect_rank(name: &str, tensor: &Tensor, rank: usize) -> Result<()> {
    let dims = tensor.dims();
    if dims.len() == rank {
        Ok(())
    } else {
        Err(Error::Msg(format!(
            "{name}: expected rank {rank}, got shape {:?}",
            dims
        )))
    }
}

/// Ensures a tensor matches the expected dimensions exactly.
pub fn expect_shape(name: &str, tensor: &Tensor, expected: &[usize]) -> Result<()> {
    let actual = tensor.dims();
    if actual == expected {
        Ok(())
    } else {
        Err(Error::Msg(format!(
            "{name}: expected shape {:?}, got {:?}",
            expected, actual
        )))
    }
}

/// Validates the `(batch, seq, hidden)` convention with a known hidden size.
pub fn expect_batch_seq_hidden(name: &str, tensor: &Tensor, hidden: usize) -> Result<()> {
    match tensor.dims() {
        [_, _, actual_hidden] if *actual_hidden == hidden => Ok(()),
        dims => Err(Error::Msg(format!(
            "{name}: expected (batch, seq, {hidden}) layout, got {:?}",
            dims
        ))),
    }
}

/// Validates a non-empty `(batch, seq, features)` tensor and returns its dims.
pub fn non_empty_sequence(name: &str, tensor: &Tensor) -> Result<(usize, usize, usize)> {
    let (batch, seq, features) = tensor
        .dims3()
        .map_err(|_| Error::Msg(format!("{name}: expected (batch, seq, features), got {:?}", tensor.dims())))?;
    if batch == 0 || seq == 0 {
        return Err(Error::Msg(format!(
            "{name}: batch and seq dimensions must be non-zero, got {:?}",
            tensor.dims()
        )));
    }
    Ok((batch, seq, features))
}

/// Checks the tensor dtype is one of the allowed values.
pub fn expect_dtype_in(name: &str, tensor: &Tensor, allowed: &[DType]) -> Result<()> {
    let dtype = tensor.dtype();
    if allowed.iter().copied().any(|allowed| allowed == dtype) {
        Ok(())
    } else {
        Err(Error::Msg(format!(
            "{name}: expected dtype in {:?}, got {:?}",
            allowed, dtype
        )))
    }
}

/// Ensures two tensors share a dtype.
pub fn expect_same_dtype(left_name: &str, left: &Tensor, right_name: &str, right: &Tensor) -> Result<()> {
    if left.dtype() == right.dtype() {
        Ok(())
    } else {
        Err(Error::Msg(format!(
            "{left_name} dtype {:?} does not match {right_name} dtype {:?}",
            left.dtype(),
            right.dtype()
        )))
    }
}

/// Ensures two tensors have identical shapes.
pub fn expect_same_shape(left_name: &str, left: &Tensor, right_name: &str, right: &Tensor) -> Result<()> {
    if left.dims() == right.dims() {
        Ok(())
    } else {
        Err(Error::Msg(format!(
            "{left_name} shape {:?} does not match {right_name} shape {:?}",
            left.dims(),
            right.dims()
        )))
    }
}
