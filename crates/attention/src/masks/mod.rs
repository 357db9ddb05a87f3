//! Mask utilities shared by attention implementations.
//!
//! All masks produced here are additive tensors with dtype `f32`, shaped
//! `[batch, seq_len]` over key positions. Values are either `0.0` (keep) or
//! [`MASK_FILL`] (discard). A large finite value is used instead of
//! `-inf` so a row whose keys are all padding still yields a finite
//! (uniform) distribution.

pub mod padding;

use candle_core::DType;

/// Dtype shared by all additive masks.
pub const MASK_DTYPE: DType = DType::F32;

/// Additive bias placed on discarded key positions.
pub const MASK_FILL: f32 = -1e9;

pub use padding::{padding_mask_from_ids, padding_mask_from_lengths};
