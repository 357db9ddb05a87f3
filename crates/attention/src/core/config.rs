//! Configuration options shared by all attention implementations.
//!
//! The [`Config`] struct captures run-time knobs that callers can tune without
//! swapping implementations.

use crate::masks::MASK_FILL;

/// Configuration driving attention behaviour.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Apply additive padding masks when the caller supplies one.
    ///
    /// When `false`, masks are ignored and padded positions receive
    /// attention mass like any other position.
    pub use_padding_mask: bool,
    /// Additive score for discarded positions.
    ///
    /// Every non-zero entry of a caller mask is replaced by this value before
    /// it is added to the scores, so the builders in [`crate::masks`] and plain
    /// `0/1` masks behave the same.
    pub mask_fill: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            use_padding_mask: false,
            mask_fill: MASK_FILL,
        }
    }
}

impl Config {
    /// Default configuration with padding masks honoured.
    pub fn masked() -> Self {
        Self {
            use_padding_mask: true,
            ..Self::default()
        }
    }
}
