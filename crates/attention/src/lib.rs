//! Attention primitives for the sentence-pair matcher.
//!
//! All inputs are batch-first sequences `[batch, seq_len, hidden]`.
//!
//! * [`sentence::SentenceVectorAttention`] pools a sequence into one vector
//!   with learned soft-attention weights.
//! * [`fusion::CrossSentenceFusion`] injects that vector into the other
//!   sentence's sequence.
//! * [`self_attention::SelfAttention`] and [`alignment::soft_align`] are the
//!   parameter-free dot-product variants.
//!
//! Padding masks are optional and off by default; see [`masks`] and
//! [`Config::use_padding_mask`].

pub mod alignment;
pub mod core;
pub mod fusion;
pub mod masks;
pub mod self_attention;
pub mod sentence;

pub use alignment::{soft_align, Alignment};
pub use self::core::{Attention, AttentionError, AttentionOutput, Config};
pub use fusion::CrossSentenceFusion;
pub use self_attention::SelfAttention;
pub use sentence::SentenceVectorAttention;
