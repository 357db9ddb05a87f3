//! Embedding crate
//!
//! Word and character lookup tables for the matching network, built either
//! from a pre-trained matrix or from random initialisation.

pub mod token;

pub use token::*;
