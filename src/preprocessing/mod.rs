//! Preprocessing modules
//!
//! Perceptual volume normalization of raw spectrograms.

pub mod normalize;
