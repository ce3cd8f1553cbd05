//! Feature-set I/O modules
//!
//! Saving and loading extracted feature sets.

pub mod persist;
