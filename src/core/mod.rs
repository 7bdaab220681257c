//! Core constants and error types.
//!
//! This module has no I/O and is shared by every layer.

mod constants;
mod error;

pub use constants::*;
pub use error::*;
