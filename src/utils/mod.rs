//! Utility functions and helpers.

pub mod fs;
pub mod signal;

pub use signal::StopSignal;
