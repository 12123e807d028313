//! Shared plumbing for the courier crates: logging bootstrap, log macros and
//! RON configuration loading.

pub mod config;
pub mod logging;

pub use tracing;
