//! Batch email sending: configuration and process wiring for the `courier`
//! binary

pub mod config;
pub mod controller;

pub use config::CourierConfig;
pub use controller::{Courier, Report, SendOptions};
