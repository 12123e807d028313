//! Provider side of the [`Mailer`](courier_dispatch::Mailer) contract
//!
//! - [`ProviderClient`]: JSON over HTTP to a template-based transactional
//!   email API
//! - [`LogMailer`]: dry-run mailer that logs instead of sending

mod client;
mod config;
mod dry_run;
mod error;

pub use client::{ProviderClient, SERVER_TOKEN_HEADER};
pub use config::ProviderConfig;
pub use dry_run::LogMailer;
pub use error::ProviderError;
