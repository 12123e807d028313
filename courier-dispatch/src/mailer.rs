//! The single-send contract shared by the dispatch loop and the recovery flow

use async_trait::async_trait;

use crate::{error::SendError, types::Recipient};

/// Everything a provider needs to deliver one templated email
#[derive(Debug, Clone, Copy)]
pub struct SendRequest<'a> {
    pub recipient: &'a Recipient,
    pub template_id: &'a str,
    pub from: Option<&'a str>,
}

/// Delivers exactly one templated email.
///
/// Implementations own their timeout and retry behaviour; the caller waits
/// for the returned outcome and never issues a second call concurrently.
/// A provider throughput rejection (HTTP 429 or equivalent) must be reported
/// as [`SendError::RateLimited`], never as a generic failure.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// # Errors
    ///
    /// Returns the classified reason the provider did not accept the email.
    async fn send(&self, request: SendRequest<'_>) -> Result<(), SendError>;
}

#[async_trait]
impl<M: Mailer + ?Sized> Mailer for std::sync::Arc<M> {
    async fn send(&self, request: SendRequest<'_>) -> Result<(), SendError> {
        (**self).send(request).await
    }
}
