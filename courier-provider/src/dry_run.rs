use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use courier_common::outgoing;
use courier_dispatch::{Mailer, SendError, SendRequest};

/// Mailer that only logs what it would have sent
#[derive(Debug, Default)]
pub struct LogMailer {
    sent: AtomicUsize,
}

impl LogMailer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Emails "sent" so far
    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, request: SendRequest<'_>) -> Result<(), SendError> {
        self.sent.fetch_add(1, Ordering::Relaxed);

        outgoing!(
            level = INFO,
            "[dry run] {} <{}> with template {} from {}",
            request.recipient.id,
            request.recipient.email,
            request.template_id,
            request.from.unwrap_or("<provider default>")
        );

        Ok(())
    }
}
