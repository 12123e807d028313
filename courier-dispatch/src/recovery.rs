//! Reset and resend for recipients that failed or were rate limited
//!
//! Recovery runs independently of any batch session: it shares the session's
//! [`StatusTracker`] but none of its pacing, pause or cancel machinery. Each
//! operation is a one-shot call addressed by the stable recipient id.
//!
//! ```text
//! failed | rate_limited | success ──reset──> reset ──resend──> sending ──> success
//!                                              ^                   │
//!                                              └──── failure ──────┘
//! ```

use std::sync::Arc;

use chrono::Utc;
use courier_common::{
    internal,
    tracing::{self, warn},
};

use crate::{
    config::DispatchConfig,
    contacts::ContactStore,
    error::{RecoveryError, TrackerError},
    mailer::{Mailer, SendRequest},
    queue::RecipientSource,
    tracker::{StatusTracker, Transition},
    types::{EmailStatusRecord, RecipientId, SendStatus},
};

/// Outcome of one entry of a batch recovery operation
pub type RecoveryOutcome = (RecipientId, Result<EmailStatusRecord, RecoveryError>);

#[derive(Clone)]
pub struct RecoveryFlow {
    tracker: StatusTracker,
    source: Arc<dyn RecipientSource>,
    mailer: Arc<dyn Mailer>,
    contacts: Arc<dyn ContactStore>,
    template_id: String,
    from: Option<String>,
}

impl std::fmt::Debug for RecoveryFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryFlow")
            .field("tracker", &self.tracker)
            .field("template_id", &self.template_id)
            .field("from", &self.from)
            .finish_non_exhaustive()
    }
}

impl RecoveryFlow {
    #[must_use]
    pub fn new(
        config: &DispatchConfig,
        tracker: StatusTracker,
        source: Arc<dyn RecipientSource>,
        mailer: Arc<dyn Mailer>,
        contacts: Arc<dyn ContactStore>,
    ) -> Self {
        Self {
            tracker,
            source,
            mailer,
            contacts,
            template_id: config.template_id.clone(),
            from: config.throttle.from_address.clone(),
        }
    }

    pub const fn tracker(&self) -> &StatusTracker {
        &self.tracker
    }

    /// Clear the recipient's last-contact marker and move its record to
    /// `reset`, dropping any prior error or skip reason.
    ///
    /// The throttle policy is not consulted.
    ///
    /// # Errors
    ///
    /// - [`RecoveryError::ResetFailure`] if the contact store call fails; the
    ///   record keeps its prior status
    /// - [`RecoveryError::Tracker`] if the recipient is unknown or its record
    ///   is not in `success`, `failed` or `rate_limited`
    #[tracing::instrument(level = "info", skip(self), fields(recipient = %id))]
    pub async fn reset_contact(&self, id: &RecipientId) -> Result<EmailStatusRecord, RecoveryError> {
        let status = self
            .tracker
            .status(id)
            .ok_or_else(|| TrackerError::UnknownRecipient(id.clone()))?;

        if !status.is_resettable() {
            return Err(TrackerError::IllegalTransition {
                id: id.clone(),
                from: status,
                to: SendStatus::Reset,
            }
            .into());
        }

        self.contacts
            .clear_last_contact(id)
            .await
            .map_err(|source| RecoveryError::ResetFailure {
                id: id.clone(),
                source,
            })?;

        let record = self.tracker.apply(id, Transition::Reset)?;
        internal!(level = INFO, "Reset {} (was {})", id, status);

        Ok(record)
    }

    /// Send once more to a recipient whose record is `reset`.
    ///
    /// The template model is re-resolved from the source record. On failure
    /// the record returns to `reset` carrying the new error, ready for another
    /// attempt.
    ///
    /// # Errors
    ///
    /// - [`RecoveryError::NotInResettableState`] if the record is not `reset`
    /// - [`RecoveryError::Queue`] if the recipient cannot be re-resolved
    /// - [`RecoveryError::ResendFailure`] if the provider did not accept it
    #[tracing::instrument(level = "info", skip(self), fields(recipient = %id))]
    pub async fn resend(&self, id: &RecipientId) -> Result<EmailStatusRecord, RecoveryError> {
        let status = self
            .tracker
            .status(id)
            .ok_or_else(|| TrackerError::UnknownRecipient(id.clone()))?;

        if status != SendStatus::Reset {
            return Err(RecoveryError::NotInResettableState {
                id: id.clone(),
                status,
            });
        }

        let recipient = self.source.recipient(id)?;

        self.tracker.apply(id, Transition::Sending)?;

        let request = SendRequest {
            recipient: &recipient,
            template_id: &self.template_id,
            from: self.from.as_deref(),
        };

        match self.mailer.send(request).await {
            Ok(()) => {
                if let Err(e) = self.contacts.mark_contacted(id, Utc::now()).await {
                    warn!(
                        recipient = %id,
                        error = %e,
                        "Failed to persist last contact after resend"
                    );
                }

                let record = self.tracker.apply(id, Transition::Success)?;
                internal!(level = INFO, "Resent to {}", id);
                Ok(record)
            }
            Err(source) => {
                warn!(recipient = %id, error = %source, "Resend failed");
                self.tracker
                    .apply(id, Transition::ResendFailed(source.to_string()))?;
                Err(RecoveryError::ResendFailure {
                    id: id.clone(),
                    source,
                })
            }
        }
    }

    /// Reset every record currently in one of `statuses`, one at a time.
    pub async fn reset_all(&self, statuses: &[SendStatus]) -> Vec<RecoveryOutcome> {
        let mut outcomes = Vec::new();

        for status in statuses.iter().filter(|status| status.is_resettable()) {
            for id in self.tracker.ids_with_status(*status) {
                let outcome = self.reset_contact(&id).await;
                outcomes.push((id, outcome));
            }
        }

        outcomes
    }

    /// Resend to every record currently in `reset`, one at a time.
    pub async fn resend_all_reset(&self) -> Vec<RecoveryOutcome> {
        let mut outcomes = Vec::new();

        for id in self.tracker.ids_with_status(SendStatus::Reset) {
            let outcome = self.resend(&id).await;
            outcomes.push((id, outcome));
        }

        outcomes
    }
}
