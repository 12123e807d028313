//! The dispatch loop
//!
//! A session walks its recipient list strictly in order with a single
//! logical worker:
//!
//! ```text
//! for each recipient:
//!     cancelled?          -> stop, remaining records stay pending
//!     paused?             -> wait for resume (or cancel)
//!     throttle denies?    -> skipped, no delay, counter untouched
//!     send (one at a time)-> success | failed | rate_limited
//!     more to go?         -> randomized delay, counted down in ticks
//!                            (none once the daily cap is used up)
//! ```
//!
//! The cooldown is judged against the later of the recipient's own
//! last-contact date and the marker held by the [`ContactStore`], so a
//! recipient emailed by an earlier session stays throttled.
//!
//! Sends are never issued concurrently. Cancellation is cooperative: an
//! in-flight send is allowed to finish and its outcome is recorded.

mod control;
mod progress;

use std::{borrow::Cow, time::Duration};

use ahash::AHashSet;
use chrono::{DateTime, Utc};
use courier_common::{
    internal,
    tracing::{self, warn},
};

pub use control::SessionControl;
pub use progress::{ChannelSink, LogSink, NullSink, ProgressSink, SessionEvent};

use crate::{
    config::DispatchConfig,
    contacts::ContactStore,
    error::SessionError,
    mailer::{Mailer, SendRequest},
    throttle::{DailySendCounter, ThrottleDecision, can_send},
    tracker::{StatusTracker, Transition},
    types::{Recipient, SessionId, SessionProgress, SessionResult},
};

/// One batch send over a fixed recipient list
///
/// Creating the session seeds a `pending` record for every recipient. The
/// [`StatusTracker`] and [`SessionControl`] can be cloned out before running
/// and remain usable after the session has finished.
#[derive(Debug)]
pub struct DispatchSession {
    id: SessionId,
    config: DispatchConfig,
    recipients: Vec<Recipient>,
    tracker: StatusTracker,
    control: SessionControl,
}

impl DispatchSession {
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidDelayRange`] if the configured delay
    /// range is inverted, and [`SessionError::MissingEmail`] or
    /// [`SessionError::DuplicateRecipient`] if the recipient list is
    /// malformed.
    pub fn new(config: DispatchConfig, recipients: Vec<Recipient>) -> Result<Self, SessionError> {
        Self::with_control(config, recipients, SessionControl::new())
    }

    /// Create a session driven by an existing control handle
    ///
    /// # Errors
    ///
    /// Same as [`DispatchSession::new`].
    pub fn with_control(
        config: DispatchConfig,
        recipients: Vec<Recipient>,
        control: SessionControl,
    ) -> Result<Self, SessionError> {
        config.delay.validate()?;
        validate_recipients(&recipients)?;

        let tracker = StatusTracker::seed(&recipients);

        Ok(Self {
            id: SessionId::generate(),
            config,
            recipients,
            tracker,
            control,
        })
    }

    pub const fn id(&self) -> SessionId {
        self.id
    }

    pub const fn tracker(&self) -> &StatusTracker {
        &self.tracker
    }

    pub const fn control(&self) -> &SessionControl {
        &self.control
    }

    pub fn recipients(&self) -> &[Recipient] {
        &self.recipients
    }

    /// Run the session to completion or cancellation.
    ///
    /// `counter` is the caller's "sent today" state; it is consulted by the
    /// throttle policy and incremented on every successful send.
    #[tracing::instrument(
        level = "info",
        skip_all,
        fields(session = %self.id, template = %self.config.template_id, recipients = self.recipients.len())
    )]
    pub async fn run<M, C, S>(
        self,
        mailer: &M,
        contacts: &C,
        counter: &mut DailySendCounter,
        sink: &mut S,
    ) -> SessionResult
    where
        M: Mailer + ?Sized,
        C: ContactStore + ?Sized,
        S: ProgressSink + ?Sized,
    {
        let total = self.recipients.len();
        let mut progress = SessionProgress {
            total,
            ..SessionProgress::default()
        };
        let mut cancelled = false;
        let mut backoff_secs = 0;

        internal!(level = INFO, "Session {} starting with {} recipients", self.id, total);
        sink.on_progress(&progress);

        for (i, recipient) in self.recipients.iter().enumerate() {
            if self.control.is_cancelled() {
                cancelled = true;
                break;
            }

            if self.control.is_paused() && self.pause(&mut progress, sink).await {
                cancelled = true;
                break;
            }

            progress.current = i + 1;
            progress.current_email = Some(recipient.email.clone());
            progress.delay_remaining_secs = 0;

            let candidate = with_known_contact(recipient, contacts).await;
            let now = Utc::now();
            if let ThrottleDecision::Denied(reason) =
                can_send(&candidate, &self.config.throttle, counter.sent_on(now), now)
            {
                self.settle(recipient, Transition::Skipped(reason.to_string()), sink);
                sink.on_progress(&progress);
                continue;
            }

            if self.tracker.apply(&recipient.id, Transition::Sending).is_err() {
                continue;
            }
            sink.on_progress(&progress);

            let transition = self.send_one(mailer, contacts, recipient, counter).await;
            if matches!(transition, Transition::RateLimited(_)) {
                backoff_secs = self.config.rate_limit_backoff_secs;
            }
            self.settle(recipient, transition, sink);
            sink.on_progress(&progress);

            if i + 1 < total
                && !self
                    .config
                    .throttle
                    .daily_cap_reached(counter.sent_on(Utc::now()))
            {
                let delay_secs = self
                    .config
                    .delay
                    .pick(&mut rand::rng())
                    .saturating_add(std::mem::take(&mut backoff_secs));

                if self.delay(delay_secs, &mut progress, sink).await {
                    cancelled = true;
                    break;
                }
            }
        }

        progress.current_email = None;
        progress.delay_remaining_secs = 0;
        progress.is_paused = false;
        progress.is_cancelled = cancelled;
        progress.is_complete = true;
        sink.on_progress(&progress);

        let result = SessionResult::from_counts(self.id, &self.tracker.counts(), cancelled);

        internal!(
            level = INFO,
            "Session {} {}: {} sent, {} failed, {} skipped, {} rate limited",
            self.id,
            if cancelled { "cancelled" } else { "completed" },
            result.success,
            result.failed,
            result.skipped,
            result.rate_limited
        );

        result
    }

    async fn send_one<M, C>(
        &self,
        mailer: &M,
        contacts: &C,
        recipient: &Recipient,
        counter: &mut DailySendCounter,
    ) -> Transition
    where
        M: Mailer + ?Sized,
        C: ContactStore + ?Sized,
    {
        let request = SendRequest {
            recipient,
            template_id: &self.config.template_id,
            from: self.config.throttle.from_address.as_deref(),
        };

        match mailer.send(request).await {
            Ok(()) => {
                let now = Utc::now();
                counter.record(now);

                if let Err(e) = contacts.mark_contacted(&recipient.id, now).await {
                    warn!(
                        recipient = %recipient.id,
                        error = %e,
                        "Failed to persist last contact after successful send"
                    );
                }

                Transition::Success
            }
            Err(e) if e.is_rate_limited() => Transition::RateLimited(e.to_string()),
            Err(e) => Transition::Failed(e.to_string()),
        }
    }

    fn settle<S: ProgressSink + ?Sized>(
        &self,
        recipient: &Recipient,
        transition: Transition,
        sink: &mut S,
    ) {
        if let Ok(record) = self.tracker.apply(&recipient.id, transition) {
            sink.on_recipient_done(recipient, &record);
        }
    }

    /// Wait out a pause. Returns `true` if the session was cancelled meanwhile.
    async fn pause<S: ProgressSink + ?Sized>(
        &self,
        progress: &mut SessionProgress,
        sink: &mut S,
    ) -> bool {
        internal!(level = INFO, "Session {} paused", self.id);
        progress.is_paused = true;
        sink.on_progress(progress);

        let cancelled = self.control.wait_while_paused().await;

        progress.is_paused = false;
        if !cancelled {
            internal!(level = INFO, "Session {} resumed", self.id);
            sink.on_progress(progress);
        }
        cancelled
    }

    /// Count down `secs` in ticks. Time spent paused does not count towards
    /// the delay. Returns `true` if the session was cancelled meanwhile.
    async fn delay<S: ProgressSink + ?Sized>(
        &self,
        secs: u64,
        progress: &mut SessionProgress,
        sink: &mut S,
    ) -> bool {
        let tick = self.config.tick();
        let mut remaining = Duration::from_secs(secs);

        while !remaining.is_zero() {
            if self.control.is_cancelled() {
                return true;
            }

            if self.control.is_paused() && self.pause(progress, sink).await {
                return true;
            }

            progress.delay_remaining_secs = remaining_secs(remaining);
            sink.on_progress(progress);

            let step = tick.min(remaining);
            tokio::select! {
                () = tokio::time::sleep(step) => {}
                () = self.control.cancelled() => return true,
            }
            remaining = remaining.saturating_sub(step);
        }

        progress.delay_remaining_secs = 0;
        false
    }
}

/// Reject recipients without an address and repeated identifiers
fn validate_recipients(recipients: &[Recipient]) -> Result<(), SessionError> {
    let mut seen = AHashSet::with_capacity(recipients.len());

    for recipient in recipients {
        if recipient.email.trim().is_empty() {
            return Err(SessionError::MissingEmail(recipient.id.clone()));
        }
        if !seen.insert(&recipient.id) {
            return Err(SessionError::DuplicateRecipient(recipient.id.clone()));
        }
    }

    Ok(())
}

/// `recipient` with its last contact raised to the store's marker when that
/// is later. A store error falls back to the recipient's own date.
async fn with_known_contact<'a, C>(
    recipient: &'a Recipient,
    contacts: &C,
) -> Cow<'a, Recipient>
where
    C: ContactStore + ?Sized,
{
    let stored = match contacts.read_last_contact(&recipient.id).await {
        Ok(stored) => stored,
        Err(e) => {
            warn!(
                recipient = %recipient.id,
                error = %e,
                "Failed to read last contact, using the source record's"
            );
            None
        }
    };

    let latest: Option<DateTime<Utc>> = stored.max(recipient.last_contact);
    if latest == recipient.last_contact {
        Cow::Borrowed(recipient)
    } else {
        Cow::Owned(Recipient {
            last_contact: latest,
            ..recipient.clone()
        })
    }
}

/// Whole seconds left, rounded up so a display never shows 0 while waiting
fn remaining_secs(remaining: Duration) -> u64 {
    u64::try_from(remaining.as_millis().div_ceil(1000)).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::TemplateModel;

    fn recipient(id: &str, email: &str) -> Recipient {
        Recipient {
            id: id.into(),
            email: email.to_string(),
            template_model: TemplateModel::new(),
            last_contact: None,
        }
    }

    #[test]
    fn malformed_recipient_lists_are_rejected() {
        let config = DispatchConfig::new("welcome-back");

        let err = DispatchSession::new(
            config.clone(),
            vec![recipient("1", "1@example.com"), recipient("2", "  ")],
        )
        .unwrap_err();
        assert_eq!(err, SessionError::MissingEmail("2".into()));

        let err = DispatchSession::new(
            config.clone(),
            vec![
                recipient("1", "1@example.com"),
                recipient("1", "other@example.com"),
            ],
        )
        .unwrap_err();
        assert_eq!(err, SessionError::DuplicateRecipient("1".into()));

        let session = DispatchSession::new(config, vec![recipient("1", "1@example.com")]);
        assert!(session.is_ok());
    }

    #[test]
    fn remaining_seconds_round_up() {
        assert_eq!(remaining_secs(Duration::from_millis(1)), 1);
        assert_eq!(remaining_secs(Duration::from_millis(1000)), 1);
        assert_eq!(remaining_secs(Duration::from_millis(1001)), 2);
        assert_eq!(remaining_secs(Duration::ZERO), 0);
    }
}
