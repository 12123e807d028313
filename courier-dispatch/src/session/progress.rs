//! Progress reporting for live status displays

use courier_common::tracing::{debug, info, warn};
use tokio::sync::mpsc;

use crate::types::{EmailStatusRecord, Recipient, SendStatus, SessionProgress};

/// Receives session updates as they happen
pub trait ProgressSink: Send {
    /// Called after every state change, including each delay tick
    fn on_progress(&mut self, progress: &SessionProgress);

    /// Called once per recipient when its record settles
    fn on_recipient_done(&mut self, recipient: &Recipient, record: &EmailStatusRecord);
}

/// Discards all updates
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn on_progress(&mut self, _progress: &SessionProgress) {}

    fn on_recipient_done(&mut self, _recipient: &Recipient, _record: &EmailStatusRecord) {}
}

/// Writes updates to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn on_progress(&mut self, progress: &SessionProgress) {
        if progress.is_complete {
            info!(
                total = progress.total,
                cancelled = progress.is_cancelled,
                "Session complete"
            );
        } else if progress.delay_remaining_secs > 0 {
            debug!(
                current = progress.current,
                total = progress.total,
                next_in = progress.delay_remaining_secs,
                paused = progress.is_paused,
                "Waiting before next send"
            );
        } else {
            debug!(
                current = progress.current,
                total = progress.total,
                email = progress.current_email.as_deref().unwrap_or_default(),
                paused = progress.is_paused,
                "Session progress"
            );
        }
    }

    fn on_recipient_done(&mut self, recipient: &Recipient, record: &EmailStatusRecord) {
        match record.status {
            SendStatus::Success => info!(recipient = %recipient.id, email = %recipient.email, "Sent"),
            SendStatus::Skipped => info!(
                recipient = %recipient.id,
                reason = record.skip_reason.as_deref().unwrap_or_default(),
                "Skipped"
            ),
            status => warn!(
                recipient = %recipient.id,
                email = %recipient.email,
                %status,
                error = record.error.as_deref().unwrap_or_default(),
                "Not sent"
            ),
        }
    }
}

/// Update forwarded by a [`ChannelSink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Progress(SessionProgress),
    RecipientDone(EmailStatusRecord),
}

/// Forwards updates over an unbounded channel, e.g. to a UI task
///
/// Updates are dropped silently once the receiver is gone; a closed display
/// never stops a session.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelSink {
    /// Create a sink together with the receiving end of its channel
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl ProgressSink for ChannelSink {
    fn on_progress(&mut self, progress: &SessionProgress) {
        let _closed = self.sender.send(SessionEvent::Progress(progress.clone()));
    }

    fn on_recipient_done(&mut self, _recipient: &Recipient, record: &EmailStatusRecord) {
        let _closed = self.sender.send(SessionEvent::RecipientDone(record.clone()));
    }
}

impl<S: ProgressSink + ?Sized> ProgressSink for Box<S> {
    fn on_progress(&mut self, progress: &SessionProgress) {
        (**self).on_progress(progress);
    }

    fn on_recipient_done(&mut self, recipient: &Recipient, record: &EmailStatusRecord) {
        (**self).on_recipient_done(recipient, record);
    }
}
