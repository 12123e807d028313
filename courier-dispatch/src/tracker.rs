//! Per-recipient status records and aggregate counts
//!
//! ```text
//! pending ──> sending ──> success | failed | rate_limited
//!    │           │                    │
//!    v           │ (resend failed)    v
//! skipped        └──────────────>  reset ──> sending
//! ```
//!
//! Every other transition is rejected and leaves the record untouched. Once a
//! record reaches `success`, only an explicit reset can change it.

use std::sync::Arc;

use ahash::AHashMap;
use courier_common::internal;
use parking_lot::RwLock;

use crate::{
    error::TrackerError,
    types::{EmailStatusRecord, Recipient, RecipientId, SendStatus, StatusCounts},
};

/// A requested state change together with the detail it records
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Sending,
    Success,
    Failed(String),
    RateLimited(String),
    Skipped(String),
    Reset,
    /// A resend attempt failed; back to `reset` carrying the error
    ResendFailed(String),
}

impl Transition {
    #[must_use]
    pub const fn target(&self) -> SendStatus {
        match self {
            Self::Sending => SendStatus::Sending,
            Self::Success => SendStatus::Success,
            Self::Failed(_) => SendStatus::Failed,
            Self::RateLimited(_) => SendStatus::RateLimited,
            Self::Skipped(_) => SendStatus::Skipped,
            Self::Reset | Self::ResendFailed(_) => SendStatus::Reset,
        }
    }
}

const fn is_allowed(from: SendStatus, to: SendStatus) -> bool {
    use SendStatus::{Failed, Pending, RateLimited, Reset, Sending, Skipped, Success};

    matches!(
        (from, to),
        (Pending | Reset, Sending)
            | (Pending, Skipped)
            | (Sending, Success | Failed | RateLimited | Reset)
            | (Success | Failed | RateLimited, Reset)
    )
}

#[derive(Debug, Default)]
struct TrackerState {
    records: Vec<EmailStatusRecord>,
    index: AHashMap<RecipientId, usize>,
    counts: StatusCounts,
}

/// Holds one [`EmailStatusRecord`] per recipient of a session
///
/// Cloning is cheap and every clone observes the same records, so the
/// tracker can be shared between the dispatch loop, the recovery flow and a
/// status display. Records outlive the session that created them.
#[derive(Debug, Clone, Default)]
pub struct StatusTracker {
    state: Arc<RwLock<TrackerState>>,
}

impl StatusTracker {
    /// Create a tracker with one `pending` record per recipient, in list order.
    ///
    /// A repeated identifier keeps its first record only.
    #[must_use]
    pub fn seed(recipients: &[Recipient]) -> Self {
        let mut state = TrackerState::default();

        for recipient in recipients {
            if state.index.contains_key(&recipient.id) {
                internal!(
                    level = WARN,
                    "Duplicate recipient {} ignored by status tracker",
                    recipient.id
                );
                continue;
            }

            state
                .index
                .insert(recipient.id.clone(), state.records.len());
            state.records.push(EmailStatusRecord::pending(recipient));
            state.counts.increment(SendStatus::Pending);
        }

        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().records.is_empty()
    }

    pub fn get(&self, id: &RecipientId) -> Option<EmailStatusRecord> {
        let state = self.state.read();
        state.index.get(id).map(|&i| state.records[i].clone())
    }

    pub fn status(&self, id: &RecipientId) -> Option<SendStatus> {
        let state = self.state.read();
        state.index.get(id).map(|&i| state.records[i].status)
    }

    /// All records in recipient order
    pub fn records(&self) -> Vec<EmailStatusRecord> {
        self.state.read().records.clone()
    }

    /// Identifiers of every record currently in `status`
    pub fn ids_with_status(&self, status: SendStatus) -> Vec<RecipientId> {
        self.state
            .read()
            .records
            .iter()
            .filter(|record| record.status == status)
            .map(|record| record.id.clone())
            .collect()
    }

    /// Aggregate counts, maintained on every transition
    pub fn counts(&self) -> StatusCounts {
        self.state.read().counts
    }

    /// Apply a transition to one record.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::UnknownRecipient`] if no record exists, and
    /// [`TrackerError::IllegalTransition`] if the change is outside the
    /// transition table; in both cases nothing is modified.
    pub fn apply(
        &self,
        id: &RecipientId,
        transition: Transition,
    ) -> Result<EmailStatusRecord, TrackerError> {
        let mut guard = self.state.write();
        let state = &mut *guard;

        let Some(&i) = state.index.get(id) else {
            return Err(TrackerError::UnknownRecipient(id.clone()));
        };

        let record = &mut state.records[i];
        let from = record.status;
        let to = transition.target();

        if !is_allowed(from, to) {
            drop(guard);
            internal!(
                level = WARN,
                "Rejected status transition for {}: {} -> {}",
                id,
                from,
                to
            );
            return Err(TrackerError::IllegalTransition {
                id: id.clone(),
                from,
                to,
            });
        }

        match transition {
            Transition::Sending | Transition::Success | Transition::Reset => {
                record.error = None;
                record.skip_reason = None;
            }
            Transition::Failed(error)
            | Transition::RateLimited(error)
            | Transition::ResendFailed(error) => {
                record.error = Some(error);
            }
            Transition::Skipped(reason) => {
                record.skip_reason = Some(reason);
            }
        }
        record.status = to;

        state.counts.decrement(from);
        state.counts.increment(to);

        Ok(state.records[i].clone())
    }
}
