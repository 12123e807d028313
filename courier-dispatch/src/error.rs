//! Typed errors for dispatch operations.
//!
//! Throttle skips are not errors and never appear here; they are recorded as
//! `skipped` with a reason. Send failures are recoverable per recipient and
//! never abort a session.

use thiserror::Error;

use crate::types::{RecipientId, SendStatus};

/// Outcome of a single failed provider call.
///
/// `RateLimited` is kept apart from ordinary failures so an operator can
/// batch-reset and retry later instead of compounding provider penalties.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SendError {
    /// The provider refused the message (bad address, inactive recipient,
    /// template error, ...).
    #[error("Rejected: {0}")]
    Rejected(String),

    /// The provider rejected the request for exceeding its throughput limit.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// The request never produced a provider answer (connect, timeout, I/O).
    #[error("Transport error: {0}")]
    Transport(String),
}

impl SendError {
    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }

    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Errors from the persistence collaborator that stores last-contact markers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContactError {
    #[error("Unknown contact: {0}")]
    NotFound(RecipientId),

    #[error("Contact store unavailable: {0}")]
    Unavailable(String),
}

/// Errors while turning a source record into a template model.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Required template field {variable} has no value")]
    MissingField { variable: String },

    #[error("Invalid field path: {0}")]
    InvalidPath(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("Recipient {0} is not part of this queue")]
    UnknownRecipient(RecipientId),

    #[error("Recipient {0} has no usable email address")]
    MissingEmail(RecipientId),

    #[error("Failed to resolve template model for {id}: {source}")]
    Resolve {
        id: RecipientId,
        #[source]
        source: ResolveError,
    },
}

/// Rejected status tracker operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TrackerError {
    #[error("No status record for recipient {0}")]
    UnknownRecipient(RecipientId),

    #[error("Illegal transition for {id}: {from} -> {to}")]
    IllegalTransition {
        id: RecipientId,
        from: SendStatus,
        to: SendStatus,
    },
}

/// Errors surfaced by the reset and resend entry points.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecoveryError {
    /// Clearing the last-contact marker failed; the record keeps its status.
    #[error("Failed to reset {id}: {source}")]
    ResetFailure {
        id: RecipientId,
        #[source]
        source: ContactError,
    },

    #[error("Recipient {id} is {status}, not reset")]
    NotInResettableState { id: RecipientId, status: SendStatus },

    /// The resend attempt failed; the record is back in `reset`.
    #[error("Resend to {id} failed: {source}")]
    ResendFailure {
        id: RecipientId,
        #[source]
        source: SendError,
    },

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),
}

impl RecoveryError {
    /// Whether the same operation may simply be attempted again.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ResetFailure { .. } | Self::ResendFailure { .. })
    }
}

/// Errors from the session facade.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("A dispatch session is already running")]
    AlreadyRunning,

    #[error("No dispatch session has been started")]
    NoSession,

    #[error("Invalid delay range: min {min}s is greater than max {max}s")]
    InvalidDelayRange { min: u64, max: u64 },

    #[error("Recipient {0} has no email address")]
    MissingEmail(RecipientId),

    #[error("Recipient {0} appears more than once")]
    DuplicateRecipient(RecipientId),

    #[error(transparent)]
    Recovery(#[from] RecoveryError),
}
