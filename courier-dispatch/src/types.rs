//! Core data model shared by the dispatch loop, tracker and recovery flow

use core::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Key/value model handed to the provider's template engine
pub type TemplateModel = serde_json::Map<String, serde_json::Value>;

/// Stable per-recipient identifier (the CRUD record id of a lead or application)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecipientId(String);

impl RecipientId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RecipientId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecipientId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RecipientId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Identifier of one dispatch session, used to correlate log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(ulid::Ulid);

impl SessionId {
    #[must_use]
    pub fn generate() -> Self {
        Self(ulid::Ulid::new())
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One addressable target of a batch send
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: RecipientId,
    /// Never empty: recipients without a usable address are filtered out by
    /// the queue builder
    pub email: String,
    #[serde(default)]
    pub template_model: TemplateModel,
    #[serde(default)]
    pub last_contact: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendStatus {
    Pending,
    Sending,
    Success,
    Failed,
    Skipped,
    RateLimited,
    Reset,
}

impl SendStatus {
    pub const ALL: [Self; 7] = [
        Self::Pending,
        Self::Sending,
        Self::Success,
        Self::Failed,
        Self::Skipped,
        Self::RateLimited,
        Self::Reset,
    ];

    const fn index(self) -> usize {
        match self {
            Self::Pending => 0,
            Self::Sending => 1,
            Self::Success => 2,
            Self::Failed => 3,
            Self::Skipped => 4,
            Self::RateLimited => 5,
            Self::Reset => 6,
        }
    }

    /// Whether the record has left `pending`/`sending` and holds an outcome
    #[must_use]
    pub const fn is_settled(self) -> bool {
        !matches!(self, Self::Pending | Self::Sending)
    }

    /// States the recovery flow may reset
    #[must_use]
    pub const fn is_resettable(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::RateLimited)
    }
}

impl Display for SendStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Sending => "sending",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::RateLimited => "rate_limited",
            Self::Reset => "reset",
        })
    }
}

/// Per-recipient status as shown on the live status display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailStatusRecord {
    pub id: RecipientId,
    /// Display only; records are keyed by `id`
    pub email: String,
    pub status: SendStatus,
    pub error: Option<String>,
    pub skip_reason: Option<String>,
}

impl EmailStatusRecord {
    #[must_use]
    pub fn pending(recipient: &Recipient) -> Self {
        Self {
            id: recipient.id.clone(),
            email: recipient.email.clone(),
            status: SendStatus::Pending,
            error: None,
            skip_reason: None,
        }
    }
}

/// Number of records in each [`SendStatus`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts([usize; 7]);

impl StatusCounts {
    #[must_use]
    pub const fn get(&self, status: SendStatus) -> usize {
        self.0[status.index()]
    }

    pub(crate) const fn increment(&mut self, status: SendStatus) {
        self.0[status.index()] += 1;
    }

    pub(crate) const fn decrement(&mut self, status: SendStatus) {
        self.0[status.index()] = self.0[status.index()].saturating_sub(1);
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.0.iter().sum()
    }
}

/// Snapshot emitted after every state change of a session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionProgress {
    pub total: usize,
    /// 1-based position of the recipient being processed, 0 before the first
    pub current: usize,
    pub current_email: Option<String>,
    pub delay_remaining_secs: u64,
    pub is_complete: bool,
    pub is_cancelled: bool,
    pub is_paused: bool,
}

/// Aggregate outcome of a session, valid once it is complete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionResult {
    pub session_id: SessionId,
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
    pub rate_limited: usize,
    /// Distinguishes an operator cancellation from normal completion
    pub cancelled: bool,
}

impl SessionResult {
    #[must_use]
    pub const fn from_counts(session_id: SessionId, counts: &StatusCounts, cancelled: bool) -> Self {
        Self {
            session_id,
            success: counts.get(SendStatus::Success),
            failed: counts.get(SendStatus::Failed),
            skipped: counts.get(SendStatus::Skipped),
            rate_limited: counts.get(SendStatus::RateLimited),
            cancelled,
        }
    }

    /// Recipients whose record left `pending`
    #[must_use]
    pub const fn processed(&self) -> usize {
        self.success + self.failed + self.skipped + self.rate_limited
    }
}
