//! Paced batch email dispatch
//!
//! This crate provides:
//! - Recipient queue building from lead and application records
//! - A sequential dispatch loop with randomized pacing, cooperative cancel and
//!   pause, and live progress reporting
//! - Per-recipient throttling (contact cooldown and a daily send cap)
//! - Per-recipient status tracking with reset and resend recovery

pub mod config;
mod contacts;
mod error;
mod mailer;
pub mod queue;
mod recovery;
mod service;
pub mod session;
pub mod throttle;
mod tracker;
mod types;

pub use config::{DelayRange, DispatchConfig};
pub use contacts::{ContactStore, MemoryContactStore};
pub use error::{
    ContactError, QueueError, RecoveryError, ResolveError, SendError, SessionError, TrackerError,
};
pub use mailer::{Mailer, SendRequest};
pub use queue::{
    FieldMapping, FieldSource, QueueBuilder, RecipientQueue, RecipientSource, ResolveContext,
    SourceKind, SourceRecord,
};
pub use recovery::{RecoveryFlow, RecoveryOutcome};
pub use service::{ActionAffordances, DispatchService};
pub use session::{
    ChannelSink, DispatchSession, LogSink, NullSink, ProgressSink, SessionControl, SessionEvent,
};
pub use throttle::{DailySendCounter, SkipReason, ThrottleDecision, ThrottleSettings, can_send};
pub use tracker::{StatusTracker, Transition};
pub use types::{
    EmailStatusRecord, Recipient, RecipientId, SendStatus, SessionId, SessionProgress,
    SessionResult, StatusCounts, TemplateModel,
};
