//! Recipient queue building
//!
//! Raw leads and applications arrive as [`SourceRecord`]s from the CRUD API.
//! [`QueueBuilder`] turns them into the ordered [`Recipient`] list a session
//! runs over, and the resulting [`RecipientQueue`] keeps the source records so
//! a single recipient can be re-resolved later for a resend.

mod resolve;

use std::sync::Arc;

use ahash::AHashMap;
use chrono::{DateTime, Utc};
use courier_common::internal;
use serde::{Deserialize, Serialize};

pub use resolve::{FieldMapping, FieldPathResolver, FieldSource, ResolveContext, TemplateResolver};

use crate::{
    error::QueueError,
    types::{Recipient, RecipientId},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[default]
    Lead,
    Application,
}

/// A lead or application as read from the CRUD API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub id: RecipientId,
    #[serde(default)]
    pub kind: SourceKind,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub last_contact: Option<DateTime<Utc>>,
    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl SourceRecord {
    fn usable_email(&self) -> Option<&str> {
        self.email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())
    }
}

/// Looks up one recipient, freshly resolved, by identifier
pub trait RecipientSource: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the recipient is unknown or its template model
    /// cannot be resolved.
    fn recipient(&self, id: &RecipientId) -> Result<Recipient, QueueError>;
}

#[derive(Clone)]
pub struct QueueBuilder {
    mappings: Arc<[FieldMapping]>,
    context: Arc<ResolveContext>,
    resolver: Arc<dyn TemplateResolver>,
}

impl std::fmt::Debug for QueueBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueBuilder")
            .field("mappings", &self.mappings)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl QueueBuilder {
    /// Builder using the [`FieldPathResolver`]
    #[must_use]
    pub fn new(mappings: Vec<FieldMapping>, context: ResolveContext) -> Self {
        Self::with_resolver(mappings, context, Arc::new(FieldPathResolver))
    }

    #[must_use]
    pub fn with_resolver(
        mappings: Vec<FieldMapping>,
        context: ResolveContext,
        resolver: Arc<dyn TemplateResolver>,
    ) -> Self {
        Self {
            mappings: mappings.into(),
            context: Arc::new(context),
            resolver,
        }
    }

    /// Resolve a single source record into a recipient.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::MissingEmail`] for records without a usable
    /// address, and [`QueueError::Resolve`] if the template model fails.
    pub fn recipient_for(&self, record: &SourceRecord) -> Result<Recipient, QueueError> {
        let email = record
            .usable_email()
            .ok_or_else(|| QueueError::MissingEmail(record.id.clone()))?;

        let template_model = self
            .resolver
            .resolve(&self.mappings, record, &self.context)
            .map_err(|source| QueueError::Resolve {
                id: record.id.clone(),
                source,
            })?;

        Ok(Recipient {
            id: record.id.clone(),
            email: email.to_string(),
            template_model,
            last_contact: record.last_contact,
        })
    }

    /// Build the ordered recipient queue.
    ///
    /// Records without a usable email and repeated identifiers are dropped;
    /// records whose template model cannot be resolved are reported in
    /// [`RecipientQueue::rejected`].
    pub fn build<I>(&self, sources: I) -> RecipientQueue
    where
        I: IntoIterator<Item = SourceRecord>,
    {
        let mut recipients = Vec::new();
        let mut rejected = Vec::new();
        let mut kept = AHashMap::new();
        let mut without_email = 0_usize;

        for record in sources {
            if kept.contains_key(&record.id) {
                internal!(level = DEBUG, "Dropping duplicate source record {}", record.id);
                continue;
            }

            match self.recipient_for(&record) {
                Ok(recipient) => {
                    recipients.push(recipient);
                    kept.insert(record.id.clone(), record);
                }
                Err(QueueError::MissingEmail(_)) => without_email += 1,
                Err(e) => {
                    internal!(level = WARN, "Excluding recipient from queue: {}", e);
                    rejected.push(e);
                }
            }
        }

        internal!(
            level = INFO,
            "Built recipient queue: {} recipients, {} without email, {} rejected",
            recipients.len(),
            without_email,
            rejected.len()
        );

        RecipientQueue {
            recipients,
            rejected,
            without_email,
            sources: kept,
            builder: self.clone(),
        }
    }
}

/// Output of the queue builder
#[derive(Debug, Clone)]
pub struct RecipientQueue {
    recipients: Vec<Recipient>,
    rejected: Vec<QueueError>,
    without_email: usize,
    sources: AHashMap<RecipientId, SourceRecord>,
    builder: QueueBuilder,
}

impl RecipientQueue {
    /// Recipients in dispatch order
    pub fn recipients(&self) -> &[Recipient] {
        &self.recipients
    }

    /// Records excluded because their template model failed to resolve
    pub fn rejected(&self) -> &[QueueError] {
        &self.rejected
    }

    /// Records filtered out for lacking an email address
    pub const fn without_email(&self) -> usize {
        self.without_email
    }

    pub fn len(&self) -> usize {
        self.recipients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }
}

impl RecipientSource for RecipientQueue {
    fn recipient(&self, id: &RecipientId) -> Result<Recipient, QueueError> {
        let record = self
            .sources
            .get(id)
            .ok_or_else(|| QueueError::UnknownRecipient(id.clone()))?;

        self.builder.recipient_for(record)
    }
}
