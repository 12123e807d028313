//! Last-contact markers kept by the remote CRUD API

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::{error::ContactError, types::RecipientId};

/// Persistence collaborator for the "last contacted" marker of a recipient
#[async_trait]
pub trait ContactStore: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    async fn read_last_contact(
        &self,
        id: &RecipientId,
    ) -> Result<Option<DateTime<Utc>>, ContactError>;

    /// # Errors
    ///
    /// Returns an error if the marker could not be cleared.
    async fn clear_last_contact(&self, id: &RecipientId) -> Result<(), ContactError>;

    /// # Errors
    ///
    /// Returns an error if the marker could not be written.
    async fn mark_contacted(&self, id: &RecipientId, at: DateTime<Utc>)
    -> Result<(), ContactError>;
}

#[async_trait]
impl<C: ContactStore + ?Sized> ContactStore for Arc<C> {
    async fn read_last_contact(
        &self,
        id: &RecipientId,
    ) -> Result<Option<DateTime<Utc>>, ContactError> {
        (**self).read_last_contact(id).await
    }

    async fn clear_last_contact(&self, id: &RecipientId) -> Result<(), ContactError> {
        (**self).clear_last_contact(id).await
    }

    async fn mark_contacted(
        &self,
        id: &RecipientId,
        at: DateTime<Utc>,
    ) -> Result<(), ContactError> {
        (**self).mark_contacted(id, at).await
    }
}

/// In-process contact store
///
/// Unknown recipients read as never contacted; clearing an unknown recipient
/// is a no-op.
#[derive(Debug, Clone, Default)]
pub struct MemoryContactStore {
    contacts: Arc<DashMap<RecipientId, DateTime<Utc>>>,
}

impl MemoryContactStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from known markers (e.g. the `last_contact` of source records)
    pub fn with_contacts<I>(contacts: I) -> Self
    where
        I: IntoIterator<Item = (RecipientId, DateTime<Utc>)>,
    {
        Self {
            contacts: Arc::new(contacts.into_iter().collect()),
        }
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }
}

#[async_trait]
impl ContactStore for MemoryContactStore {
    async fn read_last_contact(
        &self,
        id: &RecipientId,
    ) -> Result<Option<DateTime<Utc>>, ContactError> {
        Ok(self.contacts.get(id).map(|entry| *entry.value()))
    }

    async fn clear_last_contact(&self, id: &RecipientId) -> Result<(), ContactError> {
        self.contacts.remove(id);
        Ok(())
    }

    async fn mark_contacted(
        &self,
        id: &RecipientId,
        at: DateTime<Utc>,
    ) -> Result<(), ContactError> {
        self.contacts.insert(id.clone(), at);
        Ok(())
    }
}
