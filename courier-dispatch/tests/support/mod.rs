//! Test doubles for dispatch integration tests
#![allow(dead_code)] // Not every test file uses every helper

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courier_dispatch::{
    ContactError, ContactStore, FieldMapping, Mailer, QueueBuilder, RecipientId, RecipientQueue,
    ResolveContext, SendError, SendRequest, SessionControl, SourceKind, SourceRecord,
};
use parking_lot::Mutex;
use serde_json::json;
use tokio::time::Instant;

/// A send as observed by [`MockMailer`]
#[derive(Debug, Clone)]
pub struct SendCall {
    pub id: RecipientId,
    pub email: String,
    pub template_id: String,
    pub from: Option<String>,
    pub called_at: Instant,
    pub returned_at: Instant,
}

/// Scripted mailer that records call and return instants
///
/// Each recipient id can be given a queue of outcomes; once a queue runs dry
/// (or for ids without one) sends succeed.
#[derive(Debug, Default)]
pub struct MockMailer {
    outcomes: Mutex<HashMap<RecipientId, VecDeque<Result<(), SendError>>>>,
    calls: Mutex<Vec<SendCall>>,
    latency: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    on_send: Mutex<Vec<(usize, SessionControl, ControlAction)>>,
}

#[derive(Debug, Clone, Copy)]
pub enum ControlAction {
    Cancel,
    Pause,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every send takes `latency` before it returns
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    pub fn script(self, id: &str, outcome: Result<(), SendError>) -> Self {
        self.outcomes
            .lock()
            .entry(id.into())
            .or_default()
            .push_back(outcome);
        self
    }

    /// Fire `action` on `control` while the `nth` (1-based) send is in flight
    pub fn during_send(self, nth: usize, control: &SessionControl, action: ControlAction) -> Self {
        self.on_send.lock().push((nth, control.clone(), action));
        self
    }

    pub fn calls(&self) -> Vec<SendCall> {
        self.calls.lock().clone()
    }

    pub fn sent_to(&self) -> Vec<String> {
        self.calls.lock().iter().map(|call| call.email.clone()).collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send(&self, request: SendRequest<'_>) -> Result<(), SendError> {
        let called_at = Instant::now();
        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        let nth = self.calls.lock().len() + 1;
        for (_, control, action) in self.on_send.lock().iter().filter(|(n, ..)| *n == nth) {
            match action {
                ControlAction::Cancel => control.cancel(),
                ControlAction::Pause => control.pause(),
            }
        }

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let outcome = self
            .outcomes
            .lock()
            .get_mut(&request.recipient.id)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Ok(()));

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.calls.lock().push(SendCall {
            id: request.recipient.id.clone(),
            email: request.recipient.email.clone(),
            template_id: request.template_id.to_string(),
            from: request.from.map(str::to_string),
            called_at,
            returned_at: Instant::now(),
        });

        outcome
    }
}

/// Contact store that cannot be reached
#[derive(Debug, Default)]
pub struct BrokenContactStore;

#[async_trait]
impl ContactStore for BrokenContactStore {
    async fn read_last_contact(
        &self,
        _id: &RecipientId,
    ) -> Result<Option<DateTime<Utc>>, ContactError> {
        Err(ContactError::Unavailable("connection refused".to_string()))
    }

    async fn clear_last_contact(&self, _id: &RecipientId) -> Result<(), ContactError> {
        Err(ContactError::Unavailable("connection refused".to_string()))
    }

    async fn mark_contacted(&self, _id: &RecipientId, _at: DateTime<Utc>) -> Result<(), ContactError> {
        Err(ContactError::Unavailable("connection refused".to_string()))
    }
}

pub fn source(id: &str, email: &str, last_contact: Option<DateTime<Utc>>) -> SourceRecord {
    let mut fields = serde_json::Map::new();
    fields.insert("first_name".to_string(), json!(format!("Name {id}")));

    SourceRecord {
        id: id.into(),
        kind: SourceKind::Lead,
        email: Some(email.to_string()),
        last_contact,
        fields,
    }
}

pub fn queue(records: Vec<SourceRecord>) -> RecipientQueue {
    QueueBuilder::new(
        vec![
            FieldMapping::field("name", "first_name"),
            FieldMapping::context("company", "company"),
        ],
        ResolveContext::new().with("company", json!("Acme")),
    )
    .build(records)
}

/// Three recipients: `1@example.com`, `2@example.com`, `3@example.com`
pub fn three_recipients() -> RecipientQueue {
    queue(vec![
        source("1", "1@example.com", None),
        source("2", "2@example.com", None),
        source("3", "3@example.com", None),
    ])
}

pub fn shared<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
