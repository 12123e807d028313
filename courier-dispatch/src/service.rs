//! Operator-facing entry points
//!
//! [`DispatchService`] owns the collaborators (mailer, contact store, daily
//! counter) and hands out one [`DispatchSession`] at a time. While a session is
//! running, cancel/pause/resume drive it; once it has finished, its records
//! stay available for display and for the reset/resend recovery flow.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use courier_common::internal;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::{
    config::DispatchConfig,
    contacts::ContactStore,
    error::SessionError,
    mailer::Mailer,
    queue::RecipientQueue,
    recovery::{RecoveryFlow, RecoveryOutcome},
    session::{DispatchSession, ProgressSink, SessionControl},
    throttle::DailySendCounter,
    tracker::StatusTracker,
    types::{EmailStatusRecord, RecipientId, SendStatus, SessionId, SessionResult, StatusCounts},
};

/// Which recovery actions a status display should offer for a record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActionAffordances {
    pub reset: bool,
    pub resend: bool,
}

impl ActionAffordances {
    #[must_use]
    pub const fn for_status(status: SendStatus) -> Self {
        Self {
            reset: matches!(status, SendStatus::Failed | SendStatus::RateLimited),
            resend: matches!(status, SendStatus::Reset),
        }
    }
}

/// The most recent session's handles
#[derive(Debug, Clone)]
struct SessionHandles {
    id: SessionId,
    tracker: StatusTracker,
    control: SessionControl,
    recovery: RecoveryFlow,
}

/// Clears the running flag however `start_session` exits, including when
/// its future is dropped mid-run
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct DispatchService {
    config: DispatchConfig,
    mailer: Arc<dyn Mailer>,
    contacts: Arc<dyn ContactStore>,
    counter: Mutex<DailySendCounter>,
    running: AtomicBool,
    current: RwLock<Option<SessionHandles>>,
}

impl std::fmt::Debug for DispatchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchService")
            .field("config", &self.config)
            .field("counter", &self.counter)
            .field("running", &self.running)
            .finish_non_exhaustive()
    }
}

impl DispatchService {
    #[must_use]
    pub fn new(
        config: DispatchConfig,
        mailer: Arc<dyn Mailer>,
        contacts: Arc<dyn ContactStore>,
    ) -> Self {
        Self::with_counter(config, mailer, contacts, DailySendCounter::new())
    }

    /// Service whose daily cap starts from an existing count
    #[must_use]
    pub fn with_counter(
        config: DispatchConfig,
        mailer: Arc<dyn Mailer>,
        contacts: Arc<dyn ContactStore>,
        counter: DailySendCounter,
    ) -> Self {
        Self {
            config,
            mailer,
            contacts,
            counter: Mutex::new(counter),
            running: AtomicBool::new(false),
            current: RwLock::new(None),
        }
    }

    pub const fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Identifier of the running or most recently finished session
    pub fn session_id(&self) -> Option<SessionId> {
        self.current.read().as_ref().map(|handles| handles.id)
    }

    /// Today's send count as seen by the throttle policy
    pub fn counter(&self) -> DailySendCounter {
        *self.counter.lock()
    }

    /// Run a batch send over `queue` and wait for it to finish.
    ///
    /// The records of any previous session are replaced.
    ///
    /// # Errors
    ///
    /// - [`SessionError::AlreadyRunning`] if another session is still active
    /// - [`SessionError::InvalidDelayRange`] if the configured delay range is
    ///   inverted
    /// - [`SessionError::MissingEmail`] or [`SessionError::DuplicateRecipient`]
    ///   for a malformed queue
    pub async fn start_session<S>(
        &self,
        queue: RecipientQueue,
        sink: &mut S,
    ) -> Result<SessionResult, SessionError>
    where
        S: ProgressSink + ?Sized,
    {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SessionError::AlreadyRunning);
        }
        let _running = RunningGuard(&self.running);

        let session = DispatchSession::new(self.config.clone(), queue.recipients().to_vec())?;

        let handles = SessionHandles {
            id: session.id(),
            tracker: session.tracker().clone(),
            control: session.control().clone(),
            recovery: RecoveryFlow::new(
                &self.config,
                session.tracker().clone(),
                Arc::new(queue),
                Arc::clone(&self.mailer),
                Arc::clone(&self.contacts),
            ),
        };
        *self.current.write() = Some(handles);

        let mut counter = *self.counter.lock();
        let result = session
            .run(self.mailer.as_ref(), self.contacts.as_ref(), &mut counter, sink)
            .await;
        *self.counter.lock() = counter;

        Ok(result)
    }

    fn active_control(&self) -> Result<SessionControl, SessionError> {
        if !self.is_running() {
            return Err(SessionError::NoSession);
        }

        self.current
            .read()
            .as_ref()
            .map(|handles| handles.control.clone())
            .ok_or(SessionError::NoSession)
    }

    /// # Errors
    ///
    /// Returns [`SessionError::NoSession`] if no session is running.
    pub fn cancel(&self) -> Result<(), SessionError> {
        self.active_control()?.cancel();
        internal!(level = INFO, "Cancellation requested");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`SessionError::NoSession`] if no session is running.
    pub fn pause(&self) -> Result<(), SessionError> {
        self.active_control()?.pause();
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`SessionError::NoSession`] if no session is running.
    pub fn resume(&self) -> Result<(), SessionError> {
        self.active_control()?.resume();
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`SessionError::NoSession`] if no session is running.
    pub fn toggle_pause(&self) -> Result<bool, SessionError> {
        let control = self.active_control()?;
        if control.is_paused() {
            control.resume();
            Ok(false)
        } else {
            control.pause();
            Ok(true)
        }
    }

    fn recovery(&self) -> Result<RecoveryFlow, SessionError> {
        if self.is_running() {
            return Err(SessionError::AlreadyRunning);
        }

        self.current
            .read()
            .as_ref()
            .map(|handles| handles.recovery.clone())
            .ok_or(SessionError::NoSession)
    }

    /// # Errors
    ///
    /// Fails with [`SessionError::AlreadyRunning`] while a session is active,
    /// [`SessionError::NoSession`] before the first one, and otherwise with
    /// the underlying [`RecoveryError`](crate::error::RecoveryError).
    pub async fn reset_recipient(&self, id: &RecipientId) -> Result<EmailStatusRecord, SessionError> {
        Ok(self.recovery()?.reset_contact(id).await?)
    }

    /// # Errors
    ///
    /// Fails with [`SessionError::AlreadyRunning`] while a session is active,
    /// [`SessionError::NoSession`] before the first one, and otherwise with
    /// the underlying [`RecoveryError`](crate::error::RecoveryError).
    pub async fn resend_recipient(&self, id: &RecipientId) -> Result<EmailStatusRecord, SessionError> {
        Ok(self.recovery()?.resend(id).await?)
    }

    /// # Errors
    ///
    /// Fails if a session is active or none has run yet. Per-record failures
    /// are reported in the returned outcomes.
    pub async fn reset_all(&self, statuses: &[SendStatus]) -> Result<Vec<RecoveryOutcome>, SessionError> {
        Ok(self.recovery()?.reset_all(statuses).await)
    }

    /// # Errors
    ///
    /// Fails if a session is active or none has run yet. Per-record failures
    /// are reported in the returned outcomes.
    pub async fn resend_all_reset(&self) -> Result<Vec<RecoveryOutcome>, SessionError> {
        Ok(self.recovery()?.resend_all_reset().await)
    }

    fn tracker(&self) -> Option<StatusTracker> {
        self.current
            .read()
            .as_ref()
            .map(|handles| handles.tracker.clone())
    }

    /// Records of the running or most recent session, in dispatch order
    pub fn records(&self) -> Vec<EmailStatusRecord> {
        self.tracker()
            .map(|tracker| tracker.records())
            .unwrap_or_default()
    }

    pub fn counts(&self) -> StatusCounts {
        self.tracker()
            .map(|tracker| tracker.counts())
            .unwrap_or_default()
    }

    /// Recovery actions available for a record; none while a session runs
    pub fn action_affordances(&self, id: &RecipientId) -> Option<ActionAffordances> {
        let status = self.tracker()?.status(id)?;

        if self.is_running() {
            Some(ActionAffordances::default())
        } else {
            Some(ActionAffordances::for_status(status))
        }
    }
}
