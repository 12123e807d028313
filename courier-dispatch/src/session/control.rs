//! Cooperative cancel / pause signalling for a running session

use std::sync::Arc;

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ControlState {
    paused: bool,
    cancelled: bool,
}

/// Control handle shared between a session and its operators
///
/// Every clone drives the same session. Cancellation is one-directional;
/// pause and resume are last-write-wins. The session polls these flags at the
/// start of every recipient and on every delay tick, and waits on the
/// underlying channel instead of spinning while paused.
#[derive(Debug, Clone)]
pub struct SessionControl {
    state: Arc<watch::Sender<ControlState>>,
}

impl Default for SessionControl {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionControl {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _receiver) = watch::channel(ControlState::default());
        Self {
            state: Arc::new(sender),
        }
    }

    /// Stop the session at its next poll point. An in-flight send still
    /// completes and is recorded.
    pub fn cancel(&self) {
        self.state
            .send_if_modified(|state| !std::mem::replace(&mut state.cancelled, true));
    }

    pub fn pause(&self) {
        self.state
            .send_if_modified(|state| !std::mem::replace(&mut state.paused, true));
    }

    pub fn resume(&self) {
        self.state
            .send_if_modified(|state| std::mem::replace(&mut state.paused, false));
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.borrow().cancelled
    }

    pub fn is_paused(&self) -> bool {
        self.state.borrow().paused
    }

    /// Suspend until the session is resumed or cancelled.
    ///
    /// Returns `true` if the wait ended because of cancellation.
    pub async fn wait_while_paused(&self) -> bool {
        let mut receiver = self.state.subscribe();
        let state = receiver.wait_for(|state| !state.paused || state.cancelled).await;

        match state {
            Ok(state) => state.cancelled,
            Err(_) => true,
        }
    }

    /// Resolves once the session is cancelled
    pub async fn cancelled(&self) {
        let mut receiver = self.state.subscribe();
        // The sender lives as long as `self`, so this only ends on cancellation
        let _cancelled = receiver.wait_for(|state| state.cancelled).await;
    }
}
