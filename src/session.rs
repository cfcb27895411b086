//! Capture session tokens
//!
//! Scroll position is shared, mutable state of the view. Only the most
//! recently started session may scroll it: starting a session invalidates the
//! previous one, and tearing the view down invalidates the live one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Hands out session tokens and tracks which one is current.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    generation: Arc<AtomicU64>,
    current: Arc<Mutex<Option<CancellationToken>>>,
}

/// Proof of ownership of the view's scroll position for one capture attempt.
#[derive(Debug, Clone)]
pub struct SessionToken {
    id: u64,
    generation: Arc<AtomicU64>,
    cancel: CancellationToken,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new session, cancelling whichever one was in flight.
    pub fn begin(&self) -> SessionToken {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = current.take() {
            previous.cancel();
        }
        let id = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();
        *current = Some(cancel.clone());
        log::debug!("capture session {} started", id);
        SessionToken {
            id,
            generation: self.generation.clone(),
            cancel,
        }
    }

    /// The hosting view is going away: cancel the live session, if any.
    pub fn teardown(&self) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(token) = current.take() {
            log::debug!("tearing down capture session {}", self.generation.load(Ordering::SeqCst));
            token.cancel();
        }
    }
}

impl SessionToken {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// True while this session is the current one and has not been cancelled.
    pub fn is_live(&self) -> bool {
        !self.cancel.is_cancelled() && self.generation.load(Ordering::SeqCst) == self.id
    }

    /// Resolves when the session is cancelled.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}
