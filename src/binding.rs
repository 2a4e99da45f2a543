//! Shared handle exposing one `AuthSession` to consumers.
//!
//! SYSTEM CONTEXT
//! ==============
//! Views that care about login state hold a `SessionBinding` (usually in an
//! `Arc`) instead of reaching for a global. The first `observe` runs the
//! session's startup revalidation; later observers, including ones that come
//! and go, reuse that result. Consumers that need to re-render subscribe to a
//! `watch` channel of snapshots.

#[cfg(test)]
#[path = "binding_test.rs"]
mod tests;

use std::sync::Arc;

use tokio::sync::{OnceCell, watch};

use crate::error::Result;
use crate::session::{AuthSession, SessionSnapshot};

pub struct SessionBinding {
    session: Arc<AuthSession>,
    init: OnceCell<bool>,
    tx: watch::Sender<SessionSnapshot>,
}

impl SessionBinding {
    #[must_use]
    pub fn new(session: Arc<AuthSession>) -> Self {
        let (tx, _rx) = watch::channel(session.snapshot());
        Self { session, init: OnceCell::new(), tx }
    }

    #[must_use]
    pub fn session(&self) -> &Arc<AuthSession> {
        &self.session
    }

    /// Receiver that wakes whenever the published snapshot changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.tx.subscribe()
    }

    /// Whether startup revalidation has completed.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.init.initialized()
    }

    /// Current snapshot, running `init` first if nobody has yet.
    ///
    /// Concurrent first observers wait on the same `init`.
    pub async fn observe(&self) -> SessionSnapshot {
        self.init
            .get_or_init(|| async {
                let connected = self.session.init().await;
                tracing::debug!(connected, "auth session initialized");
                self.publish();
                connected
            })
            .await;
        self.session.snapshot()
    }

    /// # Errors
    ///
    /// See [`AuthSession::connect`].
    pub async fn connect(&self) -> Result<bool> {
        let result = self.session.connect().await;
        self.publish();
        result
    }

    /// # Errors
    ///
    /// See [`AuthSession::check`].
    pub async fn check(&self) -> Result<bool> {
        let result = self.session.check().await;
        self.publish();
        result
    }

    pub async fn disconnect(&self) -> bool {
        let result = self.session.disconnect().await;
        self.publish();
        result
    }

    /// # Errors
    ///
    /// See [`AuthSession::balance`].
    pub async fn balance(&self) -> Result<f64> {
        self.session.balance().await
    }

    /// # Errors
    ///
    /// See [`AuthSession::top_up_balance`].
    pub async fn top_up_balance(&self, amount: u64) -> Result<()> {
        let result = self.session.top_up_balance(amount).await;
        self.publish();
        result
    }

    fn publish(&self) {
        let snapshot = self.session.snapshot();
        self.tx.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            *current = snapshot;
            true
        });
    }
}
