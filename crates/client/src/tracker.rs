//! Trigger-and-track orchestration.
//!
//! [`Tracker`] owns the webhook invoker, the configured status fetcher
//! and an optional handle store. It invokes operations, runs one
//! [`PollSession`] per pending operation and keeps a cancellation token
//! per active session so that individual operations (or everything, on
//! shutdown) can be cancelled.
//!
//! Lifecycle events are broadcast via a [`tokio::sync::broadcast`]
//! channel. Call [`Tracker::subscribe`] to receive them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use hooktrack_core::error::{CoreError, PollError};
use hooktrack_core::invocation::Invocation;
use hooktrack_core::polling::PollingConfig;
use hooktrack_core::status::StatusRecord;
use hooktrack_core::types::{OperationHandle, PersistedHandle};
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;

use crate::api::{OperationRequest, WebhookApi};
use crate::events::TrackerEvent;
use crate::fetcher::{FetchError, StatusFetcher};
use crate::session::PollSession;
use crate::store::{ClearPolicy, HandleStore, StoreError};

/// Broadcast channel capacity for tracker events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Bookkeeping for a single running session.
struct ActiveSession {
    /// Distinguishes sessions started for the same operation id.
    session_id: u64,
    /// Per-session cancellation token (child of the master token).
    cancel: CancellationToken,
}

/// Outcome of one resumed operation: its id and how tracking ended.
pub type ResumeOutcome = (String, Result<Value, PollError>);

/// Invokes webhook operations and tracks them to completion.
///
/// Safe to share behind an `Arc`; every operation runs on the caller's
/// task and only the registry of cancellation tokens is shared.
pub struct Tracker {
    api: WebhookApi,
    fetcher: Arc<dyn StatusFetcher>,
    store: Option<Arc<dyn HandleStore>>,
    config: PollingConfig,
    clear_policy: ClearPolicy,
    event_tx: broadcast::Sender<TrackerEvent>,
    /// Running sessions by operation id.
    active: RwLock<HashMap<String, ActiveSession>>,
    next_session: AtomicU64,
    /// Master cancellation token -- cancelled during shutdown.
    cancel: CancellationToken,
}

// Needed by `assert_matches!` on `Result<Tracker, _>` in tests.
#[cfg(test)]
impl std::fmt::Debug for Tracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker").finish_non_exhaustive()
    }
}

impl Tracker {
    /// Build a tracker. Fails when `config` is not usable by the loop.
    pub fn new(
        api: WebhookApi,
        fetcher: Arc<dyn StatusFetcher>,
        config: PollingConfig,
    ) -> Result<Self, CoreError> {
        config.validate()?;
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            api,
            fetcher,
            store: None,
            config,
            clear_policy: ClearPolicy::default(),
            event_tx,
            active: RwLock::new(HashMap::new()),
            next_session: AtomicU64::new(0),
            cancel: CancellationToken::new(),
        })
    }

    /// Persist handles of pending operations in `store`.
    pub fn with_store(mut self, store: Arc<dyn HandleStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_clear_policy(mut self, policy: ClearPolicy) -> Self {
        self.clear_policy = policy;
        self
    }

    /// Subscribe to lifecycle and progress events.
    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.event_tx.subscribe()
    }

    pub fn config(&self) -> &PollingConfig {
        &self.config
    }

    pub fn store(&self) -> Option<&Arc<dyn HandleStore>> {
        self.store.as_ref()
    }

    /// Invoke the webhook and, when the operation continues remotely,
    /// poll it until it resolves.
    pub async fn trigger(&self, request: &OperationRequest) -> Result<Value, PollError> {
        match self.api.invoke(request).await? {
            Invocation::Immediate(value) => {
                tracing::info!("Webhook returned result directly");
                Ok(value)
            }
            Invocation::Pending { handle, initial } => {
                tracing::info!(
                    operation_id = %handle.id,
                    status_location = ?handle.status_location,
                    progress = ?initial.progress,
                    "Operation accepted, tracking",
                );
                self.emit(TrackerEvent::Invoked {
                    operation_id: handle.id.clone(),
                });
                self.track(PollSession::new(handle, self.config.clone())).await
            }
        }
    }

    /// Resume tracking an operation from a persisted handle.
    ///
    /// The attempt counter and the timeout window start over.
    pub async fn resume(&self, persisted: PersistedHandle) -> Result<Value, PollError> {
        tracing::info!(
            operation_id = %persisted.handle.id,
            saved_at = %persisted.saved_at,
            "Resuming tracking",
        );
        self.emit(TrackerEvent::Resumed {
            operation_id: persisted.handle.id.clone(),
        });
        self.track(PollSession::resume(persisted, self.config.clone()))
            .await
    }

    /// Resume the most recently persisted operation, if any.
    pub async fn resume_latest(&self) -> Result<Option<ResumeOutcome>, StoreError> {
        let Some(store) = &self.store else {
            return Ok(None);
        };
        let Some(persisted) = store.load().await? else {
            return Ok(None);
        };
        let id = persisted.handle.id.clone();
        Ok(Some((id, self.resume(persisted).await)))
    }

    /// Resume every persisted operation concurrently.
    ///
    /// Returns one outcome per stored handle, in store order. Without a
    /// store there is nothing to resume.
    pub async fn resume_all(&self) -> Result<Vec<ResumeOutcome>, StoreError> {
        let Some(store) = &self.store else {
            return Ok(Vec::new());
        };
        let pending = store.pending().await?;
        tracing::info!(count = pending.len(), "Resuming persisted operations");

        let runs = pending.into_iter().map(|persisted| async move {
            let id = persisted.handle.id.clone();
            (id, self.resume(persisted).await)
        });
        Ok(join_all(runs).await)
    }

    /// Perform a single status check without starting a session.
    pub async fn check_status(&self, handle: &OperationHandle) -> Result<StatusRecord, FetchError> {
        self.fetcher.check_wiring(handle)?;
        self.fetcher.fetch(handle).await
    }

    /// Request cancellation of one operation.
    ///
    /// Returns `false` when no session with that id is running; that
    /// includes operations which already resolved.
    pub async fn cancel(&self, operation_id: &str) -> bool {
        match self.active.read().await.get(operation_id) {
            Some(session) => {
                tracing::info!(operation_id, "Cancelling operation");
                session.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Ids of operations currently being polled.
    pub async fn active_operations(&self) -> Vec<String> {
        self.active.read().await.keys().cloned().collect()
    }

    /// Cancel every running session. Sessions resolve as cancelled on
    /// their own tasks; persisted handles are kept for a later resume.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down tracker");
        self.cancel.cancel();
        let active = self.active.read().await;
        for operation_id in active.keys() {
            tracing::info!(operation_id = %operation_id, "Stopping session");
        }
    }

    // ---- private helpers ----

    /// Run a session under a child token registered for its operation.
    async fn track(&self, session: PollSession) -> Result<Value, PollError> {
        let session = session.with_events(self.event_tx.clone());
        let session = match &self.store {
            Some(store) => session.with_store(Arc::clone(store), self.clear_policy),
            None => session,
        };

        let operation_id = session.handle().id.clone();
        let session_id = self.next_session.fetch_add(1, Ordering::Relaxed);
        let token = self.cancel.child_token();
        {
            let registered = ActiveSession {
                session_id,
                cancel: token.clone(),
            };
            let mut active = self.active.write().await;
            if let Some(previous) = active.insert(operation_id.clone(), registered) {
                tracing::warn!(
                    operation_id = %operation_id,
                    "Operation already tracked, cancelling previous session",
                );
                previous.cancel.cancel();
            }
        }

        let outcome = session.run(self.fetcher.as_ref(), &token).await;

        let mut active = self.active.write().await;
        // A newer session for the same id may have replaced ours.
        if active
            .get(&operation_id)
            .is_some_and(|current| current.session_id == session_id)
        {
            active.remove(&operation_id);
        }

        outcome
    }

    fn emit(&self, event: TrackerEvent) {
        // Ignore the SendError, it only means there are zero receivers.
        let _ = self.event_tx.send(event);
    }
}
