//! The polling state machine.
//!
//! A [`PollSession`] drives repeated [`StatusFetcher`] calls for one
//! operation until a terminal status, cancellation, timeout or the
//! attempt cap is reached:
//!
//! ```text
//! Initiated -> Waiting <-> Fetching -> Completed | Failed | TimedOut
//!                                      | AttemptsExceeded | Cancelled
//! ```
//!
//! Each cycle checks the terminal preconditions first, then increments
//! the attempt counter, waits (cancellably) for the backoff delay and
//! performs one fetch. Transient fetch errors are logged and the loop
//! continues; everything else resolves the session.

use std::sync::Arc;
use std::time::Duration;

use hooktrack_core::backoff::next_delay;
use hooktrack_core::error::PollError;
use hooktrack_core::polling::PollingConfig;
use hooktrack_core::status::{RunState, DEFAULT_REMOTE_ERROR};
use hooktrack_core::types::{OperationHandle, PersistedHandle};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::events::TrackerEvent;
use crate::fetcher::{FetchError, StatusFetcher};
use crate::store::{ClearPolicy, HandleStore};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    /// Created from a fresh invocation; nothing persisted or fetched yet.
    Initiated,
    Waiting,
    Fetching,
    Completed,
    Failed,
    TimedOut,
    AttemptsExceeded,
    Cancelled,
}

impl PollState {
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            PollState::Initiated | PollState::Waiting | PollState::Fetching
        )
    }
}

/// Polling state for one operation.
///
/// Owned exclusively by the task running it; sessions share nothing
/// but the cancellation token handed to [`run`](Self::run).
pub struct PollSession {
    handle: OperationHandle,
    config: PollingConfig,
    attempt: u32,
    started_at: Instant,
    state: PollState,
    store: Option<(Arc<dyn HandleStore>, ClearPolicy)>,
    events: Option<broadcast::Sender<TrackerEvent>>,
}

impl PollSession {
    /// Start tracking an operation the invoker reported as running.
    pub fn new(handle: OperationHandle, config: PollingConfig) -> Self {
        Self {
            handle,
            config,
            attempt: 0,
            started_at: Instant::now(),
            state: PollState::Initiated,
            store: None,
            events: None,
        }
    }

    /// Rebuild a session from a persisted handle.
    ///
    /// The session starts directly in [`PollState::Waiting`] with a fresh
    /// attempt counter and a fresh timeout window.
    pub fn resume(persisted: PersistedHandle, config: PollingConfig) -> Self {
        Self {
            state: PollState::Waiting,
            ..Self::new(persisted.handle, config)
        }
    }

    /// Persist the handle when polling starts and clear it according to
    /// `policy` once the session resolves.
    pub fn with_store(mut self, store: Arc<dyn HandleStore>, policy: ClearPolicy) -> Self {
        self.store = Some((store, policy));
        self
    }

    /// Publish lifecycle and progress events on `tx`.
    pub fn with_events(mut self, tx: broadcast::Sender<TrackerEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn handle(&self) -> &OperationHandle {
        &self.handle
    }

    pub fn config(&self) -> &PollingConfig {
        &self.config
    }

    /// Number of fetches started so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Run the loop to a terminal outcome.
    ///
    /// Returns the remote result on completion. Every other outcome is a
    /// [`PollError`] whose kind tells timeout, attempt cap, cancellation,
    /// remote failure and missing wiring apart.
    pub async fn run<F>(mut self, fetcher: &F, cancel: &CancellationToken) -> Result<Value, PollError>
    where
        F: StatusFetcher + ?Sized,
    {
        if let Err(e) = fetcher.check_wiring(&self.handle) {
            tracing::error!(operation_id = %self.handle.id, error = %e, "Cannot start polling");
            let outcome = Err(PollError::MissingWiring {
                operation_id: Some(self.handle.id.clone()),
                reason: e.to_string(),
            });
            return self.finish(outcome).await;
        }

        if self.state == PollState::Initiated {
            self.persist().await;
            self.state = PollState::Waiting;
        }

        tracing::info!(
            operation_id = %self.handle.id,
            base_interval_ms = self.config.base_interval.as_millis() as u64,
            timeout_ms = self.config.timeout.as_millis() as u64,
            max_attempts = ?self.config.max_attempts,
            backoff = self.config.backoff_mode.as_str(),
            "Polling started",
        );
        self.emit(TrackerEvent::PollingStarted {
            operation_id: self.handle.id.clone(),
        });

        let outcome = self.poll_loop(fetcher, cancel).await;
        self.finish(outcome).await
    }

    async fn poll_loop<F>(&mut self, fetcher: &F, cancel: &CancellationToken) -> Result<Value, PollError>
    where
        F: StatusFetcher + ?Sized,
    {
        loop {
            // Terminal preconditions, before any work.
            if cancel.is_cancelled() {
                return Err(self.cancelled());
            }
            let elapsed = self.elapsed();
            if elapsed >= self.config.timeout {
                return Err(self.timed_out());
            }
            if let Some(max) = self.config.max_attempts {
                if self.attempt >= max {
                    self.state = PollState::AttemptsExceeded;
                    return Err(PollError::AttemptsExceeded {
                        operation_id: self.handle.id.clone(),
                        attempts: self.attempt,
                    });
                }
            }

            self.attempt += 1;
            let delay = next_delay(self.attempt, &self.config);
            let remaining = self.config.timeout - elapsed;
            // Never start a fetch at or past the deadline: sleep out the
            // remainder instead and resolve as timed out.
            let deadline_first = delay >= remaining;
            let wait = if deadline_first { remaining } else { delay };

            self.state = PollState::Waiting;
            tracing::debug!(
                operation_id = %self.handle.id,
                attempt = self.attempt,
                delay_ms = wait.as_millis() as u64,
                "Waiting before status check",
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(self.cancelled()),
                _ = tokio::time::sleep(wait) => {}
            }

            if deadline_first {
                return Err(self.timed_out());
            }

            self.state = PollState::Fetching;
            let fetched = fetcher.fetch(&self.handle).await;

            // A fetch in flight is not aborted, but its result is dropped
            // once cancellation has been requested.
            if cancel.is_cancelled() {
                return Err(self.cancelled());
            }

            match fetched {
                Ok(record) => match record.state {
                    RunState::Running => {
                        tracing::debug!(
                            operation_id = %self.handle.id,
                            attempt = self.attempt,
                            progress = ?record.progress,
                            "Operation still running",
                        );
                        if let Some(fraction) = record.progress {
                            self.emit(TrackerEvent::Progress {
                                operation_id: self.handle.id.clone(),
                                attempt: self.attempt,
                                fraction,
                            });
                        }
                    }
                    RunState::Complete => {
                        self.state = PollState::Completed;
                        return Ok(record.result.unwrap_or(Value::Null));
                    }
                    RunState::Error => {
                        self.state = PollState::Failed;
                        return Err(PollError::Remote {
                            operation_id: Some(self.handle.id.clone()),
                            message: record
                                .error_message
                                .unwrap_or_else(|| DEFAULT_REMOTE_ERROR.to_string()),
                        });
                    }
                },
                Err(e) if e.is_transient() => {
                    tracing::warn!(
                        operation_id = %self.handle.id,
                        attempt = self.attempt,
                        error = %e,
                        "Status check failed, will retry",
                    );
                }
                Err(FetchError::MissingWiring(reason)) => {
                    self.state = PollState::Failed;
                    return Err(PollError::MissingWiring {
                        operation_id: Some(self.handle.id.clone()),
                        reason,
                    });
                }
                Err(e) => {
                    self.state = PollState::Failed;
                    return Err(PollError::Remote {
                        operation_id: Some(self.handle.id.clone()),
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    fn cancelled(&mut self) -> PollError {
        self.state = PollState::Cancelled;
        PollError::Cancelled {
            operation_id: self.handle.id.clone(),
        }
    }

    fn timed_out(&mut self) -> PollError {
        self.state = PollState::TimedOut;
        PollError::TimedOut {
            operation_id: self.handle.id.clone(),
            elapsed: self.elapsed(),
        }
    }

    /// Log the outcome, publish it, and apply the clear policy.
    async fn finish(self, outcome: Result<Value, PollError>) -> Result<Value, PollError> {
        match &outcome {
            Ok(_) => {
                tracing::info!(
                    operation_id = %self.handle.id,
                    attempts = self.attempt,
                    elapsed_ms = self.elapsed().as_millis() as u64,
                    "Operation completed",
                );
                self.emit(TrackerEvent::Completed {
                    operation_id: self.handle.id.clone(),
                    attempts: self.attempt,
                });
            }
            Err(e) => {
                if e.is_cancellation() {
                    tracing::info!(operation_id = %self.handle.id, "Polling cancelled");
                } else {
                    tracing::error!(
                        operation_id = %self.handle.id,
                        attempts = self.attempt,
                        kind = e.kind().as_str(),
                        error = %e,
                        "Polling ended without result",
                    );
                }
                self.emit(TrackerEvent::Failed {
                    operation_id: self.handle.id.clone(),
                    kind: e.kind(),
                    message: e.to_string(),
                });
            }
        }

        if let Some((store, policy)) = &self.store {
            if policy.should_clear(&outcome) {
                if let Err(e) = store.clear(&self.handle.id).await {
                    tracing::warn!(
                        operation_id = %self.handle.id,
                        error = %e,
                        "Failed to clear persisted handle",
                    );
                }
            }
        }

        outcome
    }

    async fn persist(&self) {
        let Some((store, _)) = &self.store else {
            return;
        };
        let record = PersistedHandle::new(self.handle.clone(), RunState::Running);
        if let Err(e) = store.save(&record).await {
            tracing::warn!(
                operation_id = %self.handle.id,
                error = %e,
                "Failed to persist handle, tracking continues without resume support",
            );
        }
    }

    fn emit(&self, event: TrackerEvent) {
        if let Some(tx) = &self.events {
            // Ignore the SendError, it only means there are zero receivers.
            let _ = tx.send(event);
        }
    }
}
