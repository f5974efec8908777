//! Shared task registry for supervised background work.
//!
//! Centralizes task tracking for change-driven loops and aggregation waiters.
//! Tasks observe a shared stopping signal; `wait` joins them and reports the
//! first failure.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use beacon_core::effects::task::{CancellationToken, TaskSpawner};
use beacon_core::BeaconError;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::Instant;

use crate::config::RuntimeConfig;

/// Tracks spawned tasks and broadcasts a shared stopping signal.
#[derive(Debug)]
pub struct TaskRegistry {
    shutdown_tx: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    /// Tasks currently being joined by `wait`.
    joining: Mutex<Vec<AbortHandle>>,
    first_error: Arc<Mutex<Option<BeaconError>>>,
    stop_grace: Duration,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::with_stop_grace(RuntimeConfig::default().stop_grace())
    }

    /// Build a registry from a validated configuration.
    pub fn with_config(config: &RuntimeConfig) -> Result<Self, BeaconError> {
        config.validate()?;
        Ok(Self::with_stop_grace(config.stop_grace()))
    }

    fn with_stop_grace(stop_grace: Duration) -> Self {
        let (shutdown_tx, _shutdown_rx) = watch::channel(false);
        Self {
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
            joining: Mutex::new(Vec::new()),
            first_error: Arc::new(Mutex::new(None)),
            stop_grace,
        }
    }

    pub fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.track(tokio::spawn(fut));
    }

    pub fn spawn_cancellable<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let stopping = until_stopping(self.shutdown_tx.subscribe());
        self.track(tokio::spawn(async move {
            tokio::select! {
                _ = stopping => {}
                _ = fut => {}
            }
        }));
    }

    /// Spawn a task whose failure should be reported by [`wait`](Self::wait).
    ///
    /// Only the first error is kept.
    pub fn spawn_fallible<F>(&self, fut: F)
    where
        F: Future<Output = Result<(), BeaconError>> + Send + 'static,
    {
        let first_error = self.first_error.clone();
        self.track(tokio::spawn(async move {
            if let Err(err) = fut.await {
                record_failure(&first_error, err);
            }
        }));
    }

    /// Enter the stopping state. Every token from
    /// [`cancellation_token`](Self::cancellation_token) fires; running tasks
    /// are left to finish on their own.
    pub fn stop(&self) {
        if !self.shutdown_tx.send_replace(true) {
            tracing::debug!(tasks = self.handles.lock().len(), "task registry stopping");
        }
    }

    pub fn is_stopping(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Join every tracked task, including ones spawned while waiting, and
    /// return the first reported failure.
    pub async fn wait(&self) -> Result<(), BeaconError> {
        self.join_all(None).await
    }

    /// Stop, give tasks the configured grace period to finish, then abort
    /// whatever is left and join it.
    pub async fn stop_and_wait(&self) -> Result<(), BeaconError> {
        self.stop();
        self.join_all(Some(Instant::now() + self.stop_grace)).await
    }

    /// Stop and abort every tracked task immediately.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send_replace(true);
        for handle in self.handles.lock().drain(..) {
            handle.abort();
        }
        for handle in self.joining.lock().drain(..) {
            handle.abort();
        }
    }

    pub fn cancellation_token(&self) -> Arc<dyn CancellationToken> {
        Arc::new(TaskRegistryCancellationToken {
            shutdown_rx: self.shutdown_tx.subscribe(),
        })
    }

    /// Number of tracked tasks that have not finished yet.
    pub fn active_tasks(&self) -> usize {
        let mut handles = self.handles.lock();
        handles.retain(|handle| !handle.is_finished());
        handles.len()
    }

    /// Join tracked tasks. With a deadline, tasks still running when it
    /// passes are aborted, then joined.
    async fn join_all(&self, deadline: Option<Instant>) -> Result<(), BeaconError> {
        let mut aborted = 0usize;
        loop {
            let handles = std::mem::take(&mut *self.handles.lock());
            if handles.is_empty() {
                break;
            }
            self.joining
                .lock()
                .extend(handles.iter().map(JoinHandle::abort_handle));
            for mut handle in handles {
                let joined = match deadline {
                    Some(deadline) => match tokio::time::timeout_at(deadline, &mut handle).await {
                        Ok(joined) => joined,
                        Err(_) => {
                            aborted += 1;
                            handle.abort();
                            handle.await
                        }
                    },
                    None => handle.await,
                };
                if let Err(err) = joined {
                    if err.is_panic() {
                        record_failure(
                            &self.first_error,
                            BeaconError::internal(format!("task panicked: {err}")),
                        );
                    }
                }
            }
            self.joining.lock().retain(|handle| !handle.is_finished());
        }
        if aborted > 0 {
            tracing::warn!(
                aborted,
                grace_ms = self.stop_grace.as_millis() as u64,
                "tasks still running after grace period were aborted"
            );
        }
        match self.first_error.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut handles = self.handles.lock();
        // Aggregation waiters are spawned per call; drop finished ones so the
        // list stays bounded by live tasks.
        handles.retain(|handle| !handle.is_finished());
        handles.push(handle);
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TaskRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Resolves once the registry enters the stopping state or is dropped.
async fn until_stopping(mut shutdown_rx: watch::Receiver<bool>) {
    let _closed = shutdown_rx.wait_for(|stopping| *stopping).await.is_err();
}

fn record_failure(slot: &Mutex<Option<BeaconError>>, err: BeaconError) {
    tracing::warn!(error = %err, "supervised task failed");
    let mut slot = slot.lock();
    if slot.is_none() {
        *slot = Some(err);
    }
}

#[derive(Debug)]
struct TaskRegistryCancellationToken {
    shutdown_rx: watch::Receiver<bool>,
}

#[async_trait::async_trait]
impl CancellationToken for TaskRegistryCancellationToken {
    async fn cancelled(&self) {
        until_stopping(self.shutdown_rx.clone()).await;
    }

    fn is_cancelled(&self) -> bool {
        *self.shutdown_rx.borrow()
    }
}

impl TaskSpawner for TaskRegistry {
    fn spawn(&self, fut: BoxFuture<'static, ()>) {
        TaskRegistry::spawn(self, fut);
    }

    fn spawn_cancellable(&self, fut: BoxFuture<'static, ()>, token: Arc<dyn CancellationToken>) {
        let stopping = until_stopping(self.shutdown_tx.subscribe());
        self.track(tokio::spawn(async move {
            tokio::select! {
                _ = stopping => {}
                _ = token.cancelled() => {}
                _ = fut => {}
            }
        }));
    }

    fn cancellation_token(&self) -> Arc<dyn CancellationToken> {
        TaskRegistry::cancellation_token(self)
    }
}
