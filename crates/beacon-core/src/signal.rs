//! One-shot signals
//!
//! A [`Trigger`] owns the right to fire; any number of [`Signal`] observers
//! can check or await it. The transition from unfired to fired happens
//! exactly once and is permanent, which is what lets a `Var` hand the same
//! signal to every reader of one generation.
//!
//! Built on `tokio::sync::watch` so waiting needs no executor-specific
//! machinery: the channel value is the fired flag and is only ever moved
//! from `false` to `true`.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::effects::task::CancellationToken;

/// Firing side of a one-shot signal.
pub struct Trigger {
    state: Arc<watch::Sender<bool>>,
}

impl Trigger {
    /// Mint a fresh, unfired signal.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            state: Arc::new(tx),
        }
    }

    /// Hand out an observer for this trigger.
    pub fn signal(&self) -> Signal {
        Signal {
            state: self.state.clone(),
        }
    }

    /// Fire the signal, waking every waiter.
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn fire(&self) -> bool {
        self.state.send_if_modified(|fired| {
            if *fired {
                false
            } else {
                *fired = true;
                true
            }
        })
    }

    /// Whether the signal has been fired.
    pub fn is_fired(&self) -> bool {
        *self.state.borrow()
    }
}

impl Default for Trigger {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trigger")
            .field("fired", &self.is_fired())
            .finish()
    }
}

/// Observer side of a one-shot signal.
///
/// Cloning is cheap and every clone observes the same transition.
#[derive(Clone)]
pub struct Signal {
    state: Arc<watch::Sender<bool>>,
}

impl Signal {
    /// A signal that has already fired.
    pub fn fired_now() -> Self {
        let (tx, _rx) = watch::channel(true);
        Self {
            state: Arc::new(tx),
        }
    }

    /// Non-blocking check.
    pub fn is_fired(&self) -> bool {
        *self.state.borrow()
    }

    /// Resolves once the signal has fired; immediately if it already has.
    ///
    /// The returned future owns what it needs, so it can be moved into a
    /// spawned task.
    pub fn fired(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.state.subscribe();
        async move {
            // A closed channel means the trigger was dropped unfired, so this
            // generation can never end.
            let closed = rx.wait_for(|fired| *fired).await.is_err();
            if closed {
                futures::future::pending::<()>().await;
            }
        }
    }

    /// Whether both handles observe the same trigger.
    pub fn ptr_eq(&self, other: &Signal) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("fired", &self.is_fired())
            .finish()
    }
}

/// A signal doubles as a cancellation source: firing it cancels.
#[async_trait]
impl CancellationToken for Signal {
    async fn cancelled(&self) {
        self.fired().await;
    }

    fn is_cancelled(&self) -> bool {
        self.is_fired()
    }
}

/// Fires the wrapped trigger when dropped.
///
/// Background waiters hold one of these so their result resolves even if the
/// task is aborted before it completes.
pub(crate) struct FireOnDrop(pub(crate) Trigger);

impl Drop for FireOnDrop {
    fn drop(&mut self) {
        self.0.fire();
    }
}
