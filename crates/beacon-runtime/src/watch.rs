//! Change-driven control loops over a single [`Var`].
//!
//! Everything here is built from `Var::get` and the returned [`Signal`]
//! alone: read the value, compare, and if nothing interesting happened wait
//! for the signal (or cancellation, or a timer) and read again. Equal-value
//! writes still fire signals, so callers are only woken for values that
//! actually differ from the one they hold.
//!
//! [`Signal`]: beacon_core::Signal

use std::fmt;
use std::future::Future;
use std::time::Duration;

use beacon_core::{BeaconError, CancellationToken, Var};

use crate::config::RuntimeConfig;

/// Outcome of waiting for a variable to move away from a known value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observed<T> {
    /// The variable now holds this different value.
    Changed(T),
    /// The period elapsed first; carries the value the caller already had.
    TimedOut(T),
    /// Cancellation was requested first; carries the value the caller
    /// already had.
    Abandoned(T),
}

impl<T> Observed<T> {
    /// Whether the variable moved to a different value.
    pub fn is_changed(&self) -> bool {
        matches!(self, Observed::Changed(_))
    }

    /// The carried value, whichever way the wait ended.
    pub fn into_value(self) -> T {
        match self {
            Observed::Changed(v) | Observed::TimedOut(v) | Observed::Abandoned(v) => v,
        }
    }
}

/// A change handler failed; the loop stopped at `old`, the last value it
/// processed successfully.
#[derive(Debug, thiserror::Error)]
#[error("changed [{old:?} -> {new:?}]: {source}")]
pub struct HandlerFailed<T: fmt::Debug> {
    /// Last value the handler accepted
    pub old: T,
    /// Value the handler rejected
    pub new: T,
    #[source]
    pub source: BeaconError,
}

/// Wait until `var` holds something other than `current`.
pub async fn wait_for_change<T>(
    cancel: &dyn CancellationToken,
    current: &T,
    var: &Var<T>,
) -> Observed<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    loop {
        let (next, changed) = var.get();
        if next != *current {
            return Observed::Changed(next);
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Observed::Abandoned(current.clone()),
            _ = changed.fired() => {}
        }
    }
}

/// Like [`wait_for_change`], but gives up once `period` has elapsed.
///
/// The timer covers the whole call, not each individual wake-up.
pub async fn wait_for_change_or_timeout<T>(
    cancel: &dyn CancellationToken,
    current: &T,
    var: &Var<T>,
    period: Duration,
) -> Observed<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    let deadline = tokio::time::sleep(period);
    tokio::pin!(deadline);
    loop {
        let (next, changed) = var.get();
        if next != *current {
            return Observed::Changed(next);
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Observed::Abandoned(current.clone()),
            _ = changed.fired() => {}
            _ = &mut deadline => return Observed::TimedOut(current.clone()),
        }
    }
}

/// Wait until `var` holds exactly `expected`. Mostly useful in tests.
pub async fn wait_for_value<T>(
    cancel: &dyn CancellationToken,
    expected: &T,
    var: &Var<T>,
) -> Result<(), BeaconError>
where
    T: Clone + PartialEq + fmt::Debug + Send + Sync + 'static,
{
    loop {
        let (found, changed) = var.get();
        if found == *expected {
            return Ok(());
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(BeaconError::cancelled(format!(
                    "last saw {found:?} while expecting {expected:?}"
                )));
            }
            _ = changed.fired() => {}
        }
    }
}

/// Run `f(old, new)` each time `var` moves to a different value, starting
/// from `start`.
///
/// Returns the last successfully processed value once `cancel` fires. A
/// handler error ends the loop with [`HandlerFailed`].
pub async fn do_when_changed<T, F, Fut>(
    cancel: &dyn CancellationToken,
    start: T,
    var: &Var<T>,
    mut f: F,
) -> Result<T, HandlerFailed<T>>
where
    T: Clone + PartialEq + fmt::Debug + Send + Sync + 'static,
    F: FnMut(T, T) -> Fut,
    Fut: Future<Output = Result<(), BeaconError>>,
{
    let mut last = start;
    loop {
        let next = match wait_for_change(cancel, &last, var).await {
            Observed::Changed(next) if !cancel.is_cancelled() => next,
            _ => return Ok(last),
        };
        last = dispatch(&mut f, last, next).await?;
    }
}

/// Like [`do_when_changed`], but also runs `f(last, last)` whenever `period`
/// passes without a change.
pub async fn do_when_changed_or_interval<T, F, Fut>(
    cancel: &dyn CancellationToken,
    start: T,
    var: &Var<T>,
    period: Duration,
    mut f: F,
) -> Result<T, HandlerFailed<T>>
where
    T: Clone + PartialEq + fmt::Debug + Send + Sync + 'static,
    F: FnMut(T, T) -> Fut,
    Fut: Future<Output = Result<(), BeaconError>>,
{
    let mut last = start;
    loop {
        let next = match wait_for_change_or_timeout(cancel, &last, var, period).await {
            Observed::Abandoned(_) => return Ok(last),
            _ if cancel.is_cancelled() => return Ok(last),
            observed => observed.into_value(),
        };
        last = dispatch(&mut f, last, next).await?;
    }
}

/// [`do_when_changed_or_interval`] with the period taken from
/// `config.change_interval_ms`.
pub async fn do_when_changed_or_configured_interval<T, F, Fut>(
    cancel: &dyn CancellationToken,
    config: &RuntimeConfig,
    start: T,
    var: &Var<T>,
    f: F,
) -> Result<T, HandlerFailed<T>>
where
    T: Clone + PartialEq + fmt::Debug + Send + Sync + 'static,
    F: FnMut(T, T) -> Fut,
    Fut: Future<Output = Result<(), BeaconError>>,
{
    do_when_changed_or_interval(cancel, start, var, config.change_interval(), f).await
}

async fn dispatch<T, F, Fut>(f: &mut F, old: T, new: T) -> Result<T, HandlerFailed<T>>
where
    T: Clone + fmt::Debug,
    F: FnMut(T, T) -> Fut,
    Fut: Future<Output = Result<(), BeaconError>>,
{
    match f(old.clone(), new.clone()).await {
        Ok(()) => Ok(new),
        Err(source) => {
            tracing::debug!(old = ?old, new = ?new, error = %source, "change handler failed");
            Err(HandlerFailed { old, new, source })
        }
    }
}
