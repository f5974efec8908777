//! Var<T> - A reactive value with a one-shot change signal per generation
//!
//! `Var<T>` holds the current value together with the signal that will fire
//! when that value is superseded. Readers get both halves from one snapshot,
//! so a reader can never pair a value with the wrong generation's signal.
//!
//! # Concurrency
//!
//! - Writers (`set`, `update`) are serialized by a writer mutex. The transform
//!   passed to `update` runs under that mutex only.
//! - The `(value, signal)` pair lives behind one `Arc` that is swapped under a
//!   short read/write lock, so `get` is never held up by a running transform.
//! - The previous generation's signal is fired after the swap, so a woken
//!   waiter that calls `get` always observes the newer value.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::signal::{Signal, Trigger};

/// One `(value, signal)` pair.
struct Generation<T> {
    value: T,
    trigger: Trigger,
    number: u64,
}

/// Shared state of a `Var`.
pub(crate) struct VarInner<T> {
    current: RwLock<Arc<Generation<T>>>,
    writer: Mutex<()>,
}

/// A reactive variable.
///
/// `Var<T>` provides:
/// - `get()`: the current value and the signal for its generation
/// - `set()`: publish a new value, firing the previous generation's signal
/// - `update()`: fallible read-modify-write under the writer lock
///
/// Cloning a `Var` shares the same underlying cell; the clone is the same
/// variable, not a copy of its value.
///
/// # Example
///
/// ```rust,ignore
/// use beacon_core::Var;
///
/// let config = Var::new(String::from("foo"));
/// let (value, changed) = config.get();
/// assert_eq!(value, "foo");
///
/// config.set(String::from("bar"));
/// assert!(changed.is_fired());
/// ```
pub struct Var<T> {
    pub(crate) inner: Arc<VarInner<T>>,
}

/// Values observed by a successful [`Var::update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change<T> {
    /// Value before the transform ran
    pub old: T,
    /// Value published by the transform
    pub new: T,
}

/// A transform passed to [`Var::update`] failed.
///
/// The variable was left untouched and no signal fired. `current` is the
/// value the transform was given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRejected<T, E> {
    /// The unchanged value
    pub current: T,
    /// The transform's error
    pub error: E,
}

impl<T, E: fmt::Display> fmt::Display for UpdateRejected<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "update rejected: {}", self.error)
    }
}

impl<T, E> std::error::Error for UpdateRejected<T, E>
where
    T: fmt::Debug,
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl<T> Var<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a variable holding `value` with an unfired signal.
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(VarInner {
                current: RwLock::new(Arc::new(Generation {
                    value,
                    trigger: Trigger::new(),
                    number: 0,
                })),
                writer: Mutex::new(()),
            }),
        }
    }

    /// Return the current value and the signal that fires when it changes.
    pub fn get(&self) -> (T, Signal) {
        let generation = self.snapshot();
        (generation.value.clone(), generation.trigger.signal())
    }

    /// Number of completed `set`/successful `update` calls.
    pub fn generation(&self) -> u64 {
        self.snapshot().number
    }

    /// Replace the value and notify.
    ///
    /// Setting a value equal to the current one still starts a new generation
    /// and still fires the signal.
    pub fn set(&self, value: T) {
        let _writer = self.inner.writer.lock();
        self.publish(value);
    }

    /// Apply a fallible transform to the current value.
    ///
    /// On success the result is published exactly as `set` would and both the
    /// previous and the new value are returned. On failure nothing changes,
    /// no signal fires, and the unchanged value is returned with the error.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let counter = Var::new(1);
    /// let change = counter.update(|old| Ok::<_, Infallible>(old + 1))?;
    /// assert_eq!((change.old, change.new), (1, 2));
    /// ```
    pub fn update<E, F>(&self, f: F) -> Result<Change<T>, UpdateRejected<T, E>>
    where
        F: FnOnce(&T) -> Result<T, E>,
    {
        let _writer = self.inner.writer.lock();
        let old = self.snapshot();
        match f(&old.value) {
            Ok(new) => {
                self.publish(new.clone());
                Ok(Change {
                    old: old.value.clone(),
                    new,
                })
            }
            Err(error) => Err(UpdateRejected {
                current: old.value.clone(),
                error,
            }),
        }
    }

    fn snapshot(&self) -> Arc<Generation<T>> {
        self.inner.current.read().clone()
    }

    /// Swap in a fresh generation and retire the old one. Caller holds the
    /// writer lock.
    fn publish(&self, value: T) {
        let previous = {
            let mut current = self.inner.current.write();
            let next = Arc::new(Generation {
                value,
                trigger: Trigger::new(),
                number: current.number + 1,
            });
            std::mem::replace(&mut *current, next)
        };
        previous.trigger.fire();
    }
}

impl<T> Clone for Var<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + Default + 'static> Default for Var<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Clone + Send + Sync + fmt::Debug + 'static> fmt::Debug for Var<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let generation = self.snapshot();
        f.debug_struct("Var")
            .field("value", &generation.value)
            .field("generation", &generation.number)
            .finish()
    }
}
