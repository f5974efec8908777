//! Aggregation - wait for a change on any of a dynamic set of variables
//!
//! An `Aggregation` arms variables of arbitrary value types against the
//! signal they had when registered. [`Aggregation::updated`] produces a single
//! signal covering every armed variable (plus a cancellation token), and
//! [`Aggregation::choose`] hands back one changed variable at a time as a
//! type-erased [`AnyVar`], disarming it.
//!
//! ## Registration lifecycle
//!
//! ```text
//! unarmed --register--> armed --var changes--> fired (still armed) --choose--> unarmed
//! ```
//!
//! Registering an armed variable again leaves its captured signal alone, so a
//! change can be neither missed nor counted twice.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use futures::future::{self, BoxFuture};
use futures::FutureExt;
use parking_lot::RwLock;

use crate::effects::task::{CancellationToken, TaskSpawner};
use crate::signal::{FireOnDrop, Signal, Trigger};
use crate::var::{Var, VarInner};

/// Identity of a variable, stable for as long as any handle to it exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(usize);

impl VarId {
    fn of<T>(var: &Var<T>) -> Self {
        Self(Arc::as_ptr(&var.inner) as *const () as usize)
    }
}

/// Type-erased handle to a specific [`Var`], returned by
/// [`Aggregation::choose`].
///
/// The caller, knowing which value types it registered, narrows the handle
/// back with [`AnyVar::downcast`]:
///
/// ```rust,ignore
/// if let Some(found) = agg.choose() {
///     if let Some(count) = found.downcast::<u64>() {
///         let (value, _) = count.get();
///     } else if let Some(name) = found.downcast::<String>() {
///         let (value, _) = name.get();
///     }
/// }
/// ```
#[derive(Clone)]
pub struct AnyVar {
    id: VarId,
    inner: Arc<dyn Any + Send + Sync>,
}

impl AnyVar {
    fn new<T: Send + Sync + 'static>(var: &Var<T>) -> Self {
        let inner: Arc<dyn Any + Send + Sync> = var.inner.clone();
        Self {
            id: VarId::of(var),
            inner,
        }
    }

    /// Identity of the underlying variable.
    pub fn id(&self) -> VarId {
        self.id
    }

    /// Whether the underlying variable holds values of type `T`.
    pub fn is<T: Send + Sync + 'static>(&self) -> bool {
        self.inner.is::<VarInner<T>>()
    }

    /// Recover the typed variable, or `None` if `T` is not its value type.
    pub fn downcast<T: Send + Sync + 'static>(&self) -> Option<Var<T>> {
        self.inner
            .clone()
            .downcast::<VarInner<T>>()
            .ok()
            .map(|inner| Var { inner })
    }

    /// Whether this handle refers to `var`.
    pub fn same_as<T>(&self, var: &Var<T>) -> bool {
        self.id == VarId::of(var)
    }
}

impl PartialEq for AnyVar {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for AnyVar {}

impl Hash for AnyVar {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for AnyVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AnyVar").field(&self.id).finish()
    }
}

/// An armed registration: the handle plus the signal captured at
/// registration time.
struct Armed {
    var: AnyVar,
    signal: Signal,
}

/// Selects over an arbitrary number of variables of heterogeneous types.
///
/// Variables are removed once [`choose`](Self::choose) reports them; call
/// [`register`](Self::register) again to keep watching.
///
/// # Example
///
/// ```rust,ignore
/// let agg = Aggregation::new(spawner);
/// let count = agg.register(&counter);
/// let name = agg.register(&label);
///
/// while !agg.is_empty() {
///     agg.updated(cancel.clone()).fired().await;
///     while let Some(found) = agg.choose() {
///         // narrow with found.downcast::<T>()
///     }
/// }
/// ```
pub struct Aggregation {
    registrations: RwLock<HashMap<VarId, Armed>>,
    spawner: Arc<dyn TaskSpawner>,
}

impl Aggregation {
    /// Create an empty aggregation. `spawner` runs the background waiter
    /// started by [`updated`](Self::updated).
    pub fn new(spawner: Arc<dyn TaskSpawner>) -> Self {
        Self {
            registrations: RwLock::new(HashMap::new()),
            spawner,
        }
    }

    /// Arm `var` and return its current value.
    ///
    /// If `var` is already armed, its captured signal is left untouched and
    /// the live value is returned.
    pub fn register<T>(&self, var: &Var<T>) -> T
    where
        T: Clone + Send + Sync + 'static,
    {
        let id = VarId::of(var);
        let mut registrations = self.registrations.write();
        let (value, signal) = var.get();
        if !registrations.contains_key(&id) {
            tracing::trace!(var = ?id, armed = registrations.len() + 1, "armed variable");
            registrations.insert(
                id,
                Armed {
                    var: AnyVar::new(var),
                    signal,
                },
            );
        }
        value
    }

    /// Number of armed variables.
    pub fn len(&self) -> usize {
        self.registrations.read().len()
    }

    /// Whether no variables are armed.
    pub fn is_empty(&self) -> bool {
        self.registrations.read().is_empty()
    }

    /// Whether `var` is currently armed.
    pub fn is_registered<T>(&self, var: &Var<T>) -> bool {
        self.registrations.read().contains_key(&VarId::of(var))
    }

    /// Take one armed variable whose signal has fired.
    ///
    /// Returns `None` if nothing has changed or the aggregation is empty.
    /// Among several changed variables any one may be returned.
    pub fn choose(&self) -> Option<AnyVar> {
        let mut registrations = self.registrations.write();
        let id = registrations
            .iter()
            .find(|(_, armed)| armed.signal.is_fired())
            .map(|(id, _)| *id)?;
        let armed = registrations.remove(&id)?;
        tracing::trace!(var = ?id, armed = registrations.len(), "consumed changed variable");
        Some(armed.var)
    }

    /// A signal that fires when any currently armed variable changes or
    /// `cancel` fires.
    ///
    /// Only registrations present now are watched; call again after
    /// consuming a change to pick up later registrations. If something has
    /// already changed, or `cancel` already fired, the returned signal is
    /// pre-fired and nothing is spawned. Otherwise a single background waiter
    /// resolves it the first time any watched signal fires and then exits.
    pub fn updated(&self, cancel: Arc<dyn CancellationToken>) -> Signal {
        let watched: Vec<Signal> = self
            .registrations
            .read()
            .values()
            .map(|armed| armed.signal.clone())
            .collect();

        if cancel.is_cancelled() || watched.iter().any(Signal::is_fired) {
            tracing::trace!(watched = watched.len(), "aggregation already updated");
            return Signal::fired_now();
        }

        let trigger = Trigger::new();
        let result = trigger.signal();
        // Owned by the task future, so it fires even if the task is dropped
        // before its first poll.
        let resolve = FireOnDrop(trigger);

        let mut waits: Vec<BoxFuture<'static, ()>> =
            watched.iter().map(|signal| signal.fired().boxed()).collect();
        waits.push(async move { cancel.cancelled().await }.boxed());

        tracing::trace!(watched = watched.len(), "spawning aggregation waiter");
        self.spawner.spawn(
            async move {
                let _resolve = resolve;
                let _ = future::select_all(waits).await;
            }
            .boxed(),
        );

        result
    }
}

impl fmt::Debug for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aggregation")
            .field("armed", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::task::NeverCancel;
    use futures::future::BoxFuture;
    use parking_lot::Mutex;

    /// Collects spawned futures so tests can drive them by hand.
    #[derive(Default)]
    struct ManualSpawner {
        spawned: Mutex<Vec<BoxFuture<'static, ()>>>,
    }

    impl ManualSpawner {
        fn spawned(&self) -> usize {
            self.spawned.lock().len()
        }

        fn take(&self) -> Vec<BoxFuture<'static, ()>> {
            std::mem::take(&mut *self.spawned.lock())
        }
    }

    impl TaskSpawner for ManualSpawner {
        fn spawn(&self, fut: BoxFuture<'static, ()>) {
            self.spawned.lock().push(fut);
        }

        fn spawn_cancellable(
            &self,
            fut: BoxFuture<'static, ()>,
            _token: Arc<dyn CancellationToken>,
        ) {
            self.spawn(fut);
        }

        fn cancellation_token(&self) -> Arc<dyn CancellationToken> {
            Arc::new(NeverCancel)
        }
    }

    fn aggregation() -> (Aggregation, Arc<ManualSpawner>) {
        let spawner = Arc::new(ManualSpawner::default());
        (Aggregation::new(spawner.clone()), spawner)
    }

    #[test]
    fn register_returns_value_and_is_idempotent() {
        let (agg, _) = aggregation();
        let v = Var::new(5);

        assert_eq!(agg.register(&v), 5);
        assert_eq!(agg.register(&v), 5);
        assert_eq!(agg.len(), 1);
        assert!(agg.is_registered(&v));
    }

    #[test]
    fn double_registration_keeps_captured_signal() {
        let (agg, _) = aggregation();
        let v = Var::new(1);
        agg.register(&v);

        v.set(2);
        // Re-registering after the change must not re-arm against the new
        // generation and hide the change.
        assert_eq!(agg.register(&v), 2);

        let found = agg.choose().unwrap();
        assert!(found.same_as(&v));
        assert!(agg.choose().is_none());
        assert!(agg.is_empty());
    }

    #[test]
    fn choose_is_none_until_something_changes() {
        let (agg, _) = aggregation();
        assert!(agg.choose().is_none());

        let v = Var::new("x");
        agg.register(&v);
        assert!(agg.choose().is_none());
        assert_eq!(agg.len(), 1);
    }

    #[test]
    fn reregistration_rearms_against_current_signal() {
        let (agg, _) = aggregation();
        let v = Var::new(0);
        agg.register(&v);
        v.set(1);
        assert!(agg.choose().is_some());

        assert_eq!(agg.register(&v), 1);
        assert!(agg.choose().is_none());
        v.set(2);
        assert!(agg.choose().unwrap().same_as(&v));
    }

    #[test]
    fn updated_is_prefired_without_spawning() {
        let (agg, spawner) = aggregation();
        let v = Var::new(0);
        agg.register(&v);
        v.set(1);

        let signal = agg.updated(Arc::new(NeverCancel));
        assert!(signal.is_fired());
        assert_eq!(spawner.spawned(), 0);
    }

    #[test]
    fn updated_is_prefired_when_cancel_already_fired() {
        let (agg, spawner) = aggregation();
        agg.register(&Var::new(0));
        let cancel = Trigger::new();
        cancel.fire();

        let signal = agg.updated(Arc::new(cancel.signal()));
        assert!(signal.is_fired());
        assert_eq!(spawner.spawned(), 0);
    }

    #[test]
    fn updated_spawns_one_waiter_that_resolves_on_change() {
        let (agg, spawner) = aggregation();
        let a = Var::new(0);
        let b = Var::new(String::from("b"));
        agg.register(&a);
        agg.register(&b);

        let signal = agg.updated(Arc::new(NeverCancel));
        assert!(!signal.is_fired());
        assert_eq!(spawner.spawned(), 1);

        let mut waiter = spawner.take().pop().unwrap();
        assert!((&mut waiter).now_or_never().is_none());
        assert!(!signal.is_fired());

        b.set(String::from("c"));
        assert!(waiter.now_or_never().is_some());
        assert!(signal.is_fired());
        assert!(agg.choose().unwrap().same_as(&b));
    }

    #[test]
    fn updated_resolves_on_cancel() {
        let (agg, spawner) = aggregation();
        agg.register(&Var::new(0));
        let cancel = Trigger::new();

        let signal = agg.updated(Arc::new(cancel.signal()));
        let waiter = spawner.take().pop().unwrap();
        cancel.fire();

        assert!(waiter.now_or_never().is_some());
        assert!(signal.is_fired());
        assert!(agg.choose().is_none());
    }

    #[test]
    fn dropped_waiter_still_resolves() {
        let (agg, spawner) = aggregation();
        agg.register(&Var::new(0));

        let signal = agg.updated(Arc::new(NeverCancel));
        let mut waiter = spawner.take().pop().unwrap();
        assert!((&mut waiter).now_or_never().is_none());

        // Simulates the supervisor aborting the task.
        drop(waiter);
        assert!(signal.is_fired());
    }

    #[test]
    fn unpolled_waiter_resolves_when_dropped() {
        let (agg, spawner) = aggregation();
        agg.register(&Var::new(0));

        let signal = agg.updated(Arc::new(NeverCancel));
        drop(spawner.take());
        assert!(signal.is_fired());
    }

    #[test]
    fn later_registrations_are_not_watched() {
        let (agg, spawner) = aggregation();
        agg.register(&Var::new(0));
        let signal = agg.updated(Arc::new(NeverCancel));

        let late = Var::new(0);
        agg.register(&late);
        late.set(1);

        let mut waiter = spawner.take().pop().unwrap();
        assert!((&mut waiter).now_or_never().is_none());
        assert!(!signal.is_fired());
        assert!(agg.choose().unwrap().same_as(&late));

        drop(waiter);
        assert!(signal.is_fired());
    }

    #[test]
    fn any_var_downcasts_to_registered_type_only() {
        let (agg, _) = aggregation();
        let v = Var::new(3u32);
        agg.register(&v);
        v.set(4);

        let found = agg.choose().unwrap();
        assert!(found.is::<u32>());
        assert!(!found.is::<i64>());
        assert!(found.downcast::<String>().is_none());

        let typed = found.downcast::<u32>().unwrap();
        assert_eq!(typed.get().0, 4);
        assert_eq!(found, AnyVar::new(&typed));
        assert_eq!(found.id(), AnyVar::new(&v).id());
    }
}
