//! Aggregation drain scenarios over a real Tokio executor.
#![allow(missing_docs)]

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use beacon_core::{Aggregation, CancellationToken, NeverCancel, Signal, TaskSpawner, Trigger, Var};
use futures::future::BoxFuture;
use tokio::time::timeout;

struct TokioSpawner;

impl TaskSpawner for TokioSpawner {
    fn spawn(&self, fut: BoxFuture<'static, ()>) {
        tokio::spawn(fut);
    }

    fn spawn_cancellable(&self, fut: BoxFuture<'static, ()>, token: Arc<dyn CancellationToken>) {
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = fut => {}
            }
        });
    }

    fn cancellation_token(&self) -> Arc<dyn CancellationToken> {
        Arc::new(NeverCancel)
    }
}

fn aggregation() -> Aggregation {
    Aggregation::new(Arc::new(TokioSpawner))
}

async fn within_a_minute(signal: Signal) {
    timeout(Duration::from_secs(60), signal.fired())
        .await
        .expect("aggregation never reported an update");
}

#[tokio::test]
async fn drain_one_change_at_a_time() {
    let agg = aggregation();
    let stop = Trigger::new();
    let cancel: Arc<dyn CancellationToken> = Arc::new(stop.signal());

    let vars: Vec<Var<usize>> = (0..10).map(Var::new).collect();
    for (i, v) in vars.iter().enumerate() {
        assert_eq!(agg.register(v), i);
        // Double registration is a no-op.
        assert_eq!(agg.register(v), i);
    }
    assert_eq!(agg.len(), vars.len());
    assert!(agg.choose().is_none());

    let updated = agg.updated(cancel.clone());
    assert!(!updated.is_fired());

    for (i, v) in vars.iter().enumerate() {
        v.update(|old| Ok::<_, std::convert::Infallible>(old + vars.len()))
            .unwrap();
        within_a_minute(agg.updated(cancel.clone())).await;

        let found = agg.choose().expect("changed variable must be chosen");
        assert!(found.same_as(v));
        assert_eq!(found.downcast::<usize>().unwrap().get().0, i + vars.len());
        assert_eq!(agg.len(), vars.len() - i - 1);
    }

    // The first waiter only watched the first generation of all ten.
    within_a_minute(updated).await;
    assert!(agg.is_empty());
    assert!(!stop.is_fired());
}

#[tokio::test]
async fn changes_before_updated_resolve_synchronously() {
    let agg = aggregation();
    let vars: Vec<Var<i32>> = (0..10).map(Var::new).collect();
    for (i, v) in vars.iter().enumerate() {
        assert_eq!(agg.register(v), i as i32);
        v.set(99);
    }
    assert_eq!(agg.len(), vars.len());

    assert!(agg.updated(Arc::new(NeverCancel)).is_fired());

    let mut count = 0;
    while let Some(found) = agg.choose() {
        count += 1;
        assert_eq!(found.downcast::<i32>().unwrap().get().0, 99);
    }
    assert_eq!(count, vars.len());
    assert_eq!(agg.len(), 0);
}

#[tokio::test]
async fn cancellation_resolves_outstanding_wait() {
    let agg = aggregation();
    agg.register(&Var::new(0));
    let cancel = Trigger::new();

    let updated = agg.updated(Arc::new(cancel.signal()));
    tokio::task::yield_now().await;
    assert!(!updated.is_fired());

    cancel.fire();
    within_a_minute(updated).await;
    assert!(agg.choose().is_none());
    assert_eq!(agg.len(), 1);
}

#[tokio::test]
async fn heterogeneous_variables_are_narrowed_by_caller() {
    let agg = aggregation();
    let cancel: Arc<dyn CancellationToken> = Arc::new(NeverCancel);

    let ints: Vec<Var<i32>> = (1..=2).map(Var::new).collect();
    let strings: Vec<Var<String>> = (1..=2).map(|i| Var::new(format!("X {i}"))).collect();

    for v in &ints {
        let sampled = agg.register(v);
        let v = v.clone();
        tokio::spawn(async move { v.set(10 * sampled) });
    }
    for v in &strings {
        let sampled = agg.register(v);
        let v = v.clone();
        tokio::spawn(async move { v.set(format!("{sampled} Updated")) });
    }

    let mut seen = Vec::new();
    while !agg.is_empty() {
        within_a_minute(agg.updated(cancel.clone())).await;
        let Some(found) = agg.choose() else {
            continue;
        };
        if let Some(v) = found.downcast::<i32>() {
            seen.push(v.get().0.to_string());
        } else if let Some(v) = found.downcast::<String>() {
            seen.push(v.get().0);
        } else {
            panic!("unexpected value type");
        }
    }

    seen.sort();
    assert_eq!(seen, vec!["10", "20", "X 1 Updated", "X 2 Updated"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_changes_drain_exactly_once() {
    const N: usize = 64;
    let agg = aggregation();
    let cancel: Arc<dyn CancellationToken> = Arc::new(NeverCancel);

    let vars: Vec<Var<u64>> = (0..N as u64).map(Var::new).collect();
    for v in &vars {
        agg.register(v);
    }

    for v in &vars {
        let v = v.clone();
        tokio::spawn(async move {
            let (old, _) = v.get();
            v.set(old + 1000);
        });
    }

    let mut drained = HashSet::new();
    while !agg.is_empty() {
        within_a_minute(agg.updated(cancel.clone())).await;
        while let Some(found) = agg.choose() {
            assert!(drained.insert(found.id()), "variable reported twice");
        }
    }

    assert_eq!(drained.len(), N);
    for v in &vars {
        assert!(v.get().0 >= 1000);
    }
}
