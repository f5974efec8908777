//! Beacon Core - change notification without polling
//!
//! This crate provides the runtime-agnostic primitives:
//!
//! - [`Var<T>`]: a value plus a one-shot [`Signal`] that fires when the value
//!   is superseded. `get` returns both from one atomic snapshot.
//! - [`Aggregation`]: waits for a change on any of a runtime-determined set of
//!   variables of heterogeneous types, handing changed variables back one at a
//!   time as type-erased [`AnyVar`] handles.
//! - [`effects::task`]: the cancellation and task-spawning interfaces the
//!   aggregation needs from its environment.
//!
//! Only `tokio::sync` is used here. Executors, supervision and control loops
//! live in `beacon-runtime`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use beacon_core::Var;
//!
//! let v = Var::new(1);
//! let (value, changed) = v.get();
//!
//! // Elsewhere:
//! v.set(value + 1);
//!
//! changed.fired().await;
//! assert_eq!(v.get().0, 2);
//! ```

#![forbid(unsafe_code)]

/// Wait-for-any over a dynamic set of variables
pub mod aggregation;

/// Effect interfaces (cancellation, task spawning)
pub mod effects;

/// Unified error handling
pub mod errors;

/// One-shot signals
pub mod signal;

/// Reactive variables
pub mod var;

pub use aggregation::{Aggregation, AnyVar, VarId};
pub use effects::{CancellationToken, NeverCancel, TaskSpawner};
pub use errors::BeaconError;
pub use signal::{Signal, Trigger};
pub use var::{Change, UpdateRejected, Var};
