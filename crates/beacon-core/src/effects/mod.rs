//! Effect interfaces consumed by the primitives.
//!
//! The core defines **what** it needs from its environment (a way to run a
//! background future and a cancellation source); runtime crates define **how**.

pub mod task;

pub use task::{CancellationToken, NeverCancel, TaskSpawner};
