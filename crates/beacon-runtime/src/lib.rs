//! Beacon Runtime - Tokio integration for beacon variables
//!
//! - [`TaskRegistry`]: supervises background tasks and implements
//!   [`beacon_core::TaskSpawner`], so it can back an
//!   [`Aggregation`](beacon_core::Aggregation) directly.
//! - [`watch`]: control loops that react to a single variable changing
//!   (`do_when_changed`, `wait_for_value`, ...).
//! - [`RuntimeConfig`] and [`init_tracing`](logging::init_tracing) for
//!   process setup.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use beacon_core::{Aggregation, Var};
//! use beacon_runtime::{RuntimeConfig, TaskRegistry};
//!
//! let config = RuntimeConfig::default();
//! let tasks = Arc::new(TaskRegistry::with_config(&config)?);
//! let agg = Aggregation::new(tasks.clone());
//!
//! let v = Var::new(0);
//! agg.register(&v);
//! v.set(1);
//! agg.updated(tasks.cancellation_token()).fired().await;
//! assert!(agg.choose().is_some());
//! ```

#![forbid(unsafe_code)]

/// Runtime configuration
pub mod config;

/// Tracing subscriber setup
pub mod logging;

/// Supervised task spawning
pub mod task_registry;

/// Change-driven control loops
pub mod watch;

pub use config::RuntimeConfig;
pub use logging::init_tracing;
pub use task_registry::TaskRegistry;
pub use watch::{
    do_when_changed, do_when_changed_or_configured_interval, do_when_changed_or_interval,
    wait_for_change, wait_for_change_or_timeout, wait_for_value, HandlerFailed, Observed,
};
