//! # Cargador
//!
//! Load-generation engine for benchmarking remote inference-serving
//! endpoints.
//!
//! Cargador (Spanish: "loader") drives a configurable population of
//! concurrent worker threads, each repeatedly issuing synthetic or
//! file-derived inference requests, while collecting per-request latency
//! timestamps and cumulative completion statistics for throughput and
//! latency reporting.
//!
//! ## Features
//!
//! - **Validated input synthesis**: one pass over the model's declared
//!   inputs sizes two shared read-only buffers to the largest batch-1
//!   requirement, fail-fast before any thread starts
//! - **Per-worker stat records**: each worker owns an independently locked
//!   record, so harvesting never blocks the pool
//! - **Cooperative shutdown**: a shared cancellation token plus wake
//!   condition, observed at request-cycle boundaries
//! - **Fault isolation**: a failing worker records its own error and stops;
//!   healthy workers keep generating load
//! - **Pluggable pacing**: the pool mechanics are policy-agnostic; the
//!   request-issuance cadence is injected as a strategy
//!
//! ## Example
//!
//! ```rust
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use cargador::client::ClientFactory;
//! use cargador::data::{InputDataStore, SyntheticDataOptions};
//! use cargador::pool::{PoolConfig, Saturating, WorkerPool};
//! use cargador::testing::MockClientFactory;
//!
//! let factory = Arc::new(
//!     MockClientFactory::new(8).with_numeric_input("input0", vec![16], 4),
//! );
//! let options = SyntheticDataOptions::default().with_zero_input(true);
//! let store = Arc::new(
//!     InputDataStore::build(factory.as_ref(), HashMap::new(), &options).unwrap(),
//! );
//!
//! let mut pool = WorkerPool::new(PoolConfig::default().with_max_workers(2));
//! for _ in 0..2 {
//!     pool.spawn_request_worker(
//!         Arc::clone(&factory) as Arc<dyn ClientFactory>,
//!         Arc::clone(&store),
//!         Arc::new(Saturating),
//!     )
//!     .unwrap();
//! }
//! std::thread::sleep(Duration::from_millis(50));
//!
//! let mut timestamps = Vec::new();
//! pool.swap_timestamps(&mut timestamps);
//! pool.check_health().unwrap();
//! pool.shutdown();
//! assert!(pool.accumulated_stat().completed_request_count > 0);
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
// Clippy allows (MUST come after deny/warn to override them)
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)] // f64 -> i64 offsets are bounded
#![allow(clippy::cast_precision_loss)] // usize -> f64 for length jitter is acceptable
#![allow(clippy::cast_possible_wrap)] // usize -> i64 for lengths is safe
#![allow(clippy::cast_sign_loss)] // dims are validated non-negative before casts
#![allow(clippy::must_use_candidate)] // Not all methods need #[must_use]
#![allow(clippy::missing_panics_doc)] // Lock poisoning panics are not documented per method

/// Request input binding against a validated data store
pub mod binder;
/// Inference client boundary: context and factory traits
pub mod client;
/// Input data synthesis, file loading, and the shared store
pub mod data;
pub mod error;
/// Worker pool lifecycle, cancellation, and stat harvesting
pub mod pool;
/// Scriptable mock client for tests
pub mod testing;

// Re-exports for convenience
pub use error::{CargadorError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(VERSION.starts_with("0."));
        assert!(VERSION.contains('.'));
    }
}
