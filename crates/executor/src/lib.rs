//! # Executor Crate
//!
//! Turns a mirrored `TradeRecord` into an order on the client account.
//!
//! ## Architectural Principles
//!
//! - **Execution Abstraction:** The `Executor` trait hides how a record becomes an
//!   order, so the client engine only deals with records and reports.
//! - **Bounded Concurrency:** The `ExecutionPool` runs a fixed number of workers off
//!   a bounded queue. Every order has a deadline and is abandoned on shutdown; an
//!   order is attempted once and never retried.
//!
//! ## Public API
//!
//! - `Executor`: The core trait for all execution engines.
//! - `MirrorExecutor`: Places the mirrored order on a `BrokerSession`.
//! - `ExecutionPool`: The worker pool, with `ExecutionReport`s on a channel.
//! - `fold_duration`: Fits a duration to the broker's supported expiries.
//! - `ExecutionError`: The specific error types that can be returned from this crate.

// Declare the modules that constitute this crate.
pub mod duration;
pub mod error;
pub mod mirror;
pub mod pool;

// Re-export the key components to provide a clean, public-facing API.
pub use duration::fold_duration;
pub use error::ExecutionError;
pub use mirror::{Executor, MirrorExecutor};
pub use pool::{ExecutionOutcome, ExecutionPool, ExecutionReport, PoolSettings};
