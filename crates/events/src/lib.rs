//! # Event Log
//!
//! The append-only text file shared between the master process, which appends one
//! line per detected trade, and any number of client processes, which tail it.
//!
//! A line is self-describing and may carry free text before the fields:
//!
//! ```text
//! - Time: 2024-05-01 12:00:03 Stamp: 1714564803 ID: 34156731 Asset: EURUSD_otc Amount: 10 Direction: CALL Duration: 60
//! ```

// Declare the modules that make up this crate.
pub mod error;
pub mod grammar;
pub mod log;

// Re-export the core types to provide a clean public API.
pub use error::EventLogError;
pub use grammar::{format_line, parse_line};
pub use log::{EventLog, LogBatch, LogCursor};
