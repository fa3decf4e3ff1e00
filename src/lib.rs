//! trip-budget: per-trip travel budget tracker.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod trip;
pub mod engine;
pub mod storage;
pub mod session;
