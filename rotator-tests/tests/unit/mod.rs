//! Unit tests for snapshot-rotator
//!
//! Engine and adapter behaviour against in-memory provider mocks.

mod config;
mod database;
mod retention;
