//! Command tests for snapshot-rotator
//!
//! Full invocations through the run coordinator with mocked providers.

mod notify;
mod run;
