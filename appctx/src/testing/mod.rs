//! Testing utilities for context trees.
//!
//! This module provides mock materializers and disposers that record what
//! the lifecycle does to them.

mod mocks;

pub use mocks::{CountingMaterializer, FailingDisposer, RecordingDisposer, SlowDisposer};
