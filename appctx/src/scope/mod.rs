//! Per-unit-of-work scopes over a base context.
//!
//! A [`ScopeRunner`] is the framework-agnostic shape of request middleware:
//! one child context per unit of work, completed when the work ends, with
//! timing and id metadata and a watchdog for work that takes over
//! completion itself.

mod config;
mod runner;

pub use config::ScopeConfig;
pub use runner::{
    format_millis, Hijack, ScopeMetadata, ScopeOutcome, ScopeRunner, REQUEST_ID_HEADER,
    REQUEST_TIMER_METRIC, REQUEST_TIME_HEADER,
};
