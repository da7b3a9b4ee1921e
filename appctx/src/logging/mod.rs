//! Context-scoped logging.
//!
//! This module provides:
//! - [`ContextLogger`], a `tracing`-backed logger bound to one context
//! - [`LoggerFactory`], which owns the shared level and hands out loggers
//!   as an accessor or as a registry property
//! - [`LevelListeners`], the explicit table of level-change listeners

mod level;
mod logger;

pub use level::{LevelListeners, ListenerKey, LogLevel};
pub use logger::{ContextLogger, LoggerFactory, LOG_PROPERTY};
