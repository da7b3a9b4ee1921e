//! # appctx
//!
//! Hierarchical application contexts with lazily materialized, scoped
//! properties.
//!
//! A context tree provides:
//!
//! - **Lazy properties**: named values computed on first read, cached per
//!   context, and derived from the same property on the parent
//! - **Ordered completion**: a context cannot complete while it has active
//!   children; completion runs every disposer and poisons disposed values
//! - **Completion signals**: any number of tasks can await a context's end
//! - **Scoped logging**: per-context `tracing` loggers with a shared,
//!   adjustable level
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use appctx::prelude::*;
//!
//! let registry = PropertyRegistry::new([
//!     ("depth", PropertyDefinition::typed(|_, parent: Option<Arc<u32>>| {
//!         Ok(parent.map_or(0, |p| *p + 1))
//!     })),
//! ])?;
//!
//! let root = create_root(registry, None).await?;
//! let request = root.child().await?;
//! assert_eq!(*request.get_as::<u32>("depth").await?, 1);
//! request.done().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod context;
pub mod defaults;
pub mod errors;
pub mod logging;
pub mod observability;
pub mod property;
pub mod scope;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::context::{
        create_root, Context, ContextFactory, ContextId, ContextInfo, IdGenerator,
        SequentialIds, UuidIds,
    };
    pub use crate::defaults::background;
    pub use crate::errors::{CleanupError, ContextError, PropertyError};
    pub use crate::logging::{ContextLogger, LogLevel, LoggerFactory, LOG_PROPERTY};
    pub use crate::observability::{init_tracing, TracingConfig};
    pub use crate::property::{
        Disposer, Materializer, PropertyAccessor, PropertyDefinition, PropertyRegistry,
        PropertyValue,
    };
    pub use crate::scope::{ScopeConfig, ScopeOutcome, ScopeRunner};
    pub use std::sync::Arc;
}
