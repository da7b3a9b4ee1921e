//! Context trees.
//!
//! This module provides:
//! - Context nodes with lazily materialized, inherited properties
//! - Ordered, child-first completion with disposer fan-out
//! - Root construction and id generation

mod factory;
mod identity;
mod lifecycle;
mod node;
mod snapshot;

pub use factory::{create_root, ContextFactory};
pub use identity::{ContextId, IdGenerator, SequentialIds, UuidIds, UuidVersion};
pub(crate) use node::NodeKey;
pub use node::Context;
pub use snapshot::ContextInfo;
