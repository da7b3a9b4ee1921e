//! Error types for the appctx framework.
//!
//! Every variant of [`ContextError`] except [`ContextError::Materialize`] and
//! [`ContextError::Cleanup`] describes API misuse and is reported at the point
//! of misuse. Materializer and disposer failures are user errors carried as
//! [`PropertyError`].

use std::collections::HashMap;
use thiserror::Error;

use crate::context::ContextId;

/// The error type produced by user materializers and disposers.
pub type PropertyError = anyhow::Error;

/// The main error type for context operations.
#[derive(Debug, Error)]
pub enum ContextError {
    /// A property definition was rejected at registration.
    #[error("Invalid definition for property '{name}': {reason}")]
    InvalidDefinition {
        /// The property name.
        name: String,
        /// Why the definition was rejected.
        reason: String,
    },

    /// Two definitions share a name.
    #[error("Duplicate property: '{name}' is registered more than once")]
    DuplicateProperty {
        /// The duplicated property name.
        name: String,
    },

    /// The property is not in the registry.
    #[error("Unknown property: '{name}'")]
    UnknownProperty {
        /// The requested property name.
        name: String,
    },

    /// The property was disposed by `done()`.
    #[error("Attempt to use 'ctx.{name}' after calling 'ctx.done()'")]
    UseAfterCleanup {
        /// The property name.
        name: String,
    },

    /// `done()` was called while children are still active.
    #[error("Attempt to call done() on context {id} with {active} active children")]
    ActiveChildren {
        /// The context id.
        id: ContextId,
        /// The number of active children.
        active: usize,
    },

    /// The context has already completed (or is completing).
    #[error("Context {id} is already done")]
    AlreadyDone {
        /// The context id.
        id: ContextId,
    },

    /// A typed read found a value of another type.
    #[error("Type mismatch for property '{name}': expected {expected}")]
    TypeMismatch {
        /// The property name.
        name: String,
        /// The requested type name.
        expected: &'static str,
    },

    /// A materializer failed.
    #[error("Failed to materialize property '{name}': {source}")]
    Materialize {
        /// The property name.
        name: String,
        /// The underlying failure.
        #[source]
        source: PropertyError,
    },

    /// One or more disposers failed during `done()`.
    #[error("{0}")]
    Cleanup(#[from] CleanupError),

    /// Tracing subscriber setup failed.
    #[error("Tracing setup error: {0}")]
    Tracing(String),
}

impl ContextError {
    /// Creates an invalid definition error.
    #[must_use]
    pub fn invalid_definition(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates a duplicate property error.
    #[must_use]
    pub fn duplicate_property(name: impl Into<String>) -> Self {
        Self::DuplicateProperty { name: name.into() }
    }

    /// Creates an unknown property error.
    #[must_use]
    pub fn unknown_property(name: impl Into<String>) -> Self {
        Self::UnknownProperty { name: name.into() }
    }

    /// Creates a use-after-cleanup error.
    #[must_use]
    pub fn use_after_cleanup(name: impl Into<String>) -> Self {
        Self::UseAfterCleanup { name: name.into() }
    }

    /// Creates an already-done error.
    #[must_use]
    pub fn already_done(id: &ContextId) -> Self {
        Self::AlreadyDone { id: id.clone() }
    }

    /// Creates a materialize error.
    #[must_use]
    pub fn materialize(name: impl Into<String>, source: PropertyError) -> Self {
        Self::Materialize {
            name: name.into(),
            source,
        }
    }

    /// Returns the stable type tag used in [`ContextError::to_dict`].
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidDefinition { .. } => "InvalidDefinition",
            Self::DuplicateProperty { .. } => "DuplicateProperty",
            Self::UnknownProperty { .. } => "UnknownProperty",
            Self::UseAfterCleanup { .. } => "UseAfterCleanup",
            Self::ActiveChildren { .. } => "ActiveChildrenError",
            Self::AlreadyDone { .. } => "AlreadyDone",
            Self::TypeMismatch { .. } => "TypeMismatch",
            Self::Materialize { .. } => "MaterializeError",
            Self::Cleanup(_) => "CleanupError",
            Self::Tracing(_) => "TracingError",
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("type".to_string(), serde_json::json!(self.kind()));

        match self {
            Self::InvalidDefinition { name, reason } => {
                map.insert("name".to_string(), serde_json::json!(name));
                map.insert("reason".to_string(), serde_json::json!(reason));
            }
            Self::DuplicateProperty { name }
            | Self::UnknownProperty { name }
            | Self::UseAfterCleanup { name }
            | Self::Materialize { name, .. } => {
                map.insert("name".to_string(), serde_json::json!(name));
            }
            Self::ActiveChildren { id, active } => {
                map.insert("ctx_id".to_string(), serde_json::json!(id.as_str()));
                map.insert("active_children".to_string(), serde_json::json!(active));
            }
            Self::AlreadyDone { id } => {
                map.insert("ctx_id".to_string(), serde_json::json!(id.as_str()));
            }
            Self::TypeMismatch { name, expected } => {
                map.insert("name".to_string(), serde_json::json!(name));
                map.insert("expected".to_string(), serde_json::json!(expected));
            }
            Self::Cleanup(err) => {
                map.insert("ctx_id".to_string(), serde_json::json!(err.id.as_str()));
                map.insert(
                    "failed".to_string(),
                    serde_json::json!(err.property_names()),
                );
            }
            Self::Tracing(_) => {}
        }

        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map
    }
}

/// A single disposer failure.
#[derive(Debug)]
pub struct DisposeFailure {
    /// The property whose disposer failed.
    pub property: String,
    /// The failure (a returned error or a caught panic).
    pub error: PropertyError,
}

/// Aggregate of every disposer failure from one `done()` call.
#[derive(Debug, Error)]
#[error("{} disposer(s) failed while completing context {id}: {}", .failures.len(), summary(.failures))]
pub struct CleanupError {
    /// The context that was completing.
    pub id: ContextId,
    /// Every failure, in completion order.
    pub failures: Vec<DisposeFailure>,
}

fn summary(failures: &[DisposeFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{}: {}", f.property, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

impl CleanupError {
    /// Creates an aggregate cleanup error.
    #[must_use]
    pub fn new(id: ContextId, failures: Vec<DisposeFailure>) -> Self {
        Self { id, failures }
    }

    /// Returns the names of the properties whose disposers failed.
    #[must_use]
    pub fn property_names(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.property.as_str()).collect()
    }
}
