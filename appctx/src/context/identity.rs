//! Context identity tokens and their generators.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Opaque, stable identifier of a context node.
///
/// Cheap to clone; assigned once when the node is constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ContextId(Arc<str>);

impl ContextId {
    /// Creates an id from any string-like value.
    #[must_use]
    pub fn new(value: impl AsRef<str>) -> Self {
        Self(Arc::from(value.as_ref()))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContextId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ContextId {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl From<Uuid> for ContextId {
    fn from(value: Uuid) -> Self {
        Self::from(value.to_string())
    }
}

impl From<ContextId> for String {
    fn from(value: ContextId) -> Self {
        value.0.to_string()
    }
}

impl AsRef<str> for ContextId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Produces one unique id per context node, root included.
pub trait IdGenerator: Send + Sync {
    /// Returns the next id.
    fn next_id(&self) -> ContextId;
}

impl<F> IdGenerator for F
where
    F: Fn() -> ContextId + Send + Sync,
{
    fn next_id(&self) -> ContextId {
        self()
    }
}

/// Monotonic counter ids: `1`, `2`, `3`, ...
///
/// This is the default generator. Ids are only unique within one generator.
#[derive(Debug, Default)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl SequentialIds {
    /// Creates a counter starting at 1.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many ids have been handed out.
    #[must_use]
    pub fn issued(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> ContextId {
        let id = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        ContextId::from(id.to_string())
    }
}

/// UUID version used by [`UuidIds`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UuidVersion {
    /// Random UUIDs.
    #[default]
    V4,
    /// Time-ordered UUIDs.
    V7,
}

/// Collision-resistant UUID ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIds {
    version: UuidVersion,
}

impl UuidIds {
    /// Creates a v4 generator.
    #[must_use]
    pub fn v4() -> Self {
        Self {
            version: UuidVersion::V4,
        }
    }

    /// Creates a v7 (time-ordered) generator.
    #[must_use]
    pub fn v7() -> Self {
        Self {
            version: UuidVersion::V7,
        }
    }
}

impl IdGenerator for UuidIds {
    fn next_id(&self) -> ContextId {
        let id = match self.version {
            UuidVersion::V4 => Uuid::new_v4(),
            UuidVersion::V7 => Uuid::now_v7(),
        };
        ContextId::from(id)
    }
}
