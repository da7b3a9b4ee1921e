//! The context node: identity, lazy property cache, and completion.

use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::any::{type_name, Any};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{watch, OnceCell};
use tracing::{debug, warn};

use super::lifecycle::{self, Lifecycle, PendingCleanup};
use super::{ContextId, IdGenerator};
use crate::errors::{CleanupError, ContextError};
use crate::property::{PropertyOrdinal, PropertyRegistry, PropertyValue};
use crate::utils::{now_utc, Timestamp};

static NEXT_NODE_KEY: AtomicU64 = AtomicU64::new(0);

/// Process-unique identity of a context node, independent of its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeKey(u64);

impl NodeKey {
    fn next() -> Self {
        Self(NEXT_NODE_KEY.fetch_add(1, Ordering::Relaxed))
    }
}

/// One cache entry per registered property.
#[derive(Default)]
struct PropertySlot {
    value: OnceCell<PropertyValue>,
    poisoned: AtomicBool,
}

impl PropertySlot {
    /// A cached value that has not been disposed.
    fn is_live(&self) -> bool {
        self.value.initialized() && !self.poisoned.load(Ordering::SeqCst)
    }
}

struct ContextInner {
    key: NodeKey,
    id: ContextId,
    parent: Option<Context>,
    depth: usize,
    registry: Arc<PropertyRegistry>,
    ids: Arc<dyn IdGenerator>,
    slots: Box<[PropertySlot]>,
    lifecycle: Mutex<Lifecycle>,
    children: Mutex<Vec<Weak<ContextInner>>>,
    started: Instant,
    started_at: Timestamp,
    completed: watch::Sender<bool>,
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        let lifecycle = self.lifecycle.get_mut();
        if lifecycle.is_active() && lifecycle.pending_count() > 0 {
            warn!(
                ctx_id = %self.id,
                pending = lifecycle.pending_count(),
                "Context dropped without done(); disposers never ran"
            );
        }
    }
}

/// A scoped node in a context tree.
///
/// `Context` is a cheap handle; clones refer to the same node. A child keeps
/// its parent alive, while a parent only tracks its children weakly to
/// enforce that it cannot complete before them.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    pub(crate) fn new_node(
        registry: Arc<PropertyRegistry>,
        ids: Arc<dyn IdGenerator>,
        id: ContextId,
        parent: Option<Self>,
    ) -> Self {
        let slots = (0..registry.len()).map(|_| PropertySlot::default()).collect();
        let depth = parent.as_ref().map_or(0, |p| p.depth() + 1);
        let (completed, _) = watch::channel(false);

        Self {
            inner: Arc::new(ContextInner {
                key: NodeKey::next(),
                id,
                parent,
                depth,
                registry,
                ids,
                slots,
                lifecycle: Mutex::new(Lifecycle::new()),
                children: Mutex::new(Vec::new()),
                started: Instant::now(),
                started_at: now_utc(),
                completed,
            }),
        }
    }

    /// Materializes every property flagged to run on construction.
    ///
    /// On failure the half-built context is completed so that eager values
    /// with disposers are released.
    pub(crate) async fn construct(self) -> Result<Self, ContextError> {
        let eager: Vec<PropertyOrdinal> = self
            .inner
            .registry
            .iter()
            .filter(|(_, p)| p.definition.runs_on_construction())
            .map(|(ordinal, _)| ordinal)
            .collect();

        for ordinal in eager {
            if let Err(err) = self.resolve(ordinal).await {
                if let Err(cleanup_err) = self.done().await {
                    warn!(ctx_id = %self.id(), error = %cleanup_err, "Failed to release partially constructed context");
                }
                return Err(err);
            }
        }

        Ok(self)
    }

    /// Returns the context id.
    #[must_use]
    pub fn id(&self) -> &ContextId {
        &self.inner.id
    }

    /// Returns the parent context, or `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<&Self> {
        self.inner.parent.as_ref()
    }

    /// Returns the distance from the root (the root is 0).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.inner.depth
    }

    /// Returns the registry shared by the whole tree.
    #[must_use]
    pub fn registry(&self) -> &Arc<PropertyRegistry> {
        &self.inner.registry
    }

    /// Returns the wall-clock construction time.
    #[must_use]
    pub fn started_at(&self) -> Timestamp {
        self.inner.started_at
    }

    /// Returns true once `done()` has finished.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.inner.lifecycle.lock().is_done()
    }

    /// Time since construction, frozen at the moment `done()` was called.
    #[must_use]
    pub fn lifetime(&self) -> Duration {
        self.inner
            .lifecycle
            .lock()
            .frozen_lifetime()
            .unwrap_or_else(|| self.inner.started.elapsed())
    }

    /// Returns the number of children that have not completed.
    #[must_use]
    pub fn active_children(&self) -> usize {
        self.inner
            .children
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|child| !child.lifecycle.lock().is_done())
            .count()
    }

    /// Returns the number of disposers waiting for `done()`.
    #[must_use]
    pub fn pending_cleanups(&self) -> usize {
        self.inner.lifecycle.lock().pending_count()
    }

    /// Returns true if `name` has a cached value on this context that has
    /// not been disposed.
    ///
    /// # Errors
    ///
    /// Returns `UnknownProperty` if `name` is not registered.
    pub fn is_materialized(&self, name: &str) -> Result<bool, ContextError> {
        let ordinal = self.ordinal(name)?;
        Ok(self.inner.slots[ordinal].is_live())
    }

    /// Creates a child context sharing this context's registry.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyDone` if this context has completed or is completing,
    /// or the error of a property that runs on construction.
    pub async fn child(&self) -> Result<Self, ContextError> {
        self.ensure_active()?;

        let id = self.inner.ids.next_id();
        let kid = Self::new_node(
            Arc::clone(&self.inner.registry),
            Arc::clone(&self.inner.ids),
            id,
            Some(self.clone()),
        )
        .construct()
        .await?;

        let registered = {
            let lifecycle = self.inner.lifecycle.lock();
            if lifecycle.is_active() {
                let mut children = self.inner.children.lock();
                children.retain(|child| {
                    child
                        .upgrade()
                        .is_some_and(|child| !child.lifecycle.lock().is_done())
                });
                children.push(Arc::downgrade(&kid.inner));
                true
            } else {
                false
            }
        };

        if !registered {
            if let Err(err) = kid.done().await {
                warn!(ctx_id = %kid.id(), error = %err, "Failed to release orphaned child context");
            }
            return Err(ContextError::already_done(self.id()));
        }

        debug!(ctx_id = %kid.id(), parent_id = %self.id(), depth = kid.depth(), "Created child context");
        Ok(kid)
    }

    /// Completes this context.
    ///
    /// Runs every pending disposer concurrently, poisons the disposed
    /// properties, then resolves every [`wait`](Self::wait). Returns the
    /// frozen lifetime.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyDone` on a second call (including while a first call
    /// is still running disposers), `ActiveChildren` while any child has not
    /// completed, and `Cleanup` with every failure if any disposer failed.
    /// A context whose disposers failed is still done.
    pub async fn done(&self) -> Result<Duration, ContextError> {
        let (lifetime, cleanups) = {
            let mut lifecycle = self.inner.lifecycle.lock();
            if !lifecycle.is_active() {
                return Err(ContextError::already_done(self.id()));
            }
            let active = self.active_children();
            if active > 0 {
                return Err(ContextError::ActiveChildren {
                    id: self.id().clone(),
                    active,
                });
            }
            let lifetime = self.inner.started.elapsed();
            (lifetime, lifecycle.begin_completion(lifetime))
        };

        debug!(
            ctx_id = %self.id(),
            lifetime_ms = lifetime.as_secs_f64() * 1e3,
            pending = cleanups.len(),
            "Completing context"
        );

        let failures = lifecycle::run_all(self, cleanups).await;

        self.inner.lifecycle.lock().finish();
        self.inner.completed.send_replace(true);

        if failures.is_empty() {
            Ok(lifetime)
        } else {
            Err(CleanupError::new(self.id().clone(), failures).into())
        }
    }

    /// Returns a future that resolves once this context is done.
    ///
    /// Resolves immediately if it already is. The future does not keep the
    /// context alive; it also resolves if every handle is dropped without
    /// completing.
    pub fn wait(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut completed = self.inner.completed.subscribe();
        async move {
            let _ = completed.wait_for(|done| *done).await;
        }
    }

    /// Reads a property, materializing it on first access.
    ///
    /// # Errors
    ///
    /// Returns `UnknownProperty`, `UseAfterCleanup` once the property has been
    /// disposed, or `Materialize` if the materializer (here or on an
    /// ancestor) fails.
    pub async fn get(&self, name: &str) -> Result<PropertyValue, ContextError> {
        let ordinal = self.ordinal(name)?;
        self.resolve(ordinal).await
    }

    /// Reads a property and downcasts it to `T`.
    ///
    /// # Errors
    ///
    /// Same as [`get`](Self::get), plus `TypeMismatch`.
    pub async fn get_as<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>, ContextError> {
        self.get(name)
            .await?
            .downcast::<T>()
            .map_err(|_| ContextError::TypeMismatch {
                name: name.to_string(),
                expected: type_name::<T>(),
            })
    }

    fn ordinal(&self, name: &str) -> Result<PropertyOrdinal, ContextError> {
        self.inner
            .registry
            .ordinal(name)
            .ok_or_else(|| ContextError::unknown_property(name))
    }

    fn resolve(&self, ordinal: PropertyOrdinal) -> BoxFuture<'_, Result<PropertyValue, ContextError>> {
        Box::pin(async move {
            let slot = &self.inner.slots[ordinal];
            if slot.poisoned.load(Ordering::SeqCst) {
                let name = &self.inner.registry.get(ordinal).name;
                return Err(ContextError::use_after_cleanup(name));
            }

            let value = slot
                .value
                .get_or_try_init(|| self.materialize(ordinal))
                .await?;
            Ok(Arc::clone(value))
        })
    }

    async fn materialize(&self, ordinal: PropertyOrdinal) -> Result<PropertyValue, ContextError> {
        let property = self.inner.registry.get(ordinal);
        let definition = &property.definition;

        if definition.has_disposer() && !self.inner.lifecycle.lock().is_active() {
            return Err(ContextError::use_after_cleanup(&property.name));
        }

        let value = match (&self.inner.parent, definition.initial()) {
            (None, Some(initial)) => Arc::clone(initial),
            (parent, _) => {
                let parent_value = match parent {
                    Some(parent) => Some(parent.resolve(ordinal).await?),
                    None => None,
                };
                let materializer = definition.materializer().ok_or_else(|| {
                    ContextError::invalid_definition(&property.name, "definition must have a materializer")
                })?;
                materializer
                    .materialize(self, parent_value)
                    .await
                    .map_err(|e| ContextError::materialize(&property.name, e))?
            }
        };

        if definition.has_disposer() {
            let registered = self
                .inner
                .lifecycle
                .lock()
                .register(ordinal, Arc::clone(&value));
            if !registered {
                // Completion started while materializing; release the value now.
                let cleanup = PendingCleanup { ordinal, value };
                if let Some(failure) = lifecycle::dispose_one(self, cleanup).await {
                    warn!(ctx_id = %self.id(), property = %failure.property, error = %failure.error, "Late disposal failed");
                }
                return Err(ContextError::use_after_cleanup(&property.name));
            }
        }

        debug!(ctx_id = %self.id(), property = %property.name, "Materialized property");
        Ok(value)
    }

    pub(crate) fn poison(&self, ordinal: PropertyOrdinal) {
        self.inner.slots[ordinal].poisoned.store(true, Ordering::SeqCst);
    }

    pub(crate) fn ensure_active(&self) -> Result<(), ContextError> {
        if self.inner.lifecycle.lock().is_active() {
            Ok(())
        } else {
            Err(ContextError::already_done(self.id()))
        }
    }

    pub(crate) fn key(&self) -> NodeKey {
        self.inner.key
    }

    /// Returns the names of properties with a live cached value. Disposed
    /// properties are left out.
    #[must_use]
    pub fn materialized(&self) -> Vec<&str> {
        self.inner
            .registry
            .iter()
            .filter(|(ordinal, _)| self.inner.slots[*ordinal].is_live())
            .map(|(_, p)| p.name.as_str())
            .collect()
    }

    /// Returns true if both handles refer to the same node.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (phase, pending) = {
            let lifecycle = self.inner.lifecycle.lock();
            (lifecycle.phase(), lifecycle.pending_count())
        };
        f.debug_struct("Context")
            .field("id", &self.inner.id)
            .field("depth", &self.inner.depth)
            .field("phase", &phase)
            .field("pending_cleanups", &pending)
            .finish()
    }
}
