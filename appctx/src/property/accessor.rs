//! Standalone per-context lazy values.
//!
//! A [`PropertyAccessor`] lets a subsystem attach a scoped singleton to any
//! context without being part of the registry the tree was built from.

use dashmap::DashMap;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::context::{Context, ContextId, NodeKey};
use crate::errors::{ContextError, PropertyError};

type LoadFn<T> = dyn Fn(Context) -> BoxFuture<'static, Result<T, PropertyError>> + Send + Sync;
type UnloadFn<T> =
    dyn Fn(Arc<T>, ContextId) -> BoxFuture<'static, Result<(), PropertyError>> + Send + Sync;

/// A materialize/dispose pair applied to any context.
///
/// The first [`get`](Self::get) for a context materializes and caches the
/// value in accessor-private storage, then schedules disposal for when the
/// context completes. Later calls return the same `Arc`.
pub struct PropertyAccessor<T> {
    name: Arc<str>,
    load: Arc<LoadFn<T>>,
    unload: Option<Arc<UnloadFn<T>>>,
    values: Arc<DashMap<NodeKey, Arc<OnceCell<Arc<T>>>>>,
}

impl<T: Send + Sync + 'static> PropertyAccessor<T> {
    /// Creates an accessor from a synchronous loader.
    #[must_use]
    pub fn new<F>(name: impl AsRef<str>, load: F) -> Self
    where
        F: Fn(&Context) -> Result<T, PropertyError> + Send + Sync + 'static,
    {
        Self::from_load(
            name.as_ref(),
            Arc::new(move |ctx: Context| {
                let loaded = load(&ctx);
                Box::pin(async move { loaded }) as BoxFuture<'static, _>
            }),
        )
    }

    /// Creates an accessor from an asynchronous loader.
    #[must_use]
    pub fn new_async<F, Fut>(name: impl AsRef<str>, load: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, PropertyError>> + Send + 'static,
    {
        Self::from_load(
            name.as_ref(),
            Arc::new(move |ctx| Box::pin(load(ctx)) as BoxFuture<'static, _>),
        )
    }

    fn from_load(name: &str, load: Arc<LoadFn<T>>) -> Self {
        Self {
            name: Arc::from(name),
            load,
            unload: None,
            values: Arc::new(DashMap::new()),
        }
    }

    /// Sets a synchronous unloader, run once the context completes.
    #[must_use]
    pub fn with_dispose<F>(mut self, unload: F) -> Self
    where
        F: Fn(Arc<T>, ContextId) -> Result<(), PropertyError> + Send + Sync + 'static,
    {
        self.unload = Some(Arc::new(move |value, id| {
            let result = unload(value, id);
            Box::pin(async move { result }) as BoxFuture<'static, _>
        }));
        self
    }

    /// Sets an asynchronous unloader, run once the context completes.
    #[must_use]
    pub fn with_async_dispose<F, Fut>(mut self, unload: F) -> Self
    where
        F: Fn(Arc<T>, ContextId) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), PropertyError>> + Send + 'static,
    {
        self.unload = Some(Arc::new(move |value, id| {
            Box::pin(unload(value, id)) as BoxFuture<'static, _>
        }));
        self
    }

    /// Returns the value for `ctx`, materializing it on first use.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyDone` if the context has completed and holds no
    /// value from this accessor, or `Materialize` if the loader fails. A
    /// first read outside a Tokio runtime also fails with `Materialize`,
    /// since disposal is scheduled as a task on the current runtime.
    pub async fn get(&self, ctx: &Context) -> Result<Arc<T>, ContextError> {
        let key = ctx.key();
        let cell = Arc::clone(
            self.values
                .entry(key)
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .value(),
        );

        if let Some(value) = cell.get() {
            return Ok(Arc::clone(value));
        }

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                self.values.remove_if(&key, |_, cell| !cell.initialized());
                return Err(ContextError::materialize(
                    &*self.name,
                    anyhow::Error::new(e).context("no runtime to schedule disposal on"),
                ));
            }
        };

        let loaded_here = AtomicBool::new(false);
        let result = cell
            .get_or_try_init(|| async {
                ctx.ensure_active()?;
                let value = (self.load)(ctx.clone())
                    .await
                    .map_err(|e| ContextError::materialize(&*self.name, e))?;
                loaded_here.store(true, Ordering::SeqCst);
                Ok::<_, ContextError>(Arc::new(value))
            })
            .await;

        match result {
            Ok(value) => {
                let value = Arc::clone(value);
                if loaded_here.load(Ordering::SeqCst) {
                    self.schedule_unload(&runtime, ctx, key, Arc::clone(&value));
                }
                Ok(value)
            }
            Err(err) => {
                self.values
                    .remove_if(&key, |_, cell| !cell.initialized());
                Err(err)
            }
        }
    }

    fn schedule_unload(&self, runtime: &Handle, ctx: &Context, key: NodeKey, value: Arc<T>) {
        let name = Arc::clone(&self.name);
        let unload = self.unload.clone();
        let values = Arc::clone(&self.values);
        let id = ctx.id().clone();
        let completed = ctx.wait();

        runtime.spawn(async move {
            completed.await;
            values.remove(&key);

            let Some(unload) = unload else {
                return;
            };
            match unload(value, id.clone()).await {
                Ok(()) => debug!(ctx_id = %id, property = %name, "Unloaded accessor value"),
                Err(e) => warn!(
                    ctx_id = %id,
                    property = %name,
                    error = %e,
                    "Accessor unload failed"
                ),
            }
        });
    }

    /// Returns the property name used in logs and errors.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of contexts currently holding a value.
    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.values
            .iter()
            .filter(|entry| entry.value().initialized())
            .count()
    }
}

impl<T> Clone for PropertyAccessor<T> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            load: Arc::clone(&self.load),
            unload: self.unload.clone(),
            values: Arc::clone(&self.values),
        }
    }
}

impl<T> fmt::Debug for PropertyAccessor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyAccessor")
            .field("name", &self.name)
            .field("contexts", &self.values.len())
            .finish()
    }
}
