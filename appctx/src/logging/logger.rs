//! Context-scoped loggers and the factory that owns their level.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, info_span, trace, warn, Span};

use super::{LevelListeners, ListenerKey, LogLevel};
use crate::context::{Context, ContextId};
use crate::property::{PropertyAccessor, PropertyDefinition};

/// Property name under which loggers are conventionally registered.
pub const LOG_PROPERTY: &str = "log";

/// A logger bound to one context.
///
/// Events are emitted through `tracing` inside a span carrying the context
/// id. The level follows the owning [`LoggerFactory`] until the logger is
/// closed.
#[derive(Debug)]
pub struct ContextLogger {
    id: ContextId,
    level: Arc<AtomicU8>,
    span: Span,
    listeners: Arc<LevelListeners>,
    key: Mutex<Option<ListenerKey>>,
}

impl ContextLogger {
    /// Returns the id of the context this logger belongs to.
    #[must_use]
    pub fn id(&self) -> &ContextId {
        &self.id
    }

    /// Returns the current level.
    #[must_use]
    pub fn level(&self) -> LogLevel {
        LogLevel::from_u8(self.level.load(Ordering::SeqCst))
    }

    /// Returns true if events at `level` would be emitted.
    #[must_use]
    pub fn enabled(&self, level: LogLevel) -> bool {
        level != LogLevel::Off && level <= self.level()
    }

    /// Returns the span events are recorded in.
    #[must_use]
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Logs at error level.
    pub fn error(&self, message: impl fmt::Display) {
        self.log(LogLevel::Error, &message);
    }

    /// Logs at warn level.
    pub fn warn(&self, message: impl fmt::Display) {
        self.log(LogLevel::Warn, &message);
    }

    /// Logs at info level.
    pub fn info(&self, message: impl fmt::Display) {
        self.log(LogLevel::Info, &message);
    }

    /// Logs at debug level.
    pub fn debug(&self, message: impl fmt::Display) {
        self.log(LogLevel::Debug, &message);
    }

    /// Logs at trace level.
    pub fn trace(&self, message: impl fmt::Display) {
        self.log(LogLevel::Trace, &message);
    }

    /// Records a named measurement at info level.
    pub fn metric(&self, name: &str, value: f64) {
        if !self.enabled(LogLevel::Info) {
            return;
        }
        let _entered = self.span.enter();
        info!(ctx_id = %self.id, metric = name, value, "metric");
    }

    fn log(&self, level: LogLevel, message: &dyn fmt::Display) {
        if !self.enabled(level) {
            return;
        }
        let _entered = self.span.enter();
        match level {
            LogLevel::Off => {}
            LogLevel::Error => error!(ctx_id = %self.id, "{}", message),
            LogLevel::Warn => warn!(ctx_id = %self.id, "{}", message),
            LogLevel::Info => info!(ctx_id = %self.id, "{}", message),
            LogLevel::Debug => debug!(ctx_id = %self.id, "{}", message),
            LogLevel::Trace => trace!(ctx_id = %self.id, "{}", message),
        }
    }

    /// Stops following level changes. Returns false if already closed.
    pub fn close(&self) -> bool {
        match self.key.lock().take() {
            Some(key) => self.listeners.deregister(key),
            None => false,
        }
    }

    /// Returns true once [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.key.lock().is_none()
    }
}

impl Drop for ContextLogger {
    fn drop(&mut self) {
        if let Some(key) = self.key.get_mut().take() {
            self.listeners.deregister(key);
        }
    }
}

struct FactoryInner {
    level: AtomicU8,
    listeners: Arc<LevelListeners>,
}

/// Creates context loggers and owns their shared level.
///
/// Cheap to clone; clones control the same loggers.
#[derive(Clone)]
pub struct LoggerFactory {
    inner: Arc<FactoryInner>,
}

impl Default for LoggerFactory {
    fn default() -> Self {
        Self::new(LogLevel::default())
    }
}

impl LoggerFactory {
    /// Creates a factory with a base level.
    #[must_use]
    pub fn new(level: LogLevel) -> Self {
        Self {
            inner: Arc::new(FactoryInner {
                level: AtomicU8::new(level.to_u8()),
                listeners: Arc::new(LevelListeners::new()),
            }),
        }
    }

    /// Returns the base level.
    #[must_use]
    pub fn level(&self) -> LogLevel {
        LogLevel::from_u8(self.inner.level.load(Ordering::SeqCst))
    }

    /// Changes the level of the factory and of every open logger.
    pub fn set_level(&self, level: LogLevel) {
        self.inner.level.store(level.to_u8(), Ordering::SeqCst);
        self.inner.listeners.notify(level);
        debug!(level = %level, loggers = self.listener_count(), "Log level changed");
    }

    /// Returns the number of open loggers following the level.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }

    /// Creates a logger for `id`, nested under `parent`'s span if given.
    #[must_use]
    pub fn logger(&self, id: &ContextId, parent: Option<&ContextLogger>) -> ContextLogger {
        let span = match parent {
            Some(parent) => info_span!(parent: &parent.span, "context", ctx_id = %id),
            None => info_span!("context", ctx_id = %id),
        };

        let level = Arc::new(AtomicU8::new(self.level().to_u8()));
        let follower = Arc::clone(&level);
        let key = self.inner.listeners.register(move |new_level| {
            follower.store(new_level.to_u8(), Ordering::SeqCst);
        });

        ContextLogger {
            id: id.clone(),
            level,
            span,
            listeners: Arc::clone(&self.inner.listeners),
            key: Mutex::new(Some(key)),
        }
    }

    /// Returns an accessor that attaches a logger to any context.
    ///
    /// The logger is closed once the context completes.
    #[must_use]
    pub fn accessor(&self) -> PropertyAccessor<ContextLogger> {
        let factory = self.clone();
        PropertyAccessor::new(LOG_PROPERTY, move |ctx: &Context| Ok(factory.logger(ctx.id(), None)))
            .with_dispose(|logger, _| {
                logger.close();
                Ok(())
            })
    }

    /// Returns a registry definition producing one logger per context.
    ///
    /// Child loggers nest under their parent's span; `done()` closes them.
    #[must_use]
    pub fn definition(&self) -> PropertyDefinition {
        let factory = self.clone();
        PropertyDefinition::typed(move |ctx: &Context, parent: Option<Arc<ContextLogger>>| {
            Ok(factory.logger(ctx.id(), parent.as_deref()))
        })
        .with_typed_dispose_fn(|logger: Arc<ContextLogger>, _| {
            logger.close();
            Ok(())
        })
    }
}

impl fmt::Debug for LoggerFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggerFactory")
            .field("level", &self.level())
            .field("loggers", &self.listener_count())
            .finish()
    }
}
