//! Mock materializers and disposers.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::context::{Context, ContextId};
use crate::errors::PropertyError;
use crate::property::{Disposer, Materializer, PropertyValue};

/// A materializer that counts its calls and yields the call number as a `u64`.
///
/// Clones share the counter.
#[derive(Debug, Clone, Default)]
pub struct CountingMaterializer {
    calls: Arc<AtomicU64>,
    delay: Option<Duration>,
}

impl CountingMaterializer {
    /// Creates a new counting materializer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleeps for `delay` before yielding, to widen race windows.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Returns the number of calls so far.
    #[must_use]
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Materializer for CountingMaterializer {
    async fn materialize(
        &self,
        _ctx: &Context,
        _parent: Option<PropertyValue>,
    ) -> Result<PropertyValue, PropertyError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Arc::new(n))
    }
}

/// A disposer that records the id of every context it disposes for.
///
/// Clones share the record, so a test can keep one clone and hand the other
/// to a definition.
#[derive(Debug, Clone, Default)]
pub struct RecordingDisposer {
    disposed: Arc<Mutex<Vec<ContextId>>>,
}

impl RecordingDisposer {
    /// Creates a new recording disposer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded ids in disposal order.
    #[must_use]
    pub fn disposed(&self) -> Vec<ContextId> {
        self.disposed.lock().clone()
    }

    /// Returns the number of disposals.
    #[must_use]
    pub fn count(&self) -> usize {
        self.disposed.lock().len()
    }
}

#[async_trait]
impl Disposer for RecordingDisposer {
    async fn dispose(&self, _value: PropertyValue, ctx: &Context) -> Result<(), PropertyError> {
        self.disposed.lock().push(ctx.id().clone());
        Ok(())
    }
}

/// A disposer that always fails, by error or by panic.
#[derive(Debug, Clone)]
pub struct FailingDisposer {
    message: String,
    panics: bool,
}

impl FailingDisposer {
    /// Creates a disposer that returns an error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            panics: false,
        }
    }

    /// Creates a disposer that panics.
    #[must_use]
    pub fn panicking(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            panics: true,
        }
    }
}

#[async_trait]
impl Disposer for FailingDisposer {
    async fn dispose(&self, _value: PropertyValue, _ctx: &Context) -> Result<(), PropertyError> {
        if self.panics {
            panic!("{}", self.message);
        }
        Err(anyhow::anyhow!("{}", self.message))
    }
}

/// A disposer that takes time, then records like [`RecordingDisposer`].
#[derive(Debug, Clone)]
pub struct SlowDisposer {
    delay: Duration,
    record: RecordingDisposer,
}

impl SlowDisposer {
    /// Creates a slow disposer.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            record: RecordingDisposer::new(),
        }
    }

    /// Creates a slow disposer with delay in milliseconds.
    #[must_use]
    pub fn with_delay_ms(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    /// Returns the shared record of completed disposals.
    #[must_use]
    pub fn record(&self) -> &RecordingDisposer {
        &self.record
    }
}

#[async_trait]
impl Disposer for SlowDisposer {
    async fn dispose(&self, value: PropertyValue, ctx: &Context) -> Result<(), PropertyError> {
        tokio::time::sleep(self.delay).await;
        self.record.dispose(value, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::create_root;
    use crate::property::PropertyRegistry;

    #[tokio::test]
    async fn test_counting_materializer() {
        let ctx = create_root(PropertyRegistry::empty(), None).await.unwrap();
        let counter = CountingMaterializer::new();
        let shared = counter.clone();

        let first = counter.materialize(&ctx, None).await.unwrap();
        shared.materialize(&ctx, None).await.unwrap();
        assert_eq!(*first.downcast::<u64>().unwrap(), 1);
        assert_eq!(counter.calls(), 2);
    }

    #[tokio::test]
    async fn test_recording_disposer() {
        let ctx = create_root(PropertyRegistry::empty(), None).await.unwrap();
        let recorder = RecordingDisposer::new();
        recorder.dispose(Arc::new(()), &ctx).await.unwrap();
        assert_eq!(recorder.disposed(), vec![ctx.id().clone()]);
    }

    #[tokio::test]
    async fn test_failing_disposer() {
        let ctx = create_root(PropertyRegistry::empty(), None).await.unwrap();
        let err = FailingDisposer::new("nope")
            .dispose(Arc::new(()), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "nope");
    }
}
