//! Completion state and the per-context cleanup list.

use futures::future::join_all;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tracing::{debug, warn};

use super::Context;
use crate::errors::DisposeFailure;
use crate::property::{PropertyOrdinal, PropertyValue};

/// Lifecycle phase of a context.
///
/// `Completing` covers the window while disposers run. It is not exposed:
/// callers see a completing context as neither active nor done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Active,
    Completing,
    Done,
}

/// A disposer waiting for its context to complete.
pub(crate) struct PendingCleanup {
    pub(crate) ordinal: PropertyOrdinal,
    pub(crate) value: PropertyValue,
}

/// Mutable lifecycle state of one context, guarded by the context's lock.
pub(crate) struct Lifecycle {
    phase: Phase,
    cleanups: Vec<PendingCleanup>,
    lifetime: Option<Duration>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            phase: Phase::Active,
            cleanups: Vec::new(),
            lifetime: None,
        }
    }

    pub(crate) fn phase(&self) -> Phase {
        self.phase
    }

    pub(crate) fn is_active(&self) -> bool {
        self.phase == Phase::Active
    }

    pub(crate) fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    pub(crate) fn frozen_lifetime(&self) -> Option<Duration> {
        self.lifetime
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.cleanups.len()
    }

    /// Appends a cleanup. Returns false once completion has begun.
    pub(crate) fn register(&mut self, ordinal: PropertyOrdinal, value: PropertyValue) -> bool {
        if !self.is_active() {
            return false;
        }
        self.cleanups.push(PendingCleanup { ordinal, value });
        true
    }

    /// Moves to `Completing`, freezes the lifetime, and hands back every
    /// pending cleanup.
    pub(crate) fn begin_completion(&mut self, lifetime: Duration) -> Vec<PendingCleanup> {
        self.phase = Phase::Completing;
        self.lifetime = Some(lifetime);
        std::mem::take(&mut self.cleanups)
    }

    pub(crate) fn finish(&mut self) {
        self.phase = Phase::Done;
    }
}

/// Runs one disposer and poisons the property afterwards.
///
/// The property is poisoned whether or not the disposer succeeds; a panic is
/// caught and reported as a failure.
pub(crate) async fn dispose_one(ctx: &Context, cleanup: PendingCleanup) -> Option<DisposeFailure> {
    let property = ctx.registry().get(cleanup.ordinal);
    let name = property.name.clone();

    let outcome = match property.definition.disposer() {
        Some(disposer) => {
            AssertUnwindSafe(disposer.dispose(cleanup.value, ctx))
                .catch_unwind()
                .await
        }
        None => Ok(Ok(())),
    };
    ctx.poison(cleanup.ordinal);

    match outcome {
        Ok(Ok(())) => {
            debug!(ctx_id = %ctx.id(), property = %name, "Disposed property");
            None
        }
        Ok(Err(error)) => {
            warn!(ctx_id = %ctx.id(), property = %name, error = %error, "Disposer failed");
            Some(DisposeFailure {
                property: name,
                error,
            })
        }
        Err(panic) => {
            let msg = panic_message(panic.as_ref());
            warn!(ctx_id = %ctx.id(), property = %name, "Disposer panicked: {}", msg);
            Some(DisposeFailure {
                property: name,
                error: anyhow::anyhow!("disposer panicked: {msg}"),
            })
        }
    }
}

/// Dispatches every cleanup concurrently and waits for all of them.
///
/// Failures are collected rather than short-circuiting, so one failing
/// disposer never prevents the others from running.
pub(crate) async fn run_all(ctx: &Context, cleanups: Vec<PendingCleanup>) -> Vec<DisposeFailure> {
    if cleanups.is_empty() {
        return Vec::new();
    }

    join_all(cleanups.into_iter().map(|cleanup| dispose_one(ctx, cleanup)))
        .await
        .into_iter()
        .flatten()
        .collect()
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_lifecycle_starts_active() {
        let lifecycle = Lifecycle::new();
        assert!(lifecycle.is_active());
        assert!(!lifecycle.is_done());
        assert_eq!(lifecycle.pending_count(), 0);
        assert!(lifecycle.frozen_lifetime().is_none());
    }

    #[test]
    fn test_register_rejected_after_completion_begins() {
        let mut lifecycle = Lifecycle::new();
        assert!(lifecycle.register(0, Arc::new(1_u8)));

        let taken = lifecycle.begin_completion(Duration::from_millis(5));
        assert_eq!(taken.len(), 1);
        assert_eq!(lifecycle.phase(), Phase::Completing);
        assert!(!lifecycle.is_active());
        assert!(!lifecycle.is_done());
        assert!(!lifecycle.register(1, Arc::new(2_u8)));
        assert_eq!(lifecycle.frozen_lifetime(), Some(Duration::from_millis(5)));

        lifecycle.finish();
        assert!(lifecycle.is_done());
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(3_u8);
        assert_eq!(panic_message(boxed.as_ref()), "<non-string panic>");
    }
}
