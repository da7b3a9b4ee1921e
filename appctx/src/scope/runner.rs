//! Runs one unit of work inside its own child context.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::ScopeConfig;
use crate::context::Context;
use crate::errors::ContextError;
use crate::logging::{ContextLogger, LOG_PROPERTY};

/// Metadata header carrying the scope lifetime.
pub const REQUEST_TIME_HEADER: &str = "x-request-time";
/// Metadata header carrying the scope's context id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";
/// Metric logged with the scope lifetime in milliseconds.
pub const REQUEST_TIMER_METRIC: &str = "request.timer";

/// Lets the work take over completion of its context.
///
/// Once hijacked, the runner neither records metadata nor calls `done()`;
/// the work is responsible for it.
#[derive(Debug, Clone, Default)]
pub struct Hijack {
    flag: Arc<AtomicBool>,
}

impl Hijack {
    /// Takes over completion.
    pub fn hijack(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Returns true if completion was taken over.
    #[must_use]
    pub fn is_hijacked(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Response metadata of a completed scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeMetadata {
    /// Lifetime formatted as milliseconds with three decimals, e.g. `12.345ms`.
    pub request_time: String,
    /// The context id, when exposed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ScopeMetadata {
    /// Returns the metadata as `(header, value)` pairs.
    #[must_use]
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![(REQUEST_TIME_HEADER, self.request_time.clone())];
        if let Some(id) = &self.request_id {
            headers.push((REQUEST_ID_HEADER, id.clone()));
        }
        headers
    }
}

/// Result of [`ScopeRunner::run`].
#[derive(Debug)]
pub struct ScopeOutcome<T> {
    /// What the work returned.
    pub result: T,
    /// Metadata, absent when the work hijacked completion.
    pub metadata: Option<ScopeMetadata>,
    /// Watchdog for a hijacked scope that was not yet done. Resolves to true
    /// if it had to warn.
    pub watchdog: Option<JoinHandle<bool>>,
}

/// Creates a child of a base context per unit of work and completes it.
#[derive(Debug, Clone)]
pub struct ScopeRunner {
    base: Context,
    config: ScopeConfig,
}

impl ScopeRunner {
    /// Creates a runner over `base`.
    #[must_use]
    pub fn new(base: Context, config: ScopeConfig) -> Self {
        Self { base, config }
    }

    /// Returns the base context.
    #[must_use]
    pub fn base(&self) -> &Context {
        &self.base
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ScopeConfig {
        &self.config
    }

    /// Runs `work` in a fresh child context.
    ///
    /// Unless the work hijacks completion, the child is completed after the
    /// work returns (if the work has not done so itself).
    ///
    /// # Errors
    ///
    /// Returns the error of creating the child, or of completing it.
    pub async fn run<F, Fut, T>(&self, work: F) -> Result<ScopeOutcome<T>, ContextError>
    where
        F: FnOnce(Context, Hijack) -> Fut,
        Fut: Future<Output = T>,
    {
        let ctx = self.base.child().await?;
        let hijack = Hijack::default();

        let result = work(ctx.clone(), hijack.clone()).await;

        if hijack.is_hijacked() {
            let watchdog = (!ctx.is_done())
                .then(|| spawn_watchdog(ctx.clone(), self.config.hijack_grace()));
            debug!(ctx_id = %ctx.id(), "Scope hijacked");
            return Ok(ScopeOutcome {
                result,
                metadata: None,
                watchdog,
            });
        }

        let lifetime = ctx.lifetime();
        let metadata = ScopeMetadata {
            request_time: format_millis(lifetime),
            request_id: self.config.expose_id.then(|| ctx.id().to_string()),
        };

        if self.config.log_timing {
            log_timer(&ctx, lifetime).await;
        }

        if !ctx.is_done() {
            ctx.done().await?;
        }

        Ok(ScopeOutcome {
            result,
            metadata: Some(metadata),
            watchdog: None,
        })
    }
}

async fn log_timer(ctx: &Context, lifetime: Duration) {
    if !ctx.registry().contains(LOG_PROPERTY) {
        return;
    }
    match ctx.get_as::<ContextLogger>(LOG_PROPERTY).await {
        Ok(logger) => logger.metric(REQUEST_TIMER_METRIC, lifetime.as_secs_f64() * 1e3),
        Err(e) => debug!(ctx_id = %ctx.id(), error = %e, "No logger for request timer"),
    }
}

fn spawn_watchdog(ctx: Context, grace: Duration) -> JoinHandle<bool> {
    tokio::spawn(async move {
        if tokio::time::timeout(grace, ctx.wait()).await.is_ok() || ctx.is_done() {
            return false;
        }
        warn!(
            ctx_id = %ctx.id(),
            grace_ms = grace.as_millis(),
            "Hijacked scope has not called done()"
        );
        true
    })
}

/// Formats a duration as milliseconds with three decimals.
#[must_use]
pub fn format_millis(duration: Duration) -> String {
    format!("{:.3}ms", duration.as_secs_f64() * 1e3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::create_root;
    use crate::logging::LoggerFactory;
    use crate::property::PropertyRegistry;
    use pretty_assertions::assert_eq;

    fn quick() -> ScopeConfig {
        ScopeConfig::new().with_hijack_grace(Duration::from_millis(20))
    }

    #[test]
    fn test_format_millis() {
        assert_eq!(format_millis(Duration::from_micros(12_345)), "12.345ms");
        assert_eq!(format_millis(Duration::ZERO), "0.000ms");
    }

    #[tokio::test]
    async fn test_runner_debug_includes_base_context() {
        let root = create_root(PropertyRegistry::empty(), None).await.unwrap();
        let runner = ScopeRunner::new(root, quick());

        let formatted = tokio::task::spawn_blocking(move || format!("{runner:?}"));
        let debug = tokio::time::timeout(Duration::from_secs(2), formatted)
            .await
            .unwrap()
            .unwrap();
        assert!(debug.contains("ScopeRunner"));
        assert!(debug.contains("base: Context"));
        assert!(debug.contains("phase: Active"));
    }

    #[tokio::test]
    async fn test_run_completes_child() {
        let root = create_root(PropertyRegistry::empty(), None).await.unwrap();
        let runner = ScopeRunner::new(root.clone(), quick());

        let outcome = runner.run(|ctx, _| async move { ctx }).await.unwrap();
        let ctx = outcome.result;

        assert!(ctx.is_done());
        assert_eq!(ctx.parent().map(|p| p.id()), Some(root.id()));
        assert!(outcome.watchdog.is_none());

        let metadata = outcome.metadata.unwrap();
        assert_eq!(metadata.request_id.as_deref(), Some(ctx.id().as_str()));
        assert!(metadata.request_time.ends_with("ms"));
        let headers = metadata.headers();
        assert_eq!(headers[0].0, REQUEST_TIME_HEADER);
        assert_eq!(headers[1], (REQUEST_ID_HEADER, ctx.id().to_string()));
        assert_eq!(root.active_children(), 0);
    }

    #[tokio::test]
    async fn test_hidden_id() {
        let root = create_root(PropertyRegistry::empty(), None).await.unwrap();
        let runner = ScopeRunner::new(root, quick().with_expose_id(false));

        let outcome = runner.run(|_, _| async {}).await.unwrap();
        let metadata = outcome.metadata.unwrap();
        assert!(metadata.request_id.is_none());
        assert_eq!(metadata.headers().len(), 1);
    }

    #[tokio::test]
    async fn test_work_may_complete_itself() {
        let root = create_root(PropertyRegistry::empty(), None).await.unwrap();
        let runner = ScopeRunner::new(root, quick());

        let outcome = runner
            .run(|ctx, _| async move { ctx.done().await.map(|_| ()) })
            .await
            .unwrap();
        assert!(outcome.result.is_ok());
        assert!(outcome.metadata.is_some());
    }

    #[tokio::test]
    async fn test_timer_logged_through_log_property() {
        let factory = LoggerFactory::default();
        let registry = PropertyRegistry::new([(LOG_PROPERTY, factory.definition())]).unwrap();
        let root = create_root(registry, None).await.unwrap();
        let runner = ScopeRunner::new(root, quick());

        let outcome = runner
            .run(|ctx, _| async move { ctx.get_as::<ContextLogger>(LOG_PROPERTY).await.is_ok() })
            .await
            .unwrap();
        assert!(outcome.result);
        // Only the root logger stays open.
        assert_eq!(factory.listener_count(), 1);
    }

    #[tokio::test]
    async fn test_hijacked_without_done_warns() {
        let root = create_root(PropertyRegistry::empty(), None).await.unwrap();
        let runner = ScopeRunner::new(root.clone(), quick());

        let outcome = runner
            .run(|ctx, hijack| async move {
                hijack.hijack();
                ctx
            })
            .await
            .unwrap();

        assert!(outcome.metadata.is_none());
        assert!(!outcome.result.is_done());
        assert!(outcome.watchdog.unwrap().await.unwrap());
        assert_eq!(root.active_children(), 1);
    }

    #[tokio::test]
    async fn test_hijacked_and_done_in_time() {
        let root = create_root(PropertyRegistry::empty(), None).await.unwrap();
        let runner = ScopeRunner::new(root, quick());

        let outcome = runner
            .run(|ctx, hijack| async move {
                hijack.hijack();
                ctx
            })
            .await
            .unwrap();

        let watchdog = outcome.watchdog.unwrap();
        outcome.result.done().await.unwrap();
        assert!(!watchdog.await.unwrap());
    }

    #[tokio::test]
    async fn test_hijacked_after_done_has_no_watchdog() {
        let root = create_root(PropertyRegistry::empty(), None).await.unwrap();
        let runner = ScopeRunner::new(root, quick());

        let outcome = runner
            .run(|ctx, hijack| async move {
                hijack.hijack();
                ctx.done().await.unwrap();
            })
            .await
            .unwrap();
        assert!(outcome.watchdog.is_none());
    }

    #[tokio::test]
    async fn test_run_on_done_base_fails() {
        let root = create_root(PropertyRegistry::empty(), None).await.unwrap();
        root.done().await.unwrap();
        let runner = ScopeRunner::new(root, quick());

        let err = runner.run(|_, _| async {}).await.unwrap_err();
        assert_eq!(err.kind(), "AlreadyDone");
    }
}
