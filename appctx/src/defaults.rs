//! The default application context.

use std::sync::Arc;

use crate::context::{Context, ContextFactory, UuidIds};
use crate::errors::ContextError;
use crate::logging::{LoggerFactory, LOG_PROPERTY};
use crate::property::{PropertyDefinition, PropertyRegistry};

/// Id of the default root context.
pub const BACKGROUND_ID: &str = "background";

/// Builds the default tree: a root named `background` whose registry holds
/// a `log` property plus `extra`, with UUID ids for every child.
///
/// The logger is materialized when each context is constructed. The
/// returned factory controls the level of every logger in the tree.
///
/// # Errors
///
/// Returns `DuplicateProperty` if `extra` also defines `log`, or any error
/// from `extra`'s eager properties.
pub async fn background<I, S>(extra: I) -> Result<(Context, LoggerFactory), ContextError>
where
    I: IntoIterator<Item = (S, PropertyDefinition)>,
    S: Into<String>,
{
    let loggers = LoggerFactory::default();

    let mut builder = PropertyRegistry::builder();
    builder.register(LOG_PROPERTY, loggers.definition().run_on_construction())?;
    for (name, definition) in extra {
        builder.register(name, definition)?;
    }
    let registry = builder.build()?;

    let root = ContextFactory::new(registry)
        .with_id_generator(Arc::new(UuidIds::v4()))
        .with_root_id(BACKGROUND_ID)
        .create_root()
        .await?;

    Ok((root, loggers))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{ContextLogger, LogLevel};

    #[tokio::test]
    async fn test_background_context() {
        let (root, loggers) = background(Vec::<(String, PropertyDefinition)>::new())
            .await
            .unwrap();
        assert_eq!(root.id().as_str(), BACKGROUND_ID);
        assert!(root.is_materialized(LOG_PROPERTY).unwrap());
        assert_eq!(loggers.listener_count(), 1);

        let kid = root.child().await.unwrap();
        assert_eq!(kid.id().as_str().len(), 36);
        assert_eq!(loggers.listener_count(), 2);

        let log = kid.get_as::<ContextLogger>(LOG_PROPERTY).await.unwrap();
        loggers.set_level(LogLevel::Trace);
        assert!(log.enabled(LogLevel::Trace));

        kid.done().await.unwrap();
        root.done().await.unwrap();
        assert_eq!(loggers.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_extra_properties() {
        let (root, _) = background([("answer", PropertyDefinition::shared(42_u32))])
            .await
            .unwrap();
        assert_eq!(*root.get_as::<u32>("answer").await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_log_cannot_be_redefined() {
        let err = background([(LOG_PROPERTY, PropertyDefinition::shared(()))])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "DuplicateProperty");
    }
}
