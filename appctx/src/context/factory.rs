//! Root construction.

use std::fmt;
use std::sync::Arc;
use tracing::debug;

use super::{Context, ContextId, IdGenerator, SequentialIds};
use crate::errors::ContextError;
use crate::property::PropertyRegistry;

/// Builds root contexts for a registry.
///
/// Every node in a tree created from the same factory shares its registry
/// and id generator.
#[derive(Clone)]
pub struct ContextFactory {
    registry: Arc<PropertyRegistry>,
    ids: Arc<dyn IdGenerator>,
    root_id: Option<ContextId>,
}

impl ContextFactory {
    /// Creates a factory with sequential ids.
    #[must_use]
    pub fn new(registry: Arc<PropertyRegistry>) -> Self {
        Self {
            registry,
            ids: Arc::new(SequentialIds::new()),
            root_id: None,
        }
    }

    /// Sets the id generator.
    #[must_use]
    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Gives the root a fixed id instead of drawing one from the generator.
    #[must_use]
    pub fn with_root_id(mut self, id: impl Into<ContextId>) -> Self {
        self.root_id = Some(id.into());
        self
    }

    /// Returns the registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<PropertyRegistry> {
        &self.registry
    }

    /// Creates a new root context.
    ///
    /// # Errors
    ///
    /// Returns the error of any property that runs on construction.
    pub async fn create_root(&self) -> Result<Context, ContextError> {
        let id = self
            .root_id
            .clone()
            .unwrap_or_else(|| self.ids.next_id());

        let root = Context::new_node(Arc::clone(&self.registry), Arc::clone(&self.ids), id, None)
            .construct()
            .await?;

        debug!(ctx_id = %root.id(), properties = self.registry.len(), "Created root context");
        Ok(root)
    }
}

impl fmt::Debug for ContextFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextFactory")
            .field("properties", &self.registry.names())
            .field("root_id", &self.root_id)
            .finish_non_exhaustive()
    }
}

/// Creates a root context, using sequential ids when `ids` is `None`.
///
/// # Errors
///
/// Returns the error of any property that runs on construction.
pub async fn create_root(
    registry: Arc<PropertyRegistry>,
    ids: Option<Arc<dyn IdGenerator>>,
) -> Result<Context, ContextError> {
    let mut factory = ContextFactory::new(registry);
    if let Some(ids) = ids {
        factory = factory.with_id_generator(ids);
    }
    factory.create_root().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::UuidIds;
    use crate::property::PropertyDefinition;

    #[tokio::test]
    async fn test_root_takes_first_sequential_id() {
        let root = create_root(PropertyRegistry::empty(), None).await.unwrap();
        assert_eq!(root.id().as_str(), "1");
        assert_eq!(root.depth(), 0);
        assert!(root.parent().is_none());

        let kid = root.child().await.unwrap();
        assert_eq!(kid.id().as_str(), "2");
    }

    #[tokio::test]
    async fn test_fixed_root_id() {
        let factory = ContextFactory::new(PropertyRegistry::empty())
            .with_id_generator(Arc::new(UuidIds::v4()))
            .with_root_id("background");

        let root = factory.create_root().await.unwrap();
        assert_eq!(root.id().as_str(), "background");

        let kid = root.child().await.unwrap();
        assert_eq!(kid.id().as_str().len(), 36);
    }

    #[tokio::test]
    async fn test_custom_generator_closure() {
        let ids: Arc<dyn IdGenerator> = Arc::new(|| ContextId::from("fixed"));
        let root = create_root(PropertyRegistry::empty(), Some(ids)).await.unwrap();
        assert_eq!(root.id().as_str(), "fixed");
    }

    #[tokio::test]
    async fn test_independent_roots() {
        let registry = PropertyRegistry::new([("n", PropertyDefinition::shared(1_u8))]).unwrap();
        let factory = ContextFactory::new(registry);

        let a = factory.create_root().await.unwrap();
        let b = factory.create_root().await.unwrap();
        assert_ne!(a.id(), b.id());
        assert!(!a.ptr_eq(&b));
        assert!(Arc::ptr_eq(a.registry(), b.registry()));
    }
}
