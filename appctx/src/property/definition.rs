//! Property definitions: the recipe for a lazily materialized value.

use async_trait::async_trait;
use std::any::{type_name, Any};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::context::Context;
use crate::errors::PropertyError;

/// A materialized property value.
pub type PropertyValue = Arc<dyn Any + Send + Sync>;

/// Computes a property value for a context.
///
/// `parent` is the same property resolved on the parent context, or `None`
/// on the root.
#[async_trait]
pub trait Materializer: Send + Sync {
    /// Computes the value for `ctx`.
    async fn materialize(
        &self,
        ctx: &Context,
        parent: Option<PropertyValue>,
    ) -> Result<PropertyValue, PropertyError>;
}

/// Releases a materialized value when its context completes.
#[async_trait]
pub trait Disposer: Send + Sync {
    /// Disposes `value`, which was materialized on `ctx`.
    async fn dispose(&self, value: PropertyValue, ctx: &Context) -> Result<(), PropertyError>;
}

struct FnMaterializer<F>(F);

#[async_trait]
impl<F> Materializer for FnMaterializer<F>
where
    F: Fn(&Context, Option<PropertyValue>) -> Result<PropertyValue, PropertyError> + Send + Sync,
{
    async fn materialize(
        &self,
        ctx: &Context,
        parent: Option<PropertyValue>,
    ) -> Result<PropertyValue, PropertyError> {
        (self.0)(ctx, parent)
    }
}

struct AsyncFnMaterializer<F>(F);

#[async_trait]
impl<F, Fut> Materializer for AsyncFnMaterializer<F>
where
    F: Fn(Context, Option<PropertyValue>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<PropertyValue, PropertyError>> + Send,
{
    async fn materialize(
        &self,
        ctx: &Context,
        parent: Option<PropertyValue>,
    ) -> Result<PropertyValue, PropertyError> {
        (self.0)(ctx.clone(), parent).await
    }
}

struct FnDisposer<F>(F);

#[async_trait]
impl<F> Disposer for FnDisposer<F>
where
    F: Fn(PropertyValue, &Context) -> Result<(), PropertyError> + Send + Sync,
{
    async fn dispose(&self, value: PropertyValue, ctx: &Context) -> Result<(), PropertyError> {
        (self.0)(value, ctx)
    }
}

/// Downcasts a property value, naming the expected type on failure.
pub(crate) fn downcast_value<T: Any + Send + Sync>(
    value: PropertyValue,
) -> Result<Arc<T>, PropertyError> {
    value
        .downcast::<T>()
        .map_err(|_| anyhow::anyhow!("value is not a {}", type_name::<T>()))
}

/// The declared recipe for a named context property.
///
/// A definition without a materializer is rejected at registration: the
/// initial value only applies to the root, so every child needs one.
#[derive(Clone, Default)]
pub struct PropertyDefinition {
    materializer: Option<Arc<dyn Materializer>>,
    initial: Option<PropertyValue>,
    disposer: Option<Arc<dyn Disposer>>,
    run_on_construction: bool,
}

impl PropertyDefinition {
    /// Creates a definition from a materializer.
    #[must_use]
    pub fn new(materializer: impl Materializer + 'static) -> Self {
        Self {
            materializer: Some(Arc::new(materializer)),
            ..Self::default()
        }
    }

    /// Creates a definition from a synchronous, untyped closure.
    #[must_use]
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&Context, Option<PropertyValue>) -> Result<PropertyValue, PropertyError>
            + Send
            + Sync
            + 'static,
    {
        Self::new(FnMaterializer(f))
    }

    /// Creates a definition from an asynchronous closure.
    ///
    /// The closure receives an owned handle to the context so the returned
    /// future can be `'static`.
    #[must_use]
    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(Context, Option<PropertyValue>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<PropertyValue, PropertyError>> + Send + 'static,
    {
        Self::new(AsyncFnMaterializer(f))
    }

    /// Creates a definition from a synchronous, typed closure.
    ///
    /// The parent's value is downcast to `T` before `f` runs.
    #[must_use]
    pub fn typed<T, F>(f: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&Context, Option<Arc<T>>) -> Result<T, PropertyError> + Send + Sync + 'static,
    {
        Self::from_fn(move |ctx, parent| {
            let parent = parent.map(downcast_value::<T>).transpose()?;
            let value: PropertyValue = Arc::new(f(ctx, parent)?);
            Ok(value)
        })
    }

    /// Creates a definition that resolves to the same shared value on
    /// every context.
    #[must_use]
    pub fn shared<T: Any + Send + Sync>(value: T) -> Self {
        let value: PropertyValue = Arc::new(value);
        Self::from_fn(move |_, _| Ok(Arc::clone(&value)))
    }

    /// Sets the value used on the root context instead of materializing.
    #[must_use]
    pub fn with_initial<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.initial = Some(Arc::new(value));
        self
    }

    /// Sets the disposer.
    #[must_use]
    pub fn with_disposer(mut self, disposer: impl Disposer + 'static) -> Self {
        self.disposer = Some(Arc::new(disposer));
        self
    }

    /// Sets a synchronous, untyped disposer.
    #[must_use]
    pub fn with_dispose_fn<F>(self, f: F) -> Self
    where
        F: Fn(PropertyValue, &Context) -> Result<(), PropertyError> + Send + Sync + 'static,
    {
        self.with_disposer(FnDisposer(f))
    }

    /// Sets a synchronous, typed disposer.
    #[must_use]
    pub fn with_typed_dispose_fn<T, F>(self, f: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(Arc<T>, &Context) -> Result<(), PropertyError> + Send + Sync + 'static,
    {
        self.with_dispose_fn(move |value, ctx| f(downcast_value::<T>(value)?, ctx))
    }

    /// Materializes the property as soon as a context is constructed.
    #[must_use]
    pub fn run_on_construction(mut self) -> Self {
        self.run_on_construction = true;
        self
    }

    /// Returns true if a materializer is set.
    #[must_use]
    pub fn has_materializer(&self) -> bool {
        self.materializer.is_some()
    }

    /// Returns true if a root initial value is set.
    #[must_use]
    pub fn has_initial(&self) -> bool {
        self.initial.is_some()
    }

    /// Returns true if a disposer is set.
    #[must_use]
    pub fn has_disposer(&self) -> bool {
        self.disposer.is_some()
    }

    /// Returns true if the property materializes at construction.
    #[must_use]
    pub fn runs_on_construction(&self) -> bool {
        self.run_on_construction
    }

    pub(crate) fn materializer(&self) -> Option<&Arc<dyn Materializer>> {
        self.materializer.as_ref()
    }

    pub(crate) fn initial(&self) -> Option<&PropertyValue> {
        self.initial.as_ref()
    }

    pub(crate) fn disposer(&self) -> Option<&Arc<dyn Disposer>> {
        self.disposer.as_ref()
    }
}

impl fmt::Debug for PropertyDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyDefinition")
            .field("materializer", &self.has_materializer())
            .field("initial", &self.has_initial())
            .field("disposer", &self.has_disposer())
            .field("run_on_construction", &self.run_on_construction)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_definition_is_empty() {
        let def = PropertyDefinition::default();
        assert!(!def.has_materializer());
        assert!(!def.has_disposer());
        assert!(!def.runs_on_construction());
    }

    #[test]
    fn test_builder_flags() {
        let def = PropertyDefinition::typed(|_, _: Option<Arc<u32>>| Ok(1_u32))
            .with_initial(0_u32)
            .with_typed_dispose_fn(|_: Arc<u32>, _| Ok(()))
            .run_on_construction();

        assert!(def.has_materializer());
        assert!(def.has_initial());
        assert!(def.has_disposer());
        assert!(def.runs_on_construction());
    }

    #[test]
    fn test_downcast_value_reports_type() {
        let value: PropertyValue = Arc::new("text");
        let err = downcast_value::<u64>(value).unwrap_err();
        assert!(err.to_string().contains("u64"));
    }

    #[test]
    fn test_shared_yields_one_value() {
        let def = PropertyDefinition::shared(7_u8);
        let ctx = tokio_test::block_on(crate::context::create_root(
            crate::property::PropertyRegistry::empty(),
            None,
        ))
        .unwrap();
        let materializer = def.materializer().unwrap();

        let a = tokio_test::block_on(materializer.materialize(&ctx, None)).unwrap();
        let b = tokio_test::block_on(materializer.materialize(&ctx, None)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_typed_rejects_wrong_parent_type() {
        let def = PropertyDefinition::typed(|_, parent: Option<Arc<u32>>| {
            Ok(parent.map_or(0, |p| *p))
        });
        let ctx = tokio_test::block_on(crate::context::create_root(
            crate::property::PropertyRegistry::empty(),
            None,
        ))
        .unwrap();
        let parent: PropertyValue = Arc::new("not a number");

        let result = tokio_test::block_on(def.materializer().unwrap().materialize(&ctx, Some(parent)));
        assert!(result.is_err());
    }

    #[test]
    fn test_debug_output() {
        let def = PropertyDefinition::shared(5_i32);
        let debug = format!("{def:?}");
        assert!(debug.contains("materializer: true"));
        assert!(debug.contains("disposer: false"));
    }
}
