//! The immutable registry of property definitions shared by a context tree.

use std::collections::HashMap;
use std::sync::Arc;

use super::PropertyDefinition;
use crate::errors::ContextError;

/// Stable index of a property within its registry.
pub type PropertyOrdinal = usize;

/// A registered property.
#[derive(Debug, Clone)]
pub(crate) struct RegisteredProperty {
    pub(crate) name: String,
    pub(crate) definition: PropertyDefinition,
}

/// Mapping from property name to definition.
///
/// Read-only once built: there is no API to add or replace a property after
/// construction, so live contexts never see property semantics change.
#[derive(Debug, Default)]
pub struct PropertyRegistry {
    properties: Vec<RegisteredProperty>,
    index: HashMap<String, PropertyOrdinal>,
}

impl PropertyRegistry {
    /// Builds a registry from `(name, definition)` pairs.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDefinition` for a rejected definition and
    /// `DuplicateProperty` when two definitions share a name.
    pub fn new<I, S>(definitions: I) -> Result<Arc<Self>, ContextError>
    where
        I: IntoIterator<Item = (S, PropertyDefinition)>,
        S: Into<String>,
    {
        let mut builder = Self::builder();
        for (name, definition) in definitions {
            builder.register(name, definition)?;
        }
        builder.build()
    }

    /// Creates an empty builder.
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Creates a registry with no properties.
    #[must_use]
    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns the ordinal of a property.
    #[must_use]
    pub fn ordinal(&self, name: &str) -> Option<PropertyOrdinal> {
        self.index.get(name).copied()
    }

    /// Returns the definition registered under `name`.
    #[must_use]
    pub fn definition(&self, name: &str) -> Option<&PropertyDefinition> {
        self.ordinal(name).map(|i| &self.properties[i].definition)
    }

    /// Returns true if `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Returns property names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.properties.iter().map(|p| p.name.as_str()).collect()
    }

    /// Returns the number of properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Returns true if no properties are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub(crate) fn get(&self, ordinal: PropertyOrdinal) -> &RegisteredProperty {
        &self.properties[ordinal]
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (PropertyOrdinal, &RegisteredProperty)> {
        self.properties.iter().enumerate()
    }
}

/// Collects definitions and validates them into a [`PropertyRegistry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    properties: Vec<RegisteredProperty>,
}

impl RegistryBuilder {
    /// Registers a property.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDefinition` if the name is empty or the definition
    /// has no materializer.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        definition: PropertyDefinition,
    ) -> Result<&mut Self, ContextError> {
        let name = name.into();

        if name.trim().is_empty() {
            return Err(ContextError::invalid_definition(
                name,
                "property name must not be empty",
            ));
        }
        if !definition.has_materializer() {
            return Err(ContextError::invalid_definition(
                name,
                "definition must have a materializer",
            ));
        }

        self.properties.push(RegisteredProperty { name, definition });
        Ok(self)
    }

    /// Builds the registry.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateProperty` if two definitions share a name
    /// (case-sensitive).
    pub fn build(&mut self) -> Result<Arc<PropertyRegistry>, ContextError> {
        let properties = std::mem::take(&mut self.properties);
        let mut index = HashMap::with_capacity(properties.len());

        for (ordinal, property) in properties.iter().enumerate() {
            if index.insert(property.name.clone(), ordinal).is_some() {
                return Err(ContextError::duplicate_property(&property.name));
            }
        }

        Ok(Arc::new(PropertyRegistry { properties, index }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn counter() -> PropertyDefinition {
        PropertyDefinition::shared(0_u64)
    }

    #[test]
    fn test_registry_preserves_order() {
        let registry = PropertyRegistry::new([("b", counter()), ("a", counter())]).unwrap();

        assert_eq!(registry.names(), vec!["b", "a"]);
        assert_eq!(registry.ordinal("a"), Some(1));
        assert_eq!(registry.len(), 2);
        assert!(registry.contains("b"));
        assert!(!registry.contains("c"));
    }

    #[test]
    fn test_duplicate_property_rejected() {
        let err = PropertyRegistry::new([("log", counter()), ("log", counter())]).unwrap_err();
        assert!(matches!(err, ContextError::DuplicateProperty { ref name } if name == "log"));
    }

    #[test]
    fn test_names_are_case_sensitive() {
        let registry = PropertyRegistry::new([("log", counter()), ("Log", counter())]).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_missing_materializer_rejected() {
        let mut builder = PropertyRegistry::builder();
        let err = builder
            .register("id", PropertyDefinition::default().with_initial("background"))
            .unwrap_err();
        assert!(matches!(err, ContextError::InvalidDefinition { .. }));
    }

    #[test]
    fn test_empty_name_rejected() {
        let mut builder = PropertyRegistry::builder();
        let err = builder.register("  ", counter()).unwrap_err();
        assert_eq!(err.kind(), "InvalidDefinition");
    }

    #[test]
    fn test_builder_chaining() {
        let registry = PropertyRegistry::builder()
            .register("a", counter())
            .and_then(|b| b.register("b", counter()))
            .and_then(RegistryBuilder::build)
            .unwrap();
        assert_eq!(registry.names(), vec!["a", "b"]);
    }

    #[test]
    fn test_empty_registry() {
        let registry = PropertyRegistry::empty();
        assert!(registry.is_empty());
        assert!(registry.definition("anything").is_none());
    }
}
