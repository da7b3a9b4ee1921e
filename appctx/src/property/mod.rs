//! Property definitions, the registry, and standalone accessors.

mod accessor;
mod definition;
mod registry;

pub use accessor::PropertyAccessor;
pub use definition::{Disposer, Materializer, PropertyDefinition, PropertyValue};
pub use registry::{PropertyOrdinal, PropertyRegistry, RegistryBuilder};
