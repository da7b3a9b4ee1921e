//! Serializable point-in-time view of a context.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{Context, ContextId};
use crate::utils::Timestamp;

/// A read-only snapshot of a context's observable state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextInfo {
    /// The context id.
    pub id: ContextId,
    /// The parent id, absent for the root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<ContextId>,
    /// Distance from the root.
    pub depth: usize,
    /// Whether `done()` has finished.
    pub is_done: bool,
    /// Lifetime in milliseconds, frozen once completed.
    pub lifetime_ms: f64,
    /// When the context was constructed.
    pub started_at: Timestamp,
    /// Children not yet completed.
    pub active_children: usize,
    /// Disposers waiting for completion.
    pub pending_cleanups: usize,
    /// Properties with a live cached value on this context.
    #[serde(default)]
    pub materialized: Vec<String>,
}

impl ContextInfo {
    /// Converts to a dictionary.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map.into_iter().collect(),
            _ => HashMap::new(),
        }
    }
}

impl Context {
    /// Captures the current state of this context.
    #[must_use]
    pub fn info(&self) -> ContextInfo {
        ContextInfo {
            id: self.id().clone(),
            parent_id: self.parent().map(|p| p.id().clone()),
            depth: self.depth(),
            is_done: self.is_done(),
            lifetime_ms: self.lifetime().as_secs_f64() * 1e3,
            started_at: self.started_at(),
            active_children: self.active_children(),
            pending_cleanups: self.pending_cleanups(),
            materialized: self.materialized().into_iter().map(String::from).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::context::create_root;
    use crate::property::{PropertyDefinition, PropertyRegistry};

    #[tokio::test]
    async fn test_info_tracks_state() {
        let registry = PropertyRegistry::new([
            ("a", PropertyDefinition::shared(1_u8)),
            ("b", PropertyDefinition::shared(2_u8)),
        ])
        .unwrap();
        let root = create_root(registry, None).await.unwrap();
        let kid = root.child().await.unwrap();
        kid.get("b").await.unwrap();

        let info = kid.info();
        assert_eq!(info.parent_id.as_ref(), Some(root.id()));
        assert_eq!(info.depth, 1);
        assert!(!info.is_done);
        assert_eq!(info.materialized, vec!["b".to_string()]);
        assert_eq!(root.info().active_children, 1);

        kid.done().await.unwrap();
        assert!(kid.info().is_done);
        assert_eq!(root.info().active_children, 0);
    }

    #[tokio::test]
    async fn test_to_dict() {
        let root = create_root(PropertyRegistry::empty(), None).await.unwrap();
        let dict = root.info().to_dict();

        assert_eq!(dict.get("id"), Some(&serde_json::json!("1")));
        assert!(!dict.contains_key("parent_id"));
        assert_eq!(dict.get("depth"), Some(&serde_json::json!(0)));
    }
}
