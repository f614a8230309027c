//! Handler Registry: `(namespace, name, version)` -> handlers,
//! with validate-then-publish atomic registration and O(1) lookup.

use super::handler::{StepHandler, TaskHandler};
use crate::error::CoreError;
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandlerKey {
    pub namespace: String,
    pub name: String,
    pub version: String,
}

impl HandlerKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            version: version.into(),
        }
    }

    pub fn default_namespace(name: impl Into<String>) -> Self {
        Self::new("default", name, "0.1.0")
    }
}

struct TaskEntry {
    task_handler: Option<Arc<dyn TaskHandler>>,
    step_handlers: Vec<Arc<dyn StepHandler>>,
}

/// `(namespace, name, version)` -> registered handlers. Registration is
/// validate-then-publish: a new template's step handlers are fully built and
/// checked for internal consistency (no duplicate step names) before the
/// entry becomes visible to lookups, so concurrent readers never observe a
/// partially-registered template.
#[derive(Default)]
pub struct HandlerRegistry {
    entries: DashMap<HandlerKey, Arc<TaskEntry>>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("registered", &self.entries.len())
            .finish()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task template's handlers atomically. Fails validation if
    /// two `StepHandler`s claim the same `step_name`.
    pub fn register(
        &self,
        key: HandlerKey,
        task_handler: Option<Arc<dyn TaskHandler>>,
        step_handlers: Vec<Arc<dyn StepHandler>>,
    ) -> Result<(), CoreError> {
        let mut seen = std::collections::HashSet::new();
        for handler in &step_handlers {
            if !seen.insert(handler.step_name().to_string()) {
                return Err(CoreError::Validation {
                    entity: format!("{}/{}/{}", key.namespace, key.name, key.version),
                    reason: format!("duplicate step handler for '{}'", handler.step_name()),
                });
            }
        }

        let entry = Arc::new(TaskEntry {
            task_handler,
            step_handlers,
        });
        self.entries.insert(key, entry);
        Ok(())
    }

    /// Look up a step's handler, distinguishing "namespace/name/version was
    /// never registered" from "it's registered but has no such step" so
    /// callers can tell the two apart instead of folding both into one
    /// generic not-found.
    pub fn step_handler(&self, key: &HandlerKey, step_name: &str) -> Result<Arc<dyn StepHandler>, CoreError> {
        let entry = self.entries.get(key).ok_or_else(|| CoreError::HandlerNamespaceNotFound {
            namespace: key.namespace.clone(),
            name: key.name.clone(),
            version: key.version.clone(),
        })?;

        entry
            .step_handlers
            .iter()
            .find(|h| h.step_name() == step_name)
            .cloned()
            .ok_or_else(|| CoreError::HandlerStepNotFound {
                namespace: key.namespace.clone(),
                name: key.name.clone(),
                version: key.version.clone(),
                step_name: step_name.to_string(),
            })
    }

    pub fn task_handler(&self, key: &HandlerKey) -> Result<Arc<dyn TaskHandler>, CoreError> {
        let entry = self.entries.get(key).ok_or_else(|| CoreError::HandlerNamespaceNotFound {
            namespace: key.namespace.clone(),
            name: key.name.clone(),
            version: key.version.clone(),
        })?;

        entry.task_handler.clone().ok_or_else(|| CoreError::HandlerStepNotFound {
            namespace: key.namespace.clone(),
            name: key.name.clone(),
            version: key.version.clone(),
            step_name: "<task_handler>".to_string(),
        })
    }

    pub fn is_registered(&self, key: &HandlerKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All registered keys, optionally filtered to one namespace.
    pub fn list(&self, namespace: Option<&str>) -> Vec<HandlerKey> {
        self.entries
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|key| namespace.map_or(true, |ns| key.namespace == ns))
            .collect()
    }

    /// Distinct namespaces with at least one registered entry.
    pub fn namespaces(&self) -> Vec<String> {
        let mut namespaces: Vec<String> =
            self.entries.iter().map(|entry| entry.key().namespace.clone()).collect();
        namespaces.sort_unstable();
        namespaces.dedup();
        namespaces
    }
}
