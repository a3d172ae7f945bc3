//! # Instance Registry
//!
//! The round-robin router asks an [`InstanceRegistry`] for the live list of
//! healthy brokers on every request. How that list is kept current (a
//! coordination service watch, a static file, ...) is the implementation's
//! business; the router only needs a cheap, non-blocking read.
//!
//! [`StaticRegistry`] keeps the list in an `ArcSwap`, so reads are a single
//! atomic load and writers publish a whole new list at once.

use arc_swap::ArcSwap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::core::types::InstanceEndpoint;

/// Source of currently healthy broker instances
///
/// Implementations must answer from memory: the call sits on the request path.
pub trait InstanceRegistry: Send + Sync {
    /// Healthy instances in a stable order; may be empty
    fn healthy_instances(&self) -> Arc<Vec<InstanceEndpoint>>;
}

/// In-memory registry with copy-on-write updates
#[derive(Debug, Default)]
pub struct StaticRegistry {
    instances: ArcSwap<Vec<InstanceEndpoint>>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry seeded with the given instances
    pub fn with_instances(instances: Vec<InstanceEndpoint>) -> Self {
        info!(count = instances.len(), "Seeding instance registry");
        Self {
            instances: ArcSwap::from_pointee(instances),
        }
    }

    /// Add an instance, or replace the one with the same id in place
    pub fn register(&self, instance: InstanceEndpoint) {
        let id = instance.id.clone();
        self.instances.rcu(|current| {
            let mut next = Vec::clone(current);
            match next.iter_mut().find(|existing| existing.id == instance.id) {
                Some(existing) => *existing = instance.clone(),
                None => next.push(instance.clone()),
            }
            next
        });
        debug!(instance_id = %id, "Registered instance");
    }

    /// Remove an instance by id; returns whether it was present
    pub fn deregister(&self, instance_id: &str) -> bool {
        let previous = self.instances.rcu(|current| {
            current
                .iter()
                .filter(|existing| existing.id != instance_id)
                .cloned()
                .collect::<Vec<_>>()
        });
        let removed = previous.iter().any(|existing| existing.id == instance_id);
        if removed {
            debug!(instance_id = %instance_id, "Deregistered instance");
        }
        removed
    }

    /// Replace the whole instance list
    pub fn replace_all(&self, instances: Vec<InstanceEndpoint>) {
        debug!(count = instances.len(), "Replacing instance list");
        self.instances.store(Arc::new(instances));
    }

    pub fn len(&self) -> usize {
        self.instances.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl InstanceRegistry for StaticRegistry {
    fn healthy_instances(&self) -> Arc<Vec<InstanceEndpoint>> {
        self.instances.load_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(registry: &StaticRegistry) -> Vec<String> {
        registry.healthy_instances().iter().map(|i| i.id.clone()).collect()
    }

    #[test]
    fn test_register_keeps_order_and_replaces_in_place() {
        let registry = StaticRegistry::new();
        assert!(registry.is_empty());

        registry.register(InstanceEndpoint::new("a", "http://a:8080"));
        registry.register(InstanceEndpoint::new("b", "http://b:8080"));
        registry.register(InstanceEndpoint::new("a", "http://a:9090"));

        assert_eq!(ids(&registry), vec!["a", "b"]);
        assert_eq!(registry.healthy_instances()[0].web_service_url, "http://a:9090");
    }

    #[test]
    fn test_deregister() {
        let registry = StaticRegistry::with_instances(vec![
            InstanceEndpoint::new("a", "http://a:8080"),
            InstanceEndpoint::new("b", "http://b:8080"),
        ]);

        assert!(registry.deregister("a"));
        assert!(!registry.deregister("a"));
        assert_eq!(ids(&registry), vec!["b"]);
    }

    #[test]
    fn test_readers_keep_their_list_across_updates() {
        let registry = StaticRegistry::with_instances(vec![InstanceEndpoint::new("a", "http://a:8080")]);
        let before = registry.healthy_instances();

        registry.replace_all(Vec::new());

        assert_eq!(before.len(), 1);
        assert_eq!(registry.len(), 0);
    }
}
