//! # Round-Robin Router
//!
//! Picks the next broker for an inbound request from whatever the instance
//! registry currently reports.
//!
//! ## Cursor semantics
//!
//! The cursor is a single `AtomicI32` shared by every request task. Each
//! selection does one `fetch_add`, so concurrent selections always observe
//! distinct counter values. `fetch_add` wraps on overflow, which sends the
//! counter through the negative range under sustained load; the index is
//! therefore taken with a sign-safe modulo (`rem_euclid`) rather than `%`.
//!
//! The list length is read fresh on every call. When instances come and go
//! between calls the distribution drifts for a moment, which is acceptable.

use serde::Serialize;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::core::error::{DiscoveryError, DiscoveryResult};
use crate::core::types::InstanceEndpoint;
use crate::discovery::InstanceRegistry;

/// Modulo that always lands in `[0, divisor)`, also for negative dividends
///
/// `divisor` must be non-zero.
pub fn sign_safe_mod(dividend: i32, divisor: usize) -> usize {
    (dividend as i64).rem_euclid(divisor as i64) as usize
}

/// Shared round-robin counter
#[derive(Debug, Default)]
pub struct RoundRobinCursor {
    counter: AtomicI32,
}

impl RoundRobinCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cursor whose first selection uses `value`
    pub fn starting_at(value: i32) -> Self {
        Self {
            counter: AtomicI32::new(value),
        }
    }

    /// Post-increment the counter and map the old value into `[0, len)`
    pub fn next_index(&self, len: usize) -> usize {
        let value = self.counter.fetch_add(1, Ordering::SeqCst);
        sign_safe_mod(value, len)
    }

    /// Current counter value
    pub fn position(&self) -> i32 {
        self.counter.load(Ordering::SeqCst)
    }
}

/// Router statistics for the admin surface
#[derive(Debug, Clone, Serialize)]
pub struct RouterStats {
    pub algorithm: &'static str,
    pub cursor: i32,
    pub total_selections: u64,
    pub failed_selections: u64,
}

/// Round-robin selection over the registry's healthy instances
pub struct RoundRobinRouter {
    registry: Arc<dyn InstanceRegistry>,
    cursor: RoundRobinCursor,
    total_selections: AtomicU64,
    failed_selections: AtomicU64,
}

impl RoundRobinRouter {
    /// Create a router over `registry` with the cursor at zero
    pub fn new(registry: Arc<dyn InstanceRegistry>) -> Self {
        Self::with_cursor(registry, RoundRobinCursor::new())
    }

    /// Create a router with a pre-positioned cursor
    pub fn with_cursor(registry: Arc<dyn InstanceRegistry>, cursor: RoundRobinCursor) -> Self {
        Self {
            registry,
            cursor,
            total_selections: AtomicU64::new(0),
            failed_selections: AtomicU64::new(0),
        }
    }

    /// Pick the next instance
    ///
    /// Fails with [`DiscoveryError::NoInstanceAvailable`] when the registry is
    /// empty; the cursor is not advanced in that case.
    pub fn select_instance(&self) -> DiscoveryResult<InstanceEndpoint> {
        let instances = self.registry.healthy_instances();

        if instances.is_empty() {
            self.failed_selections.fetch_add(1, Ordering::Relaxed);
            return Err(DiscoveryError::NoInstanceAvailable);
        }

        let index = self.cursor.next_index(instances.len());
        self.total_selections.fetch_add(1, Ordering::Relaxed);

        let selected = &instances[index];
        debug!(
            instance_id = %selected.id,
            index,
            available = instances.len(),
            algorithm = "round_robin",
            "Selected instance"
        );

        Ok(selected.clone())
    }

    pub fn stats(&self) -> RouterStats {
        RouterStats {
            algorithm: "round_robin",
            cursor: self.cursor.position(),
            total_selections: self.total_selections.load(Ordering::Relaxed),
            failed_selections: self.failed_selections.load(Ordering::Relaxed),
        }
    }

    pub fn registry(&self) -> &Arc<dyn InstanceRegistry> {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::StaticRegistry;

    fn registry(ids: &[&str]) -> Arc<StaticRegistry> {
        Arc::new(StaticRegistry::with_instances(
            ids.iter()
                .map(|id| InstanceEndpoint::new(*id, format!("http://{}:8080", id)))
                .collect(),
        ))
    }

    fn select_ids(router: &RoundRobinRouter, count: usize) -> Vec<String> {
        (0..count).map(|_| router.select_instance().unwrap().id).collect()
    }

    #[test]
    fn test_sign_safe_mod() {
        assert_eq!(sign_safe_mod(7, 3), 1);
        assert_eq!(sign_safe_mod(-1, 3), 2);
        assert_eq!(sign_safe_mod(-3, 3), 0);
        assert_eq!(sign_safe_mod(i32::MIN, 3), 1);
        assert_eq!(sign_safe_mod(i32::MAX, 1), 0);
    }

    #[test]
    fn test_round_robin_order_wraps() {
        let router = RoundRobinRouter::new(registry(&["A", "B", "C"]));
        assert_eq!(select_ids(&router, 4), vec!["A", "B", "C", "A"]);
        assert_eq!(router.stats().total_selections, 4);
    }

    #[test]
    fn test_cursor_through_signed_overflow() {
        let cursor = RoundRobinCursor::starting_at(i32::MAX - 1);
        let indices: Vec<usize> = (0..4).map(|_| cursor.next_index(4)).collect();
        // MAX-1, MAX, MIN, MIN+1
        assert_eq!(indices, vec![2, 3, 0, 1]);
        assert!(cursor.position() < 0);

        let cursor = RoundRobinCursor::starting_at(i32::MAX);
        for _ in 0..10 {
            assert!(cursor.next_index(3) < 3);
        }
    }

    #[test]
    fn test_empty_registry_fails_every_call() {
        let router = RoundRobinRouter::new(registry(&[]));
        for _ in 0..3 {
            assert_eq!(router.select_instance(), Err(DiscoveryError::NoInstanceAvailable));
        }
        assert_eq!(router.stats().failed_selections, 3);
        assert_eq!(router.stats().cursor, 0);
    }

    #[test]
    fn test_list_changes_between_calls() {
        let registry = registry(&["A", "B"]);
        let router = RoundRobinRouter::new(registry.clone());
        assert_eq!(select_ids(&router, 1), vec!["A"]);

        registry.register(InstanceEndpoint::new("C", "http://C:8080"));
        // cursor is now 1, list is [A, B, C]
        assert_eq!(select_ids(&router, 3), vec!["B", "C", "A"]);

        registry.replace_all(Vec::new());
        assert!(router.select_instance().is_err());
    }

    #[test]
    fn test_concurrent_selections_get_distinct_counter_values() {
        let router = Arc::new(RoundRobinRouter::new(registry(&["A", "B", "C", "D"])));
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let router = router.clone();
                std::thread::spawn(move || select_ids(&router, 1000))
            })
            .collect();

        let mut counts = std::collections::HashMap::new();
        for thread in threads {
            for id in thread.join().unwrap() {
                *counts.entry(id).or_insert(0) += 1;
            }
        }

        // 8000 distinct counter values over 4 instances split evenly
        assert_eq!(router.stats().cursor, 8000);
        assert!(counts.values().all(|count| *count == 2000));
    }
}
