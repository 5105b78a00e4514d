//! Per-target breaker registry.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::breaker::CircuitBreaker;
use crate::config::CircuitBreakerConfig;
use crate::state::BreakerSnapshot;

/// Lazily creates and shares one [`CircuitBreaker`] per target name.
///
/// Every caller asking for the same target receives the same breaker, so
/// breaker state is shared across all concurrent callers in the process.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    /// Creates a registry that configures new breakers with `config`.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the breaker for `target`, creating it on first use.
    pub async fn breaker_for(&self, target: &str) -> Arc<CircuitBreaker> {
        {
            let breakers = self.breakers.read().await;
            if let Some(breaker) = breakers.get(target) {
                return breaker.clone();
            }
        }

        let mut breakers = self.breakers.write().await;
        // Another caller may have created it between the two locks.
        if let Some(breaker) = breakers.get(target) {
            return breaker.clone();
        }
        let breaker = Arc::new(CircuitBreaker::new(target, self.config.clone()));
        breakers.insert(target.to_string(), breaker.clone());
        breaker
    }

    /// Returns the snapshot for `target`, if a breaker exists for it.
    pub async fn snapshot(&self, target: &str) -> Option<BreakerSnapshot> {
        let breaker = {
            let breakers = self.breakers.read().await;
            breakers.get(target).cloned()
        };
        match breaker {
            Some(breaker) => Some(breaker.snapshot().await),
            None => None,
        }
    }

    /// Returns snapshots for every breaker, sorted by target name.
    pub async fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let breakers: Vec<Arc<CircuitBreaker>> = {
            let map = self.breakers.read().await;
            map.values().cloned().collect()
        };
        let mut snapshots = Vec::with_capacity(breakers.len());
        for breaker in breakers {
            snapshots.push(breaker.snapshot().await);
        }
        snapshots.sort_by(|a, b| a.target.cmp(&b.target));
        snapshots
    }

    /// Resets the breaker for `target`. Returns false if none exists.
    pub async fn reset(&self, target: &str) -> bool {
        let breaker = {
            let breakers = self.breakers.read().await;
            breakers.get(target).cloned()
        };
        match breaker {
            Some(breaker) => {
                breaker.reset().await;
                true
            }
            None => false,
        }
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::CircuitState;
    use std::time::Duration;

    #[tokio::test]
    async fn test_breaker_for_returns_shared_instance() {
        let registry = CircuitBreakerRegistry::default();
        let first = registry.breaker_for("payment").await;
        let second = registry.breaker_for("payment").await;
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_distinct_targets_get_distinct_breakers() {
        let registry = CircuitBreakerRegistry::default();
        let payment = registry.breaker_for("payment").await;
        let shipping = registry.breaker_for("shipping").await;
        assert!(!Arc::ptr_eq(&payment, &shipping));
    }

    #[tokio::test]
    async fn test_tripping_one_target_leaves_others_closed() {
        let config = CircuitBreakerConfig::new()
            .with_failure_threshold(1)
            .with_open_timeout(Duration::from_secs(60));
        let registry = CircuitBreakerRegistry::new(config);

        let payment = registry.breaker_for("payment").await;
        payment
            .execute(|| async { Err::<(), _>("boom".to_string()) })
            .await
            .unwrap_err();

        assert_eq!(
            registry.snapshot("payment").await.unwrap().state,
            CircuitState::Open
        );
        let shipping = registry.breaker_for("shipping").await;
        assert_eq!(shipping.snapshot().await.state, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_snapshot_missing_target() {
        let registry = CircuitBreakerRegistry::default();
        assert!(registry.snapshot("unknown").await.is_none());
        assert!(!registry.reset("unknown").await);
    }

    #[tokio::test]
    async fn test_snapshots_sorted_by_target() {
        let registry = CircuitBreakerRegistry::default();
        registry.breaker_for("shipping").await;
        registry.breaker_for("inventory").await;
        registry.breaker_for("payment").await;

        let snapshots = registry.snapshots().await;
        let targets: Vec<_> = snapshots.iter().map(|s| s.target.as_str()).collect();
        assert_eq!(targets, vec!["inventory", "payment", "shipping"]);
    }
}
