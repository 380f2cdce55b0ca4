use crate::core::errors::TripsplitError;
use crate::core::models::balance::BalanceView;
use crate::infrastructure::cache::Cache;
use crate::infrastructure::cache::cache_keys::user_balances_key;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

type Entry = (Vec<BalanceView>, chrono::DateTime<chrono::Utc>);

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, Entry>,
    // Bumped on every invalidation; entries loaded under an older value are dropped.
    generations: HashMap<String, u64>,
}

#[derive(Clone, Default)]
pub struct InMemoryCache {
    cache: Arc<RwLock<CacheState>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        InMemoryCache {
            cache: Arc::new(RwLock::new(CacheState::default())),
        }
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get_user_balances(&self, user_id: &str) -> Result<Option<Vec<BalanceView>>, TripsplitError> {
        let cache = self.cache.read().await;
        let key = user_balances_key(user_id);
        Ok(cache
            .entries
            .get(&key)
            .filter(|(_, expiry)| *expiry > chrono::Utc::now())
            .map(|(balances, _)| balances.clone()))
    }

    async fn balances_generation(&self, user_id: &str) -> Result<u64, TripsplitError> {
        let cache = self.cache.read().await;
        Ok(cache.generations.get(&user_balances_key(user_id)).copied().unwrap_or(0))
    }

    async fn save_user_balances(
        &self,
        user_id: &str,
        balances: &[BalanceView],
        generation: u64,
        ttl: std::time::Duration,
    ) -> Result<bool, TripsplitError> {
        let expiry = chrono::Utc::now()
            + chrono::Duration::from_std(ttl)
                .map_err(|e| TripsplitError::CacheError(format!("Failed to convert TTL: {}", e)))?;
        let key = user_balances_key(user_id);
        let mut cache = self.cache.write().await;
        if cache.generations.get(&key).copied().unwrap_or(0) != generation {
            return Ok(false);
        }
        cache.entries.insert(key, (balances.to_vec(), expiry));
        Ok(true)
    }

    async fn invalidate_user_balances(&self, user_ids: &[String]) -> Result<(), TripsplitError> {
        let mut cache = self.cache.write().await;
        for user_id in user_ids {
            let key = user_balances_key(user_id);
            cache.entries.remove(&key);
            *cache.generations.entry(key).or_insert(0) += 1;
        }
        let now = chrono::Utc::now();
        cache.entries.retain(|_, (_, expiry)| *expiry > now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::balance::Direction;
    use crate::core::money::Money;
    use std::time::Duration;

    fn view() -> Vec<BalanceView> {
        vec![BalanceView {
            group_id: "g1".to_string(),
            other_user_id: "bob".to_string(),
            net_amount: Money::from_cents(1000),
            direction: Direction::OwesYou,
        }]
    }

    #[tokio::test]
    async fn returns_fresh_entries() {
        let cache = InMemoryCache::new();
        cache.save_user_balances("alice", &view(), 0, Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get_user_balances("alice").await.unwrap(), Some(view()));
        assert_eq!(cache.get_user_balances("bob").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_entries_are_misses() {
        let cache = InMemoryCache::new();
        cache.save_user_balances("alice", &view(), 0, Duration::ZERO).await.unwrap();
        assert_eq!(cache.get_user_balances("alice").await.unwrap(), None);
    }

    #[tokio::test]
    async fn invalidation_removes_only_named_users() {
        let cache = InMemoryCache::new();
        cache.save_user_balances("alice", &view(), 0, Duration::from_secs(60)).await.unwrap();
        cache.save_user_balances("carol", &view(), 0, Duration::from_secs(60)).await.unwrap();
        cache.invalidate_user_balances(&["alice".to_string()]).await.unwrap();
        assert_eq!(cache.get_user_balances("alice").await.unwrap(), None);
        assert!(cache.get_user_balances("carol").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn fill_loaded_before_invalidation_is_dropped() {
        let cache = InMemoryCache::new();
        let generation = cache.balances_generation("alice").await.unwrap();

        cache.invalidate_user_balances(&["alice".to_string()]).await.unwrap();

        let stored = cache
            .save_user_balances("alice", &view(), generation, Duration::from_secs(60))
            .await
            .unwrap();
        assert!(!stored);
        assert_eq!(cache.get_user_balances("alice").await.unwrap(), None);

        let generation = cache.balances_generation("alice").await.unwrap();
        let stored = cache
            .save_user_balances("alice", &view(), generation, Duration::from_secs(60))
            .await
            .unwrap();
        assert!(stored);
        assert_eq!(cache.get_user_balances("alice").await.unwrap(), Some(view()));
    }
}
