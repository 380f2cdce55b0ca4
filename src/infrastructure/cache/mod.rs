pub mod cache_keys;
pub mod in_memory;

use crate::core::errors::TripsplitError;
use crate::core::models::balance::BalanceView;
use async_trait::async_trait;

#[async_trait]
pub trait Cache: Send + Sync {
    async fn get_user_balances(&self, user_id: &str) -> Result<Option<Vec<BalanceView>>, TripsplitError>;

    /// Current invalidation generation of `user_id`. Read it before loading
    /// the balances that will be passed to [`Cache::save_user_balances`].
    async fn balances_generation(&self, user_id: &str) -> Result<u64, TripsplitError>;

    /// Store `balances` unless `user_id` was invalidated after `generation`
    /// was read. Returns whether the entry was stored.
    async fn save_user_balances(
        &self,
        user_id: &str,
        balances: &[BalanceView],
        generation: u64,
        ttl: std::time::Duration,
    ) -> Result<bool, TripsplitError>;

    async fn invalidate_user_balances(&self, user_ids: &[String]) -> Result<(), TripsplitError>;
}
