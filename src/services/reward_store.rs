//! Storage contract for rewards and their ledger lines.
//!
//! Two backends implement it: [`SqliteRewardStore`](super::SqliteRewardStore)
//! for durable storage and [`MemoryRewardStore`](super::MemoryRewardStore)
//! for local runs and tests. The services never know which one they hold.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::StoreError;
use crate::types::{LedgerEntry, RewardEvent};

/// Append-only store of reward events keyed by user.
///
/// All list methods return events ordered ascending by `rewarded_at`, ties
/// broken by id. Days are UTC calendar days.
#[async_trait]
pub trait RewardStore: Send + Sync {
    /// Append a reward.
    ///
    /// Fails with [`StoreError::Duplicate`] when the user already has a reward
    /// with the same non-empty idempotency key.
    async fn create_reward(&self, reward: &RewardEvent) -> Result<(), StoreError>;

    /// Look up a reward by idempotency key. An empty key never matches.
    async fn find_by_idempotency_key(
        &self,
        user_id: &str,
        key: &str,
    ) -> Result<Option<RewardEvent>, StoreError>;

    /// Rewards with `rewarded_at` inside `[day 00:00, day+1 00:00)`.
    async fn list_by_user_and_date(
        &self,
        user_id: &str,
        day: NaiveDate,
    ) -> Result<Vec<RewardEvent>, StoreError>;

    /// Rewards strictly before the start of `cutoff`.
    async fn list_before_date(
        &self,
        user_id: &str,
        cutoff: NaiveDate,
    ) -> Result<Vec<RewardEvent>, StoreError>;

    async fn list_all(&self, user_id: &str) -> Result<Vec<RewardEvent>, StoreError>;

    /// Append ledger lines. Entries with an id already stored are left untouched.
    async fn upsert_ledger_entries(&self, entries: &[LedgerEntry]) -> Result<(), StoreError>;

    /// Append a reward together with its ledger lines as one unit.
    ///
    /// Readers never observe the reward without its lines. Uniqueness is
    /// enforced exactly as in [`create_reward`](Self::create_reward).
    async fn record_reward(
        &self,
        reward: &RewardEvent,
        entries: &[LedgerEntry],
    ) -> Result<(), StoreError>;

    async fn ledger_for_reward(&self, reward_id: &str) -> Result<Vec<LedgerEntry>, StoreError>;
}

/// Sort key shared by both backends.
pub(crate) fn sort_by_rewarded_at(events: &mut [RewardEvent]) {
    events.sort_by(|a, b| {
        a.rewarded_at
            .cmp(&b.rewarded_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}
