//! Volatile reward store.
//!
//! One mutex guards the idempotency index, the per-user event lists and the
//! ledger, and is held across the duplicate check and the insert.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use super::clock::day_bounds;
use super::reward_store::{sort_by_rewarded_at, RewardStore};
use crate::error::StoreError;
use crate::types::{LedgerEntry, RewardEvent};

#[derive(Default)]
struct MemoryState {
    rewards_by_user: HashMap<String, Vec<RewardEvent>>,
    /// (user_id, idempotency_key) -> reward id
    idempotency_index: HashMap<(String, String), String>,
    ledger: Vec<LedgerEntry>,
    ledger_ids: HashSet<String>,
}

impl MemoryState {
    fn insert_reward(&mut self, reward: &RewardEvent) -> Result<(), StoreError> {
        if let Some(key) = reward.idempotency_key() {
            let index_key = (reward.user_id.clone(), key.to_string());
            if self.idempotency_index.contains_key(&index_key) {
                return Err(StoreError::Duplicate);
            }
            self.idempotency_index.insert(index_key, reward.id.clone());
        }

        self.rewards_by_user
            .entry(reward.user_id.clone())
            .or_default()
            .push(reward.clone());
        Ok(())
    }

    fn insert_ledger(&mut self, entries: &[LedgerEntry]) {
        for entry in entries {
            if self.ledger_ids.insert(entry.id.clone()) {
                self.ledger.push(entry.clone());
            }
        }
    }

    fn filtered<F>(&self, user_id: &str, keep: F) -> Vec<RewardEvent>
    where
        F: Fn(&RewardEvent) -> bool,
    {
        let mut events: Vec<RewardEvent> = self
            .rewards_by_user
            .get(user_id)
            .map(|events| events.iter().filter(|e| keep(*e)).cloned().collect())
            .unwrap_or_default();
        sort_by_rewarded_at(&mut events);
        events
    }
}

/// In-memory [`RewardStore`]. Data is lost on restart.
#[derive(Default)]
pub struct MemoryRewardStore {
    state: Mutex<MemoryState>,
}

impl MemoryRewardStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Total ledger lines held, across all users.
    pub fn ledger_len(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.ledger.len())
    }
}

#[async_trait]
impl RewardStore for MemoryRewardStore {
    async fn create_reward(&self, reward: &RewardEvent) -> Result<(), StoreError> {
        self.lock()?.insert_reward(reward)
    }

    async fn find_by_idempotency_key(
        &self,
        user_id: &str,
        key: &str,
    ) -> Result<Option<RewardEvent>, StoreError> {
        if key.is_empty() {
            return Ok(None);
        }
        let state = self.lock()?;
        let Some(id) = state
            .idempotency_index
            .get(&(user_id.to_string(), key.to_string()))
        else {
            return Ok(None);
        };

        Ok(state
            .rewards_by_user
            .get(user_id)
            .and_then(|events| events.iter().find(|e| &e.id == id))
            .cloned())
    }

    async fn list_by_user_and_date(
        &self,
        user_id: &str,
        day: NaiveDate,
    ) -> Result<Vec<RewardEvent>, StoreError> {
        let (start, end) = day_bounds(day);
        Ok(self
            .lock()?
            .filtered(user_id, |e| e.rewarded_at >= start && e.rewarded_at < end))
    }

    async fn list_before_date(
        &self,
        user_id: &str,
        cutoff: NaiveDate,
    ) -> Result<Vec<RewardEvent>, StoreError> {
        let (start, _) = day_bounds(cutoff);
        Ok(self.lock()?.filtered(user_id, |e| e.rewarded_at < start))
    }

    async fn list_all(&self, user_id: &str) -> Result<Vec<RewardEvent>, StoreError> {
        Ok(self.lock()?.filtered(user_id, |_| true))
    }

    async fn upsert_ledger_entries(&self, entries: &[LedgerEntry]) -> Result<(), StoreError> {
        self.lock()?.insert_ledger(entries);
        Ok(())
    }

    async fn record_reward(
        &self,
        reward: &RewardEvent,
        entries: &[LedgerEntry],
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        state.insert_reward(reward)?;
        state.insert_ledger(entries);
        debug!("Recorded reward {} with {} ledger lines", reward.id, entries.len());
        Ok(())
    }

    async fn ledger_for_reward(&self, reward_id: &str) -> Result<Vec<LedgerEntry>, StoreError> {
        Ok(self
            .lock()?
            .ledger
            .iter()
            .filter(|e| e.reward_id == reward_id)
            .cloned()
            .collect())
    }
}
