//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use stocky::error::{PriceError, StoreError};
use stocky::services::{MemoryRewardStore, PriceSource, RewardStore};
use stocky::types::{FeeBreakdown, LedgerEntry, PriceQuote, RewardEvent};

/// 2024-06-03 10:30:00 UTC, the "now" used across tests.
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 10, 30, 0).unwrap()
}

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Price source with fixed, per-test prices and configurable failures.
#[derive(Default)]
pub struct FixedPriceSource {
    latest: Mutex<HashMap<String, Decimal>>,
    historical: Mutex<HashMap<(String, NaiveDate), Decimal>>,
    failing: Mutex<HashSet<String>>,
    latest_calls: AtomicUsize,
}

impl FixedPriceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latest(self, symbol: &str, price: Decimal) -> Self {
        self.latest.lock().unwrap().insert(symbol.to_string(), price);
        self
    }

    pub fn with_historical(self, symbol: &str, day: NaiveDate, price: Decimal) -> Self {
        self.historical
            .lock()
            .unwrap()
            .insert((symbol.to_string(), day), price);
        self
    }

    pub fn failing(self, symbol: &str) -> Self {
        self.failing.lock().unwrap().insert(symbol.to_string());
        self
    }

    pub fn latest_calls(&self) -> usize {
        self.latest_calls.load(Ordering::SeqCst)
    }

    fn check(&self, symbol: &str) -> Result<(), PriceError> {
        if self.failing.lock().unwrap().contains(symbol) {
            return Err(PriceError::Unavailable {
                symbol: symbol.to_string(),
                reason: "feed down".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PriceSource for FixedPriceSource {
    async fn latest_price(&self, symbol: &str) -> Result<PriceQuote, PriceError> {
        self.latest_calls.fetch_add(1, Ordering::SeqCst);
        self.check(symbol)?;
        let price = self
            .latest
            .lock()
            .unwrap()
            .get(symbol)
            .copied()
            .ok_or_else(|| PriceError::UnknownSymbol(symbol.to_string()))?;
        Ok(PriceQuote::new(symbol, price, now()))
    }

    async fn historical_price(&self, symbol: &str, day: NaiveDate) -> Result<Decimal, PriceError> {
        self.check(symbol)?;
        self.historical
            .lock()
            .unwrap()
            .get(&(symbol.to_string(), day))
            .copied()
            .ok_or_else(|| PriceError::UnknownSymbol(symbol.to_string()))
    }
}

/// A reward as it would sit in a store, bypassing the engine's checks.
pub fn stored_reward(id: &str, symbol: &str, quantity: Decimal, at: DateTime<Utc>) -> RewardEvent {
    RewardEvent {
        id: id.to_string(),
        user_id: "u1".to_string(),
        symbol: symbol.to_string(),
        quantity,
        rewarded_at: at,
        idempotency_key: None,
        fees: FeeBreakdown::default(),
        unit_price: Decimal::ONE,
        total_cost: quantity,
        priced_at: at,
        is_adjustment: quantity < Decimal::ZERO,
    }
}

/// Memory store whose writes and/or reads can be made to fail.
#[derive(Default)]
pub struct FailingStore {
    inner: MemoryRewardStore,
    fail_writes: bool,
    fail_reads: bool,
}

impl FailingStore {
    pub fn failing_writes() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    pub fn failing_reads() -> Self {
        Self {
            fail_reads: true,
            ..Self::default()
        }
    }

    fn write(&self) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(StoreError::Database("disk I/O error".to_string()));
        }
        Ok(())
    }

    fn read(&self) -> Result<(), StoreError> {
        if self.fail_reads {
            return Err(StoreError::Database("database is locked".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RewardStore for FailingStore {
    async fn create_reward(&self, reward: &RewardEvent) -> Result<(), StoreError> {
        self.write()?;
        self.inner.create_reward(reward).await
    }

    async fn find_by_idempotency_key(
        &self,
        user_id: &str,
        key: &str,
    ) -> Result<Option<RewardEvent>, StoreError> {
        self.read()?;
        self.inner.find_by_idempotency_key(user_id, key).await
    }

    async fn list_by_user_and_date(
        &self,
        user_id: &str,
        day: NaiveDate,
    ) -> Result<Vec<RewardEvent>, StoreError> {
        self.read()?;
        self.inner.list_by_user_and_date(user_id, day).await
    }

    async fn list_before_date(
        &self,
        user_id: &str,
        cutoff: NaiveDate,
    ) -> Result<Vec<RewardEvent>, StoreError> {
        self.read()?;
        self.inner.list_before_date(user_id, cutoff).await
    }

    async fn list_all(&self, user_id: &str) -> Result<Vec<RewardEvent>, StoreError> {
        self.read()?;
        self.inner.list_all(user_id).await
    }

    async fn upsert_ledger_entries(&self, entries: &[LedgerEntry]) -> Result<(), StoreError> {
        self.write()?;
        self.inner.upsert_ledger_entries(entries).await
    }

    async fn record_reward(
        &self,
        reward: &RewardEvent,
        entries: &[LedgerEntry],
    ) -> Result<(), StoreError> {
        self.write()?;
        self.inner.record_reward(reward, entries).await
    }

    async fn ledger_for_reward(&self, reward_id: &str) -> Result<Vec<LedgerEntry>, StoreError> {
        self.read()?;
        self.inner.ledger_for_reward(reward_id).await
    }
}
