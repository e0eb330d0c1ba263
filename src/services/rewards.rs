//! Reward Service
//!
//! Turns a reward request into a priced, idempotent [`RewardEvent`] plus its
//! three ledger lines:
//! - validates and normalizes the request
//! - short-circuits on a known idempotency key before any pricing work
//! - prices the symbol from the [`PriceSource`] (no retries)
//! - hands the event and its postings to the store as one unit
//!
//! The store's uniqueness constraint on `(user_id, idempotency_key)` is the
//! real guard against concurrent duplicates; the early lookup only saves a
//! price fetch.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::clock::{system_clock, Clock};
use super::ledger::build_ledger_entries;
use super::pricing::PriceSource;
use super::reward_store::RewardStore;
use crate::error::{Result, RewardError, StoreError};
use crate::types::{
    CreateRewardInput, RewardEvent, MAX_FEE, MAX_QUANTITY, MONEY_SCALE, QUANTITY_SCALE,
};

/// Accounting engine for reward grants.
#[derive(Clone)]
pub struct RewardService {
    store: Arc<dyn RewardStore>,
    prices: Arc<dyn PriceSource>,
    clock: Clock,
}

impl RewardService {
    pub fn new(store: Arc<dyn RewardStore>, prices: Arc<dyn PriceSource>) -> Self {
        Self {
            store,
            prices,
            clock: system_clock(),
        }
    }

    /// Replace the clock used for default `rewarded_at` and ledger timestamps.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Grant a reward.
    ///
    /// Returns [`RewardError::Duplicate`] carrying the earlier reward when the
    /// user already used this idempotency key.
    pub async fn create_reward(&self, input: CreateRewardInput) -> Result<RewardEvent> {
        let input = normalize(input)?;

        if let Some(key) = input.idempotency_key.as_deref() {
            if let Some(existing) = self
                .store
                .find_by_idempotency_key(&input.user_id, key)
                .await?
            {
                warn!(
                    user_id = %input.user_id,
                    idempotency_key = key,
                    reward_id = %existing.id,
                    "Duplicate reward request"
                );
                return Err(RewardError::Duplicate(Box::new(existing)));
            }
        }

        let quote = self.prices.latest_price(&input.symbol).await?;
        let unit_price = quote.price.round_dp(MONEY_SCALE);
        let now = (self.clock)();
        let mut reward = RewardEvent {
            id: Uuid::new_v4().to_string(),
            user_id: input.user_id,
            symbol: input.symbol,
            quantity: input.quantity,
            rewarded_at: input.rewarded_at.unwrap_or(now),
            idempotency_key: input.idempotency_key,
            fees: input.fees,
            unit_price,
            total_cost: Decimal::ZERO,
            priced_at: quote.as_of,
            is_adjustment: input.is_adjustment,
        };
        reward.total_cost = reward
            .gross_value()
            .and_then(|gross| gross.checked_add(reward.fees.total()))
            .ok_or_else(|| {
                RewardError::overflow(format!("total cost of {} {}", reward.quantity, reward.symbol))
            })?
            .round_dp(MONEY_SCALE);
        let entries = build_ledger_entries(&reward, now)
            .ok_or_else(|| RewardError::overflow(format!("ledger value of reward {}", reward.id)))?;

        match self.store.record_reward(&reward, &entries).await {
            Ok(()) => {}
            Err(StoreError::Duplicate) => return Err(self.resolve_duplicate(&reward).await),
            Err(e) => return Err(e.into()),
        }

        info!(
            user_id = %reward.user_id,
            symbol = %reward.symbol,
            quantity = %reward.quantity,
            total_cost = %reward.total_cost,
            "Recorded reward {}",
            reward.id
        );
        Ok(reward)
    }

    /// A concurrent request won the race on the same key; report its reward.
    async fn resolve_duplicate(&self, attempted: &RewardEvent) -> RewardError {
        let Some(key) = attempted.idempotency_key() else {
            return StoreError::Duplicate.into();
        };
        match self
            .store
            .find_by_idempotency_key(&attempted.user_id, key)
            .await
        {
            Ok(Some(existing)) => {
                warn!(
                    user_id = %attempted.user_id,
                    idempotency_key = key,
                    reward_id = %existing.id,
                    "Duplicate reward rejected by store"
                );
                RewardError::Duplicate(Box::new(existing))
            }
            Ok(None) => StoreError::Duplicate.into(),
            Err(e) => e.into(),
        }
    }
}

/// Validate a request and bring it to canonical form.
fn normalize(mut input: CreateRewardInput) -> Result<CreateRewardInput> {
    input.user_id = input.user_id.trim().to_string();
    input.symbol = input.symbol.trim().to_uppercase();
    input.quantity = input.quantity.round_dp(QUANTITY_SCALE);
    input.fees = input.fees.round_dp(MONEY_SCALE);
    input.idempotency_key = input
        .idempotency_key
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty());

    if input.user_id.is_empty() || input.symbol.is_empty() || input.quantity.is_zero() {
        return Err(RewardError::validation(
            "userId, symbol and non-zero quantity are required",
        ));
    }
    if input.quantity < Decimal::ZERO && !input.is_adjustment {
        return Err(RewardError::validation(
            "negative quantities are only allowed for adjustments",
        ));
    }
    if input.quantity.abs() > MAX_QUANTITY {
        return Err(RewardError::validation(format!(
            "quantity must not exceed {} units",
            MAX_QUANTITY
        )));
    }
    if !input.fees.is_non_negative() {
        return Err(RewardError::validation("fee components must not be negative"));
    }
    if !input.fees.within(MAX_FEE) {
        return Err(RewardError::validation(format!(
            "fee components must not exceed {}",
            MAX_FEE
        )));
    }
    Ok(input)
}
