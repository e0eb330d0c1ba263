//! Read-side reports over the reward log.
//!
//! Every report is recomputed from the stored events on each call; nothing
//! here is cached. Price lookup failures for a single symbol degrade the
//! report (zero contribution or a missing position) and are logged, they
//! never fail the call. Sums and products that leave the decimal range fail
//! with [`RewardError::Overflow`].

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

use super::clock::{system_clock, Clock};
use super::pricing::PriceSource;
use super::reward_store::RewardStore;
use crate::error::{Result, RewardError};
use crate::types::{HistoricalDayValue, LedgerEntry, PortfolioPosition, RewardEvent, RewardStats};

/// Aggregation engine for per-user reports.
#[derive(Clone)]
pub struct AggregationService {
    store: Arc<dyn RewardStore>,
    prices: Arc<dyn PriceSource>,
    clock: Clock,
}

impl AggregationService {
    pub fn new(store: Arc<dyn RewardStore>, prices: Arc<dyn PriceSource>) -> Self {
        Self {
            store,
            prices,
            clock: system_clock(),
        }
    }

    /// Replace the clock that decides what "today" is.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn today(&self) -> NaiveDate {
        (self.clock)().date_naive()
    }

    /// Rewards granted during the current UTC day, oldest first.
    pub async fn today_rewards(&self, user_id: &str) -> Result<Vec<RewardEvent>> {
        Ok(self
            .store
            .list_by_user_and_date(user_id, self.today())
            .await?)
    }

    /// INR value of each past day's grants, priced at that day's price.
    pub async fn historical_inr(&self, user_id: &str) -> Result<Vec<HistoricalDayValue>> {
        let rewards = self.store.list_before_date(user_id, self.today()).await?;

        let mut by_day: BTreeMap<NaiveDate, BTreeMap<String, Decimal>> = BTreeMap::new();
        for reward in &rewards {
            let net = by_day
                .entry(reward.rewarded_at.date_naive())
                .or_default()
                .entry(reward.symbol.clone())
                .or_default();
            accumulate(net, reward.quantity, &reward.symbol)?;
        }

        let mut days = Vec::with_capacity(by_day.len());
        for (day, quantities) in by_day {
            let mut total = Decimal::ZERO;
            for (symbol, quantity) in quantities {
                match self.prices.historical_price(&symbol, day).await {
                    Ok(price) => {
                        let value = value_of(price, quantity, &symbol)?;
                        accumulate(&mut total, value, "historical total")?;
                    }
                    Err(e) => {
                        warn!(
                            symbol = %symbol,
                            date = %day,
                            error = %e,
                            "Historical price lookup failed, counting as zero"
                        );
                    }
                }
            }
            days.push(HistoricalDayValue {
                date: day.format("%Y-%m-%d").to_string(),
                total_inr: total,
            });
        }
        Ok(days)
    }

    /// Today's grants per symbol plus the current value of all holdings.
    ///
    /// Today's totals only sum today's events; they are not netted against
    /// earlier adjustments.
    pub async fn stats(&self, user_id: &str) -> Result<RewardStats> {
        let today = self.today_rewards(user_id).await?;

        let mut total_shares_today: BTreeMap<String, Decimal> = BTreeMap::new();
        for reward in &today {
            let shares = total_shares_today.entry(reward.symbol.clone()).or_default();
            accumulate(shares, reward.quantity, &reward.symbol)?;
        }

        let mut portfolio_value = Decimal::ZERO;
        for position in self.portfolio(user_id).await? {
            accumulate(&mut portfolio_value, position.value, "portfolio value")?;
        }

        Ok(RewardStats {
            total_shares_today,
            portfolio_value,
        })
    }

    /// Net holdings per symbol valued at the latest price, ordered by symbol.
    ///
    /// Symbols whose price cannot be fetched are left out.
    pub async fn portfolio(&self, user_id: &str) -> Result<Vec<PortfolioPosition>> {
        let rewards = self.store.list_all(user_id).await?;

        let mut holdings: BTreeMap<String, Decimal> = BTreeMap::new();
        for reward in &rewards {
            let held = holdings.entry(reward.symbol.clone()).or_default();
            accumulate(held, reward.quantity, &reward.symbol)?;
        }

        let mut positions = Vec::with_capacity(holdings.len());
        for (symbol, quantity) in holdings {
            match self.prices.latest_price(&symbol).await {
                Ok(quote) => positions.push(PortfolioPosition {
                    value: value_of(quote.price, quantity, &symbol)?,
                    symbol,
                    quantity,
                    price: quote.price,
                }),
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "Price lookup failed, omitting position");
                }
            }
        }
        Ok(positions)
    }

    /// The ledger lines posted for a reward.
    pub async fn ledger(&self, reward_id: &str) -> Result<Vec<LedgerEntry>> {
        Ok(self.store.ledger_for_reward(reward_id).await?)
    }
}

/// `total += amount`, failing instead of overflowing.
fn accumulate(total: &mut Decimal, amount: Decimal, what: &str) -> Result<()> {
    *total = total
        .checked_add(amount)
        .ok_or_else(|| RewardError::overflow(format!("sum of {}", what)))?;
    Ok(())
}

fn value_of(price: Decimal, quantity: Decimal, symbol: &str) -> Result<Decimal> {
    price
        .checked_mul(quantity)
        .ok_or_else(|| RewardError::overflow(format!("value of {} {}", quantity, symbol)))
}
