use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Net holding of one symbol valued at the latest price. Derived, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioPosition {
    pub symbol: String,
    pub quantity: Decimal,
    pub price: Decimal,
    pub value: Decimal,
}

/// INR value of the units granted on one past UTC day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalDayValue {
    /// `YYYY-MM-DD`.
    pub date: String,
    pub total_inr: Decimal,
}

/// Today's grants per symbol alongside the current value of all holdings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardStats {
    pub total_shares_today: BTreeMap<String, Decimal>,
    pub portfolio_value: Decimal,
}
