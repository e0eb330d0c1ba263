use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Decimal places on quotes produced by the simulated feed (paise).
pub const PRICE_SCALE: u32 = 2;

/// A price valid for a symbol at a point in time.
///
/// Never persisted; rewards keep only the price and time they were priced at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuote {
    pub symbol: String,
    pub price: Decimal,
    pub as_of: DateTime<Utc>,
}

impl PriceQuote {
    pub fn new(symbol: impl Into<String>, price: Decimal, as_of: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            as_of,
        }
    }
}
