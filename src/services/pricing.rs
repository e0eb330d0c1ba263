//! Price source contract and the simulated INR quote feed.
//!
//! There is no live market-data integration. [`SimulatedPriceSource`]
//! derives a stable pseudo-random price from the symbol and the hour, so a
//! symbol's price moves at most once an hour and historical lookups for the
//! same day always agree.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Timelike, Utc};
use dashmap::DashMap;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::clock::{system_clock, Clock};
use crate::error::PriceError;
use crate::types::{PriceQuote, PRICE_SCALE};

/// Lowest and highest simulated price, in paise.
const MIN_PRICE_PAISE: i64 = 8_000;
const MAX_PRICE_PAISE: i64 = 200_000;

/// Historical prices are anchored at this UTC time of day.
const HISTORICAL_ANCHOR_HOUR: u32 = 12;

/// Where rewards get priced from.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Current quote for `symbol`.
    async fn latest_price(&self, symbol: &str) -> Result<PriceQuote, PriceError>;

    /// Price for `symbol` on a UTC calendar day. Deterministic per day.
    async fn historical_price(&self, symbol: &str, day: NaiveDate) -> Result<Decimal, PriceError>;
}

/// Deterministic mock feed with a per-symbol quote cache.
pub struct SimulatedPriceSource {
    cache: DashMap<String, PriceQuote>,
    ttl: Duration,
    clock: Clock,
}

impl SimulatedPriceSource {
    /// Create a feed whose latest quotes are cached for `ttl`.
    pub fn new(ttl: std::time::Duration) -> Self {
        Self::with_clock(ttl, system_clock())
    }

    pub fn with_clock(ttl: std::time::Duration, clock: Clock) -> Self {
        Self {
            cache: DashMap::new(),
            ttl: Duration::from_std(ttl).unwrap_or_else(|_| Duration::days(36_500)),
            clock,
        }
    }

    /// Number of symbols with a cached quote (including expired ones).
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    fn normalize(symbol: &str) -> Result<String, PriceError> {
        let symbol = symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(PriceError::UnknownSymbol(symbol));
        }
        Ok(symbol)
    }

    /// Price for `symbol` in the hour containing `at`.
    fn generate_price(symbol: &str, at: DateTime<Utc>) -> Decimal {
        let mut hasher = Sha256::new();
        hasher.update(format!("{}-{}-{}", symbol, at.ordinal(), at.hour()));
        let digest = hasher.finalize();

        let mut seed = [0u8; 8];
        seed.copy_from_slice(&digest[..8]);
        let mut rng = StdRng::seed_from_u64(u64::from_le_bytes(seed));

        Decimal::new(rng.gen_range(MIN_PRICE_PAISE..=MAX_PRICE_PAISE), PRICE_SCALE)
    }
}

#[async_trait]
impl PriceSource for SimulatedPriceSource {
    async fn latest_price(&self, symbol: &str) -> Result<PriceQuote, PriceError> {
        let symbol = Self::normalize(symbol)?;
        let now = (self.clock)();

        if let Some(quote) = self.cache.get(&symbol) {
            if now - quote.as_of < self.ttl {
                return Ok(quote.clone());
            }
        }

        let quote = PriceQuote::new(symbol.clone(), Self::generate_price(&symbol, now), now);
        debug!("Generated quote for {}: {}", symbol, quote.price);
        self.cache.insert(symbol, quote.clone());
        Ok(quote)
    }

    async fn historical_price(&self, symbol: &str, day: NaiveDate) -> Result<Decimal, PriceError> {
        let symbol = Self::normalize(symbol)?;
        let anchor_time = NaiveTime::from_hms_opt(HISTORICAL_ANCHOR_HOUR, 0, 0).unwrap_or(NaiveTime::MIN);
        let anchor = day.and_time(anchor_time).and_utc();
        Ok(Self::generate_price(&symbol, anchor))
    }
}
