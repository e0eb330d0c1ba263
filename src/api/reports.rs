//! Reports API
//!
//! Read-only views derived from a user's reward log:
//! - GET /today-stocks/:userId - Rewards granted today
//! - GET /historical-inr/:userId - INR value of each past day's grants
//! - GET /stats/:userId - Today's shares per symbol and current portfolio value
//! - GET /portfolio/:userId - Holdings valued at the latest price
//! - GET /ledger/:rewardId - Posting lines of a single reward
//!
//! Path ids are trimmed the same way reward creation trims `userId`.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

use super::fixed;
use crate::error::RewardError;
use crate::types::{LedgerEntry, PRICE_SCALE};
use crate::AppState;

/// Create reports router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/today-stocks/:user_id", get(today_stocks))
        .route("/historical-inr/:user_id", get(historical_inr))
        .route("/stats/:user_id", get(stats))
        .route("/portfolio/:user_id", get(portfolio))
        .route("/ledger/:reward_id", get(ledger))
}

// =============================================================================
// Response Types
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodayReward {
    pub id: String,
    pub symbol: String,
    pub quantity: Decimal,
    pub rewarded_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct TodayStocksResponse {
    pub rewards: Vec<TodayReward>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayValue {
    pub date: String,
    pub total_inr: String,
}

#[derive(Debug, Serialize)]
pub struct HistoricalInrResponse {
    pub days: Vec<DayValue>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub total_shares_today: BTreeMap<String, Decimal>,
    pub portfolio_value_inr: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub symbol: String,
    pub quantity: Decimal,
    pub price: String,
    pub value_inr: String,
}

#[derive(Debug, Serialize)]
pub struct PortfolioResponse {
    pub positions: Vec<Position>,
}

#[derive(Debug, Serialize)]
pub struct LedgerResponse {
    pub entries: Vec<LedgerEntry>,
}

// =============================================================================
// Handlers
// =============================================================================

async fn today_stocks(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<TodayStocksResponse>, RewardError> {
    let rewards = state
        .aggregation
        .today_rewards(user_id.trim())
        .await?
        .into_iter()
        .map(|r| TodayReward {
            id: r.id,
            symbol: r.symbol,
            quantity: r.quantity,
            rewarded_at: r.rewarded_at,
        })
        .collect();

    Ok(Json(TodayStocksResponse { rewards }))
}

async fn historical_inr(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<HistoricalInrResponse>, RewardError> {
    let days = state
        .aggregation
        .historical_inr(user_id.trim())
        .await?
        .into_iter()
        .map(|d| DayValue {
            date: d.date,
            total_inr: fixed(d.total_inr, PRICE_SCALE),
        })
        .collect();

    Ok(Json(HistoricalInrResponse { days }))
}

async fn stats(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<StatsResponse>, RewardError> {
    let stats = state.aggregation.stats(user_id.trim()).await?;

    Ok(Json(StatsResponse {
        total_shares_today: stats.total_shares_today,
        portfolio_value_inr: fixed(stats.portfolio_value, PRICE_SCALE),
    }))
}

async fn portfolio(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<PortfolioResponse>, RewardError> {
    let positions = state
        .aggregation
        .portfolio(user_id.trim())
        .await?
        .into_iter()
        .map(|p| Position {
            price: fixed(p.price, PRICE_SCALE),
            value_inr: fixed(p.value, PRICE_SCALE),
            symbol: p.symbol,
            quantity: p.quantity,
        })
        .collect();

    Ok(Json(PortfolioResponse { positions }))
}

async fn ledger(
    State(state): State<AppState>,
    Path(reward_id): Path<String>,
) -> Result<Json<LedgerResponse>, RewardError> {
    let entries = state.aggregation.ledger(reward_id.trim()).await?;
    Ok(Json(LedgerResponse { entries }))
}
