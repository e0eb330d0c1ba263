//! Rewards API
//!
//! - POST /reward - Grant a stock reward to a user

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::error;

use super::fixed;
use crate::error::RewardError;
use crate::types::{CreateRewardInput, FeeBreakdown, RewardEvent, MONEY_SCALE};
use crate::AppState;

/// Create rewards router.
pub fn router() -> Router<AppState> {
    Router::new().route("/reward", post(create_reward))
}

// =============================================================================
// Request / Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRewardRequest {
    pub user_id: String,
    pub symbol: String,
    pub quantity: Decimal,
    #[serde(default)]
    pub rewarded_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "eventId")]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub fees: Option<FeesRequest>,
    #[serde(default, alias = "adjustment")]
    pub is_adjustment: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct FeesRequest {
    #[serde(default)]
    pub brokerage: Decimal,
    #[serde(default)]
    pub stt: Decimal,
    #[serde(default)]
    pub gst: Decimal,
    #[serde(default)]
    pub other: Decimal,
}

impl From<CreateRewardRequest> for CreateRewardInput {
    fn from(req: CreateRewardRequest) -> Self {
        let fees = req.fees.unwrap_or_default();
        Self {
            user_id: req.user_id,
            symbol: req.symbol,
            quantity: req.quantity,
            rewarded_at: req.rewarded_at,
            idempotency_key: req.idempotency_key,
            fees: FeeBreakdown::new(fees.brokerage, fees.stt, fees.gst, fees.other),
            is_adjustment: req.is_adjustment,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRewardResponse {
    pub id: String,
    pub user_id: String,
    pub symbol: String,
    pub quantity: Decimal,
    pub rewarded_at: DateTime<Utc>,
    pub unit_price: Decimal,
    pub total_cost: String,
}

impl From<RewardEvent> for CreateRewardResponse {
    fn from(reward: RewardEvent) -> Self {
        Self {
            total_cost: fixed(reward.total_cost, MONEY_SCALE),
            id: reward.id,
            user_id: reward.user_id,
            symbol: reward.symbol,
            quantity: reward.quantity,
            rewarded_at: reward.rewarded_at,
            unit_price: reward.unit_price,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    /// The reward recorded first, on duplicate requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward: Option<CreateRewardResponse>,
}

/// Convert RewardError to HTTP response.
impl IntoResponse for RewardError {
    fn into_response(self) -> axum::response::Response {
        let (status, code) = match &self {
            RewardError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            RewardError::Duplicate(_) => (StatusCode::CONFLICT, "DUPLICATE_REWARD"),
            RewardError::Store(_) | RewardError::Pricing(_) | RewardError::Overflow(_) => {
                error!("Request failed: {}", self);
                (StatusCode::INTERNAL_SERVER_ERROR, "BACKEND_FAILURE")
            }
        };

        let error = self.to_string();
        let reward = match self {
            RewardError::Duplicate(existing) => Some(CreateRewardResponse::from(*existing)),
            _ => None,
        };

        let body = Json(ErrorResponse {
            error,
            code: code.to_string(),
            reward,
        });

        (status, body).into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Grant a reward.
async fn create_reward(
    State(state): State<AppState>,
    payload: Result<Json<CreateRewardRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateRewardResponse>), RewardError> {
    let Json(req) = payload.map_err(|rejection| RewardError::validation(rejection.body_text()))?;

    let reward = state.rewards.create_reward(req.into()).await?;

    Ok((StatusCode::CREATED, Json(reward.into())))
}
