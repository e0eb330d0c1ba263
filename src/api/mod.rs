pub mod health;
pub mod reports;
pub mod rewards;

use crate::AppState;
use axum::Router;

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(rewards::router())
        .merge(reports::router())
}

/// Render a decimal with exactly `dp` fractional digits, rounding half away from zero.
pub(crate) fn fixed(value: rust_decimal::Decimal, dp: u32) -> String {
    let rounded =
        value.round_dp_with_strategy(dp, rust_decimal::RoundingStrategy::MidpointAwayFromZero);
    format!("{:.*}", dp as usize, rounded)
}
