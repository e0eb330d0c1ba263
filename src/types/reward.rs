use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Decimal places kept on monetary amounts (INR).
pub const MONEY_SCALE: u32 = 4;
/// Decimal places kept on share quantities.
pub const QUANTITY_SCALE: u32 = 6;

/// Largest absolute quantity a single reward may grant or claw back.
pub const MAX_QUANTITY: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);
/// Largest value accepted for any single fee component (INR).
pub const MAX_FEE: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

/// Charges incurred while acquiring the rewarded stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub brokerage: Decimal,
    /// Securities transaction tax.
    pub stt: Decimal,
    /// Goods and services tax.
    pub gst: Decimal,
    pub other: Decimal,
}

impl FeeBreakdown {
    pub fn new(brokerage: Decimal, stt: Decimal, gst: Decimal, other: Decimal) -> Self {
        Self {
            brokerage,
            stt,
            gst,
            other,
        }
    }

    /// Sum of all four components.
    pub fn total(&self) -> Decimal {
        self.brokerage + self.stt + self.gst + self.other
    }

    /// Every component rounded to `scale` decimal places.
    pub fn round_dp(&self, scale: u32) -> Self {
        Self::new(
            self.brokerage.round_dp(scale),
            self.stt.round_dp(scale),
            self.gst.round_dp(scale),
            self.other.round_dp(scale),
        )
    }

    /// Whether no component exceeds `max`.
    pub fn within(&self, max: Decimal) -> bool {
        [self.brokerage, self.stt, self.gst, self.other]
            .iter()
            .all(|c| *c <= max)
    }

    pub fn is_non_negative(&self) -> bool {
        [self.brokerage, self.stt, self.gst, self.other]
            .iter()
            .all(|c| *c >= Decimal::ZERO)
    }
}

/// An immutable record of stock units granted to a user.
///
/// Created once by the reward service and never mutated afterwards. The
/// store only ever appends these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardEvent {
    pub id: String,
    pub user_id: String,
    pub symbol: String,
    /// Signed; negative only when `is_adjustment` is set.
    pub quantity: Decimal,
    pub rewarded_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    pub fees: FeeBreakdown,
    pub unit_price: Decimal,
    /// `gross_value() + fees.total()`, at money scale.
    pub total_cost: Decimal,
    pub priced_at: DateTime<Utc>,
    pub is_adjustment: bool,
}

impl RewardEvent {
    /// Value of the units alone, before fees, at money scale. Signed like `quantity`.
    ///
    /// `None` when the product does not fit in a `Decimal`.
    pub fn gross_value(&self) -> Option<Decimal> {
        self.unit_price
            .checked_mul(self.quantity)
            .map(|v| v.round_dp(MONEY_SCALE))
    }

    /// The idempotency key if one was supplied and is non-empty.
    pub fn idempotency_key(&self) -> Option<&str> {
        self.idempotency_key.as_deref().filter(|k| !k.is_empty())
    }
}

/// Input accepted by the reward service when granting a reward.
#[derive(Debug, Clone, Default)]
pub struct CreateRewardInput {
    pub user_id: String,
    pub symbol: String,
    pub quantity: Decimal,
    /// Defaults to the current instant when absent.
    pub rewarded_at: Option<DateTime<Utc>>,
    pub idempotency_key: Option<String>,
    pub fees: FeeBreakdown,
    pub is_adjustment: bool,
}
