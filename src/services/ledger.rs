//! Double-entry postings for a priced reward.
//!
//! Every reward produces exactly three lines:
//! - `stock_inventory`: `|unit_price * quantity|`, debit for acquisitions, credit for clawbacks
//! - `fees_expense`: the fee total, always a debit
//! - `cash`: `|total_cost|`, credit when the company paid out, debit when it got money back

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::types::{EntryDirection, LedgerAccount, LedgerEntry, RewardEvent};

/// The three postings for `reward`, or `None` if its gross value overflows.
pub fn build_ledger_entries(
    reward: &RewardEvent,
    created_at: DateTime<Utc>,
) -> Option<[LedgerEntry; 3]> {
    let gross = reward.gross_value()?;
    let inventory_direction = if reward.quantity < Decimal::ZERO {
        EntryDirection::Credit
    } else {
        EntryDirection::Debit
    };
    let cash_direction = if reward.total_cost < Decimal::ZERO {
        EntryDirection::Debit
    } else {
        EntryDirection::Credit
    };

    let line = |account: LedgerAccount, units: Decimal, amount: Decimal, direction| LedgerEntry {
        id: Uuid::new_v4().to_string(),
        reward_id: reward.id.clone(),
        user_id: reward.user_id.clone(),
        account,
        symbol: reward.symbol.clone(),
        units,
        amount,
        direction,
        created_at,
    };

    Some([
        line(
            LedgerAccount::StockInventory,
            reward.quantity,
            gross.abs(),
            inventory_direction,
        ),
        line(
            LedgerAccount::FeesExpense,
            Decimal::ZERO,
            reward.fees.total().abs(),
            EntryDirection::Debit,
        ),
        line(
            LedgerAccount::Cash,
            Decimal::ZERO,
            reward.total_cost.abs(),
            cash_direction,
        ),
    ])
}

/// Whether debits and credits across `entries` sum to the same amount.
pub fn is_balanced(entries: &[LedgerEntry]) -> bool {
    entries
        .iter()
        .map(LedgerEntry::signed_amount)
        .sum::<Decimal>()
        .is_zero()
}
