use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ledger account a posting line is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerAccount {
    StockInventory,
    FeesExpense,
    Cash,
}

impl LedgerAccount {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerAccount::StockInventory => "stock_inventory",
            LedgerAccount::FeesExpense => "fees_expense",
            LedgerAccount::Cash => "cash",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "stock_inventory" => Some(LedgerAccount::StockInventory),
            "fees_expense" => Some(LedgerAccount::FeesExpense),
            "cash" => Some(LedgerAccount::Cash),
            _ => None,
        }
    }
}

impl fmt::Display for LedgerAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Side of a posting line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryDirection {
    Debit,
    Credit,
}

impl EntryDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryDirection::Debit => "debit",
            EntryDirection::Credit => "credit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "debit" => Some(EntryDirection::Debit),
            "credit" => Some(EntryDirection::Credit),
            _ => None,
        }
    }
}

impl fmt::Display for EntryDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One posting line belonging to a reward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: String,
    pub reward_id: String,
    pub user_id: String,
    pub account: LedgerAccount,
    pub symbol: String,
    /// Signed units; zero on non-inventory accounts.
    pub units: Decimal,
    /// Always non-negative, the direction carries the sign.
    pub amount: Decimal,
    pub direction: EntryDirection,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Amount with debits positive and credits negative.
    pub fn signed_amount(&self) -> Decimal {
        match self.direction {
            EntryDirection::Debit => self.amount,
            EntryDirection::Credit => -self.amount,
        }
    }
}
