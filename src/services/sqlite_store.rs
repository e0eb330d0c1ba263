//! SQLite persistence for rewards and ledger lines.
//!
//! Decimals are stored as TEXT so no precision is lost, timestamps as
//! INTEGER microseconds since the epoch. A partial UNIQUE index on
//! `(user_id, idempotency_key)` is the authoritative idempotency guard.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, Transaction};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use super::clock::day_bounds;
use super::reward_store::RewardStore;
use crate::error::StoreError;
use crate::types::{EntryDirection, FeeBreakdown, LedgerAccount, LedgerEntry, RewardEvent};

const REWARD_COLUMNS: &str = "id, user_id, symbol, quantity, rewarded_at, idempotency_key,
     fees_brokerage, fees_stt, fees_gst, fees_other, unit_price, total_cost, priced_at, is_adjustment";

/// SQLite-backed [`RewardStore`].
pub struct SqliteRewardStore {
    conn: Mutex<Connection>,
}

impl SqliteRewardStore {
    /// Open (or create) a store at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        info!("SQLite reward store initialized");
        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing).
    pub fn new_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        debug!("In-memory SQLite reward store initialized");
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;

        conn.execute_batch(
            "PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS rewards (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                symbol TEXT NOT NULL,
                quantity TEXT NOT NULL,
                rewarded_at INTEGER NOT NULL,
                idempotency_key TEXT,
                fees_brokerage TEXT NOT NULL,
                fees_stt TEXT NOT NULL,
                fees_gst TEXT NOT NULL,
                fees_other TEXT NOT NULL,
                unit_price TEXT NOT NULL,
                total_cost TEXT NOT NULL,
                priced_at INTEGER NOT NULL,
                is_adjustment INTEGER NOT NULL DEFAULT 0
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_rewards_user_idempotency
                ON rewards(user_id, idempotency_key)
                WHERE idempotency_key IS NOT NULL;

            CREATE INDEX IF NOT EXISTS idx_rewards_user_time
                ON rewards(user_id, rewarded_at);

            CREATE TABLE IF NOT EXISTS ledger_entries (
                id TEXT PRIMARY KEY,
                reward_id TEXT NOT NULL REFERENCES rewards(id),
                user_id TEXT NOT NULL,
                account TEXT NOT NULL,
                symbol TEXT NOT NULL,
                units TEXT NOT NULL,
                amount TEXT NOT NULL,
                direction TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_ledger_reward
                ON ledger_entries(reward_id);",
        )?;

        info!("SQLite schema initialized");
        Ok(())
    }

    fn query_rewards(
        &self,
        filter: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<RewardEvent>, StoreError> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM rewards WHERE {} ORDER BY rewarded_at ASC, id ASC",
            REWARD_COLUMNS, filter
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params, reward_from_row)?;

        let mut events = Vec::new();
        for row in rows {
            events.push(row??);
        }
        Ok(events)
    }
}

fn insert_reward(tx: &Transaction<'_>, reward: &RewardEvent) -> Result<(), StoreError> {
    let result = tx.execute(
        &format!(
            "INSERT INTO rewards ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            REWARD_COLUMNS
        ),
        params![
            reward.id,
            reward.user_id,
            reward.symbol,
            reward.quantity.to_string(),
            reward.rewarded_at.timestamp_micros(),
            reward.idempotency_key(),
            reward.fees.brokerage.to_string(),
            reward.fees.stt.to_string(),
            reward.fees.gst.to_string(),
            reward.fees.other.to_string(),
            reward.unit_price.to_string(),
            reward.total_cost.to_string(),
            reward.priced_at.timestamp_micros(),
            reward.is_adjustment,
        ],
    );

    match result {
        Ok(_) => Ok(()),
        Err(e) if is_unique_violation(&e) => Err(StoreError::Duplicate),
        Err(e) => Err(e.into()),
    }
}

fn insert_ledger(tx: &Transaction<'_>, entries: &[LedgerEntry]) -> Result<(), StoreError> {
    let mut stmt = tx.prepare(
        "INSERT INTO ledger_entries
         (id, reward_id, user_id, account, symbol, units, amount, direction, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(id) DO NOTHING",
    )?;

    for entry in entries {
        stmt.execute(params![
            entry.id,
            entry.reward_id,
            entry.user_id,
            entry.account.as_str(),
            entry.symbol,
            entry.units.to_string(),
            entry.amount.to_string(),
            entry.direction.as_str(),
            entry.created_at.timestamp_micros(),
        ])?;
    }
    Ok(())
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    match e {
        rusqlite::Error::SqliteFailure(err, _) => {
            err.code == ErrorCode::ConstraintViolation
                && err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        }
        _ => false,
    }
}

fn decimal_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Result<Decimal, StoreError>> {
    let raw: String = row.get(idx)?;
    Ok(Decimal::from_str(&raw).map_err(|e| StoreError::Corrupt(format!("decimal {:?}: {}", raw, e))))
}

fn time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Result<DateTime<Utc>, StoreError>> {
    let micros: i64 = row.get(idx)?;
    Ok(DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp {}", micros))))
}

/// Row mapper. The outer result carries SQLite errors, the inner one decode errors.
fn reward_from_row(row: &Row<'_>) -> rusqlite::Result<Result<RewardEvent, StoreError>> {
    let id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let symbol: String = row.get(2)?;
    let quantity = decimal_column(row, 3)?;
    let rewarded_at = time_column(row, 4)?;
    let idempotency_key: Option<String> = row.get(5)?;
    let brokerage = decimal_column(row, 6)?;
    let stt = decimal_column(row, 7)?;
    let gst = decimal_column(row, 8)?;
    let other = decimal_column(row, 9)?;
    let unit_price = decimal_column(row, 10)?;
    let total_cost = decimal_column(row, 11)?;
    let priced_at = time_column(row, 12)?;
    let is_adjustment: bool = row.get(13)?;

    let build = || -> Result<RewardEvent, StoreError> {
        Ok(RewardEvent {
            id,
            user_id,
            symbol,
            quantity: quantity?,
            rewarded_at: rewarded_at?,
            idempotency_key,
            fees: FeeBreakdown::new(brokerage?, stt?, gst?, other?),
            unit_price: unit_price?,
            total_cost: total_cost?,
            priced_at: priced_at?,
            is_adjustment,
        })
    };
    Ok(build())
}

fn ledger_from_row(row: &Row<'_>) -> rusqlite::Result<Result<LedgerEntry, StoreError>> {
    let id: String = row.get(0)?;
    let reward_id: String = row.get(1)?;
    let user_id: String = row.get(2)?;
    let account: String = row.get(3)?;
    let symbol: String = row.get(4)?;
    let units = decimal_column(row, 5)?;
    let amount = decimal_column(row, 6)?;
    let direction: String = row.get(7)?;
    let created_at = time_column(row, 8)?;

    let build = || -> Result<LedgerEntry, StoreError> {
        Ok(LedgerEntry {
            account: LedgerAccount::parse(&account)
                .ok_or_else(|| StoreError::Corrupt(format!("account {:?}", account)))?,
            direction: EntryDirection::parse(&direction)
                .ok_or_else(|| StoreError::Corrupt(format!("direction {:?}", direction)))?,
            id,
            reward_id,
            user_id,
            symbol,
            units: units?,
            amount: amount?,
            created_at: created_at?,
        })
    };
    Ok(build())
}

#[async_trait]
impl RewardStore for SqliteRewardStore {
    async fn create_reward(&self, reward: &RewardEvent) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        insert_reward(&tx, reward)?;
        tx.commit()?;
        Ok(())
    }

    async fn find_by_idempotency_key(
        &self,
        user_id: &str,
        key: &str,
    ) -> Result<Option<RewardEvent>, StoreError> {
        if key.is_empty() {
            return Ok(None);
        }
        let conn = self.lock()?;
        let found = conn
            .query_row(
                &format!(
                    "SELECT {} FROM rewards WHERE user_id = ?1 AND idempotency_key = ?2",
                    REWARD_COLUMNS
                ),
                params![user_id, key],
                reward_from_row,
            )
            .optional()?;
        found.transpose()
    }

    async fn list_by_user_and_date(
        &self,
        user_id: &str,
        day: NaiveDate,
    ) -> Result<Vec<RewardEvent>, StoreError> {
        let (start, end) = day_bounds(day);
        self.query_rewards(
            "user_id = ?1 AND rewarded_at >= ?2 AND rewarded_at < ?3",
            params![user_id, start.timestamp_micros(), end.timestamp_micros()],
        )
    }

    async fn list_before_date(
        &self,
        user_id: &str,
        cutoff: NaiveDate,
    ) -> Result<Vec<RewardEvent>, StoreError> {
        let (start, _) = day_bounds(cutoff);
        self.query_rewards(
            "user_id = ?1 AND rewarded_at < ?2",
            params![user_id, start.timestamp_micros()],
        )
    }

    async fn list_all(&self, user_id: &str) -> Result<Vec<RewardEvent>, StoreError> {
        self.query_rewards("user_id = ?1", params![user_id])
    }

    async fn upsert_ledger_entries(&self, entries: &[LedgerEntry]) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        insert_ledger(&tx, entries)?;
        tx.commit()?;
        Ok(())
    }

    async fn record_reward(
        &self,
        reward: &RewardEvent,
        entries: &[LedgerEntry],
    ) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        // Dropping `tx` on any error rolls both writes back.
        insert_reward(&tx, reward)?;
        insert_ledger(&tx, entries)?;
        tx.commit()?;

        debug!("Recorded reward {} with {} ledger lines", reward.id, entries.len());
        Ok(())
    }

    async fn ledger_for_reward(&self, reward_id: &str) -> Result<Vec<LedgerEntry>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, reward_id, user_id, account, symbol, units, amount, direction, created_at
             FROM ledger_entries WHERE reward_id = ?1 ORDER BY rowid ASC",
        )?;
        let rows = stmt.query_map(params![reward_id], ledger_from_row)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row??);
        }
        Ok(entries)
    }
}
