// AccountUpdate: cookie-refresh task log with a partial-unique "at most one
// active row" invariant (spec §3, §4.C, testable property #3/#7).
//
// SQLite has no single-statement CTE-with-conditional-insert the way the
// original Postgres schema does; atomicity here comes from running the
// check-then-insert inside a single `BEGIN IMMEDIATE` transaction, which
// takes the write lock up front so no other connection can interleave a
// conflicting insert. The partial unique index
// (`idx_account_updates_one_active` in schema.rs) is the second, storage-
// level guarantee: even a bug in this function could not create two active
// rows for the same account.

use super::Store;
use crate::atoms::error::CheckinResult;
use crate::atoms::types::UpdateStatus;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

#[derive(Debug, Clone, PartialEq)]
pub struct AccountUpdate {
    pub id: i64,
    pub account_id: i64,
    pub status: UpdateStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

const SELECT_COLUMNS: &str =
    "id, account_id, status, started_at, completed_at, error_message";

impl AccountUpdate {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        let status_str: String = row.get(2)?;
        Ok(AccountUpdate {
            id: row.get(0)?,
            account_id: row.get(1)?,
            status: UpdateStatus::parse(&status_str).unwrap_or(UpdateStatus::Pending),
            started_at: parse_ts(row.get(3)?),
            completed_at: parse_ts(row.get(4)?),
            error_message: row.get(5)?,
        })
    }
}

fn parse_ts(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| {
        chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S")
            .ok()
            .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
    })
}

impl Store {
    /// Atomic: if no active (`pending`/`processing`) row exists for
    /// `account_id`, create one in `pending` and return `(true, row)`;
    /// otherwise return `(false, existing_row)`. No race can produce two
    /// actives.
    pub fn update_try_begin(&self, account_id: i64) -> CheckinResult<(bool, AccountUpdate)> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM account_updates \
                 WHERE account_id = ?1 AND status IN ('pending', 'processing') \
                 ORDER BY created_at DESC LIMIT 1",
                params![account_id],
                |r| r.get(0),
            )
            .optional()?;

        let (created, row_id) = if let Some(id) = existing {
            (false, id)
        } else {
            tx.execute(
                "INSERT INTO account_updates (account_id, status) VALUES (?1, 'pending')",
                params![account_id],
            )?;
            (true, tx.last_insert_rowid())
        };

        let row = tx.query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM account_updates WHERE id = ?1"),
            params![row_id],
            AccountUpdate::from_row,
        )?;
        tx.commit()?;
        Ok((created, row))
    }

    /// Atomic: delete any active row for `account_id`, insert a fresh
    /// `pending` row, return it. Used for user-initiated refresh that
    /// overrides a stuck prior task.
    pub fn update_force_begin(&self, account_id: i64) -> CheckinResult<AccountUpdate> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        tx.execute(
            "DELETE FROM account_updates WHERE account_id = ?1 AND status IN ('pending', 'processing')",
            params![account_id],
        )?;
        tx.execute(
            "INSERT INTO account_updates (account_id, status) VALUES (?1, 'pending')",
            params![account_id],
        )?;
        let id = tx.last_insert_rowid();
        let row = tx.query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM account_updates WHERE id = ?1"),
            params![id],
            AccountUpdate::from_row,
        )?;
        tx.commit()?;
        Ok(row)
    }

    pub fn update_get_by_id(&self, id: i64) -> CheckinResult<Option<AccountUpdate>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM account_updates WHERE id = ?1"),
                params![id],
                AccountUpdate::from_row,
            )
            .optional()?;
        Ok(row)
    }

    /// `pending -> processing` records `started_at`; `* -> completed/failed`
    /// records `completed_at`.
    pub fn update_set_status(
        &self,
        id: i64,
        status: UpdateStatus,
        error_message: Option<&str>,
    ) -> CheckinResult<()> {
        let conn = self.conn.lock();
        match status {
            UpdateStatus::Processing => {
                conn.execute(
                    "UPDATE account_updates SET status = ?1, started_at = datetime('now') WHERE id = ?2",
                    params![status.as_str(), id],
                )?;
            }
            UpdateStatus::Completed | UpdateStatus::Failed => {
                conn.execute(
                    "UPDATE account_updates SET status = ?1, completed_at = datetime('now'), \
                     error_message = ?2 WHERE id = ?3",
                    params![status.as_str(), error_message, id],
                )?;
            }
            UpdateStatus::Pending => {
                conn.execute(
                    "UPDATE account_updates SET status = ?1 WHERE id = ?2",
                    params![status.as_str(), id],
                )?;
            }
        }
        Ok(())
    }
}
