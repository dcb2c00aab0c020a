// Append-only check-in log (spec §3, §4.C). `executed_at` is stored as a
// UTC naive timestamp (SQLite's `datetime('now')`); callers that need
// "today" or "last N days" semantics pass an explicit UTC cutoff computed
// via `engine::clock::Clock` — the store itself is timezone-agnostic.

use super::Store;
use crate::atoms::error::CheckinResult;
use crate::atoms::types::{CheckinLogStatus, Site};
use chrono::{DateTime, Utc};
use rusqlite::params;

#[derive(Debug, Clone, PartialEq)]
pub struct CheckinLog {
    pub id: i64,
    pub account_id: i64,
    pub site: Site,
    pub status: CheckinLogStatus,
    pub message: String,
    pub credits_delta: i64,
    pub credits_before: Option<i64>,
    pub credits_after: Option<i64>,
    pub error_code: Option<String>,
    pub executed_at: DateTime<Utc>,
}

fn fmt_utc(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

impl CheckinLog {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        let site_str: String = row.get(2)?;
        let status_str: String = row.get(3)?;
        let executed_raw: String = row.get(9)?;
        let executed_at = chrono::NaiveDateTime::parse_from_str(&executed_raw, "%Y-%m-%d %H:%M:%S")
            .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
            .unwrap_or_else(|_| Utc::now());
        Ok(CheckinLog {
            id: row.get(0)?,
            account_id: row.get(1)?,
            site: Site::parse(&site_str).unwrap_or(Site::Nodeseek),
            status: CheckinLogStatus::parse(&status_str).unwrap_or(CheckinLogStatus::Failed),
            message: row.get(4)?,
            credits_delta: row.get(5)?,
            credits_before: row.get(6)?,
            credits_after: row.get(7)?,
            error_code: row.get(8)?,
            executed_at,
        })
    }
}

impl Store {
    #[allow(clippy::too_many_arguments)]
    pub fn log_append(
        &self,
        account_id: i64,
        site: Site,
        status: CheckinLogStatus,
        message: &str,
        credits_delta: i64,
        credits_before: Option<i64>,
        credits_after: Option<i64>,
        error_code: Option<&str>,
    ) -> CheckinResult<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO checkin_logs (account_id, site, status, message, credits_delta, \
             credits_before, credits_after, error_code) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                account_id,
                site.as_str(),
                status.as_str(),
                message,
                credits_delta,
                credits_before,
                credits_after,
                error_code,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Count of `success` rows with `executed_at` on/after `day_start_utc`
    /// and before `day_end_utc` (spec: "count of success rows ... in the
    /// current local day").
    pub fn log_today_success_count(&self, account_id: i64) -> CheckinResult<i64> {
        // Convenience overload used by the unconditional-cascade test in
        // accounts.rs; defaults to "since epoch" when no explicit window is
        // needed (e.g. asserting zero after a cascade delete).
        self.log_success_count_since(account_id, DateTime::<Utc>::UNIX_EPOCH)
    }

    pub fn log_success_count_since(
        &self,
        account_id: i64,
        since_utc: DateTime<Utc>,
    ) -> CheckinResult<i64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM checkin_logs \
             WHERE account_id = ?1 AND status = 'success' AND executed_at >= ?2",
            params![account_id, fmt_utc(since_utc)],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    pub fn log_success_count_in_range(
        &self,
        account_id: i64,
        start_utc: DateTime<Utc>,
        end_utc: DateTime<Utc>,
    ) -> CheckinResult<i64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM checkin_logs \
             WHERE account_id = ?1 AND status = 'success' \
             AND executed_at >= ?2 AND executed_at < ?3",
            params![account_id, fmt_utc(start_utc), fmt_utc(end_utc)],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    /// `credits_delta` of the earliest `success` row in `[start_utc, end_utc)`,
    /// else 0 (spec: "today_success_delta").
    pub fn log_success_delta_in_range(
        &self,
        account_id: i64,
        start_utc: DateTime<Utc>,
        end_utc: DateTime<Utc>,
    ) -> CheckinResult<i64> {
        let conn = self.conn.lock();
        let delta: Option<i64> = conn
            .query_row(
                "SELECT credits_delta FROM checkin_logs \
                 WHERE account_id = ?1 AND status = 'success' \
                 AND executed_at >= ?2 AND executed_at < ?3 \
                 ORDER BY executed_at ASC LIMIT 1",
                params![account_id, fmt_utc(start_utc), fmt_utc(end_utc)],
                |r| r.get(0),
            )
            .optional_or_zero()?;
        Ok(delta.unwrap_or(0))
    }

    /// Every log row for `account_id` in `[start_utc, end_utc)`, most recent
    /// first. Used by the notifier to render a per-account summary.
    pub fn logs_in_range(
        &self,
        account_id: i64,
        start_utc: DateTime<Utc>,
        end_utc: DateTime<Utc>,
    ) -> CheckinResult<Vec<CheckinLog>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, account_id, site, status, message, credits_delta, credits_before, \
             credits_after, error_code, executed_at FROM checkin_logs \
             WHERE account_id = ?1 AND executed_at >= ?2 AND executed_at < ?3 \
             ORDER BY executed_at DESC",
        )?;
        let rows = stmt
            .query_map(params![account_id, fmt_utc(start_utc), fmt_utc(end_utc)], CheckinLog::from_row)?
            .filter_map(Result::ok)
            .collect();
        Ok(rows)
    }

    /// `executed_at` of every `success` row within the last `days` days.
    pub fn log_recent_success_timestamps(
        &self,
        account_id: i64,
        since_utc: DateTime<Utc>,
    ) -> CheckinResult<Vec<DateTime<Utc>>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT executed_at FROM checkin_logs \
             WHERE account_id = ?1 AND status = 'success' AND executed_at >= ?2",
        )?;
        let rows = stmt
            .query_map(params![account_id, fmt_utc(since_utc)], |r| {
                let raw: String = r.get(0)?;
                Ok(raw)
            })?
            .filter_map(Result::ok)
            .filter_map(|raw| {
                chrono::NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S")
                    .ok()
                    .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
            })
            .collect();
        Ok(rows)
    }
}

/// Small helper trait so `optional()` reads naturally for a single nullable
/// column without importing `OptionalExtension` just for this one call site.
trait OptionalOrZero<T> {
    fn optional_or_zero(self) -> rusqlite::Result<Option<T>>;
}

impl<T> OptionalOrZero<T> for rusqlite::Result<T> {
    fn optional_or_zero(self) -> rusqlite::Result<Option<T>> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::{CheckinLogStatus as LogStatus, CheckinMode, Site};
    use chrono::Duration;

    fn seed_account(store: &Store) -> i64 {
        let user = store.user_upsert_by_external_id(1).unwrap();
        store
            .account_create(
                user.id,
                Site::Nodeseek,
                "alice",
                "enc",
                CheckinMode::Fixed,
                Some(4),
                Some(9),
            )
            .unwrap()
            .id
    }

    #[test]
    fn append_and_count_today() {
        let store = Store::open_in_memory().unwrap();
        let account_id = seed_account(&store);
        let now = Utc::now();
        let start = now - Duration::hours(1);
        let end = now + Duration::hours(1);
        assert_eq!(
            store.log_success_count_in_range(account_id, start, end).unwrap(),
            0
        );
        store
            .log_append(account_id, Site::Nodeseek, LogStatus::Success, "ok", 5, Some(100), Some(105), None)
            .unwrap();
        assert_eq!(
            store.log_success_count_in_range(account_id, start, end).unwrap(),
            1
        );
    }

    #[test]
    fn delta_defaults_to_zero_when_no_success_row() {
        let store = Store::open_in_memory().unwrap();
        let account_id = seed_account(&store);
        let now = Utc::now();
        let delta = store
            .log_success_delta_in_range(account_id, now - Duration::hours(1), now + Duration::hours(1))
            .unwrap();
        assert_eq!(delta, 0);
    }

    #[test]
    fn recent_timestamps_respects_cutoff() {
        let store = Store::open_in_memory().unwrap();
        let account_id = seed_account(&store);
        store
            .log_append(account_id, Site::Nodeseek, LogStatus::Success, "ok", 1, None, None, None)
            .unwrap();
        let within = store
            .log_recent_success_timestamps(account_id, Utc::now() - Duration::days(4))
            .unwrap();
        assert_eq!(within.len(), 1);
        let none = store
            .log_recent_success_timestamps(account_id, Utc::now() + Duration::days(1))
            .unwrap();
        assert!(none.is_empty());
    }
}
