// Transient multi-step dialog state for the chat shell (spec §3). Core-
// irrelevant beyond TTL ownership — the store only needs to create, fetch
// (auto-deleting if expired), update, and sweep.

use super::Store;
use crate::atoms::error::CheckinResult;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: i64,
    pub external_id: i64,
    pub state: String,
    pub data_json: String,
    pub expires_at: DateTime<Utc>,
}

fn fmt_utc(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

impl Session {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        let expires_raw: String = row.get(4)?;
        let expires_at = chrono::NaiveDateTime::parse_from_str(&expires_raw, "%Y-%m-%d %H:%M:%S")
            .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
            .unwrap_or_else(|_| Utc::now());
        Ok(Session {
            id: row.get(0)?,
            external_id: row.get(1)?,
            state: row.get(2)?,
            data_json: row.get(3)?,
            expires_at,
        })
    }
}

const SELECT_COLUMNS: &str = "id, external_id, state, data_json, expires_at";

impl Store {
    pub fn session_create(
        &self,
        external_id: i64,
        state: &str,
        data_json: &str,
        expires_at: DateTime<Utc>,
    ) -> CheckinResult<Session> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO sessions (external_id, state, data_json, expires_at) VALUES (?1, ?2, ?3, ?4)",
            params![external_id, state, data_json, fmt_utc(expires_at)],
        )?;
        let id = conn.last_insert_rowid();
        let session = conn.query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM sessions WHERE id = ?1"),
            params![id],
            Session::from_row,
        )?;
        Ok(session)
    }

    /// Fetch a session, auto-deleting it first if it has expired relative to
    /// `now_utc` (caller-supplied, never ambient).
    pub fn session_get(&self, id: i64, now_utc: DateTime<Utc>) -> CheckinResult<Option<Session>> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM sessions WHERE id = ?1 AND expires_at < ?2",
            params![id, fmt_utc(now_utc)],
        )?;
        let session = conn
            .query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM sessions WHERE id = ?1"),
                params![id],
                Session::from_row,
            )
            .optional()?;
        Ok(session)
    }

    pub fn session_update(&self, id: i64, state: &str, data_json: &str) -> CheckinResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE sessions SET state = ?1, data_json = ?2 WHERE id = ?3",
            params![state, data_json, id],
        )?;
        Ok(())
    }

    /// Delete every session past `now_utc`. Returns the number removed.
    pub fn session_delete_expired(&self, now_utc: DateTime<Utc>) -> CheckinResult<usize> {
        let conn = self.conn.lock();
        let affected = conn.execute(
            "DELETE FROM sessions WHERE expires_at < ?1",
            params![fmt_utc(now_utc)],
        )?;
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn get_auto_deletes_expired_session() {
        let store = Store::open_in_memory().unwrap();
        let now = Utc::now();
        let session = store
            .session_create(1, "awaiting_password", "{}", now - Duration::seconds(1))
            .unwrap();
        assert_eq!(store.session_get(session.id, now).unwrap(), None);
    }

    #[test]
    fn get_returns_live_session() {
        let store = Store::open_in_memory().unwrap();
        let now = Utc::now();
        let session = store
            .session_create(1, "awaiting_password", "{}", now + Duration::minutes(10))
            .unwrap();
        assert!(store.session_get(session.id, now).unwrap().is_some());
    }

    #[test]
    fn delete_expired_sweeps_all_stale_rows() {
        let store = Store::open_in_memory().unwrap();
        let now = Utc::now();
        store
            .session_create(1, "s", "{}", now - Duration::minutes(1))
            .unwrap();
        store
            .session_create(2, "s", "{}", now + Duration::minutes(1))
            .unwrap();
        let removed = store.session_delete_expired(now).unwrap();
        assert_eq!(removed, 1);
    }
}
