// User records (spec §3: "identified by a stable external integer id").

use super::Store;
use crate::atoms::error::CheckinResult;
use rusqlite::{params, OptionalExtension};

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub external_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub fingerprint: Option<String>,
}

impl User {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(User {
            id: row.get(0)?,
            external_id: row.get(1)?,
            username: row.get(2)?,
            first_name: row.get(3)?,
            last_name: row.get(4)?,
            fingerprint: row.get(5)?,
        })
    }
}

const SELECT_COLUMNS: &str =
    "id, external_id, username, first_name, last_name, fingerprint";

impl Store {
    /// Idempotent: returns the existing user if `external_id` is already
    /// known, otherwise creates one.
    pub fn user_upsert_by_external_id(&self, external_id: i64) -> CheckinResult<User> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO users (external_id) VALUES (?1)
             ON CONFLICT(external_id) DO UPDATE SET updated_at = datetime('now')",
            params![external_id],
        )?;
        let user = conn.query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM users WHERE external_id = ?1"),
            params![external_id],
            User::from_row,
        )?;
        Ok(user)
    }

    pub fn user_get_by_id(&self, id: i64) -> CheckinResult<Option<User>> {
        let conn = self.conn.lock();
        let user = conn
            .query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
                User::from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn user_get_by_external_id(&self, external_id: i64) -> CheckinResult<Option<User>> {
        let conn = self.conn.lock();
        let user = conn
            .query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM users WHERE external_id = ?1"),
                params![external_id],
                User::from_row,
            )
            .optional()?;
        Ok(user)
    }

    /// Persist the fingerprint last used for a successful login.
    pub fn user_set_fingerprint(&self, user_id: i64, fingerprint: &str) -> CheckinResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE users SET fingerprint = ?1, updated_at = datetime('now') WHERE id = ?2",
            params![fingerprint, user_id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        let a = store.user_upsert_by_external_id(42).unwrap();
        let b = store.user_upsert_by_external_id(42).unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.external_id, 42);
    }

    #[test]
    fn set_fingerprint_persists() {
        let store = Store::open_in_memory().unwrap();
        let user = store.user_upsert_by_external_id(7).unwrap();
        store.user_set_fingerprint(user.id, "chrome136").unwrap();
        let reloaded = store.user_get_by_id(user.id).unwrap().unwrap();
        assert_eq!(reloaded.fingerprint.as_deref(), Some("chrome136"));
    }

    #[test]
    fn get_by_id_missing_returns_none() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.user_get_by_id(999).unwrap(), None);
    }
}
