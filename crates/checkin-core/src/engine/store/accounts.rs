// Account records (spec §3). Uniqueness: (user, site, site_username).

use super::Store;
use crate::atoms::error::{CheckinError, CheckinResult};
use crate::atoms::types::{AccountStatus, CheckinMode, Site};
use rusqlite::{params, OptionalExtension};

#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: i64,
    pub user_id: i64,
    pub site: Site,
    pub site_username: String,
    pub encrypted_password: String,
    pub cookie: Option<String>,
    pub mode: CheckinMode,
    pub status: AccountStatus,
    pub credits: i64,
    pub checkin_count: i64,
    pub checkin_hour: Option<u8>,
    pub push_hour: Option<u8>,
}

const SELECT_COLUMNS: &str = "id, user_id, site, site_username, encrypted_password, cookie, \
     mode, status, credits, checkin_count, checkin_hour, push_hour";

impl Account {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        let site_str: String = row.get(2)?;
        let mode_str: String = row.get(6)?;
        let status_str: String = row.get(7)?;
        let checkin_hour: Option<i64> = row.get(10)?;
        let push_hour: Option<i64> = row.get(11)?;
        Ok(Account {
            id: row.get(0)?,
            user_id: row.get(1)?,
            site: Site::parse(&site_str).unwrap_or(Site::Nodeseek),
            site_username: row.get(3)?,
            encrypted_password: row.get(4)?,
            cookie: row.get(5)?,
            mode: CheckinMode::parse(&mode_str).unwrap_or(CheckinMode::Fixed),
            status: AccountStatus::parse(&status_str).unwrap_or(AccountStatus::Active),
            credits: row.get(8)?,
            checkin_count: row.get(9)?,
            checkin_hour: checkin_hour.map(|h| h as u8),
            push_hour: push_hour.map(|h| h as u8),
        })
    }
}

impl Store {
    /// Fails if `(user, site, site_username)` already exists.
    #[allow(clippy::too_many_arguments)]
    pub fn account_create(
        &self,
        user_id: i64,
        site: Site,
        site_username: &str,
        encrypted_password: &str,
        mode: CheckinMode,
        checkin_hour: Option<u8>,
        push_hour: Option<u8>,
    ) -> CheckinResult<Account> {
        let conn = self.conn.lock();
        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM accounts WHERE user_id = ?1 AND site = ?2 AND site_username = ?3",
                params![user_id, site.as_str(), site_username],
                |r| r.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Err(CheckinError::AlreadyExists(format!(
                "{}/{}",
                site, site_username
            )));
        }
        conn.execute(
            "INSERT INTO accounts (user_id, site, site_username, encrypted_password, mode, \
             checkin_hour, push_hour) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                user_id,
                site.as_str(),
                site_username,
                encrypted_password,
                mode.as_str(),
                checkin_hour.map(|h| h as i64),
                push_hour.map(|h| h as i64),
            ],
        )?;
        let id = conn.last_insert_rowid();
        let account = conn.query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM accounts WHERE id = ?1"),
            params![id],
            Account::from_row,
        )?;
        Ok(account)
    }

    pub fn account_get_by_id(&self, id: i64) -> CheckinResult<Option<Account>> {
        let conn = self.conn.lock();
        let account = conn
            .query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM accounts WHERE id = ?1"),
                params![id],
                Account::from_row,
            )
            .optional()?;
        Ok(account)
    }

    pub fn account_get_for_user(&self, id: i64, user_id: i64) -> CheckinResult<Option<Account>> {
        Ok(self
            .account_get_by_id(id)?
            .filter(|a| a.user_id == user_id))
    }

    pub fn account_list_for_user(&self, user_id: i64) -> CheckinResult<Vec<Account>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!("SELECT {SELECT_COLUMNS} FROM accounts WHERE user_id = ?1 ORDER BY id"))?;
        let rows = stmt
            .query_map(params![user_id], Account::from_row)?
            .filter_map(Result::ok)
            .collect();
        Ok(rows)
    }

    /// Every active account whose `checkin_hour` matches `hour`.
    pub fn account_by_checkin_hour(&self, hour: u8) -> CheckinResult<Vec<Account>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM accounts \
             WHERE status = 'active' AND checkin_hour = ?1"
        ))?;
        let rows = stmt
            .query_map(params![hour as i64], Account::from_row)?
            .filter_map(Result::ok)
            .collect();
        Ok(rows)
    }

    /// Every active account whose `push_hour` matches `hour`.
    pub fn account_by_push_hour(&self, hour: u8) -> CheckinResult<Vec<Account>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM accounts \
             WHERE status = 'active' AND push_hour = ?1"
        ))?;
        let rows = stmt
            .query_map(params![hour as i64], Account::from_row)?
            .filter_map(Result::ok)
            .collect();
        Ok(rows)
    }

    pub fn account_all_active(&self) -> CheckinResult<Vec<Account>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare(&format!("SELECT {SELECT_COLUMNS} FROM accounts WHERE status = 'active'"))?;
        let rows = stmt
            .query_map([], Account::from_row)?
            .filter_map(Result::ok)
            .collect();
        Ok(rows)
    }

    pub fn account_update_cookie(&self, id: i64, cookie: &str) -> CheckinResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE accounts SET cookie = ?1, updated_at = datetime('now') WHERE id = ?2",
            params![cookie, id],
        )?;
        Ok(())
    }

    /// Last-writer-wins. `increment_count` bumps `checkin_count` by one when
    /// true (a newly logged success day).
    pub fn account_update_credits(
        &self,
        id: i64,
        credits: i64,
        increment_count: bool,
    ) -> CheckinResult<()> {
        let conn = self.conn.lock();
        if increment_count {
            conn.execute(
                "UPDATE accounts SET credits = ?1, checkin_count = checkin_count + 1, \
                 updated_at = datetime('now') WHERE id = ?2",
                params![credits, id],
            )?;
        } else {
            conn.execute(
                "UPDATE accounts SET credits = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![credits, id],
            )?;
        }
        Ok(())
    }

    pub fn account_update_mode(&self, id: i64, mode: CheckinMode) -> CheckinResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE accounts SET mode = ?1, updated_at = datetime('now') WHERE id = ?2",
            params![mode.as_str(), id],
        )?;
        Ok(())
    }

    /// `None` for either hour means "keep current" (spec §4.G: "Nulls are
    /// pass-through").
    pub fn account_update_hours(
        &self,
        id: i64,
        checkin_hour: Option<u8>,
        push_hour: Option<u8>,
    ) -> CheckinResult<()> {
        let conn = self.conn.lock();
        if let Some(h) = checkin_hour {
            conn.execute(
                "UPDATE accounts SET checkin_hour = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![h as i64, id],
            )?;
        }
        if let Some(h) = push_hour {
            conn.execute(
                "UPDATE accounts SET push_hour = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![h as i64, id],
            )?;
        }
        Ok(())
    }

    pub fn account_update_status(&self, id: i64, status: AccountStatus) -> CheckinResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE accounts SET status = ?1, updated_at = datetime('now') WHERE id = ?2",
            params![status.as_str(), id],
        )?;
        Ok(())
    }

    /// Cascades logs and updates (`ON DELETE CASCADE` on both child tables).
    pub fn account_delete(&self, id: i64) -> CheckinResult<bool> {
        let conn = self.conn.lock();
        let affected = conn.execute("DELETE FROM accounts WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed_user(store: &Store) -> i64 {
        store.user_upsert_by_external_id(1).unwrap().id
    }

    #[test]
    fn create_rejects_duplicate_triple() {
        let store = Store::open_in_memory().unwrap();
        let user_id = seed_user(&store);
        store
            .account_create(
                user_id,
                Site::Nodeseek,
                "alice",
                "enc",
                CheckinMode::Fixed,
                Some(4),
                Some(9),
            )
            .unwrap();
        let result = store.account_create(
            user_id,
            Site::Nodeseek,
            "alice",
            "enc2",
            CheckinMode::Fixed,
            Some(4),
            Some(9),
        );
        assert!(matches!(result, Err(CheckinError::AlreadyExists(_))));
    }

    #[test]
    fn by_checkin_hour_filters_inactive() {
        let store = Store::open_in_memory().unwrap();
        let user_id = seed_user(&store);
        let account = store
            .account_create(
                user_id,
                Site::Nodeseek,
                "bob",
                "enc",
                CheckinMode::Fixed,
                Some(4),
                Some(9),
            )
            .unwrap();
        assert_eq!(store.account_by_checkin_hour(4).unwrap().len(), 1);
        store
            .account_update_status(account.id, AccountStatus::Inactive)
            .unwrap();
        assert_eq!(store.account_by_checkin_hour(4).unwrap().len(), 0);
    }

    #[test]
    fn update_hours_nulls_are_pass_through() {
        let store = Store::open_in_memory().unwrap();
        let user_id = seed_user(&store);
        let account = store
            .account_create(
                user_id,
                Site::Nodeseek,
                "carol",
                "enc",
                CheckinMode::Fixed,
                Some(4),
                Some(9),
            )
            .unwrap();
        store.account_update_hours(account.id, None, Some(10)).unwrap();
        let reloaded = store.account_get_by_id(account.id).unwrap().unwrap();
        assert_eq!(reloaded.checkin_hour, Some(4));
        assert_eq!(reloaded.push_hour, Some(10));
    }

    #[test]
    fn update_credits_increments_count_only_when_asked() {
        let store = Store::open_in_memory().unwrap();
        let user_id = seed_user(&store);
        let account = store
            .account_create(
                user_id,
                Site::Nodeseek,
                "dan",
                "enc",
                CheckinMode::Fixed,
                Some(4),
                Some(9),
            )
            .unwrap();
        store.account_update_credits(account.id, 100, true).unwrap();
        store.account_update_credits(account.id, 105, false).unwrap();
        let reloaded = store.account_get_by_id(account.id).unwrap().unwrap();
        assert_eq!(reloaded.credits, 105);
        assert_eq!(reloaded.checkin_count, 1);
    }

    #[test]
    fn delete_cascades_to_logs() {
        let store = Store::open_in_memory().unwrap();
        let user_id = seed_user(&store);
        let account = store
            .account_create(
                user_id,
                Site::Nodeseek,
                "eve",
                "enc",
                CheckinMode::Fixed,
                Some(4),
                Some(9),
            )
            .unwrap();
        store
            .log_append(
                account.id,
                Site::Nodeseek,
                crate::atoms::types::CheckinLogStatus::Success,
                "ok",
                0,
                None,
                None,
                None,
            )
            .unwrap();
        assert!(store.account_delete(account.id).unwrap());
        assert_eq!(store.log_today_success_count(account.id).unwrap(), 0);
    }
}
