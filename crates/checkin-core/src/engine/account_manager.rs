// ── Engine: Account Manager (spec §4.G) ────────────────────────────────────
// Ownership-checked CRUD plus the cookie-refresh/mode/hours operations. Every
// mutating operation takes the caller's external id and re-derives the owning
// user, rejecting cross-user access with `NotAuthorized` rather than trusting
// a bare account id (spec §7).

use crate::atoms::error::{CheckinError, CheckinResult};
use crate::atoms::types::{AccountStatus, CheckinMode, Site, UpdateStatus};
use crate::engine::captcha::CaptchaConfig;
use crate::engine::http;
use crate::engine::site::{descriptor_for, SiteAdapter};
use crate::engine::store::{Account, Store};
use crate::engine::vault;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

pub struct AccountManager {
    store: Arc<Store>,
    encryption_key: Vec<u8>,
    captcha: CaptchaConfig,
    default_checkin_hour: u8,
    default_push_hour: u8,
}

impl AccountManager {
    pub fn new(
        store: Arc<Store>,
        encryption_key: Vec<u8>,
        captcha: CaptchaConfig,
        default_checkin_hour: u8,
        default_push_hour: u8,
    ) -> Self {
        AccountManager {
            store,
            encryption_key,
            captcha,
            default_checkin_hour,
            default_push_hour,
        }
    }

    fn owned_account(&self, account_id: i64, external_id: i64) -> CheckinResult<(Account, i64)> {
        let user = self
            .store
            .user_get_by_external_id(external_id)?
            .ok_or_else(|| CheckinError::NotFound("user".to_string()))?;
        let account = self
            .store
            .account_get_by_id(account_id)?
            .ok_or_else(|| CheckinError::NotFound("account".to_string()))?;
        if account.user_id != user.id {
            return Err(CheckinError::NotAuthorized(format!(
                "account {account_id} does not belong to this user"
            )));
        }
        Ok((account, user.id))
    }

    /// Create a user (if needed), log in, persist the encrypted credential
    /// and cookie, then best-effort refresh the account's credit balance
    /// (spec §11: original source's `add_account` tolerates a failed credit
    /// fetch without failing the whole operation).
    pub async fn add_account(
        &self,
        external_id: i64,
        site: Site,
        site_username: &str,
        password: &str,
        mode: CheckinMode,
        fingerprint_override: Option<&str>,
    ) -> CheckinResult<Account> {
        let user = self.store.user_upsert_by_external_id(external_id)?;

        let fingerprint = fingerprint_override
            .map(|s| s.to_string())
            .or_else(|| user.fingerprint.clone())
            .unwrap_or_else(|| http::random_fingerprint().to_string());

        let descriptor = descriptor_for(site);
        let cookie = crate::engine::auth::login(
            &descriptor,
            site_username,
            password,
            &self.captcha,
            &fingerprint,
            None,
        )
        .await?;

        if user.fingerprint.as_deref() != Some(fingerprint.as_str()) {
            self.store.user_set_fingerprint(user.id, &fingerprint)?;
            debug!("[account_manager] persisted fingerprint for user {}", user.id);
        }

        let encrypted_password = vault::encrypt(password, &self.encryption_key)?;

        let account = self.store.account_create(
            user.id,
            site,
            site_username,
            &encrypted_password,
            mode,
            Some(self.default_checkin_hour),
            Some(self.default_push_hour),
        )?;
        self.store.account_update_cookie(account.id, &cookie)?;

        let adapter = SiteAdapter::new(descriptor);
        let client = http::client_for_fingerprint(&fingerprint, Duration::from_secs(15))
            .map_err(CheckinError::from)?;
        match adapter.get_credits(&client, &cookie).await {
            Some(credits) => {
                self.store.account_update_credits(account.id, credits, false)?;
                info!("[account_manager] fetched initial credits for account {}", account.id);
            }
            None => warn!("[account_manager] could not fetch initial credits for account {}", account.id),
        }

        self.store.account_get_by_id(account.id)?.ok_or_else(|| CheckinError::NotFound("account".to_string()))
    }

    pub fn delete_account(&self, account_id: i64, external_id: i64) -> CheckinResult<()> {
        let (account, _) = self.owned_account(account_id, external_id)?;
        self.store.account_delete(account.id)?;
        info!("[account_manager] deleted account {}", account.id);
        Ok(())
    }

    /// `force = false`: refuse if a refresh is already in flight for this
    /// account. `force = true`: clear any in-flight record and proceed.
    pub async fn refresh_cookie(
        &self,
        account_id: i64,
        external_id: i64,
        force: bool,
    ) -> CheckinResult<()> {
        let (account, user_id) = self.owned_account(account_id, external_id)?;

        let update = if force {
            self.store.update_force_begin(account.id)?
        } else {
            let (created, update) = self.store.update_try_begin(account.id)?;
            if !created {
                return Err(CheckinError::UpdateInFlight);
            }
            update
        };

        self.store.update_set_status(update.id, UpdateStatus::Processing, None)?;

        let password = vault::decrypt(&account.encrypted_password, &self.encryption_key)?;
        let fingerprint = http::random_fingerprint().to_string();
        let descriptor = descriptor_for(account.site);

        let result = crate::engine::auth::refresh_cookie(
            &descriptor,
            &account.site_username,
            &password,
            &self.captcha,
            &fingerprint,
            None,
        )
        .await;

        match result {
            Ok(cookie) => {
                self.store.account_update_cookie(account.id, &cookie)?;
                let current = self.store.user_get_by_id(user_id)?;
                if current.and_then(|u| u.fingerprint).as_deref() != Some(fingerprint.as_str()) {
                    self.store.user_set_fingerprint(user_id, &fingerprint)?;
                }
                self.store.update_set_status(update.id, UpdateStatus::Completed, None)?;
                info!("[account_manager] refreshed cookie for account {}", account.id);
                Ok(())
            }
            Err(e) => {
                self.store
                    .update_set_status(update.id, UpdateStatus::Failed, Some(&e.to_string()))?;
                warn!("[account_manager] cookie refresh failed for account {}: {e}", account.id);
                Err(e)
            }
        }
    }

    pub fn toggle_mode(&self, account_id: i64, external_id: i64) -> CheckinResult<CheckinMode> {
        let (account, _) = self.owned_account(account_id, external_id)?;
        let new_mode = account.mode.toggled();
        self.store.account_update_mode(account.id, new_mode)?;
        Ok(new_mode)
    }

    pub fn set_hours(
        &self,
        account_id: i64,
        external_id: i64,
        checkin_hour: Option<u8>,
        push_hour: Option<u8>,
    ) -> CheckinResult<()> {
        let (account, _) = self.owned_account(account_id, external_id)?;
        self.store.account_update_hours(account.id, checkin_hour, push_hour)?;
        Ok(())
    }

    pub fn list_accounts(&self, external_id: i64) -> CheckinResult<Vec<Account>> {
        let user = self
            .store
            .user_get_by_external_id(external_id)?
            .ok_or_else(|| CheckinError::NotFound("user".to_string()))?;
        self.store.account_list_for_user(user.id)
    }

    pub fn set_status(&self, account_id: i64, status: AccountStatus) -> CheckinResult<()> {
        self.store.account_update_status(account_id, status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::store::Store;

    fn manager() -> AccountManager {
        let store = Arc::new(Store::open_in_memory().unwrap());
        AccountManager::new(
            store,
            vec![0u8; 32],
            CaptchaConfig {
                api_url: "http://localhost".into(),
                api_key: "k".into(),
                max_retries: 1,
                retry_interval: Duration::from_millis(1),
            },
            4,
            9,
        )
    }

    #[test]
    fn ownership_check_rejects_foreign_account() {
        let mgr = manager();
        let owner = mgr.store.user_upsert_by_external_id(1).unwrap();
        let account = mgr
            .store
            .account_create(owner.id, Site::Nodeseek, "alice", "enc", CheckinMode::Fixed, None, None)
            .unwrap();
        mgr.store.user_upsert_by_external_id(2).unwrap();

        let result = mgr.owned_account(account.id, 2);
        assert!(matches!(result, Err(CheckinError::NotAuthorized(_))));
    }

    #[test]
    fn toggle_mode_flips_and_persists() {
        let mgr = manager();
        let owner = mgr.store.user_upsert_by_external_id(1).unwrap();
        let account = mgr
            .store
            .account_create(owner.id, Site::Nodeseek, "alice", "enc", CheckinMode::Fixed, None, None)
            .unwrap();

        let new_mode = mgr.toggle_mode(account.id, 1).unwrap();
        assert_eq!(new_mode, CheckinMode::Random);
        let reloaded = mgr.store.account_get_by_id(account.id).unwrap().unwrap();
        assert_eq!(reloaded.mode, CheckinMode::Random);
    }

    #[test]
    fn set_hours_is_pass_through_for_none() {
        let mgr = manager();
        let owner = mgr.store.user_upsert_by_external_id(1).unwrap();
        let account = mgr
            .store
            .account_create(owner.id, Site::Nodeseek, "alice", "enc", CheckinMode::Fixed, Some(4), Some(9))
            .unwrap();

        mgr.set_hours(account.id, 1, Some(7), None).unwrap();
        let reloaded = mgr.store.account_get_by_id(account.id).unwrap().unwrap();
        assert_eq!(reloaded.checkin_hour, Some(7));
        assert_eq!(reloaded.push_hour, Some(9));
    }

    #[test]
    fn delete_account_removes_row() {
        let mgr = manager();
        let owner = mgr.store.user_upsert_by_external_id(1).unwrap();
        let account = mgr
            .store
            .account_create(owner.id, Site::Nodeseek, "alice", "enc", CheckinMode::Fixed, None, None)
            .unwrap();

        mgr.delete_account(account.id, 1).unwrap();
        assert!(mgr.store.account_get_by_id(account.id).unwrap().is_none());
    }
}
