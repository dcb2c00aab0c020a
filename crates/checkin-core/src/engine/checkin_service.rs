// ── Engine: Check-in Service (spec §4.H) ───────────────────────────────────
// Runs a single account's check-in, whether triggered by the scheduler or a
// manual command. Keeps an in-process "already succeeded today" cache keyed
// by local calendar date so a burst of manual retries doesn't hammer the
// site once today's success is already logged.

use crate::atoms::error::CheckinResult;
use crate::atoms::types::{CheckinLogStatus, CheckinMode};
use crate::engine::clock::Clock;
use crate::engine::http;
use crate::engine::site::{descriptor_for, SiteAdapter};
use crate::engine::store::{Account, Store};
use chrono::NaiveDate;
use log::{info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct CheckinRunResult {
    pub status: CheckinLogStatus,
    pub message: String,
    pub credits_delta: i64,
    pub credits_before: Option<i64>,
    pub credits_after: Option<i64>,
    pub skipped_already_done: bool,
}

struct TodayCache {
    date: NaiveDate,
    success: HashMap<i64, bool>,
}

pub struct CheckinService {
    store: Arc<Store>,
    clock: Clock,
    impersonate_browser: String,
    cache: Mutex<TodayCache>,
}

impl CheckinService {
    pub fn new(store: Arc<Store>, clock: Clock, impersonate_browser: String) -> Self {
        CheckinService {
            store,
            clock,
            impersonate_browser,
            cache: Mutex::new(TodayCache { date: NaiveDate::MIN, success: HashMap::new() }),
        }
    }

    /// Run a check-in for `account`. `manual` only affects logging context —
    /// the idempotency and logging rules are identical either way.
    pub async fn run(&self, account: &Account, manual: bool) -> CheckinResult<CheckinRunResult> {
        let kind = if manual { "manual" } else { "scheduled" };
        let today = Clock::local_date(self.clock.now());

        if self.cached_success(account.id, today) {
            info!("[checkin_service] {kind} check-in skipped for account {}: already done today", account.id);
            return self.today_already_done(account, today);
        }

        let (start, end) = self.clock.day_bounds_utc(today);
        if self.store.log_success_count_in_range(account.id, start, end)? > 0 {
            self.mark_success_today(account.id, today);
            return self.today_already_done(account, today);
        }

        let descriptor = descriptor_for(account.site);
        let adapter = SiteAdapter::new(descriptor);
        let client = http::client_for_fingerprint(&self.impersonate_browser, Duration::from_secs(15))
            .map_err(crate::atoms::error::CheckinError::from)?;

        let cookie = account
            .cookie
            .clone()
            .ok_or_else(|| crate::atoms::error::CheckinError::InvalidCookie)?;

        let outcome = adapter.checkin(&client, &cookie, account.mode).await;

        // Defensive re-check: another task (e.g. a concurrent manual retry)
        // may have logged success while this request was in flight. Stricter
        // than the original, which logs unconditionally after `checkin()`
        // returns (spec §4.H step 3).
        let (start, end) = self.clock.day_bounds_utc(today);
        let already_logged = self.store.log_success_count_in_range(account.id, start, end)? > 0;

        if outcome.status == CheckinLogStatus::Success && already_logged {
            self.mark_success_today(account.id, today);
            return self.today_already_done(account, today);
        }

        self.store.log_append(
            account.id,
            account.site,
            outcome.status,
            &outcome.message,
            outcome.credits_delta,
            outcome.credits_before,
            outcome.credits_after,
            outcome.error_code.as_deref(),
        )?;

        if outcome.status == CheckinLogStatus::Success {
            if let Some(after) = outcome.credits_after {
                self.store.account_update_credits(account.id, after, true)?;
            }
            self.mark_success_today(account.id, today);
            info!(
                "[checkin_service] {kind} check-in succeeded for account {}: +{} credits",
                account.id, outcome.credits_delta
            );
        } else {
            warn!(
                "[checkin_service] {kind} check-in failed for account {}: {}",
                account.id, outcome.message
            );
        }

        Ok(CheckinRunResult {
            status: outcome.status,
            message: outcome.message,
            credits_delta: outcome.credits_delta,
            credits_before: outcome.credits_before,
            credits_after: outcome.credits_after,
            skipped_already_done: false,
        })
    }

    fn today_already_done(&self, account: &Account, today: NaiveDate) -> CheckinResult<CheckinRunResult> {
        let (start, end) = self.clock.day_bounds_utc(today);
        let delta = self.store.log_success_delta_in_range(account.id, start, end)?;
        Ok(CheckinRunResult {
            status: CheckinLogStatus::Success,
            message: "today already checked in".to_string(),
            credits_delta: delta,
            credits_before: Some(account.credits),
            credits_after: Some(account.credits),
            skipped_already_done: true,
        })
    }

    fn cached_success(&self, account_id: i64, today: NaiveDate) -> bool {
        let mut cache = self.cache.lock();
        if cache.date != today {
            cache.date = today;
            cache.success.clear();
        }
        cache.success.get(&account_id).copied().unwrap_or(false)
    }

    fn mark_success_today(&self, account_id: i64, today: NaiveDate) {
        let mut cache = self.cache.lock();
        if cache.date != today {
            cache.date = today;
            cache.success.clear();
        }
        cache.success.insert(account_id, true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::Site;

    fn service() -> (CheckinService, Arc<Store>) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let clock = Clock::new("Asia/Shanghai");
        let service = CheckinService::new(store.clone(), clock, "chrome136".to_string());
        (service, store)
    }

    fn seed_account(store: &Store) -> Account {
        let user = store.user_upsert_by_external_id(1).unwrap();
        let account = store
            .account_create(user.id, Site::Nodeseek, "alice", "enc", CheckinMode::Fixed, Some(4), Some(9))
            .unwrap();
        store.account_update_cookie(account.id, "session=abc").unwrap();
        store.account_get_by_id(account.id).unwrap().unwrap()
    }

    #[tokio::test]
    async fn run_short_circuits_when_already_logged_success_today() {
        let (service, store) = service();
        let account = seed_account(&store);
        store
            .log_append(account.id, Site::Nodeseek, CheckinLogStatus::Success, "ok", 5, Some(100), Some(105), None)
            .unwrap();

        let result = service.run(&account, true).await.unwrap();
        assert!(result.skipped_already_done);
        assert_eq!(result.credits_delta, 5);
    }

    #[tokio::test]
    async fn missing_cookie_is_invalid_cookie_error() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let user = store.user_upsert_by_external_id(1).unwrap();
        let account = store
            .account_create(user.id, Site::Nodeseek, "bob", "enc", CheckinMode::Fixed, None, None)
            .unwrap();
        let clock = Clock::new("Asia/Shanghai");
        let service = CheckinService::new(store, clock, "chrome136".to_string());

        let result = service.run(&account, true).await;
        assert!(matches!(result, Err(crate::atoms::error::CheckinError::InvalidCookie)));
    }

    #[test]
    fn cache_resets_on_date_rollover() {
        let (service, _store) = service();
        let day1 = NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
        let day2 = NaiveDate::from_ymd_opt(2026, 8, 2).unwrap();
        service.mark_success_today(1, day1);
        assert!(service.cached_success(1, day1));
        assert!(!service.cached_success(1, day2));
    }
}
