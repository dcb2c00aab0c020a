// ── Engine: Scheduler (spec §4.I) ──────────────────────────────────────────
// Per-minute check-in sweep, hourly push sweep (only at minute 0), and
// periodic garbage-collection sweeps, each isolated so one task's failure or
// one account's exception never blocks the others (spec §9: per-task
// exception boundary replaces the original's try/except-per-callback).
//
// Start offsets are staggered so the sweeps don't all fire in the same
// instant: check-in at +1s, push at +10s, the GC sweeps at +0s.

use crate::atoms::error::CheckinResult;
use crate::engine::checkin_service::CheckinService;
use crate::engine::clock::Clock;
use crate::engine::notifier;
use crate::engine::store::Store;
use chrono::NaiveDateTime;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Dispatches a formatted push message to `external_id`. Sending is outside
/// this crate's scope (spec Non-goals: no chat-transport client lives here);
/// the scheduler only decides *when* and *what*, and hands it to this sink.
pub type PushSink = Arc<dyn Fn(i64, String) -> BoxFuture<CheckinResult<()>> + Send + Sync>;

pub struct Scheduler {
    store: Arc<Store>,
    checkin_service: Arc<CheckinService>,
    clock: Clock,
    push: Option<PushSink>,
}

impl Scheduler {
    pub fn new(
        store: Arc<Store>,
        checkin_service: Arc<CheckinService>,
        clock: Clock,
        push: Option<PushSink>,
    ) -> Self {
        Scheduler { store, checkin_service, clock, push }
    }

    /// One check-in sweep: every active account whose `checkin_hour` matches
    /// the current local hour, filtered by the 4-day anti-duplicate window,
    /// fanned out concurrently. Returns the number of accounts dispatched.
    pub async fn checkin_tick(&self) -> CheckinResult<usize> {
        let local = self.clock.now();
        let (hour, _) = Clock::hour_slot(local);
        let accounts = self.store.account_by_checkin_hour(hour as u8)?;

        let mut dispatched = 0;
        for account in accounts {
            if !self.should_checkin(account.id, local)? {
                debug!("[scheduler] account {} already checked in this slot", account.id);
                continue;
            }
            let service = self.checkin_service.clone();
            let account_id = account.id;
            tokio::spawn(async move {
                if let Err(e) = service.run(&account, false).await {
                    error!("[scheduler] check-in task failed for account {account_id}: {e}");
                }
            });
            dispatched += 1;
        }
        Ok(dispatched)
    }

    /// False if a success was already logged in the same `(hour, slot)`
    /// bucket within the last 4 local days (spec §4.B/§4.I anti-duplicate).
    fn should_checkin(&self, account_id: i64, local: NaiveDateTime) -> CheckinResult<bool> {
        let cutoff = self.clock.days_ago_utc(local, 4);
        let recent = self.store.log_recent_success_timestamps(account_id, cutoff)?;
        let current_slot = Clock::hour_slot(local);
        for ts in recent {
            let local_ts = self.clock.to_local(ts);
            if Clock::hour_slot(local_ts) == current_slot {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Only acts when `minute == 0`. Groups due accounts by owning user,
    /// formats one message per user, and hands it to the push sink.
    pub async fn push_tick(&self) -> CheckinResult<usize> {
        use chrono::Timelike;
        let local = self.clock.now();
        if local.minute() != 0 {
            return Ok(0);
        }
        let Some(push) = self.push.clone() else { return Ok(0) };

        let accounts = self.store.account_by_push_hour(local.hour() as u8)?;
        if accounts.is_empty() {
            return Ok(0);
        }

        let mut by_user: HashMap<i64, Vec<i64>> = HashMap::new();
        for account in &accounts {
            by_user.entry(account.user_id).or_default().push(account.id);
        }

        let mut sent = 0;
        for (user_id, account_ids) in by_user {
            let external_id = match self.store.user_get_by_id(user_id)? {
                Some(u) => u.external_id,
                None => continue,
            };
            let message = match notifier::format_today_logs(&self.store, &self.clock, &account_ids)? {
                Some(m) => m,
                None => continue,
            };
            if let Err(e) = push(external_id, message).await {
                warn!("[scheduler] push failed for user {user_id}: {e}");
            } else {
                sent += 1;
            }
        }
        Ok(sent)
    }

    pub fn session_gc_tick(&self) -> CheckinResult<usize> {
        self.store.session_delete_expired(self.clock.now_utc())
    }

    /// This engine has no standing permission cache of its own — the
    /// command-permission layer that owned one in the original lives in the
    /// chat-bot shell, which is out of scope here. Kept as a tick for
    /// symmetry with the other three sweeps' spawn/offset wiring.
    pub fn permission_cache_gc_tick(&self) {
        debug!("[scheduler] permission cache sweep: nothing to do in this engine");
    }

    /// Spawn all four sweeps as background tasks with their staggered start
    /// offsets. Each loop is isolated: one iteration's error is logged and
    /// the loop continues.
    pub fn spawn(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        let checkin = self.clone();
        handles.push(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                if let Err(e) = checkin.checkin_tick().await {
                    error!("[scheduler] check-in sweep error: {e}");
                }
            }
        }));

        let push = self.clone();
        handles.push(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                if let Err(e) = push.push_tick().await {
                    error!("[scheduler] push sweep error: {e}");
                }
            }
        }));

        let session_gc = self.clone();
        handles.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                match session_gc.session_gc_tick() {
                    Ok(0) => {}
                    Ok(n) => info!("[scheduler] swept {n} expired sessions"),
                    Err(e) => error!("[scheduler] session GC error: {e}"),
                }
            }
        }));

        let permission_gc = self.clone();
        handles.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(300));
            loop {
                interval.tick().await;
                permission_gc.permission_cache_gc_tick();
            }
        }));

        handles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::{CheckinMode, Site};
    use chrono::Timelike;

    fn setup() -> (Arc<Scheduler>, Arc<Store>) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let clock = Clock::new("Asia/Shanghai");
        let checkin_service = Arc::new(CheckinService::new(store.clone(), clock.clone(), "chrome136".to_string()));
        let scheduler = Arc::new(Scheduler::new(store.clone(), checkin_service, clock, None));
        (scheduler, store)
    }

    #[tokio::test]
    async fn checkin_tick_skips_accounts_with_no_matching_hour() {
        let (scheduler, store) = setup();
        let user = store.user_upsert_by_external_id(1).unwrap();
        let mismatched_hour = (scheduler.clock.now().hour() as u8 + 1) % 24;
        store
            .account_create(user.id, Site::Nodeseek, "alice", "enc", CheckinMode::Fixed, Some(mismatched_hour), Some(9))
            .unwrap();
        let dispatched = scheduler.checkin_tick().await.unwrap();
        assert_eq!(dispatched, 0);
    }

    #[test]
    fn should_checkin_true_when_no_recent_success_logged() {
        let (scheduler, store) = setup();
        let user = store.user_upsert_by_external_id(1).unwrap();
        let account = store
            .account_create(user.id, Site::Nodeseek, "alice", "enc", CheckinMode::Fixed, Some(4), Some(9))
            .unwrap();
        assert!(scheduler.should_checkin(account.id, scheduler.clock.now()).unwrap());
    }

    #[test]
    fn should_checkin_false_after_a_success_in_the_current_slot() {
        let (scheduler, store) = setup();
        let user = store.user_upsert_by_external_id(1).unwrap();
        let account = store
            .account_create(user.id, Site::Nodeseek, "alice", "enc", CheckinMode::Fixed, Some(4), Some(9))
            .unwrap();
        store
            .log_append(account.id, Site::Nodeseek, crate::atoms::types::CheckinLogStatus::Success, "ok", 5, None, None, None)
            .unwrap();
        assert!(!scheduler.should_checkin(account.id, scheduler.clock.now()).unwrap());
    }

    #[tokio::test]
    async fn push_tick_noop_off_the_hour() {
        let (scheduler, _store) = setup();
        // Whatever the current minute is, calling push_tick must not panic
        // and returns 0 when there is no push sink configured regardless.
        let sent = scheduler.push_tick().await.unwrap();
        assert_eq!(sent, 0);
    }

    #[test]
    fn session_gc_tick_runs_clean_on_empty_store() {
        let (scheduler, _store) = setup();
        assert_eq!(scheduler.session_gc_tick().unwrap(), 0);
    }
}
