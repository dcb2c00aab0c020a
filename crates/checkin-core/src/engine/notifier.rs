// ── Engine: Notifier (spec §4.J) ───────────────────────────────────────────
// A pure-ish formatter: reads today's logs for a set of accounts and renders
// one push message grouped by site. No transport — sending the formatted
// string anywhere is the caller's job (spec Non-goals: no chat client here).

use crate::atoms::error::CheckinResult;
use crate::atoms::types::{CheckinLogStatus, Site};
use crate::engine::clock::Clock;
use crate::engine::store::Store;
use std::collections::BTreeMap;

/// Render today's check-in summary for `account_ids`, grouped by site.
/// Returns `None` when none of the accounts logged anything today.
pub fn format_today_logs(
    store: &Store,
    clock: &Clock,
    account_ids: &[i64],
) -> CheckinResult<Option<String>> {
    let today = Clock::local_date(clock.now());
    let (start, end) = clock.day_bounds_utc(today);

    let mut by_site: BTreeMap<Site, Vec<LogLine>> = BTreeMap::new();

    for &account_id in account_ids {
        let Some(account) = store.account_get_by_id(account_id)? else { continue };
        let logs = store.logs_in_range(account_id, start, end)?;
        let Some(latest) = logs.into_iter().next() else { continue };
        by_site.entry(account.site).or_default().push(LogLine {
            username: account.site_username,
            success: latest.status == CheckinLogStatus::Success,
            credits_delta: latest.credits_delta,
            credits_after: latest.credits_after,
            message: latest.message,
        });
    }

    if by_site.is_empty() {
        return Ok(None);
    }

    Ok(Some(render(&by_site, clock)))
}

struct LogLine {
    username: String,
    success: bool,
    credits_delta: i64,
    credits_after: Option<i64>,
    message: String,
}

fn render(by_site: &BTreeMap<Site, Vec<LogLine>>, clock: &Clock) -> String {
    let mut lines = vec!["Check-in results".to_string(), String::new()];

    for (site, entries) in by_site {
        lines.push(format!("[{site}]"));
        for entry in entries {
            if entry.success {
                let after = entry.credits_after.unwrap_or(0);
                lines.push(format!(
                    "  {}: +{} (total {})",
                    entry.username, entry.credits_delta, after
                ));
            } else {
                lines.push(format!("  {}: {}", entry.username, entry.message));
            }
        }
        lines.push(String::new());
    }

    lines.push(format!("as of {}", clock.now().format("%Y-%m-%d %H:%M")));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::CheckinMode;

    fn seed_with_log(store: &Store, status: CheckinLogStatus) -> i64 {
        let user = store.user_upsert_by_external_id(1).unwrap();
        let account = store
            .account_create(user.id, Site::Nodeseek, "alice", "enc", CheckinMode::Fixed, Some(4), Some(9))
            .unwrap();
        store
            .log_append(account.id, Site::Nodeseek, status, "msg", 5, Some(100), Some(105), None)
            .unwrap();
        account.id
    }

    #[test]
    fn none_when_no_logs_today() {
        let store = Store::open_in_memory().unwrap();
        let clock = Clock::new("Asia/Shanghai");
        let user = store.user_upsert_by_external_id(1).unwrap();
        let account = store
            .account_create(user.id, Site::Nodeseek, "alice", "enc", CheckinMode::Fixed, Some(4), Some(9))
            .unwrap();
        assert_eq!(format_today_logs(&store, &clock, &[account.id]).unwrap(), None);
    }

    #[test]
    fn renders_success_line_with_delta() {
        let store = Store::open_in_memory().unwrap();
        let clock = Clock::new("Asia/Shanghai");
        let account_id = seed_with_log(&store, CheckinLogStatus::Success);
        let message = format_today_logs(&store, &clock, &[account_id]).unwrap().unwrap();
        assert!(message.contains("alice"));
        assert!(message.contains("+5"));
    }

    #[test]
    fn renders_failure_message_without_delta_line() {
        let store = Store::open_in_memory().unwrap();
        let clock = Clock::new("Asia/Shanghai");
        let account_id = seed_with_log(&store, CheckinLogStatus::Failed);
        let message = format_today_logs(&store, &clock, &[account_id]).unwrap().unwrap();
        assert!(message.contains("msg"));
    }
}
