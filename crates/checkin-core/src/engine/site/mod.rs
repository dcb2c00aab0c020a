// ── Engine: Site Adapter (spec §4.E) ───────────────────────────────────────
// One parametric adapter driven by a static per-site descriptor, per spec
// §9's redesign flag ("two site adapters that are 95% identical ... extract
// one parametric adapter ... they do not [diverge] in this codebase").

mod descriptor;

pub use descriptor::{descriptor_for, SiteDescriptor};

use crate::atoms::error::CheckinError;
use crate::atoms::types::{CheckinLogStatus, CheckinMode};
use crate::engine::http;
use log::warn;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

/// A credit-history row, parsed into a named record immediately at the JSON
/// boundary (spec §9: "do not propagate raw positional tuples").
#[derive(Debug, Clone, PartialEq)]
pub struct CreditRow {
    pub amount: i64,
    pub balance: i64,
    pub description: String,
    pub timestamp: String,
}

impl CreditRow {
    fn from_tuple(raw: &serde_json::Value) -> Option<Self> {
        let arr = raw.as_array()?;
        Some(CreditRow {
            amount: arr.first()?.as_i64()?,
            balance: arr.get(1)?.as_i64()?,
            description: arr.get(2)?.as_str().unwrap_or_default().to_string(),
            timestamp: arr.get(3).and_then(|v| v.as_str()).unwrap_or_default().to_string(),
        })
    }

    /// Whether this row's description indicates a check-in credit event
    /// (spec glossary "today-delta": the original source checks both
    /// "签到" and "鸡腿" appear in the description).
    fn is_checkin_credit(&self) -> bool {
        self.description.contains("签到") && self.description.contains("鸡腿")
    }
}

#[derive(Debug, Deserialize)]
struct CreditResponse {
    success: Option<bool>,
    data: Option<Vec<serde_json::Value>>,
}

impl CreditResponse {
    fn rows(&self) -> Vec<CreditRow> {
        self.data
            .as_ref()
            .map(|rows| rows.iter().filter_map(CreditRow::from_tuple).collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct CheckinResponse {
    success: Option<bool>,
    message: Option<String>,
    status: Option<i64>,
}

/// Result of a single check-in attempt (spec §4.E operation contract).
#[derive(Debug, Clone, PartialEq)]
pub struct CheckinOutcome {
    pub status: CheckinLogStatus,
    pub message: String,
    pub credits_delta: i64,
    pub credits_before: Option<i64>,
    pub credits_after: Option<i64>,
    pub error_code: Option<String>,
}

pub struct SiteAdapter {
    descriptor: SiteDescriptor,
}

impl SiteAdapter {
    pub fn new(descriptor: SiteDescriptor) -> Self {
        SiteAdapter { descriptor }
    }

    pub fn descriptor(&self) -> &SiteDescriptor {
        &self.descriptor
    }

    /// Full check-in flow: balance-before, POST check-in, classify, re-read
    /// balance where the classification calls for it.
    pub async fn checkin(&self, client: &Client, cookie: &str, mode: CheckinMode) -> CheckinOutcome {
        let credits_before = self.get_credits(client, cookie).await;

        let url = format!(
            "{}{}?random={}",
            self.descriptor.base_url,
            self.descriptor.checkin_path,
            mode.query_value()
        );

        let response = client
            .post(&url)
            .header("Origin", self.descriptor.base_url.clone())
            .header("Referer", format!("{}/board", self.descriptor.base_url))
            .header("Content-Type", "application/json")
            .header("Cookie", cookie)
            .timeout(Duration::from_secs(15))
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                return CheckinOutcome {
                    status: CheckinLogStatus::Failed,
                    message: e.to_string(),
                    credits_delta: 0,
                    credits_before,
                    credits_after: credits_before,
                    error_code: Some("checkin_failed".to_string()),
                }
            }
        };

        if response.status() == StatusCode::FORBIDDEN {
            return CheckinOutcome {
                status: CheckinLogStatus::Failed,
                message: "blocked by edge; refresh cookie".to_string(),
                credits_delta: 0,
                credits_before,
                credits_after: credits_before,
                error_code: Some("blocked".to_string()),
            };
        }

        let parsed: CheckinResponse = match response.json().await {
            Ok(p) => p,
            Err(e) => {
                return CheckinOutcome {
                    status: CheckinLogStatus::Failed,
                    message: e.to_string(),
                    credits_delta: 0,
                    credits_before,
                    credits_after: credits_before,
                    error_code: Some("checkin_failed".to_string()),
                }
            }
        };

        self.classify(client, cookie, credits_before, parsed).await
    }

    async fn classify(
        &self,
        client: &Client,
        cookie: &str,
        credits_before: Option<i64>,
        parsed: CheckinResponse,
    ) -> CheckinOutcome {
        let message = parsed.message.clone().unwrap_or_default();

        if is_success_message(&message) || parsed.success == Some(true) {
            let credits_after = self.get_credits(client, cookie).await;
            let delta = match (credits_after, credits_before) {
                (Some(after), Some(before)) => after - before,
                _ => 0,
            };
            return CheckinOutcome {
                status: CheckinLogStatus::Success,
                message,
                credits_delta: delta,
                credits_before,
                credits_after,
                error_code: None,
            };
        }

        if message.contains("已完成签到") {
            let (balance, today_delta) = self.fetch_credits_and_delta(client, cookie).await;
            let credits_after = balance.or(credits_before);
            return CheckinOutcome {
                status: CheckinLogStatus::Success,
                message,
                credits_delta: today_delta,
                credits_before,
                credits_after,
                error_code: None,
            };
        }

        if parsed.status == Some(404) {
            return CheckinOutcome {
                status: CheckinLogStatus::Failed,
                message,
                credits_delta: 0,
                credits_before,
                credits_after: credits_before,
                error_code: Some("invalid_cookie".to_string()),
            };
        }

        CheckinOutcome {
            status: CheckinLogStatus::Failed,
            message,
            credits_delta: 0,
            credits_before,
            credits_after: credits_before,
            error_code: Some("checkin_failed".to_string()),
        }
    }

    /// GET the credit-history endpoint and return the current balance.
    /// Retries up to 3 attempts with 2s backoff on HTTP 403 or transport
    /// errors; any other non-200 returns `None` without retrying.
    pub async fn get_credits(&self, client: &Client, cookie: &str) -> Option<i64> {
        self.fetch_rows(client, cookie)
            .await
            .and_then(|rows| rows.first().map(|r| r.balance))
    }

    /// Same endpoint as `get_credits`; additionally returns the "today
    /// delta" used only by the idempotent "already done today" branch.
    pub async fn fetch_credits_and_delta(
        &self,
        client: &Client,
        cookie: &str,
    ) -> (Option<i64>, i64) {
        let rows = self.fetch_rows(client, cookie).await;
        match rows.and_then(|rows| rows.into_iter().next()) {
            Some(row) if row.is_checkin_credit() => (Some(row.balance), row.amount),
            Some(row) => (Some(row.balance), 0),
            None => (None, 0),
        }
    }

    async fn fetch_rows(&self, client: &Client, cookie: &str) -> Option<Vec<CreditRow>> {
        let url = format!("{}{}", self.descriptor.base_url, self.descriptor.credit_path);

        for attempt in 0..3 {
            let response = client
                .get(&url)
                .header("Cookie", cookie)
                .timeout(Duration::from_secs(15))
                .send()
                .await;

            match response {
                Ok(resp) if resp.status() == StatusCode::FORBIDDEN => {
                    if attempt < 2 {
                        http::backoff_delay(Duration::from_secs(2)).await;
                        continue;
                    }
                    return None;
                }
                Ok(resp) if resp.status().is_success() => {
                    let parsed: CreditResponse = match resp.json().await {
                        Ok(p) => p,
                        Err(e) => {
                            warn!("[site] credit response parse failure: {e}");
                            return None;
                        }
                    };
                    if parsed.success != Some(true) {
                        return None;
                    }
                    return Some(parsed.rows());
                }
                Ok(_) => return None,
                Err(_) if attempt < 2 => {
                    http::backoff_delay(Duration::from_secs(2)).await;
                    continue;
                }
                Err(_) => return None,
            }
        }
        None
    }
}

fn is_success_message(message: &str) -> bool {
    message.contains("鸡腿")
}

/// Map a balance-read/check-in transport outcome into the error kind the
/// account manager's batch flow reacts to (spec §7).
pub fn classify_error_code(outcome: &CheckinOutcome) -> Option<CheckinError> {
    match outcome.error_code.as_deref() {
        Some("blocked") => Some(CheckinError::Blocked),
        Some("invalid_cookie") => Some(CheckinError::InvalidCookie),
        Some("checkin_failed") => Some(CheckinError::checkin_failed(outcome.message.clone())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credit_row_parses_positional_tuple() {
        let raw = serde_json::json!([5, 105, "签到收益5个鸡腿", "2026-08-01T04:07:00"]);
        let row = CreditRow::from_tuple(&raw).unwrap();
        assert_eq!(row.amount, 5);
        assert_eq!(row.balance, 105);
        assert!(row.is_checkin_credit());
    }

    #[test]
    fn non_checkin_row_is_not_checkin_credit() {
        let raw = serde_json::json!([0, 100, "账号初始化", "2026-08-01T00:00:00"]);
        let row = CreditRow::from_tuple(&raw).unwrap();
        assert!(!row.is_checkin_credit());
    }

    #[test]
    fn success_message_detection() {
        assert!(is_success_message("签到成功+5鸡腿"));
        assert!(!is_success_message("签到失败"));
    }

    #[test]
    fn malformed_tuple_returns_none() {
        let raw = serde_json::json!(["not", "a", "number"]);
        assert!(CreditRow::from_tuple(&raw).is_none());
    }

    #[test]
    fn classify_error_code_maps_known_kinds() {
        let blocked = CheckinOutcome {
            status: CheckinLogStatus::Failed,
            message: "x".into(),
            credits_delta: 0,
            credits_before: None,
            credits_after: None,
            error_code: Some("blocked".into()),
        };
        assert!(matches!(classify_error_code(&blocked), Some(CheckinError::Blocked)));
    }
}
