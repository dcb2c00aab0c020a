// ── Engine: Site Authentication (spec §4.F) ────────────────────────────────
// Opens a fresh session, solves the Turnstile challenge, logs in, and
// harvests the resulting cookie jar as a single header string. A fresh
// client/jar is created per call — no long-lived session is kept per account
// (spec §5).

use crate::atoms::error::{CheckinError, CheckinResult};
use crate::engine::captcha::{self, CaptchaConfig, ProgressCallback};
use crate::engine::http;
use crate::engine::site::SiteDescriptor;
use log::{debug, info, warn};
use reqwest::cookie::CookieStore;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const LOGIN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct LoginResponse {
    success: Option<bool>,
    message: Option<String>,
}

/// Log into `descriptor`'s site with `username`/`password`, returning the
/// harvested cookie header string on success.
pub async fn login(
    descriptor: &SiteDescriptor,
    username: &str,
    password: &str,
    captcha: &CaptchaConfig,
    fingerprint: &str,
    progress: Option<ProgressCallback<'_>>,
) -> CheckinResult<String> {
    let (client, jar) = http::client_with_jar(fingerprint, LOGIN_TIMEOUT)
        .map_err(CheckinError::from)?;

    let login_url = format!("{}{}", descriptor.base_url, descriptor.login_path);

    debug!("[auth] seeding cookies from login page: {login_url}");
    client
        .get(&login_url)
        .timeout(LOGIN_TIMEOUT)
        .send()
        .await
        .map_err(CheckinError::from)?;

    let token = captcha::solve(&client, captcha, &login_url, &descriptor.sitekey, progress)
        .await?
        .ok_or_else(|| CheckinError::login_rejected("captcha solve failed or timed out"))?;

    let body = json!({
        "username": username,
        "password": password,
        "token": token,
        "source": "turnstile",
    });

    let response = client
        .post(&login_url)
        .header("Origin", descriptor.base_url.clone())
        .header("Referer", login_url.clone())
        .json(&body)
        .timeout(LOGIN_TIMEOUT)
        .send()
        .await
        .map_err(CheckinError::from)?;

    if !response.status().is_success() {
        let status = response.status();
        warn!("[auth] login HTTP failure: {status}");
        return Err(CheckinError::login_rejected(format!("HTTP {status}")));
    }

    let parsed: LoginResponse = response.json().await.map_err(CheckinError::from)?;

    if parsed.success != Some(true) {
        let message = parsed.message.unwrap_or_else(|| "login rejected".to_string());
        return Err(CheckinError::login_rejected(message));
    }

    let url = reqwest::Url::parse(&descriptor.base_url)
        .map_err(|_| CheckinError::login_rejected("invalid site base URL"))?;
    let cookie_header = jar
        .cookies(&url)
        .ok_or_else(|| CheckinError::login_rejected("no cookies returned by site"))?;
    let cookie_str = cookie_header
        .to_str()
        .map_err(|_| CheckinError::login_rejected("non-UTF8 cookie header"))?
        .to_string();

    info!("[auth] login succeeded for {}", username);
    Ok(cookie_str)
}

/// Refresh is a full re-authentication from scratch (spec §11 supplement:
/// the original's `refresh_cookie` never attempts a lighter-weight renewal).
pub async fn refresh_cookie(
    descriptor: &SiteDescriptor,
    username: &str,
    password: &str,
    captcha: &CaptchaConfig,
    fingerprint: &str,
    progress: Option<ProgressCallback<'_>>,
) -> CheckinResult<String> {
    login(descriptor, username, password, captcha, fingerprint, progress).await
}

