// ── Engine: Shared HTTP Utilities ──────────────────────────────────────────
// Retry/backoff helpers and the browser-impersonation client shared by the
// captcha client and the site adapter. Fingerprint "impersonation" here
// means a labeled header profile (User-Agent, sec-ch-ua, Accept-Language) —
// the teacher's stack has no JA3/TLS-fingerprint-spoofing crate, so the
// rotation policy is modeled at the header layer, which is the part of
// "impersonation" actually reachable from pure-Rust HTTP clients.

use rand::Rng;
use reqwest::cookie::Jar;
use reqwest::Client;
use rustls::ClientConfig;
use std::sync::Arc;
use std::time::Duration;

/// The 14 configured Chrome fingerprint labels (spec §6).
pub const FINGERPRINT_OPTIONS: &[&str] = &[
    "chrome99", "chrome100", "chrome101", "chrome104", "chrome107", "chrome110",
    "chrome116", "chrome119", "chrome120", "chrome123", "chrome124", "chrome131",
    "chrome133a", "chrome136",
];

/// Pick a random fingerprint label from the configured set.
pub fn random_fingerprint() -> &'static str {
    let idx = rand::thread_rng().gen_range(0..FINGERPRINT_OPTIONS.len());
    FINGERPRINT_OPTIONS[idx]
}

/// Check if an HTTP status code represents a transient/retryable error.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504 | 529)
}

/// Sleep with a fixed backoff plus small jitter, used by the balance-read
/// retry policy (spec §4.E: "up to 3 attempts with 2s backoff on HTTP 403
/// or transport errors").
pub async fn backoff_delay(base: Duration) {
    let jitter_ms = rand::thread_rng().gen_range(0..250);
    tokio::time::sleep(base + Duration::from_millis(jitter_ms)).await;
}

/// A `rustls::ClientConfig` pinned to the Mozilla root certificates, ignoring
/// the OS trust store. Every client this module builds uses it — a compromised
/// system CA must not be able to intercept traffic carrying captcha tokens or
/// site credentials.
fn pinned_tls_config() -> ClientConfig {
    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()
        .expect("default TLS protocol versions are always valid")
        .with_root_certificates(root_store)
        .with_no_client_auth()
}

fn headers_for(fingerprint: &str) -> reqwest::header::HeaderMap {
    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert(
        reqwest::header::USER_AGENT,
        user_agent_for(fingerprint).parse().unwrap(),
    );
    headers.insert(
        reqwest::header::ACCEPT_LANGUAGE,
        "en-US,en;q=0.9".parse().unwrap(),
    );
    headers.insert("sec-ch-ua", sec_ch_ua_for(fingerprint).parse().unwrap());
    headers
}

/// Build a `reqwest::Client` carrying a cookie jar and the header set for a
/// given fingerprint label. A fresh client is created per login / per
/// check-in (spec §5: "no long-lived session per account").
pub fn client_for_fingerprint(fingerprint: &str, timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .use_preconfigured_tls(pinned_tls_config())
        .cookie_store(true)
        .default_headers(headers_for(fingerprint))
        .timeout(timeout)
        .build()
}

/// Like `client_for_fingerprint`, but with an explicit, caller-owned cookie
/// jar instead of the client's opaque internal one — the login flow needs to
/// read the harvested cookies back out after authenticating.
pub fn client_with_jar(fingerprint: &str, timeout: Duration) -> reqwest::Result<(Client, Arc<Jar>)> {
    let jar = Arc::new(Jar::default());
    let client = Client::builder()
        .use_preconfigured_tls(pinned_tls_config())
        .cookie_provider(jar.clone())
        .default_headers(headers_for(fingerprint))
        .timeout(timeout)
        .build()?;
    Ok((client, jar))
}

fn chrome_version(fingerprint: &str) -> &str {
    fingerprint.trim_start_matches("chrome")
}

fn user_agent_for(fingerprint: &str) -> String {
    let version = chrome_version(fingerprint).trim_end_matches('a');
    format!(
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/{version}.0.0.0 Safari/537.36"
    )
}

fn sec_ch_ua_for(fingerprint: &str) -> String {
    let version = chrome_version(fingerprint).trim_end_matches('a');
    format!("\"Chromium\";v=\"{version}\", \"Not.A/Brand\";v=\"24\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fourteen_fingerprints_configured() {
        assert_eq!(FINGERPRINT_OPTIONS.len(), 14);
        assert!(FINGERPRINT_OPTIONS.contains(&"chrome136"));
    }

    #[test]
    fn random_fingerprint_always_in_set() {
        for _ in 0..50 {
            assert!(FINGERPRINT_OPTIONS.contains(&random_fingerprint()));
        }
    }

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(503));
        assert!(!is_retryable_status(403));
        assert!(!is_retryable_status(404));
    }

    #[test]
    fn client_builds_for_each_fingerprint() {
        for fp in FINGERPRINT_OPTIONS {
            assert!(client_for_fingerprint(fp, Duration::from_secs(5)).is_ok());
        }
    }
}
