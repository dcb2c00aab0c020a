// ── Atoms: Configuration ───────────────────────────────────────────────────
// Process-wide configuration read from the environment at startup. No
// settings-framework dependency — each variable is read and parsed
// explicitly, same as the rest of the teacher's engine modules read their
// own env vars directly.

use crate::atoms::error::{CheckinError, CheckinResult};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub admin_ids: Vec<i64>,
    pub whitelist_user_ids: Vec<i64>,
    pub whitelist_group_ids: Vec<i64>,
    pub whitelist_channel_ids: Vec<i64>,

    pub cloudflyer_api_url: String,
    pub cloudflyer_api_key: String,
    pub captcha_max_retries: u32,
    pub captcha_retry_interval: Duration,
    pub impersonate_browser: String,

    pub database_url: String,
    pub encryption_key: Vec<u8>,

    pub timezone: String,
    pub session_ttl: Duration,
    pub permission_cache_ttl: Duration,

    pub default_checkin_hour: u8,
    pub default_push_hour: u8,

    pub socks5_proxy: Option<String>,
    pub telegram_use_proxy: bool,

    pub log_level: String,
}

impl Config {
    /// Load and validate configuration from the process environment.
    /// Fails fast (spec §7: `config_invalid` is fatal at boot).
    pub fn from_env() -> CheckinResult<Self> {
        let bot_token = require_var("BOT_TOKEN")?;
        let cloudflyer_api_url = require_var("CLOUDFLYER_API_URL")?;
        let cloudflyer_api_key = require_var("CLOUDFLYER_API_KEY")?;
        let database_url = require_var("DATABASE_URL")?;
        let encryption_key_raw = require_var("ENCRYPTION_KEY")?;
        let encryption_key = decode_encryption_key(&encryption_key_raw)?;

        Ok(Config {
            bot_token,
            admin_ids: parse_id_list(&optional_var("ADMIN_IDS")),
            whitelist_user_ids: parse_id_list(&optional_var("WHITELIST_USER_IDS")),
            whitelist_group_ids: parse_id_list(&optional_var("WHITELIST_GROUP_IDS")),
            whitelist_channel_ids: parse_id_list(&optional_var("WHITELIST_CHANNEL_IDS")),

            cloudflyer_api_url,
            cloudflyer_api_key,
            captcha_max_retries: parse_or_default("CAPTCHA_MAX_RETRIES", 20),
            captcha_retry_interval: Duration::from_secs(parse_or_default(
                "CAPTCHA_RETRY_INTERVAL",
                3,
            )),
            impersonate_browser: env_or_default("IMPERSONATE_BROWSER", "chrome136"),

            database_url,
            encryption_key,

            timezone: env_or_default("TIMEZONE", "Asia/Shanghai"),
            session_ttl: Duration::from_secs(60 * parse_or_default("SESSION_TTL_MINUTES", 10)),
            permission_cache_ttl: Duration::from_secs(
                60 * parse_or_default("PERMISSION_CACHE_TTL_MINUTES", 1),
            ),

            default_checkin_hour: parse_or_default("DEFAULT_CHECKIN_HOUR", 4),
            default_push_hour: parse_or_default("DEFAULT_PUSH_HOUR", 9),

            socks5_proxy: non_empty(optional_var("SOCKS5_PROXY")),
            telegram_use_proxy: parse_or_default("TELEGRAM_USE_PROXY", false),

            log_level: env_or_default("LOG_LEVEL", "info"),
        })
    }
}

fn require_var(name: &str) -> CheckinResult<String> {
    std::env::var(name)
        .map_err(|_| CheckinError::ConfigInvalid(format!("missing required env var {name}")))
}

fn optional_var(name: &str) -> String {
    std::env::var(name).unwrap_or_default()
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

fn parse_or_default<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_id_list(value: &str) -> Vec<i64> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect()
}

/// Key must be exactly 32 raw bytes, or the 44-char base64 encoding of them.
fn decode_encryption_key(raw: &str) -> CheckinResult<Vec<u8>> {
    use base64::{engine::general_purpose::STANDARD, Engine};

    if raw.len() == 44 {
        if let Ok(decoded) = STANDARD.decode(raw) {
            if decoded.len() == 32 {
                return Ok(decoded);
            }
        }
    }
    let bytes = raw.as_bytes();
    if bytes.len() == 32 {
        return Ok(bytes.to_vec());
    }
    Err(CheckinError::ConfigInvalid(
        "ENCRYPTION_KEY must be 32 raw bytes or their 44-char base64 encoding".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_separated_id_lists() {
        assert_eq!(parse_id_list("1,2, 3"), vec![1, 2, 3]);
        assert_eq!(parse_id_list(""), Vec::<i64>::new());
        assert_eq!(parse_id_list("1,,2"), vec![1, 2]);
    }

    #[test]
    fn decodes_raw_32_byte_key() {
        let raw = "a".repeat(32);
        let key = decode_encryption_key(&raw).unwrap();
        assert_eq!(key.len(), 32);
    }

    #[test]
    fn decodes_base64_44_char_key() {
        use base64::{engine::general_purpose::STANDARD, Engine};
        let raw_key = [7u8; 32];
        let encoded = STANDARD.encode(raw_key);
        assert_eq!(encoded.len(), 44);
        let key = decode_encryption_key(&encoded).unwrap();
        assert_eq!(key, raw_key.to_vec());
    }

    #[test]
    fn rejects_wrong_length_key() {
        assert!(decode_encryption_key("too short").is_err());
    }
}
