// ── Atoms: Error Types ─────────────────────────────────────────────────────
// Single canonical error enum for the engine, built with `thiserror`.
//
// Variants are coarse-grained by domain, matching the error-kind table in
// the system spec. `#[from]` wires std/external error conversions
// automatically. No variant carries a plaintext password.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckinError {
    /// Filesystem or OS-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization / deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP / network failure (reqwest layer).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// SQLite / rusqlite database failure.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Captcha solver timed out or never produced a token.
    #[error("captcha timeout waiting for Turnstile token")]
    CaptchaTimeout,

    /// Login POST rejected after a captcha token was supplied.
    #[error("login rejected: {0}")]
    CaptchaRejected(String),

    /// Login POST returned `success:false` (or non-200).
    #[error("login rejected: {0}")]
    LoginRejected(String),

    /// Site body reported `status:404` — cookie is no longer valid.
    #[error("invalid cookie")]
    InvalidCookie,

    /// Site returned HTTP 403 — blocked at the edge.
    #[error("blocked by edge; refresh cookie")]
    Blocked,

    /// Any other non-success check-in response.
    #[error("check-in failed: {0}")]
    CheckinFailed(String),

    /// Site reported the account already checked in today (idempotent success).
    #[error("already checked in today")]
    AlreadyCheckedIn,

    /// `update.try_begin` found an existing active row.
    #[error("update already in progress")]
    UpdateInFlight,

    /// Decryption failed — wrong key or corrupted/tampered ciphertext.
    #[error("credentials corrupted")]
    CredentialsCorrupted,

    /// Configuration missing or invalid at boot.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Caller is not the owner of the referenced account.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// Referenced entity (account, user, update row) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Attempted to create an account that already exists.
    #[error("account already exists: {0}")]
    AlreadyExists(String),

    /// Catch-all for errors without a dedicated variant.
    #[error("{0}")]
    Other(String),
}

impl CheckinError {
    pub fn checkin_failed(message: impl Into<String>) -> Self {
        Self::CheckinFailed(message.into())
    }

    pub fn login_rejected(message: impl Into<String>) -> Self {
        Self::LoginRejected(message.into())
    }

    /// True for the error kinds the scheduler's batch "check-in all" flow
    /// treats as "go refresh the cookie and retry once" (spec §7).
    pub fn triggers_cookie_refresh(&self) -> bool {
        matches!(self, Self::Blocked | Self::InvalidCookie)
    }
}

impl From<String> for CheckinError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}

impl From<&str> for CheckinError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

impl From<CheckinError> for String {
    fn from(e: CheckinError) -> Self {
        e.to_string()
    }
}

/// All engine operations return this type.
pub type CheckinResult<T> = Result<T, CheckinError>;
