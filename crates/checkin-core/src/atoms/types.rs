// ── Atoms: Domain Types ────────────────────────────────────────────────────
// Tagged enums for the handful of fixed-cardinality fields in the data
// model. String form is for wire/serde only; business logic matches on the
// variant.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which forum the account belongs to. Exactly two configured sites;
/// generalizing beyond them is an explicit non-goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Site {
    Nodeseek,
    Deepflood,
}

impl Site {
    pub fn as_str(self) -> &'static str {
        match self {
            Site::Nodeseek => "nodeseek",
            Site::Deepflood => "deepflood",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "nodeseek" => Some(Site::Nodeseek),
            "deepflood" => Some(Site::Deepflood),
            _ => None,
        }
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Controls the `random` query parameter on the check-in endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckinMode {
    Fixed,
    Random,
}

impl CheckinMode {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckinMode::Fixed => "fixed",
            CheckinMode::Random => "random",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fixed" => Some(CheckinMode::Fixed),
            "random" => Some(CheckinMode::Random),
            _ => None,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            CheckinMode::Fixed => CheckinMode::Random,
            CheckinMode::Random => CheckinMode::Fixed,
        }
    }

    /// The literal query-string value sent to the check-in endpoint.
    pub fn query_value(self) -> &'static str {
        match self {
            CheckinMode::Fixed => "false",
            CheckinMode::Random => "true",
        }
    }
}

impl fmt::Display for CheckinMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Inactive,
    Error,
}

impl AccountStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Inactive => "inactive",
            AccountStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(AccountStatus::Active),
            "inactive" => Some(AccountStatus::Inactive),
            "error" => Some(AccountStatus::Error),
            _ => None,
        }
    }
}

/// `AccountUpdate` (cookie-refresh task) lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl UpdateStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UpdateStatus::Pending => "pending",
            UpdateStatus::Processing => "processing",
            UpdateStatus::Completed => "completed",
            UpdateStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(UpdateStatus::Pending),
            "processing" => Some(UpdateStatus::Processing),
            "completed" => Some(UpdateStatus::Completed),
            "failed" => Some(UpdateStatus::Failed),
            _ => None,
        }
    }

    /// Whether a row in this status counts against the single-flight
    /// partial-unique constraint (spec §3, AccountUpdate).
    pub fn is_active(self) -> bool {
        matches!(self, UpdateStatus::Pending | UpdateStatus::Processing)
    }
}

/// Outcome of a single check-in log row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckinLogStatus {
    Success,
    Failed,
    Partial,
}

impl CheckinLogStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckinLogStatus::Success => "success",
            CheckinLogStatus::Failed => "failed",
            CheckinLogStatus::Partial => "partial",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(CheckinLogStatus::Success),
            "failed" => Some(CheckinLogStatus::Failed),
            "partial" => Some(CheckinLogStatus::Partial),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn site_round_trips_through_string_form() {
        for site in [Site::Nodeseek, Site::Deepflood] {
            assert_eq!(Site::parse(site.as_str()), Some(site));
        }
        assert_eq!(Site::parse("unknown"), None);
    }

    #[test]
    fn mode_toggles_both_ways() {
        assert_eq!(CheckinMode::Fixed.toggled(), CheckinMode::Random);
        assert_eq!(CheckinMode::Random.toggled(), CheckinMode::Fixed);
    }

    #[test]
    fn mode_query_values() {
        assert_eq!(CheckinMode::Fixed.query_value(), "false");
        assert_eq!(CheckinMode::Random.query_value(), "true");
    }

    #[test]
    fn update_status_active_set() {
        assert!(UpdateStatus::Pending.is_active());
        assert!(UpdateStatus::Processing.is_active());
        assert!(!UpdateStatus::Completed.is_active());
        assert!(!UpdateStatus::Failed.is_active());
    }
}
