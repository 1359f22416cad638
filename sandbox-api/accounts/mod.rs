pub mod mongo_store;
pub mod provider;
pub mod sqlite_store;
pub mod store;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LifecycleError;

/// Backend family an account lives on. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Aws,
    Ocp,
}

impl AccountKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AccountKind::Aws => "aws",
            AccountKind::Ocp => "ocp",
        }
    }
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountKind {
    type Err = LifecycleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "aws" => Ok(AccountKind::Aws),
            "ocp" => Ok(AccountKind::Ocp),
            other => Err(LifecycleError::Validation(format!("unknown account kind: {other}"))),
        }
    }
}

/// A leasable sandbox environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub name: String,
    pub kind: AccountKind,
    #[serde(default)]
    pub available: bool,
    #[serde(default)]
    pub to_cleanup: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_email: Option<String>,
    /// Link to an external reservation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub envtype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hosted_zone_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_access_key_id: Option<String>,
    /// Encrypted credential blob. Stored and returned as-is, never decrypted here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_secret_access_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conan_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conan_timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conan_hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Secondary sort key derived from the digits in `name`.
    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub name_int: Option<u64>,
}

impl Account {
    pub fn new(name: impl Into<String>, kind: AccountKind) -> Self {
        Self {
            name: name.into(),
            kind,
            available: true,
            to_cleanup: false,
            owner: None,
            owner_email: None,
            service_uuid: None,
            guid: None,
            envtype: None,
            region: None,
            zone: None,
            hosted_zone_id: None,
            account_id: None,
            comment: None,
            aws_access_key_id: None,
            aws_secret_access_key: None,
            conan_status: None,
            conan_timestamp: None,
            conan_hostname: None,
            updated_at: None,
            name_int: None,
        }
    }

    /// Fill `name_int` from the record name.
    ///
    /// A name without digits leaves the key unset and logs the validation
    /// failure; one malformed record never fails the surrounding request.
    pub fn attach_sort_key(&mut self) {
        match derive_name_int(&self.name) {
            Ok(n) => self.name_int = Some(n),
            Err(e) => {
                tracing::warn!(account = %self.name, error = %e, "cannot derive numeric sort key");
                self.name_int = None;
            }
        }
    }
}

/// Query shape shared by every backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AccountFilter {
    #[serde(default)]
    pub service_uuid: Option<String>,
    #[serde(default)]
    pub available: Option<bool>,
}

impl AccountFilter {
    pub fn by_service_uuid(uuid: impl Into<String>) -> Self {
        Self {
            service_uuid: Some(uuid.into()),
            available: None,
        }
    }
}

/// Strip every non-digit from `name` and parse what is left,
/// e.g. `"acct-042"` -> `42`.
pub fn derive_name_int(name: &str) -> Result<u64, LifecycleError> {
    let digits: String = name.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return Err(LifecycleError::Validation(format!(
            "account name {name:?} contains no digits"
        )));
    }
    digits.parse::<u64>().map_err(|e| {
        LifecycleError::Validation(format!("account name {name:?} has an unusable numeric part: {e}"))
    })
}

/// Order by the derived numeric key (records without one last), then by name.
pub fn sort_accounts(accounts: &mut [Account]) {
    accounts.sort_by(|a, b| match (a.name_int, b.name_int) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.name.cmp(&b.name)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.name.cmp(&b.name),
    });
}
