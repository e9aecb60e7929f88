//! Caller-facing results assembled from wait outcomes.

use scanlink_core::WaitOutcome;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::{results, scanner};

/// Answer to `get_availability`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityResult {
    pub datawedge: DataWedgeAvailability,
    pub scanner: ScannerAvailability,
    pub raw: RawAvailability,
    /// Present only when the deadline cut collection short.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timed_out: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataWedgeAvailability {
    /// DataWedge answered the status query at all.
    pub present: bool,
    /// `None` when DataWedge was silent or answered something other than
    /// `ENABLED` / `DISABLED`.
    pub enabled: Option<bool>,
    pub status_raw: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScannerAvailability {
    /// `None` when the enumeration never arrived.
    pub present: Option<bool>,
    pub status: Option<String>,
    pub scanners: Vec<ScannerEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScannerEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
}

impl ScannerEntry {
    /// Read an enumerated scanner bundle. Keys of the wrong type are skipped.
    pub fn from_bundle(bundle: &Value) -> Self {
        Self {
            name: bundle
                .get(scanner::NAME)
                .and_then(Value::as_str)
                .map(str::to_string),
            connected: bundle.get(scanner::CONNECTION_STATE).and_then(Value::as_bool),
            index: bundle.get(scanner::INDEX).and_then(Value::as_i64),
            identifier: bundle
                .get(scanner::IDENTIFIER)
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAvailability {
    pub dw_status: Option<String>,
    pub scanner_status: Option<String>,
}

/// Interpret a DataWedge status string. Only `enabled` / `disabled` (any case)
/// are meaningful.
pub fn parse_enabled(status: &str) -> Option<bool> {
    if status.eq_ignore_ascii_case("enabled") {
        Some(true)
    } else if status.eq_ignore_ascii_case("disabled") {
        Some(false)
    } else {
        None
    }
}

impl AvailabilityResult {
    pub fn from_outcome(outcome: &WaitOutcome) -> Self {
        let dw_status = outcome
            .get_str(results::GET_DATAWEDGE_STATUS)
            .map(str::to_string);
        let scanner_status = outcome.get_str(results::SCANNER_STATUS).map(str::to_string);
        let scanner_list = outcome
            .get(results::ENUMERATE_SCANNERS)
            .and_then(Value::as_array);

        Self {
            datawedge: DataWedgeAvailability {
                present: dw_status.is_some(),
                enabled: dw_status.as_deref().and_then(parse_enabled),
                status_raw: dw_status.clone(),
            },
            scanner: ScannerAvailability {
                present: scanner_list.map(|list| !list.is_empty()),
                status: scanner_status.clone(),
                scanners: scanner_list
                    .map(|list| list.iter().map(ScannerEntry::from_bundle).collect())
                    .unwrap_or_default(),
            },
            raw: RawAvailability {
                dw_status,
                scanner_status,
            },
            timed_out: outcome.timed_out.then_some(true),
        }
    }
}

/// Answer to `is_ready`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyResult {
    pub ready: bool,
    pub status_raw: String,
}

impl ReadyResult {
    pub fn from_outcome(outcome: &WaitOutcome) -> Self {
        let status_raw = outcome
            .get_str(results::GET_DATAWEDGE_STATUS)
            .unwrap_or_default()
            .to_string();
        Self {
            ready: parse_enabled(&status_raw).unwrap_or(false),
            status_raw,
        }
    }
}

/// Answer to `has_scanner`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScannerStatusResult {
    pub has_scanner: bool,
    pub status: String,
}

impl ScannerStatusResult {
    pub fn from_outcome(outcome: &WaitOutcome) -> Self {
        let status = outcome
            .get_str(results::SCANNER_STATUS)
            .unwrap_or_default()
            .to_string();
        Self {
            has_scanner: !status.is_empty() && !status.eq_ignore_ascii_case("DISCONNECTED"),
            status,
        }
    }
}

/// Answer to `configure`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigureResult {
    pub profile_name: String,
    pub success: bool,
    pub result: String,
}

impl ConfigureResult {
    pub fn from_outcome(profile_name: impl Into<String>, outcome: &WaitOutcome) -> Self {
        let result = outcome
            .get_str(results::RESULT)
            .unwrap_or_default()
            .to_string();
        Self {
            profile_name: profile_name.into(),
            success: result.eq_ignore_ascii_case("SUCCESS"),
            result,
        }
    }
}

/// Answer to `version_info`: the raw version bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub datawedge: Option<String>,
    pub raw: Value,
}

impl VersionInfo {
    pub fn from_outcome(outcome: &WaitOutcome) -> Self {
        let raw = outcome
            .get(results::GET_VERSION_INFO)
            .cloned()
            .unwrap_or(Value::Null);
        Self {
            datawedge: raw
                .get("DATAWEDGE")
                .and_then(Value::as_str)
                .map(str::to_string),
            raw,
        }
    }
}
