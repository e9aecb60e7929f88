//! The DataWedge facade.
//!
//! Every query is expressed as a wait on a fixed slot, so repeating a query
//! while the previous one is still outstanding supersedes the older call.
//! Control commands are fire-and-forget.

use std::sync::Arc;

use parking_lot::RwLock;
use scanlink_core::{
    CorrelatorHost, CorrelatorStats, EngineConfig, FieldSpec, HostHandle, IssueRequest, Topic,
};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::api::{
    default_scan_action, defaults, results, ENUMERATED_SCANNER_ACTION, RESULT_ACTION,
};
use crate::command::{self, prefix};
use crate::error::{DataWedgeError, Result};
use crate::extract;
use crate::profile::ProfileConfig;
use crate::results::{
    AvailabilityResult, ConfigureResult, ReadyResult, ScannerStatusResult, VersionInfo,
};
use crate::scan::{ResultSubscription, ScanSubscription};

/// Slot names. One outstanding wait per slot.
pub mod slots {
    pub const AVAILABILITY: &str = "availability";
    pub const READINESS: &str = "readiness";
    pub const SCANNER_STATUS: &str = "scanner-status";
    pub const CONFIGURE: &str = "configure";
    pub const VERSION: &str = "version";
}

/// Options for [`DataWedge::initialize`]. Blank values fall back to defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InitializeOptions {
    pub profile_name: Option<String>,
    pub intent_action: Option<String>,
    pub intent_category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub profile_name: String,
    pub intent_action: String,
}

/// Options for [`DataWedge::configure`]. Unset values keep the current profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigureOptions {
    pub profile_name: Option<String>,
    pub intent_action: Option<String>,
    pub activities: Option<Vec<String>>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone)]
struct ProfileState {
    profile_name: String,
    intent_action: String,
    intent_category: String,
}

/// Client for a DataWedge service reachable through a broadcast channel.
#[derive(Debug, Clone)]
pub struct DataWedge {
    host: HostHandle,
    config: EngineConfig,
    package_name: String,
    state: Arc<RwLock<ProfileState>>,
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl DataWedge {
    /// Start a correlator host for `package_name` over `channel`.
    ///
    /// DataWedge's two result actions and the default scan action are added
    /// to whatever routes `config` already carries.
    pub fn spawn<C>(
        package_name: impl Into<String>,
        mut config: EngineConfig,
        channel: C,
    ) -> Result<(Self, JoinHandle<()>)>
    where
        C: scanlink_core::Channel + 'static,
    {
        let package_name = package_name.into();
        if package_name.trim().is_empty() {
            return Err(DataWedgeError::InvalidOption(
                "package name must not be empty".into(),
            ));
        }
        let intent_action = default_scan_action(&package_name);

        for action in [RESULT_ACTION, ENUMERATED_SCANNER_ACTION] {
            if !config.result_actions.iter().any(|a| a == action) {
                config.result_actions.push(action.to_string());
            }
        }
        if !config.data_actions.contains(&intent_action) {
            config.data_actions.push(intent_action.clone());
        }

        let (host, task) = CorrelatorHost::spawn(&config, channel)?;
        info!(package = %package_name, scan_action = %intent_action, "DataWedge client started");

        let state = ProfileState {
            profile_name: defaults::PROFILE_NAME.to_string(),
            intent_action,
            intent_category: defaults::INTENT_CATEGORY.to_string(),
        };
        Ok((
            Self {
                host,
                config,
                package_name,
                state: Arc::new(RwLock::new(state)),
            },
            task,
        ))
    }

    /// Handle to the underlying correlator host.
    pub fn host(&self) -> &HostHandle {
        &self.host
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    pub fn profile_name(&self) -> String {
        self.state.read().profile_name.clone()
    }

    pub fn intent_action(&self) -> String {
        self.state.read().intent_action.clone()
    }

    pub fn intent_category(&self) -> String {
        self.state.read().intent_category.clone()
    }

    /// Push profile settings with `SET_CONFIG`, then adopt them.
    ///
    /// Settings in effect stay untouched if the channel refuses the command.
    ///
    /// Returns as soon as the command is handed to the channel; DataWedge's
    /// answer is visible on [`results`](Self::results) only.
    pub async fn initialize(&self, options: InitializeOptions) -> Result<InitializeResult> {
        let profile_name = non_blank(options.profile_name.as_deref())
            .unwrap_or_else(|| defaults::PROFILE_NAME.to_string());
        let intent_action = non_blank(options.intent_action.as_deref())
            .unwrap_or_else(|| default_scan_action(&self.package_name));
        let intent_category = non_blank(options.intent_category.as_deref())
            .unwrap_or_else(|| defaults::INTENT_CATEGORY.to_string());

        let profile = ProfileConfig::new(&profile_name, &self.package_name, &intent_action);
        self.host.send(profile.to_command()).await?;

        self.apply_profile(&profile_name, &intent_action).await?;
        self.state.write().intent_category = intent_category;

        info!(profile = %profile_name, scan_action = %intent_action, "Profile pushed");
        Ok(InitializeResult {
            profile_name,
            intent_action,
        })
    }

    /// Query DataWedge status, scanner list and scanner status together.
    ///
    /// Resolves with whatever arrived once the deadline passes; a silent
    /// DataWedge yields `present: false` rather than an error.
    pub async fn get_availability(&self, timeout_ms: Option<u64>) -> Result<AvailabilityResult> {
        let request_id = command::request_id("AVAIL");
        let request = IssueRequest::new(
            slots::AVAILABILITY,
            self.config.aggregate_options().with_timeout_ms(timeout_ms),
        )
        .field(datawedge_status_field())
        .field(
            FieldSpec::new(results::ENUMERATE_SCANNERS)
                .with_tag_prefix(prefix::ENUM_SCANNERS)
                .with_extractor(extract::scanner_list),
        )
        .field(scanner_status_field())
        .command(command::get_datawedge_status(&request_id))
        .command(command::enumerate_scanners(&request_id))
        .command(command::get_scanner_status(&request_id));

        let outcome = self.host.issue(request).await?;
        debug!(
            timed_out = outcome.timed_out,
            missing = ?outcome.missing,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "Availability resolved"
        );
        Ok(AvailabilityResult::from_outcome(&outcome))
    }

    /// Whether DataWedge reports itself enabled.
    pub async fn is_ready(&self, timeout_ms: Option<u64>) -> Result<ReadyResult> {
        let request_id = command::request_id("READY");
        let request = IssueRequest::new(
            slots::READINESS,
            self.config.single_options().with_timeout_ms(timeout_ms),
        )
        .field(datawedge_status_field())
        .command(command::get_datawedge_status(&request_id));

        let outcome = self.host.issue(request).await?;
        Ok(ReadyResult::from_outcome(&outcome))
    }

    /// Whether a scanner is attached and what state it is in.
    pub async fn has_scanner(&self, timeout_ms: Option<u64>) -> Result<ScannerStatusResult> {
        let request_id = command::request_id("SCANNER");
        let request = IssueRequest::new(
            slots::SCANNER_STATUS,
            self.config.single_options().with_timeout_ms(timeout_ms),
        )
        .field(scanner_status_field())
        .command(command::get_scanner_status(&request_id));

        let outcome = self.host.issue(request).await?;
        Ok(ScannerStatusResult::from_outcome(&outcome))
    }

    /// Push a profile and wait for DataWedge to accept or reject it.
    ///
    /// The profile name and scan action in effect are only replaced when
    /// DataWedge answers `SUCCESS`.
    pub async fn configure(&self, options: ConfigureOptions) -> Result<ConfigureResult> {
        let (current_profile, current_action) = {
            let state = self.state.read();
            (state.profile_name.clone(), state.intent_action.clone())
        };
        let profile_name =
            non_blank(options.profile_name.as_deref()).unwrap_or(current_profile);
        let intent_action =
            non_blank(options.intent_action.as_deref()).unwrap_or(current_action);

        let mut profile = ProfileConfig::new(&profile_name, &self.package_name, &intent_action);
        if let Some(activities) = options.activities {
            if activities.iter().all(|a| a.trim().is_empty()) {
                return Err(DataWedgeError::InvalidOption(
                    "activities must name at least one activity".into(),
                ));
            }
            profile.activities = activities;
        }

        let request = IssueRequest::new(
            slots::CONFIGURE,
            self.config.single_options().with_timeout_ms(options.timeout_ms),
        )
        .field(
            FieldSpec::new(results::RESULT)
                .with_tag_prefix(format!("{}_", prefix::SET_CONFIG))
                .with_extractor(extract::string),
        )
        .command(profile.to_command());

        let outcome = self.host.issue(request).await?;
        let result = ConfigureResult::from_outcome(&profile_name, &outcome);
        if result.success {
            self.apply_profile(&profile_name, &intent_action).await?;
        }
        info!(profile = %profile_name, result = %result.result, "Profile configured");
        Ok(result)
    }

    /// DataWedge and component versions.
    pub async fn version_info(&self, timeout_ms: Option<u64>) -> Result<VersionInfo> {
        let request_id = command::request_id("VERSION");
        let request = IssueRequest::new(
            slots::VERSION,
            self.config.single_options().with_timeout_ms(timeout_ms),
        )
        .field(
            FieldSpec::new(results::GET_VERSION_INFO)
                .with_tag_prefix(prefix::GET_VERSION_INFO)
                .with_extractor(extract::bundle),
        )
        .command(command::get_version_info(&request_id));

        let outcome = self.host.issue(request).await?;
        Ok(VersionInfo::from_outcome(&outcome))
    }

    pub async fn enable(&self) -> Result<()> {
        Ok(self.host.send(command::enable_datawedge()).await?)
    }

    pub async fn disable(&self) -> Result<()> {
        Ok(self.host.send(command::disable_datawedge()).await?)
    }

    pub async fn enable_scanner(&self) -> Result<()> {
        Ok(self.host.send(command::enable_scanner()).await?)
    }

    pub async fn disable_scanner(&self) -> Result<()> {
        Ok(self.host.send(command::disable_scanner()).await?)
    }

    pub async fn start_scanning(&self) -> Result<()> {
        Ok(self.host.send(command::start_scanning()).await?)
    }

    pub async fn stop_scanning(&self) -> Result<()> {
        Ok(self.host.send(command::stop_scanning()).await?)
    }

    /// Scans delivered on the current scan action from now on.
    pub fn on_scan_result(&self) -> ScanSubscription {
        ScanSubscription::new(self.host.subscribe_data())
    }

    /// Every DataWedge result seen from now on, matched or not.
    pub fn results(&self) -> ResultSubscription {
        ResultSubscription::new(self.host.subscribe_results())
    }

    pub async fn stats(&self) -> Result<CorrelatorStats> {
        Ok(self.host.stats().await?)
    }

    /// Stop the host. Calls still waiting fail with `Closed`.
    pub async fn shutdown(&self) {
        self.host.shutdown().await;
    }

    async fn apply_profile(&self, profile_name: &str, intent_action: &str) -> Result<()> {
        let previous = {
            let mut state = self.state.write();
            state.profile_name = profile_name.to_string();
            std::mem::replace(&mut state.intent_action, intent_action.to_string())
        };
        if previous != intent_action {
            debug!(from = %previous, to = %intent_action, "Switching scan action");
            self.host.remove_route(previous).await?;
            self.host.add_route(intent_action, Topic::Data).await?;
        }
        Ok(())
    }
}

fn datawedge_status_field() -> FieldSpec {
    FieldSpec::new(results::GET_DATAWEDGE_STATUS)
        .with_tag_prefix(prefix::GET_DW_STATUS)
        .with_extractor(extract::datawedge_status)
}

fn scanner_status_field() -> FieldSpec {
    FieldSpec::new(results::SCANNER_STATUS)
        .with_tag_prefix(prefix::GET_SCANNER_STATUS)
        .with_extractor(extract::string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanlink_core::RecordingChannel;

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(Some("  P  ")), Some("P".to_string()));
        assert_eq!(non_blank(Some("   ")), None);
        assert_eq!(non_blank(None), None);
    }

    #[test]
    fn test_options_deserialize_camel_case() {
        let options: InitializeOptions =
            serde_json::from_str(r#"{"profileName": "P", "intentAction": "a.SCAN"}"#).unwrap();
        assert_eq!(options.profile_name.as_deref(), Some("P"));
        assert_eq!(options.intent_category, None);

        let options: ConfigureOptions = serde_json::from_str(r#"{"timeoutMs": 50}"#).unwrap();
        assert_eq!(options.timeout_ms, Some(50));
    }

    #[tokio::test]
    async fn test_spawn_adds_routes() {
        let (dw, _task) =
            DataWedge::spawn("com.example.app", EngineConfig::default(), RecordingChannel::new())
                .unwrap();

        let config = dw.config();
        assert!(config.result_actions.iter().any(|a| a == RESULT_ACTION));
        assert!(config
            .result_actions
            .iter()
            .any(|a| a == ENUMERATED_SCANNER_ACTION));
        assert_eq!(config.data_actions, vec!["com.example.app.SCAN".to_string()]);
        assert_eq!(dw.profile_name(), defaults::PROFILE_NAME);
    }

    #[tokio::test]
    async fn test_spawn_rejects_blank_package() {
        let err = DataWedge::spawn("  ", EngineConfig::default(), RecordingChannel::new())
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_OPTION");
    }
}
