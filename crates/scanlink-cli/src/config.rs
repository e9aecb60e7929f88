//! CLI configuration file.

use std::path::Path;

use anyhow::{Context, Result};
use scanlink_core::EngineConfig;
use scanlink_datawedge::{InitializeOptions, SimulatedDataWedge};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PACKAGE_NAME: &str = "com.example.scanlink";

/// Contents of `--config <file>`. Every section is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default = "default_package_name")]
    pub package_name: String,

    #[serde(default)]
    pub engine: EngineConfig,

    /// Profile settings used by `init` and `scan`.
    #[serde(default)]
    pub datawedge: InitializeOptions,

    #[serde(default)]
    pub simulator: SimulatorConfig,
}

fn default_package_name() -> String {
    DEFAULT_PACKAGE_NAME.to_string()
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            package_name: default_package_name(),
            engine: EngineConfig::default(),
            datawedge: InitializeOptions::default(),
            simulator: SimulatorConfig::default(),
        }
    }
}

impl CliConfig {
    /// Load from `path`, or defaults when no path is given. Environment
    /// overrides apply on top of either.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                Self::parse(&text)
                    .with_context(|| format!("Invalid config file {}", path.display()))?
            }
            None => Self::default(),
        };
        config.engine = config.engine.with_env_overrides();
        Ok(config)
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

/// Behaviour of the simulated DataWedge service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatorConfig {
    #[serde(default = "default_true")]
    pub present: bool,

    #[serde(default)]
    pub duplicate: bool,

    #[serde(default = "default_true")]
    pub echo_identifiers: bool,

    #[serde(default)]
    pub reply_delay_ms: u64,

    /// Result keys whose replies are lost.
    #[serde(default)]
    pub drop: Vec<String>,

    #[serde(default)]
    pub fail_sends: bool,
}

fn default_true() -> bool {
    true
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            present: true,
            duplicate: false,
            echo_identifiers: true,
            reply_delay_ms: 0,
            drop: Vec::new(),
            fail_sends: false,
        }
    }
}

impl SimulatorConfig {
    pub fn build(&self) -> SimulatedDataWedge {
        let sim = SimulatedDataWedge::new();
        sim.set_present(self.present)
            .set_duplicate(self.duplicate)
            .set_echo_identifiers(self.echo_identifiers)
            .set_fail_sends(self.fail_sends)
            .set_reply_delay(std::time::Duration::from_millis(self.reply_delay_ms));
        for key in &self.drop {
            sim.drop_result(key.as_str());
        }
        sim
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = CliConfig::parse("").unwrap();
        assert_eq!(config, CliConfig::default());
        assert_eq!(config.engine.aggregate_timeout_ms, 1000);
        assert!(config.simulator.present);
    }

    #[test]
    fn test_parse_sections() {
        let config = CliConfig::parse(
            r#"
package_name = "com.acme.picker"

[engine]
aggregate_timeout_ms = 750
data_actions = ["com.acme.picker.EXTRA_SCAN"]

[datawedge]
profileName = "PICKER"

[simulator]
present = false
drop = ["com.symbol.datawedge.api.RESULT_SCANNER_STATUS"]
"#,
        )
        .unwrap();

        assert_eq!(config.package_name, "com.acme.picker");
        assert_eq!(config.engine.aggregate_timeout_ms, 750);
        assert_eq!(config.engine.single_timeout_ms, 3000);
        assert_eq!(config.datawedge.profile_name.as_deref(), Some("PICKER"));
        assert!(!config.simulator.present);
        assert!(config.simulator.echo_identifiers);
        assert_eq!(config.simulator.drop.len(), 1);
    }

    #[test]
    fn test_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[engine]\naggregate_timeout_ms = \"soon\"").unwrap();

        let err = CliConfig::load(Some(file.path())).unwrap_err();
        assert!(err.to_string().starts_with("Invalid config file"));
    }

    #[test]
    fn test_missing_file() {
        let err = CliConfig::load(Some(Path::new("/nonexistent/scanlink.toml"))).unwrap_err();
        assert!(err.to_string().starts_with("Failed to read config file"));
    }
}
