//! Engine configuration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::error::Error;

/// Parses a config value string consisting of a name and an options part.
/// Example: `SecurityLevelAffinity[host_power=0.9]` splits into the name
/// `SecurityLevelAffinity` and the options string `host_power=0.9`.
pub fn parse_config_value(config_str: &str) -> (String, Option<String>) {
    match config_str.split_once('[') {
        Some((name, options)) => (name.to_string(), Some(options.replace(']', ""))),
        None => (config_str.to_string(), None),
    }
}

/// Parses an options string into a map of option names and values.
pub fn parse_options(options_str: &str) -> HashMap<String, String> {
    let mut options = HashMap::new();
    for option_str in options_str.split(',') {
        if let Some((name, value)) = option_str.split_once('=') {
            options.insert(name.trim().to_string(), value.trim().to_string());
        }
    }
    options
}

/// Holds raw engine config parsed from YAML.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
struct RawSimConfig {
    pub allocation_retry_period: Option<f64>,
    pub overutilization_threshold: Option<f64>,
    pub strategy: Option<String>,
    pub hosts: Option<Vec<HostConfig>>,
}

/// Configuration of a single physical host or a set of identical hosts.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct HostConfig {
    /// Host name. Should be set if count = 1.
    pub name: Option<String>,
    /// Host name prefix, used when count > 1; the full name is produced by
    /// appending the host instance number.
    pub name_prefix: Option<String>,
    /// Compute rate of each processing element in MIPS.
    pub pe_mips: Vec<u32>,
    /// Host memory capacity in MB.
    pub memory: u64,
    #[serde(default = "default_bandwidth")]
    pub bandwidth: u64,
    #[serde(default = "default_storage")]
    pub storage: u64,
    /// Number of such hosts.
    pub count: Option<u32>,
}

fn default_bandwidth() -> u64 {
    1_000
}

fn default_storage() -> u64 {
    100_000
}

/// Represents the engine configuration.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct SimConfig {
    /// Period in seconds to wait before retrying a deferred placement.
    pub allocation_retry_period: f64,
    /// Maximum allowed fractional resource usage before a host is considered
    /// unsafe to allocate onto during migration planning.
    pub overutilization_threshold: f64,
    /// Placement strategy config string.
    pub strategy: String,
    /// Configurations of physical hosts.
    pub hosts: Vec<HostConfig>,
}

impl SimConfig {
    /// Creates the config by reading parameter values from a YAML file
    /// (uses default values for absent parameters).
    pub fn from_file(file_name: &str) -> Result<Self, Error> {
        let content = std::fs::read_to_string(file_name)
            .map_err(|err| Error::InvalidConfig(format!("can't read file {}: {}", file_name, err)))?;
        Self::from_str(&content)
    }

    /// Creates the config from a YAML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, Error> {
        let raw: RawSimConfig =
            serde_yaml::from_str(content).map_err(|err| Error::InvalidConfig(err.to_string()))?;
        Ok(Self {
            allocation_retry_period: raw.allocation_retry_period.unwrap_or(1.0),
            overutilization_threshold: raw.overutilization_threshold.unwrap_or(0.8),
            strategy: raw.strategy.unwrap_or_else(|| "SecurityAware".to_string()),
            hosts: raw.hosts.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_config_values() {
        assert_eq!(parse_config_value("SecurityAware"), ("SecurityAware".to_string(), None));
        let (name, options) = parse_config_value("SecurityLevelAffinity[host_power=0.9]");
        assert_eq!(name, "SecurityLevelAffinity");
        let options = parse_options(&options.unwrap());
        assert_eq!(options.get("host_power").unwrap(), "0.9");
    }

    #[test]
    fn defaults_apply() {
        let config = SimConfig::from_str("{}").unwrap();
        assert_eq!(config.allocation_retry_period, 1.0);
        assert_eq!(config.overutilization_threshold, 0.8);
        assert_eq!(config.strategy, "SecurityAware");
        assert!(config.hosts.is_empty());
    }

    #[test]
    fn parses_hosts() {
        let config = SimConfig::from_str(
            r#"
overutilization_threshold: 0.9
hosts:
  - name_prefix: host
    pe_mips: [1000, 1000]
    memory: 4096
    count: 2
"#,
        )
        .unwrap();
        assert_eq!(config.overutilization_threshold, 0.9);
        assert_eq!(config.hosts.len(), 1);
        assert_eq!(config.hosts[0].count, Some(2));
        assert_eq!(config.hosts[0].bandwidth, default_bandwidth());
    }

    #[test]
    fn bad_yaml_is_an_error() {
        assert!(matches!(
            SimConfig::from_str("hosts: {not a list}"),
            Err(Error::InvalidConfig(_))
        ));
    }
}
