//! Sweeper configuration

use anyhow::{Context, Result};
use serde::Deserialize;

/// Agent configuration, read from an optional `sweeper.*` config file
/// with `SWEEPER_`-prefixed environment overrides
#[derive(Debug, Clone, Deserialize)]
pub struct SweeperConfig {
    /// Path of the CSV status log
    #[serde(default = "default_csv_output_path")]
    pub csv_output_path: String,

    /// Seconds to sleep between sweep cycles
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Opt-in for powering off VMs running past the uptime limit
    #[serde(default)]
    pub enable_uptime_check: bool,

    /// Log Analytics workspace for start-time lookups; empty disables them
    #[serde(default)]
    pub workspace_id: String,

    /// Azure management-plane endpoint
    #[serde(default = "default_management_endpoint")]
    pub management_endpoint: String,

    /// Log Analytics query endpoint
    #[serde(default = "default_log_analytics_endpoint")]
    pub log_analytics_endpoint: String,

    /// Pre-acquired bearer token for the management plane. Acquiring and
    /// refreshing credentials is outside this process.
    #[serde(default)]
    pub access_token: String,

    /// Bearer token for the Log Analytics query API; defaults to the
    /// management token when unset
    #[serde(default)]
    pub log_analytics_token: Option<String>,
}

fn default_csv_output_path() -> String {
    "vm_status.csv".to_string()
}

fn default_poll_interval() -> u64 {
    300
}

fn default_management_endpoint() -> String {
    "https://management.azure.com".to_string()
}

fn default_log_analytics_endpoint() -> String {
    "https://api.loganalytics.io".to_string()
}

impl SweeperConfig {
    /// Load configuration from the optional config file and environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("sweeper").required(false))
            .add_source(config::Environment::with_prefix("SWEEPER"))
            .build()
            .context("Failed to read configuration")?;

        config
            .try_deserialize()
            .context("Invalid sweeper configuration")
    }
}
