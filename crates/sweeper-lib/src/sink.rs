//! Durable status log
//!
//! Appends one CSV row per VM observation to a flat file shared by every
//! concurrent evaluator. A single lock serializes all writes, including
//! the header check: "create header if the file is absent" happens under
//! the same lock as row appends, so racing first writers cannot produce
//! two headers or interleaved rows.

use crate::models::VmObservation;
use anyhow::{Context, Result};
use chrono::SecondsFormat;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

const HEADER: &str =
    "TimestampUtc,SubscriptionId,ResourceGroup,ComputerName,PowerState,Autoshutdown,VmStartTimeUtc";

/// Literal written when a VM's start time could not be determined
const UNKNOWN: &str = "Unknown";

/// Append-only CSV sink for VM observations. Safe to share across
/// evaluators via `Arc`.
pub struct CsvSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Append one observation as a CSV row, writing the header first if
    /// the file does not exist yet.
    pub fn append(&self, observation: &VmObservation) -> Result<()> {
        let row = Self::format_row(observation);

        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let write_header = !self.path.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open status log {}", self.path.display()))?;
        if write_header {
            writeln!(file, "{HEADER}").context("Failed to write status log header")?;
        }
        writeln!(file, "{row}").context("Failed to append status log row")?;
        Ok(())
    }

    fn format_row(observation: &VmObservation) -> String {
        let timestamp = observation
            .timestamp
            .to_rfc3339_opts(SecondsFormat::Micros, true);
        let start_time = observation
            .start_time_utc
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Micros, true))
            .unwrap_or_else(|| UNKNOWN.to_string());
        let autoshutdown = if observation.autoshutdown { "1" } else { "0" };

        [
            timestamp.as_str(),
            observation.subscription_id.as_str(),
            observation.resource_group.as_str(),
            observation.computer_name.as_str(),
            observation.power_state.as_str(),
            autoshutdown,
            start_time.as_str(),
        ]
        .iter()
        .map(|field| Self::escape_field(field))
        .collect::<Vec<_>>()
        .join(",")
    }

    fn escape_field(field: &str) -> String {
        if field.contains([',', '"', '\n', '\r']) {
            format!("\"{}\"", field.replace('"', "\"\""))
        } else {
            field.to_string()
        }
    }
}
