//! Core data models for the sweep agent

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Tag key that marks a VM as subject to automated power rules
pub const AUTOSHUTDOWN_TAG: &str = "Autoshutdown";

/// Tag value that enables the rules; anything else leaves the VM untouched
pub const AUTOSHUTDOWN_ENABLED: &str = "1";

/// Prefix of instance view status codes that carry the power state
pub const POWER_STATE_PREFIX: &str = "PowerState/";

const RESOURCE_GROUPS_SEGMENT: &str = "resourceGroups";

/// Power state reported by the cloud provider for a VM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    #[default]
    Unknown,
    Starting,
    Running,
    Stopping,
    Stopped,
    Deallocating,
    Deallocated,
}

impl PowerState {
    /// Parse a single instance view status code such as `PowerState/running`.
    /// Codes without the power state prefix, and unrecognized states, map to
    /// `Unknown`.
    pub fn from_status_code(code: &str) -> Self {
        let Some(state) = strip_prefix_ignore_case(code, POWER_STATE_PREFIX) else {
            return PowerState::Unknown;
        };

        match state.to_ascii_lowercase().as_str() {
            "starting" => PowerState::Starting,
            "running" => PowerState::Running,
            "stopping" => PowerState::Stopping,
            "stopped" => PowerState::Stopped,
            "deallocating" => PowerState::Deallocating,
            "deallocated" => PowerState::Deallocated,
            _ => PowerState::Unknown,
        }
    }

    /// Derive the power state from a full set of instance view status codes.
    /// The first code carrying the power state prefix wins; no such code
    /// means the state is unknown.
    pub fn from_status_codes<'a, I>(codes: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        codes
            .into_iter()
            .find(|code| strip_prefix_ignore_case(code, POWER_STATE_PREFIX).is_some())
            .map(PowerState::from_status_code)
            .unwrap_or_default()
    }

    /// Lowercase state name, as written to the status log
    pub fn as_str(&self) -> &'static str {
        match self {
            PowerState::Unknown => "unknown",
            PowerState::Starting => "starting",
            PowerState::Running => "running",
            PowerState::Stopping => "stopping",
            PowerState::Stopped => "stopped",
            PowerState::Deallocating => "deallocating",
            PowerState::Deallocated => "deallocated",
        }
    }
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&value[prefix.len()..])
    } else {
        None
    }
}

/// A subscription visible to the agent's credential
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub subscription_id: String,
    pub display_name: Option<String>,
}

/// A virtual machine as returned by resource enumeration.
///
/// Carries everything the evaluator can derive without further calls:
/// the full resource id, the resource name and the tag set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmResource {
    /// Full ARM resource id, e.g.
    /// `/subscriptions/<sub>/resourceGroups/<rg>/providers/Microsoft.Compute/virtualMachines/<name>`
    pub id: String,
    pub name: String,
    pub tags: HashMap<String, String>,
}

impl VmResource {
    /// True iff the autoshutdown tag is present with the exact enabling
    /// value. String equality on purpose: `"true"`, `"yes"` and friends do
    /// not opt a VM in.
    pub fn autoshutdown_eligible(&self) -> bool {
        self.tags
            .get(AUTOSHUTDOWN_TAG)
            .is_some_and(|value| value == AUTOSHUTDOWN_ENABLED)
    }

    /// Resource group extracted from the resource id path, or an empty
    /// string when the id carries no `resourceGroups` segment.
    pub fn resource_group(&self) -> String {
        extract_resource_group(&self.id)
    }
}

/// Scan the `/`-separated segments of a resource id for the
/// `resourceGroups` marker and return the segment that follows it.
pub fn extract_resource_group(resource_id: &str) -> String {
    let mut segments = resource_id.split('/').filter(|s| !s.is_empty());
    while let Some(segment) = segments.next() {
        if segment.eq_ignore_ascii_case(RESOURCE_GROUPS_SEGMENT) {
            return segments.next().unwrap_or_default().to_string();
        }
    }
    String::new()
}

/// One observation of one VM, produced once per evaluation cycle.
/// Fully determined at construction and always recorded, whatever the
/// eligibility or rule outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmObservation {
    pub timestamp: DateTime<Utc>,
    pub subscription_id: String,
    pub resource_group: String,
    pub computer_name: String,
    pub power_state: PowerState,
    pub autoshutdown: bool,
    pub start_time_utc: Option<DateTime<Utc>>,
}
