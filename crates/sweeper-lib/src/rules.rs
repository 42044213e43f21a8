//! Power rule engine
//!
//! Pure decision logic for the autoshutdown policy: stopped-but-allocated
//! machines waste billing and are always deallocated; long-running machines
//! are powered off once past the uptime threshold, but only when uptime
//! checking is opted in and a start time is actually known. All upstream
//! fetch failures must be resolved to absent/default inputs before this
//! module is reached.

use crate::models::PowerState;
use chrono::{DateTime, Duration, Utc};

/// Maximum running duration before an eligible VM is powered off
pub const RUNNING_LIMIT_HOURS: i64 = 8;

/// Action to request from the cloud provider for one VM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerAction {
    /// Leave the VM alone
    None,
    /// Release compute and billing for a stopped-but-allocated VM
    Deallocate,
    /// Stop a VM that has been running past the uptime threshold
    PowerOff,
}

/// Decide what to do with a VM given its observed state.
///
/// Ineligible VMs are only ever recorded, never acted upon. The uptime
/// rule degrades to no-op whenever the running duration cannot be judged:
/// checking disabled, start time unknown, or a start time in the future.
pub fn decide(
    eligible: bool,
    power_state: PowerState,
    start_time: Option<DateTime<Utc>>,
    uptime_check_enabled: bool,
    now: DateTime<Utc>,
) -> PowerAction {
    if !eligible {
        return PowerAction::None;
    }

    match power_state {
        PowerState::Stopped => PowerAction::Deallocate,
        PowerState::Running => {
            if !uptime_check_enabled {
                return PowerAction::None;
            }
            let Some(start_time) = start_time else {
                return PowerAction::None;
            };
            if now - start_time > Duration::hours(RUNNING_LIMIT_HOURS) {
                PowerAction::PowerOff
            } else {
                PowerAction::None
            }
        }
        PowerState::Unknown
        | PowerState::Starting
        | PowerState::Stopping
        | PowerState::Deallocating
        | PowerState::Deallocated => PowerAction::None,
    }
}
