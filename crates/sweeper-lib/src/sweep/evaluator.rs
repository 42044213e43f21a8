//! Per-VM evaluation
//!
//! One evaluation fetches the VM's observed state, records it to the
//! status log unconditionally, and applies the power rules when the VM
//! is tagged eligible. Everything in here degrades instead of aborting:
//! a failed status fetch records an unknown power state, and any error
//! in the flow is logged at the evaluation boundary so it never reaches
//! the sweep loop.

use crate::cloud::CloudInventory;
use crate::models::{PowerState, VmObservation, VmResource};
use crate::rules::{self, PowerAction};
use crate::sink::CsvSink;
use crate::telemetry::StartTimeSource;
use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Read-only settings snapshot the evaluator needs per cycle
#[derive(Debug, Clone, Default)]
pub struct EvaluatorSettings {
    /// Opt-in for the uptime-based power-off rule
    pub enable_uptime_check: bool,
    /// Log Analytics workspace to resolve start times from; empty
    /// disables the lookup entirely
    pub workspace_id: String,
}

/// Evaluates a single VM per cycle: observe, record, apply power rules
pub struct VmEvaluator {
    inventory: Arc<dyn CloudInventory>,
    start_times: Arc<dyn StartTimeSource>,
    sink: Arc<CsvSink>,
    settings: EvaluatorSettings,
}

impl VmEvaluator {
    pub fn new(
        inventory: Arc<dyn CloudInventory>,
        start_times: Arc<dyn StartTimeSource>,
        sink: Arc<CsvSink>,
        settings: EvaluatorSettings,
    ) -> Self {
        Self {
            inventory,
            start_times,
            sink,
            settings,
        }
    }

    /// Evaluate one VM. Never fails: a single VM's error must not stop
    /// the sweep of the others, so this is the isolate-and-log boundary.
    pub async fn evaluate(&self, subscription_id: &str, vm: &VmResource) {
        if let Err(error) = self.try_evaluate(subscription_id, vm).await {
            error!(vm = %vm.id, error = %error, "Error processing VM");
        }
    }

    async fn try_evaluate(&self, subscription_id: &str, vm: &VmResource) -> Result<()> {
        let observation = self.observe(subscription_id, vm).await;
        self.sink
            .append(&observation)
            .context("Failed to record VM observation")?;

        if !observation.autoshutdown {
            debug!(vm = %vm.id, "VM not tagged for autoshutdown, recorded only");
            return Ok(());
        }

        let decision = rules::decide(
            observation.autoshutdown,
            observation.power_state,
            observation.start_time_utc,
            self.settings.enable_uptime_check,
            Utc::now(),
        );

        match decision {
            PowerAction::Deallocate => {
                info!(vm = %vm.id, "VM is stopped but allocated, requesting deallocation");
                self.inventory
                    .deallocate(&vm.id)
                    .await
                    .context("Deallocate request failed")?;
                info!(vm = %vm.id, "Deallocate accepted");
            }
            PowerAction::PowerOff => {
                info!(vm = %vm.id, "VM has been running past the uptime limit, requesting power off");
                self.inventory
                    .power_off(&vm.id)
                    .await
                    .context("Power off request failed")?;
                info!(vm = %vm.id, "Power off accepted");
            }
            PowerAction::None => {
                debug!(
                    vm = %vm.id,
                    state = observation.power_state.as_str(),
                    "No power action for VM"
                );
            }
        }

        Ok(())
    }

    /// Build the observation for one VM. Transient fetch failures are
    /// resolved to defaults here so the rule engine only ever sees
    /// complete inputs.
    async fn observe(&self, subscription_id: &str, vm: &VmResource) -> VmObservation {
        let power_state = match self.inventory.instance_status(&vm.id).await {
            Ok(codes) => PowerState::from_status_codes(codes.iter().map(String::as_str)),
            Err(error) => {
                warn!(
                    vm = %vm.id,
                    error = %error,
                    "Could not get instance view, recording unknown power state"
                );
                PowerState::Unknown
            }
        };

        let start_time_utc = self
            .start_times
            .last_start_time(&self.settings.workspace_id, &vm.id)
            .await;

        VmObservation {
            timestamp: Utc::now(),
            subscription_id: subscription_id.to_string(),
            resource_group: vm.resource_group(),
            computer_name: vm.name.clone(),
            power_state,
            autoshutdown: vm.autoshutdown_eligible(),
            start_time_utc,
        }
    }
}
