//! Shared mocks for evaluator and loop tests

use crate::cloud::{CloudError, CloudInventory};
use crate::models::{Subscription, VmResource};
use crate::telemetry::StartTimeSource;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

pub fn vm_id(name: &str) -> String {
    format!(
        "/subscriptions/sub-1/resourceGroups/rg-test/providers/Microsoft.Compute/virtualMachines/{name}"
    )
}

/// Build a VM resource, optionally carrying the autoshutdown tag value
pub fn vm(name: &str, autoshutdown_tag: Option<&str>) -> VmResource {
    let mut tags = HashMap::new();
    if let Some(value) = autoshutdown_tag {
        tags.insert(crate::models::AUTOSHUTDOWN_TAG.to_string(), value.to_string());
    }
    VmResource {
        id: vm_id(name),
        name: name.to_string(),
        tags,
    }
}

/// In-memory cloud inventory. VMs without registered status codes fail
/// their instance view lookup; requested power operations are recorded.
#[derive(Default)]
pub struct MockInventory {
    subscriptions: Mutex<Vec<Subscription>>,
    vms: Mutex<HashMap<String, Vec<VmResource>>>,
    status_codes: Mutex<HashMap<String, Vec<String>>>,
    fail_enumeration: AtomicBool,
    actions: Mutex<Vec<(String, String)>>,
}

impl MockInventory {
    pub fn add_subscription(&self, subscription_id: &str) {
        self.subscriptions
            .lock()
            .unwrap()
            .push(Subscription {
                subscription_id: subscription_id.to_string(),
                display_name: None,
            });
    }

    pub fn add_vm(&self, subscription_id: &str, vm: VmResource) {
        self.vms
            .lock()
            .unwrap()
            .entry(subscription_id.to_string())
            .or_default()
            .push(vm);
    }

    pub fn set_status(&self, vm_id: &str, codes: &[&str]) {
        self.status_codes.lock().unwrap().insert(
            vm_id.to_string(),
            codes.iter().map(|c| c.to_string()).collect(),
        );
    }

    pub fn fail_enumeration(&self) {
        self.fail_enumeration.store(true, Ordering::SeqCst);
    }

    /// Power operations requested so far, as (action, vm id) pairs
    pub fn actions(&self) -> Vec<(String, String)> {
        self.actions.lock().unwrap().clone()
    }
}

#[async_trait]
impl CloudInventory for MockInventory {
    async fn list_subscriptions(&self) -> Result<Vec<Subscription>, CloudError> {
        if self.fail_enumeration.load(Ordering::SeqCst) {
            return Err(CloudError::Api {
                operation: "list subscriptions",
                status: 500,
                body: "enumeration failed".to_string(),
            });
        }
        Ok(self.subscriptions.lock().unwrap().clone())
    }

    async fn list_virtual_machines(
        &self,
        subscription: &Subscription,
    ) -> Result<Vec<VmResource>, CloudError> {
        Ok(self
            .vms
            .lock()
            .unwrap()
            .get(&subscription.subscription_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn instance_status(&self, vm_id: &str) -> Result<Vec<String>, CloudError> {
        self.status_codes
            .lock()
            .unwrap()
            .get(vm_id)
            .cloned()
            .ok_or(CloudError::Api {
                operation: "get instance view",
                status: 404,
                body: "no instance view".to_string(),
            })
    }

    async fn deallocate(&self, vm_id: &str) -> Result<(), CloudError> {
        self.actions
            .lock()
            .unwrap()
            .push(("deallocate".to_string(), vm_id.to_string()));
        Ok(())
    }

    async fn power_off(&self, vm_id: &str) -> Result<(), CloudError> {
        self.actions
            .lock()
            .unwrap()
            .push(("powerOff".to_string(), vm_id.to_string()));
        Ok(())
    }
}

/// Start time source answering with a fixed value, honoring the "empty
/// workspace id disables the lookup" contract
pub struct FixedStartTime(pub Option<DateTime<Utc>>);

#[async_trait]
impl StartTimeSource for FixedStartTime {
    async fn last_start_time(
        &self,
        workspace_id: &str,
        _vm_resource_id: &str,
    ) -> Option<DateTime<Utc>> {
        if workspace_id.trim().is_empty() {
            return None;
        }
        self.0
    }
}
