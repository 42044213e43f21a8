//! Cloud inventory provider
//!
//! This module defines the narrow contract the sweep loop and evaluator
//! consume for resource enumeration and power operations, plus the ARM
//! REST implementation of it. The trait boundary is what evaluator and
//! loop tests mock.

mod arm;

pub use arm::ArmClient;

use crate::models::{Subscription, VmResource};
use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by cloud inventory adapters.
///
/// Callers treat every variant the same way (log and degrade or skip);
/// the split exists so logs distinguish "could not reach the API" from
/// "the API said no".
#[derive(Debug, Error)]
pub enum CloudError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{operation} returned HTTP {status}: {body}")]
    Api {
        operation: &'static str,
        status: u16,
        body: String,
    },
}

/// Contract for listing cloud resources and requesting power operations.
///
/// Implementations must be safe for concurrent use; evaluators for every
/// VM in a cycle share one instance.
#[async_trait]
pub trait CloudInventory: Send + Sync {
    /// All subscriptions visible to the agent's credential
    async fn list_subscriptions(&self) -> Result<Vec<Subscription>, CloudError>;

    /// All virtual machines in a subscription, with tags included
    async fn list_virtual_machines(
        &self,
        subscription: &Subscription,
    ) -> Result<Vec<VmResource>, CloudError>;

    /// Instance view status codes for a VM (e.g. `PowerState/running`)
    async fn instance_status(&self, vm_id: &str) -> Result<Vec<String>, CloudError>;

    /// Request deallocation of a stopped-but-allocated VM. Returns once
    /// the operation has been accepted, not once it has completed.
    async fn deallocate(&self, vm_id: &str) -> Result<(), CloudError>;

    /// Request power-off of a running VM. Accepted, not completed.
    async fn power_off(&self, vm_id: &str) -> Result<(), CloudError>;
}
