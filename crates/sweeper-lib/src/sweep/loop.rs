//! Sweep loop
//!
//! Drives the periodic sweep: enumerate every subscription and VM, fan
//! out one evaluation task per VM, await the batch, sleep, repeat. Cycles
//! run strictly one at a time; shutdown is observed both while a cycle is
//! in flight (dropping it cancels the in-flight evaluations) and during
//! the inter-cycle sleep.

use super::VmEvaluator;
use crate::cloud::CloudInventory;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, error, info};

/// Configuration for the sweep loop
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Pause between sweep cycles (default: 300 seconds)
    pub poll_interval: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(300),
        }
    }
}

/// Results from one sweep cycle
#[derive(Debug, Default, Clone, Copy)]
pub struct CycleStats {
    /// Evaluations that ran to completion (including internally handled
    /// per-VM failures)
    pub evaluated: usize,
    /// Evaluation tasks that could not be joined (panicked or were
    /// cancelled)
    pub join_failures: usize,
}

/// Top-level control loop sweeping all subscriptions on a fixed interval
pub struct SweepLoop {
    inventory: Arc<dyn CloudInventory>,
    evaluator: Arc<VmEvaluator>,
    config: SweepConfig,
}

impl SweepLoop {
    pub fn new(
        inventory: Arc<dyn CloudInventory>,
        evaluator: Arc<VmEvaluator>,
        config: SweepConfig,
    ) -> Self {
        Self {
            inventory,
            evaluator,
            config,
        }
    }

    /// Run until the shutdown signal is observed. Cycle-level failures
    /// are logged and the loop carries on after the normal sleep.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            "VM sweep started"
        );

        loop {
            tokio::select! {
                outcome = self.run_cycle() => match outcome {
                    Ok(stats) => debug!(
                        evaluated = stats.evaluated,
                        join_failures = stats.join_failures,
                        "Sweep cycle complete"
                    ),
                    Err(error) => error!(
                        error = %error,
                        "Unexpected error while scanning subscriptions/VMs"
                    ),
                },
                _ = shutdown.recv() => {
                    info!("Shutdown observed mid-cycle, stopping sweep");
                    break;
                }
            }

            tokio::select! {
                _ = sleep(self.config.poll_interval) => {}
                _ = shutdown.recv() => {
                    info!("Shutdown observed during sleep, stopping sweep");
                    break;
                }
            }
        }

        info!("VM sweep stopped");
    }

    /// One pass over every subscription and VM. Enumeration failure
    /// aborts only this cycle; per-VM failures are already isolated
    /// inside the evaluator.
    pub async fn run_cycle(&self) -> Result<CycleStats> {
        let mut stats = CycleStats::default();

        let subscriptions = self.inventory.list_subscriptions().await?;
        for subscription in subscriptions {
            debug!(subscription = %subscription.subscription_id, "Processing subscription");
            let vms = self.inventory.list_virtual_machines(&subscription).await?;

            let mut evaluations = JoinSet::new();
            for vm in vms {
                let evaluator = Arc::clone(&self.evaluator);
                let subscription_id = subscription.subscription_id.clone();
                evaluations.spawn(async move { evaluator.evaluate(&subscription_id, &vm).await });
            }

            while let Some(joined) = evaluations.join_next().await {
                match joined {
                    Ok(()) => stats.evaluated += 1,
                    Err(error) => {
                        stats.join_failures += 1;
                        error!(error = %error, "VM evaluation task failed");
                    }
                }
            }
        }

        Ok(stats)
    }
}
