//! Library for the VM sweep agent
//!
//! This crate provides the core functionality for:
//! - Enumerating subscriptions and VMs through the ARM REST API
//! - Deriving per-VM observations (power state, autoshutdown tag, last start)
//! - Appending observations to a durable CSV status log
//! - Applying the autoshutdown power rules
//! - Driving the periodic sweep loop

pub mod cloud;
pub mod models;
pub mod rules;
pub mod sink;
pub mod sweep;
pub mod telemetry;

pub use cloud::{ArmClient, CloudError, CloudInventory};
pub use models::*;
pub use rules::{decide, PowerAction};
pub use sink::CsvSink;
pub use sweep::{CycleStats, EvaluatorSettings, SweepConfig, SweepLoop, VmEvaluator};
pub use telemetry::{LogAnalyticsClient, StartTimeSource};
