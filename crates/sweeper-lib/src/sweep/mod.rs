//! Sweep orchestration
//!
//! The evaluator handles one VM per cycle and isolates its own failures;
//! the loop enumerates subscriptions and VMs, fans evaluations out
//! concurrently and sleeps between cycles until shutdown.

mod evaluator;
mod r#loop;

#[cfg(test)]
pub(crate) mod testing;

pub use evaluator::{EvaluatorSettings, VmEvaluator};
pub use r#loop::{CycleStats, SweepConfig, SweepLoop};
