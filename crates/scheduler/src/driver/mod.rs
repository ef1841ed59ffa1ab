//! Reference scheduler driver.
//!
//! Owns the authoritative job table, feeds the scheduling strategy, gates
//! promotion to READY through the transfer strategy and delivers every
//! committed transition to the strategies and registered listeners.
//!
//! Split into focused submodules:
//! - `core`: Scheduler struct, job table and accessors
//! - `lifecycle`: start/stop, scheduling new jobs and state changes
//! - `dispatch`: pulling jobs from the strategy and the worker loop
//! - `stats`: serializable counters snapshot

mod core;
mod dispatch;
mod lifecycle;
mod stats;
#[cfg(test)]
mod tests;

pub use self::core::Scheduler;
pub use self::dispatch::{ExecutionError, JobExecutor};
pub use self::stats::SchedulerStats;
