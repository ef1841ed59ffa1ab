//! Admission gates: may this job take a ready slot right now?
//!
//! Gates are orthogonal to queue ordering. They keep their own counters,
//! fed exclusively by state-change notifications, and never mutate
//! anything from [`can_transfer`](TransferStrategy::can_transfer).

mod fair_share;
mod fcfs;

pub use fair_share::FairShareTransferStrategy;
pub use fcfs::FirstComeFirstServedStrategy;

use srm_sched_core::Job;

use crate::strategy::StateChangeListener;

pub trait TransferStrategy: StateChangeListener {
    /// Whether `job` may move from RQUEUED to READY now.
    fn can_transfer(&self, job: &dyn Job) -> bool;
}
