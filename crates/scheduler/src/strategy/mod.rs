//! Scheduling strategies: decide which queued job is dispatched next.
//!
//! Every strategy answers [`remove`](SchedulingStrategy::remove) with at most
//! one job id per call, never yields an id twice without an intervening
//! [`add`](SchedulingStrategy::add), and keeps [`size`](SchedulingStrategy::size)
//! equal to the number of ids it still holds.
//!
//! Cancelled jobs: the round-robin and least-loaded strategies only support
//! FIFO pops, so a job cancelled while queued is still yielded once and the
//! driver discards it. The tape strategy deletes such jobs eagerly.

mod inprogress;
pub mod tape;
mod throughput;

pub use inprogress::InProgressFairShareStrategy;
pub use throughput::ThroughputFairShareStrategy;

use srm_sched_core::{Job, JobId, State};

/// Receives every committed job state transition.
///
/// The driver calls this synchronously for each transition, exactly once
/// per change, before the job is visible in `new` to other threads.
/// Implementations must treat `old == new` as a no-op, must not call back
/// into the driver and must not read `job.state()`: it blocks until the
/// notification is over.
pub trait StateChangeListener: Send + Sync {
    fn state_changed(&self, job: &dyn Job, old: State, new: State) {
        let _ = (job, old, new);
    }
}

/// Orders queued jobs for dispatch.
pub trait SchedulingStrategy: StateChangeListener {
    /// Queue `job`. Safe to call concurrently with `remove`.
    fn add(&self, job: &dyn Job);

    /// Next job id to dispatch, or `None` when nothing is ready to go.
    fn remove(&self) -> Option<JobId>;

    /// Number of ids added and not yet removed.
    fn size(&self) -> usize;
}
