use std::collections::BTreeMap;
use std::sync::atomic::Ordering;

use serde::Serialize;
use srm_sched_core::State;

use super::Scheduler;
use crate::locks::{lock, read};

/// Point-in-time snapshot of the driver's counters.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStats {
    pub id: String,
    pub running: bool,
    /// Jobs not yet in a final state.
    pub live_jobs: usize,
    /// Ids still held by the scheduling strategy, stale ones included.
    pub queued_in_strategy: usize,
    /// Live jobs per state, final states count finished jobs.
    pub jobs_by_state: BTreeMap<State, usize>,
    pub dispatched: u64,
    pub discarded: u64,
    /// Jobs refused because the scheduler was full.
    pub rejected: u64,
    pub executed: u64,
    pub execution_failures: u64,
    /// Temporary failures that sent a job to RETRYWAIT.
    pub retries: u64,
    /// Jobs waiting out their retry timeout.
    pub retry_waiting: usize,
    pub active_workers: usize,
}

impl SchedulerStats {
    pub fn total(&self, state: State) -> usize {
        self.jobs_by_state.get(&state).copied().unwrap_or(0)
    }
}

impl Scheduler {
    pub fn stats(&self) -> SchedulerStats {
        let jobs_by_state = {
            let jobs = read(&self.jobs);
            State::ALL
                .iter()
                .map(|state| (*state, jobs.count(*state)))
                .filter(|(_, n)| *n > 0)
                .collect()
        };
        SchedulerStats {
            id: self.settings.id.clone(),
            running: self.is_running(),
            live_jobs: self.live_jobs(),
            queued_in_strategy: self.scheduling.size(),
            jobs_by_state,
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            discarded: self.counters.discarded.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            executed: self.counters.executed.load(Ordering::Relaxed),
            execution_failures: self.counters.execution_failures.load(Ordering::Relaxed),
            retries: self.counters.retries.load(Ordering::Relaxed),
            retry_waiting: lock(&self.retry_wait).len(),
            active_workers: self.active_workers.load(Ordering::Relaxed),
        }
    }
}
