use std::sync::atomic::{AtomicUsize, Ordering};

use srm_sched_core::{Job, State};
use tracing::{debug, warn};

use super::TransferStrategy;
use crate::strategy::StateChangeListener;

/// Global ceiling on READY jobs, no per-group knowledge.
#[derive(Debug)]
pub struct FirstComeFirstServedStrategy {
    max_ready_jobs: usize,
    ready: AtomicUsize,
}

impl FirstComeFirstServedStrategy {
    pub fn new(max_ready_jobs: usize) -> Self {
        Self {
            max_ready_jobs,
            ready: AtomicUsize::new(0),
        }
    }

    pub fn ready_jobs(&self) -> usize {
        self.ready.load(Ordering::Acquire)
    }
}

impl StateChangeListener for FirstComeFirstServedStrategy {
    fn state_changed(&self, job: &dyn Job, old: State, new: State) {
        if old == new {
            return;
        }
        if new == State::Ready {
            self.ready.fetch_add(1, Ordering::AcqRel);
        } else if old == State::Ready {
            // Never wrap below zero on a stray notification.
            let decremented = self
                .ready
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
            if decremented.is_err() {
                warn!(
                    job = job.id(),
                    to = %new,
                    "ready counter out of sync: job left READY with no ready jobs counted"
                );
            }
        }
    }
}

impl TransferStrategy for FirstComeFirstServedStrategy {
    fn can_transfer(&self, job: &dyn Job) -> bool {
        let ready = self.ready_jobs();
        let allowed = ready < self.max_ready_jobs;
        debug!(job = job.id(), ready, max = self.max_ready_jobs, allowed, "fcfs admission");
        allowed
    }
}
