use std::sync::atomic::Ordering;
use std::sync::Arc;

use srm_sched_core::{Job, JobId, JobRecord, SchedError, SchedResult, State};
use tracing::{debug, error, info, warn};

use super::Scheduler;
use crate::locks::{read, write};

impl Scheduler {
    /// Accept jobs from now on.
    pub fn start(&self) -> SchedResult<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(SchedError::AlreadyRunning);
        }
        self.shutdown.store(false, Ordering::Relaxed);
        info!(
            id = %self.settings.id,
            max_requests = self.settings.max_requests,
            max_in_progress = self.settings.max_in_progress,
            max_ready_jobs = self.settings.max_ready_jobs,
            "scheduler started"
        );
        Ok(())
    }

    /// Signal the scheduler to stop. New jobs are refused and the run loop
    /// exits after its current tick.
    pub fn shutdown(&self) {
        info!(id = %self.settings.id, "scheduler shutdown requested");
        self.running.store(false, Ordering::Release);
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Take ownership of a new job.
    ///
    /// Returns the state the job ended up in: QUEUED, or FAILED when the
    /// scheduler already holds `max_requests` live jobs.
    pub fn schedule(&self, job: Arc<JobRecord>) -> SchedResult<State> {
        if !self.is_running() {
            return Err(SchedError::NotRunning);
        }
        let id = job.id();
        let state = job.state();
        let busy = {
            let mut jobs = write(&self.jobs);
            if jobs.contains(id) {
                warn!(job = id, "job is already scheduled");
                return Ok(state);
            }
            let busy = jobs.live() >= self.settings.max_requests;
            jobs.insert(Arc::clone(&job), state);
            busy
        };

        if busy {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            warn!(
                job = id,
                max_requests = self.settings.max_requests,
                "site busy: too many queued requests"
            );
            self.change_state(id, State::Failed)?;
            return Ok(State::Failed);
        }

        self.change_state(id, State::Queued)?;
        self.scheduling.add(job.as_ref());
        Ok(State::Queued)
    }

    /// Commit a transition of job `id` and deliver it to the scheduling
    /// strategy, the transfer strategy and the listeners, in that order.
    ///
    /// Other threads keep seeing the job in its old state, both through
    /// `state()` and the per-state totals, until every notification has
    /// returned. Returns the previous state. A transition to the current
    /// state is a no-op and notifies nobody.
    pub fn change_state(&self, id: JobId, next: State) -> SchedResult<State> {
        let job = self.job(id).ok_or(SchedError::JobNotFound(id))?;

        let transition = job.begin_transition(next).map_err(|e| {
            error!(job = id, error = %e, "rejected state change");
            e
        })?;
        let old = transition.previous();
        if transition.is_noop() {
            return Ok(old);
        }
        debug!(job = id, from = %old, to = %next, "state changed");

        self.notify(job.as_ref(), old, next);
        write(&self.jobs).moved(id, old, next);
        drop(transition);
        Ok(old)
    }

    /// Convenience for `change_state(id, CANCELED)`.
    pub fn cancel(&self, id: JobId) -> SchedResult<State> {
        self.change_state(id, State::Canceled)
    }

    fn notify(&self, job: &dyn Job, old: State, new: State) {
        self.scheduling.state_changed(job, old, new);
        self.transfer.state_changed(job, old, new);
        let listeners = read(&self.listeners).clone();
        for listener in listeners {
            listener.state_changed(job, old, new);
        }
    }
}
