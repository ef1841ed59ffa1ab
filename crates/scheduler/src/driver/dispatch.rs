use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use srm_sched_core::{Job, JobId, JobRecord, SchedError, SchedResult, State};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::Scheduler;
use crate::locks::{lock, read};

/// Why executing a job did not succeed.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The job cannot succeed; it moves to FAILED.
    #[error("job failed: {0}")]
    Failed(String),

    /// Temporary problem; the job waits out the retry timeout and goes
    /// back to the queue, or fails once its retries are used up.
    #[error("job should be retried: {0}")]
    Retry(String),
}

/// Does the actual work of a dispatched job (staging, pinning, ...).
///
/// Runs on the driver's worker pool. On success the job becomes RQUEUED and
/// competes for a ready slot.
pub trait JobExecutor: Send + Sync {
    fn execute(&self, job: &JobRecord) -> Result<(), ExecutionError>;
}

impl Scheduler {
    /// Pull jobs from the scheduling strategy while INPROGRESS slots are
    /// free and move them to INPROGRESS.
    ///
    /// Ids of jobs that were cancelled or otherwise left QUEUED while they
    /// sat in the strategy are discarded.
    pub fn dispatch(&self) -> Vec<Arc<JobRecord>> {
        let mut dispatched = Vec::new();
        while self.total(State::InProgress) < self.settings.max_in_progress {
            let Some(id) = self.scheduling.remove() else {
                break;
            };
            let Some(job) = self.job(id) else {
                self.discard(id, "no longer known");
                continue;
            };
            if job.state() != State::Queued {
                self.discard(id, "not queued");
                continue;
            }
            match self.change_state(id, State::InProgress) {
                Ok(_) => {
                    self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
                    debug!(job = id, "dispatched");
                    dispatched.push(job);
                }
                // Lost a race with a concurrent cancel.
                Err(e) => self.discard(id, &e.to_string()),
            }
        }
        dispatched
    }

    fn discard(&self, id: JobId, reason: &str) {
        self.counters.discarded.fetch_add(1, Ordering::Relaxed);
        debug!(job = id, reason, "discarding stale id from scheduling strategy");
    }

    /// Promote an RQUEUED job to READY if the transfer strategy allows it.
    pub fn try_to_ready(&self, id: JobId) -> SchedResult<bool> {
        let job = self.job(id).ok_or(SchedError::JobNotFound(id))?;
        if job.state() != State::Rqueued || !self.transfer.can_transfer(job.as_ref()) {
            return Ok(false);
        }
        match self.change_state(id, State::Ready) {
            Ok(_) => Ok(true),
            Err(SchedError::IllegalStateTransition { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Try to promote every RQUEUED job, oldest first. Returns how many
    /// became READY.
    pub fn promote_ready_queue(&self) -> usize {
        let mut waiting: Vec<Arc<JobRecord>> = {
            let jobs = read(&self.jobs);
            jobs.ids_in(State::Rqueued)
                .into_iter()
                .filter_map(|id| jobs.get(id))
                .collect()
        };
        waiting.sort_by_key(|job| (job.creation_time(), job.id()));

        waiting
            .iter()
            .filter(|job| matches!(self.try_to_ready(job.id()), Ok(true)))
            .count()
    }

    /// Handle the outcome of executing a dispatched job.
    pub(super) fn finish_execution(&self, job: &JobRecord, result: Result<(), ExecutionError>) {
        let id = job.id();
        let outcome = match result {
            Ok(()) => {
                self.counters.executed.fetch_add(1, Ordering::Relaxed);
                self.change_state(id, State::Rqueued)
                    .and_then(|_| self.try_to_ready(id).map(|_| ()))
            }
            Err(ExecutionError::Retry(reason)) => self.retry_later(job, &reason),
            Err(ExecutionError::Failed(reason)) => {
                self.counters.execution_failures.fetch_add(1, Ordering::Relaxed);
                warn!(job = id, reason = %reason, "job execution failed");
                self.change_state(id, State::Failed).map(|_| ())
            }
        };
        if let Err(e) = outcome {
            // Usually the job was cancelled while it executed.
            debug!(job = id, error = %e, "could not record execution outcome");
        }
    }

    /// Park a temporarily failed job in RETRYWAIT, or fail it when it has
    /// no retries left.
    fn retry_later(&self, job: &JobRecord, reason: &str) -> SchedResult<()> {
        let id = job.id();
        let max_retries = self.settings.max_number_of_retries;
        if job.retries() >= max_retries {
            self.counters.execution_failures.fetch_add(1, Ordering::Relaxed);
            warn!(job = id, reason, max_retries, "retry limit reached, failing job");
            return self.change_state(id, State::Failed).map(|_| ());
        }

        let attempt = job.record_retry();
        self.counters.retries.fetch_add(1, Ordering::Relaxed);
        self.change_state(id, State::RetryWait)?;
        let due = Instant::now() + self.settings.retry_timeout();
        lock(&self.retry_wait).insert((due, id));
        debug!(job = id, reason, attempt, max_retries, "execution will be retried");
        Ok(())
    }

    /// Queue again every RETRYWAIT job whose retry timeout has passed.
    /// Returns how many went back to the scheduling strategy.
    pub fn requeue_due_retries(&self) -> usize {
        let now = Instant::now();
        let due: Vec<JobId> = {
            let mut waiting = lock(&self.retry_wait);
            let mut due = Vec::new();
            while let Some(&(at, id)) = waiting.first() {
                if at > now {
                    break;
                }
                waiting.pop_first();
                due.push(id);
            }
            due
        };

        let mut requeued = 0;
        for id in due {
            // Cancelled while waiting.
            let Some(job) = self.job(id) else {
                continue;
            };
            match self.change_state(id, State::Queued) {
                Ok(State::RetryWait) => {
                    self.scheduling.add(job.as_ref());
                    requeued += 1;
                }
                Ok(_) => {}
                Err(e) => debug!(job = id, error = %e, "could not requeue retried job"),
            }
        }
        requeued
    }

    /// Run the dispatch loop. Blocks until [`shutdown`](Self::shutdown).
    ///
    /// Every tick requeues jobs whose retry timeout passed, promotes waiting
    /// RQUEUED jobs, then dispatches queued jobs and executes them on a rayon
    /// pool.
    pub fn run(self: &Arc<Self>, executor: Arc<dyn JobExecutor>) -> SchedResult<()> {
        if !self.is_running() {
            return Err(SchedError::NotRunning);
        }
        let num_workers = self.settings.resolved_worker_threads();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_workers)
            .thread_name(|i| format!("srm-sched-worker-{i}"))
            .build()
            .map_err(|e| SchedError::Config(format!("failed to build worker pool: {e}")))?;
        info!(id = %self.settings.id, workers = num_workers, "dispatch loop starting");

        let interval = self.settings.dispatch_interval();
        while !self.shutdown.load(Ordering::Relaxed) {
            self.requeue_due_retries();
            self.promote_ready_queue();

            for job in self.dispatch() {
                let scheduler = Arc::clone(self);
                let executor = Arc::clone(&executor);
                let active_workers = Arc::clone(&self.active_workers);

                pool.spawn(move || {
                    active_workers.fetch_add(1, Ordering::Relaxed);
                    let result = executor.execute(&job);
                    scheduler.finish_execution(&job, result);
                    active_workers.fetch_sub(1, Ordering::Relaxed);
                });
            }

            std::thread::sleep(interval);
        }

        info!(id = %self.settings.id, "dispatch loop stopped");
        Ok(())
    }
}
