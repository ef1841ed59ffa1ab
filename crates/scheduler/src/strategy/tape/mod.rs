//! Tape-locality batching ("tape recall scheduling").
//!
//! Recall jobs are clustered by the tape holding their file so that a mounted
//! tape serves many jobs. Tape locations are fetched in bulk from a
//! [`TapeInformant`] at most once per refresh interval; which tapes become
//! active is decided by a [`TapeRequirementsChecker`]. Each refill of the
//! dispatch buffer takes one job from every active tape.

mod informant;
mod requirements;
mod tapes;

pub use informant::{InformantError, StaticTapeInformant, TapeInfo, TapeInformant, TapefileInfo};
pub use requirements::{ConfiguredRequirementsChecker, TapeRequirementsChecker};
pub use tapes::{ActivationReason, TapeStats};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use srm_sched_core::{Job, JobId, State};
use tracing::{debug, warn};

use super::{SchedulingStrategy, StateChangeListener};
use crate::locks::lock;
use tapes::TapeQueues;

pub struct TapeRecallSchedulingStrategy {
    informant: Arc<dyn TapeInformant>,
    requirements: Arc<dyn TapeRequirementsChecker>,
    refresh_interval: Duration,
    queues: Mutex<TapeQueues>,
    last_refresh: Mutex<Option<Instant>>,
    refreshing: AtomicBool,
}

/// Clears the refresh flag however the refresh ends.
struct RefreshGuard<'a>(&'a AtomicBool);

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl TapeRecallSchedulingStrategy {
    pub fn new(
        informant: Arc<dyn TapeInformant>,
        requirements: Arc<dyn TapeRequirementsChecker>,
        refresh_interval: Duration,
    ) -> Self {
        Self {
            informant,
            requirements,
            refresh_interval,
            queues: Mutex::new(TapeQueues::default()),
            last_refresh: Mutex::new(None),
            refreshing: AtomicBool::new(false),
        }
    }

    /// Names of the currently active tapes.
    pub fn active_tapes(&self) -> Vec<String> {
        lock(&self.queues).active_tapes()
    }

    pub fn tape_stats(&self, tape: &str) -> Option<TapeStats> {
        lock(&self.queues).tape_stats(tape)
    }

    /// Jobs whose tape is not known yet.
    pub fn unresolved_len(&self) -> usize {
        lock(&self.queues).unresolved_len()
    }

    /// Tape that would be activated next, and why.
    pub fn select_next_tape_to_activate(&self) -> Option<(String, ActivationReason)> {
        lock(&self.queues).select_next_tape(self.requirements.as_ref())
    }

    fn refresh_if_due(&self) {
        if self.refreshing.swap(true, Ordering::AcqRel) {
            return;
        }
        let _guard = RefreshGuard(&self.refreshing);
        {
            let mut last = lock(&self.last_refresh);
            if last.is_some_and(|at| at.elapsed() < self.refresh_interval) {
                return;
            }
            *last = Some(Instant::now());
        }
        self.refresh();
    }

    /// Fetch tape metadata. The informant is called without holding the
    /// queue lock; answers are merged back afterwards.
    fn refresh(&self) {
        let file_ids = lock(&self.queues).unresolved_file_ids();
        if !file_ids.is_empty() {
            match self.informant.tapefile_infos(&file_ids) {
                Ok(infos) => {
                    let resolved = lock(&self.queues).resolve(&infos);
                    debug!(requested = file_ids.len(), resolved, "tape file locations refreshed");
                }
                Err(e) => {
                    warn!(error = %e, "tape file lookup failed, retrying on next refresh");
                    return;
                }
            }
        }

        let tapes = lock(&self.queues).tapes_without_info();
        if tapes.is_empty() {
            return;
        }
        match self.informant.tape_infos(&tapes) {
            Ok(infos) => {
                debug!(requested = tapes.len(), found = infos.len(), "tape infos refreshed");
                lock(&self.queues).update_tape_infos(&infos);
            }
            Err(e) => warn!(error = %e, "tape info lookup failed, retrying on next refresh"),
        }
    }
}

impl StateChangeListener for TapeRecallSchedulingStrategy {
    fn state_changed(&self, job: &dyn Job, old: State, new: State) {
        if old != new && new.is_final() && lock(&self.queues).forget(job.id()) {
            debug!(job = job.id(), state = %new, "dropped finished job from tape queues");
        }
    }
}

impl SchedulingStrategy for TapeRecallSchedulingStrategy {
    fn add(&self, job: &dyn Job) {
        let file_id = job.surl_or_file_path().map(str::to_string);
        let added = lock(&self.queues).add(job.id(), job.creation_time(), file_id);
        if added {
            debug!(job = job.id(), "queued for tape recall");
        } else {
            warn!(job = job.id(), "job already queued for tape recall, ignoring");
        }
    }

    fn remove(&self) -> Option<JobId> {
        self.refresh_if_due();
        lock(&self.queues).next_job(self.requirements.as_ref())
    }

    fn size(&self) -> usize {
        lock(&self.queues).len()
    }
}
