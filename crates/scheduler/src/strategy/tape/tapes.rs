//! Bookkeeping for the tape recall strategy.
//!
//! A job moves through named stages:
//!
//! ```text
//! unresolved ──resolve──▶ on tape ──tape active, round popped──▶ immediate ──▶ dispatched
//!      └──────────── tapeinfoless expiry ──────────────────────▶ immediate
//! ```
//!
//! Tape records form an arena keyed by tape name. A record is created when
//! the first job resolves to its tape and evicted as soon as it holds no
//! jobs, whether it was active or not.

use std::collections::{BTreeMap, HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::Serialize;
use srm_sched_core::JobId;
use tracing::{debug, info, warn};

use super::informant::{TapeInfo, TapefileInfo};
use super::requirements::TapeRequirementsChecker;

/// Snapshot of one tape's queue, handed to the requirements checker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TapeStats {
    pub name: String,
    pub info: Option<TapeInfo>,
    pub queued_jobs: usize,
    pub queued_bytes: u64,
    pub oldest_arrival: Option<DateTime<Utc>>,
    pub newest_arrival: Option<DateTime<Utc>>,
}

/// Which selection rule activated a tape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ActivationReason {
    OldestJobExpired,
    RecallVolume,
    QueueLength,
}

#[derive(Debug, Default)]
struct TapeRecord {
    info: Option<TapeInfo>,
    /// (creation time, id) → file size; iteration order is oldest first.
    jobs: BTreeMap<(DateTime<Utc>, JobId), u64>,
    queued_bytes: u64,
    active: bool,
}

impl TapeRecord {
    fn push(&mut self, id: JobId, created: DateTime<Utc>, size: u64) {
        self.jobs.insert((created, id), size);
        self.queued_bytes += size;
    }

    fn pop_oldest(&mut self) -> Option<(DateTime<Utc>, JobId)> {
        let ((created, id), size) = self.jobs.pop_first()?;
        self.queued_bytes -= size;
        Some((created, id))
    }

    fn remove(&mut self, id: JobId, created: DateTime<Utc>) -> bool {
        match self.jobs.remove(&(created, id)) {
            Some(size) => {
                self.queued_bytes -= size;
                true
            }
            None => false,
        }
    }

    fn stats(&self, name: &str) -> TapeStats {
        TapeStats {
            name: name.to_string(),
            info: self.info,
            queued_jobs: self.jobs.len(),
            queued_bytes: self.queued_bytes,
            oldest_arrival: self.jobs.keys().next().map(|(created, _)| *created),
            newest_arrival: self.jobs.keys().next_back().map(|(created, _)| *created),
        }
    }
}

#[derive(Debug)]
struct UnresolvedRecall {
    created: DateTime<Utc>,
    file_id: Option<String>,
}

#[derive(Debug)]
enum Location {
    Unresolved,
    OnTape { tape: String, created: DateTime<Utc> },
    Immediate,
}

/// All mutable state of the tape recall strategy. Guarded by one mutex.
#[derive(Debug, Default)]
pub(crate) struct TapeQueues {
    unresolved: BTreeMap<JobId, UnresolvedRecall>,
    tapes: BTreeMap<String, TapeRecord>,
    immediate: VecDeque<JobId>,
    locations: HashMap<JobId, Location>,
}

impl TapeQueues {
    /// Track a new job whose tape is not known yet. Returns false for an
    /// id that is already tracked.
    pub fn add(&mut self, id: JobId, created: DateTime<Utc>, file_id: Option<String>) -> bool {
        if self.locations.contains_key(&id) {
            return false;
        }
        self.unresolved.insert(id, UnresolvedRecall { created, file_id });
        self.locations.insert(id, Location::Unresolved);
        true
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn unresolved_len(&self) -> usize {
        self.unresolved.len()
    }

    /// Distinct file ids of unresolved jobs, sorted.
    pub fn unresolved_file_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .unresolved
            .values()
            .filter_map(|job| job.file_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Move unresolved jobs whose file location is now known onto their
    /// tape's queue. Jobs cancelled while the lookup ran are simply absent.
    pub fn resolve(&mut self, infos: &HashMap<String, TapefileInfo>) -> usize {
        let resolved: Vec<(JobId, &TapefileInfo)> = self
            .unresolved
            .iter()
            .filter_map(|(id, job)| {
                let info = infos.get(job.file_id.as_deref()?)?;
                Some((*id, info))
            })
            .collect();

        for (id, file) in &resolved {
            let Some(job) = self.unresolved.remove(id) else {
                continue;
            };
            self.tapes
                .entry(file.tape.clone())
                .or_default()
                .push(*id, job.created, file.file_size);
            self.locations.insert(
                *id,
                Location::OnTape {
                    tape: file.tape.clone(),
                    created: job.created,
                },
            );
        }
        resolved.len()
    }

    /// Tapes whose capacity and usage are still unknown.
    pub fn tapes_without_info(&self) -> Vec<String> {
        self.tapes
            .iter()
            .filter(|(_, tape)| tape.info.is_none())
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn update_tape_infos(&mut self, infos: &HashMap<String, TapeInfo>) {
        for (name, info) in infos {
            if let Some(tape) = self.tapes.get_mut(name) {
                tape.info = Some(*info);
            }
        }
    }

    /// Drop every trace of `id`. Returns false if it was not tracked.
    pub fn forget(&mut self, id: JobId) -> bool {
        match self.locations.remove(&id) {
            None => false,
            Some(Location::Unresolved) => {
                self.unresolved.remove(&id);
                true
            }
            Some(Location::OnTape { tape, created }) => {
                if let Some(record) = self.tapes.get_mut(&tape) {
                    record.remove(id, created);
                    if record.jobs.is_empty() {
                        self.tapes.remove(&tape);
                        debug!(tape = %tape, "tape evicted after its last job was cancelled");
                    }
                }
                true
            }
            Some(Location::Immediate) => {
                self.immediate.retain(|queued| *queued != id);
                true
            }
        }
    }

    pub fn active_tapes(&self) -> Vec<String> {
        self.tapes
            .iter()
            .filter(|(_, tape)| tape.active)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn tape_stats(&self, name: &str) -> Option<TapeStats> {
        self.tapes.get(name).map(|tape| tape.stats(name))
    }

    /// Next job to dispatch. Refills the immediate buffer first when empty.
    pub fn next_job(&mut self, checker: &dyn TapeRequirementsChecker) -> Option<JobId> {
        if self.immediate.is_empty() {
            self.release_expired_unresolved(checker);
            self.activate_tapes(checker);
            self.pop_round();
        }
        let id = self.immediate.pop_front()?;
        self.locations.remove(&id);
        Some(id)
    }

    /// Fairness escape valve for jobs whose tape lookup keeps failing.
    fn release_expired_unresolved(&mut self, checker: &dyn TapeRequirementsChecker) {
        let mut expired: Vec<(DateTime<Utc>, JobId)> = self
            .unresolved
            .iter()
            .filter(|(_, job)| checker.is_tapeinfoless_job_expired(job.created))
            .map(|(id, job)| (job.created, *id))
            .collect();
        expired.sort();

        for (_, id) in expired {
            self.unresolved.remove(&id);
            self.locations.insert(id, Location::Immediate);
            self.immediate.push_back(id);
            warn!(job = id, "releasing job without tape information after waiting too long");
        }
    }

    fn activate_tapes(&mut self, checker: &dyn TapeRequirementsChecker) {
        let max_active = checker.max_active_tapes();
        while self.tapes.values().filter(|tape| tape.active).count() < max_active {
            let Some((name, reason)) = self.select_next_tape(checker) else {
                break;
            };
            if let Some(tape) = self.tapes.get_mut(&name) {
                tape.active = true;
                info!(
                    tape = %name,
                    reason = ?reason,
                    queued_jobs = tape.jobs.len(),
                    queued_bytes = tape.queued_bytes,
                    "tape activated"
                );
            }
        }
    }

    /// Choose the next tape to activate; first matching rule wins.
    pub fn select_next_tape(
        &self,
        checker: &dyn TapeRequirementsChecker,
    ) -> Option<(String, ActivationReason)> {
        let eligible: Vec<TapeStats> = self
            .tapes
            .iter()
            .filter(|(_, tape)| !tape.active && !tape.jobs.is_empty())
            .map(|(name, tape)| tape.stats(name))
            .collect();

        if let Some(tape) = eligible
            .iter()
            .filter(|tape| checker.is_oldest_tape_job_expired(tape))
            .min_by(|a, b| checker.compare_oldest_tape_request_age(a, b))
        {
            return Some((tape.name.clone(), ActivationReason::OldestJobExpired));
        }

        // Equal volumes go to the tape with the older pending job.
        if let Some(tape) = eligible
            .iter()
            .filter(|tape| checker.is_newest_tape_job_old_enough(tape))
            .filter(|tape| checker.is_tape_recall_volume_sufficient(tape, tape.queued_bytes))
            .max_by(|a, b| {
                a.queued_bytes
                    .cmp(&b.queued_bytes)
                    .then_with(|| checker.compare_oldest_tape_request_age(b, a))
                    .then_with(|| b.name.cmp(&a.name))
            })
        {
            return Some((tape.name.clone(), ActivationReason::RecallVolume));
        }

        let min_requests = checker.min_number_of_requests_for_tape_selection()?;
        eligible
            .iter()
            .filter(|tape| tape.queued_jobs >= min_requests)
            .max_by(|a, b| {
                a.queued_jobs
                    .cmp(&b.queued_jobs)
                    .then_with(|| checker.compare_oldest_tape_request_age(b, a))
                    .then_with(|| b.name.cmp(&a.name))
            })
            .map(|tape| (tape.name.clone(), ActivationReason::QueueLength))
    }

    /// Take the oldest job of every active tape, oldest first across tapes.
    /// Tapes drained by this round are deactivated and evicted.
    fn pop_round(&mut self) {
        let mut round: Vec<(DateTime<Utc>, JobId)> = Vec::new();
        let mut drained: Vec<String> = Vec::new();

        for (name, tape) in self.tapes.iter_mut().filter(|(_, tape)| tape.active) {
            if let Some(job) = tape.pop_oldest() {
                round.push(job);
            }
            if tape.jobs.is_empty() {
                drained.push(name.clone());
            }
        }

        for name in drained {
            self.tapes.remove(&name);
            info!(tape = %name, "tape drained and deactivated");
        }

        round.sort();
        for (_, id) in round {
            self.locations.insert(id, Location::Immediate);
            self.immediate.push_back(id);
        }
    }
}
