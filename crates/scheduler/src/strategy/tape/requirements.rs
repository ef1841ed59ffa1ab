use std::cmp::Ordering;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::tapes::TapeStats;

/// Policy thresholds consulted by the tape recall strategy.
pub trait TapeRequirementsChecker: Send + Sync {
    /// Upper bound on simultaneously active tapes.
    fn max_active_tapes(&self) -> usize;

    /// Whether the tape's oldest pending job has waited too long.
    fn is_oldest_tape_job_expired(&self, tape: &TapeStats) -> bool;

    /// Whether the tape's newest job arrived long enough ago that the tape
    /// has probably stopped accumulating jobs.
    fn is_newest_tape_job_old_enough(&self, tape: &TapeStats) -> bool;

    /// Whether `volume` bytes of queued recalls justify mounting the tape.
    fn is_tape_recall_volume_sufficient(&self, tape: &TapeStats, volume: u64) -> bool;

    /// Minimum queue length for selection by queue length; `None` disables the rule.
    fn min_number_of_requests_for_tape_selection(&self) -> Option<usize>;

    /// Whether a job whose tape is still unknown has waited long enough to
    /// be released without tape information.
    fn is_tapeinfoless_job_expired(&self, created: DateTime<Utc>) -> bool;

    /// Orders tapes by the age of their oldest pending job, oldest first.
    fn compare_oldest_tape_request_age(&self, a: &TapeStats, b: &TapeStats) -> Ordering;
}

/// Threshold-based checker configured from provider options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfiguredRequirementsChecker {
    pub max_active_tapes: usize,
    /// Share of a tape's used space (0-100) that queued recalls must exceed.
    pub min_tape_recall_percentage: u8,
    pub min_number_of_requests: Option<usize>,
    /// Newest job must be at least this old before volume-based selection.
    pub min_job_waiting_time: Duration,
    /// Oldest job older than this forces its tape to be selected.
    pub max_job_waiting_time: Duration,
    pub tapeinfoless_job_waiting_time: Duration,
}

impl Default for ConfiguredRequirementsChecker {
    fn default() -> Self {
        Self {
            max_active_tapes: 1,
            min_tape_recall_percentage: 60,
            min_number_of_requests: None,
            min_job_waiting_time: Duration::from_secs(2 * 60),
            max_job_waiting_time: Duration::from_secs(2 * 60 * 60),
            tapeinfoless_job_waiting_time: Duration::from_secs(10 * 60),
        }
    }
}

/// Whether `since` lies at least `wait` in the past.
fn waited_at_least(since: DateTime<Utc>, wait: Duration) -> bool {
    match chrono::Duration::from_std(wait) {
        Ok(wait) => Utc::now().signed_duration_since(since) >= wait,
        Err(_) => false,
    }
}

impl TapeRequirementsChecker for ConfiguredRequirementsChecker {
    fn max_active_tapes(&self) -> usize {
        self.max_active_tapes
    }

    fn is_oldest_tape_job_expired(&self, tape: &TapeStats) -> bool {
        tape.oldest_arrival
            .is_some_and(|oldest| waited_at_least(oldest, self.max_job_waiting_time))
    }

    fn is_newest_tape_job_old_enough(&self, tape: &TapeStats) -> bool {
        tape.newest_arrival
            .is_some_and(|newest| waited_at_least(newest, self.min_job_waiting_time))
    }

    fn is_tape_recall_volume_sufficient(&self, tape: &TapeStats, volume: u64) -> bool {
        let Some(info) = tape.info else {
            return false;
        };
        if info.used_space == 0 {
            return volume > 0;
        }
        u128::from(volume) * 100
            > u128::from(info.used_space) * u128::from(self.min_tape_recall_percentage)
    }

    fn min_number_of_requests_for_tape_selection(&self) -> Option<usize> {
        self.min_number_of_requests
    }

    fn is_tapeinfoless_job_expired(&self, created: DateTime<Utc>) -> bool {
        waited_at_least(created, self.tapeinfoless_job_waiting_time)
    }

    fn compare_oldest_tape_request_age(&self, a: &TapeStats, b: &TapeStats) -> Ordering {
        match (a.oldest_arrival, b.oldest_arrival) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }
}
