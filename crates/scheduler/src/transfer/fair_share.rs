use std::sync::Arc;

use srm_sched_core::{Job, JobDiscriminator, State};
use tracing::{debug, warn};

use super::TransferStrategy;
use crate::multiset::CountingMultiset;
use crate::strategy::StateChangeListener;

/// Per-group admission derived from current RQUEUED and READY counts.
///
/// The counters are read without a common lock, so a decision taken while
/// transitions are in flight can over- or under-admit by at most the number
/// of concurrent transitions. That error is accepted.
pub struct FairShareTransferStrategy {
    discriminator: Arc<dyn JobDiscriminator>,
    max_ready_jobs: usize,
    ready: CountingMultiset,
    queued: CountingMultiset,
}

impl FairShareTransferStrategy {
    pub fn new(discriminator: Arc<dyn JobDiscriminator>, max_ready_jobs: usize) -> Self {
        Self {
            discriminator,
            max_ready_jobs,
            ready: CountingMultiset::new(),
            queued: CountingMultiset::new(),
        }
    }

    pub fn ready_count(&self, key: &str) -> usize {
        self.ready.count(key)
    }

    pub fn queued_count(&self, key: &str) -> usize {
        self.queued.count(key)
    }

    /// RQUEUED jobs of other groups that a fair allocation would promote
    /// before a job of a group holding `job_ready` slots.
    fn ahead_of_job(&self, job_ready: usize) -> usize {
        let queued = self.queued.snapshot();
        self.ready
            .snapshot()
            .iter()
            .map(|(key, &ready)| {
                let waiting = queued.get(key).copied().unwrap_or(0);
                waiting.min(job_ready.saturating_sub(ready))
            })
            .sum()
    }
}

impl StateChangeListener for FairShareTransferStrategy {
    fn state_changed(&self, job: &dyn Job, old: State, new: State) {
        if old == new {
            return;
        }
        let tracked = |state: State| matches!(state, State::Rqueued | State::Ready);
        if !tracked(old) && !tracked(new) {
            return;
        }
        let key = self.discriminator.discriminating_value(job);
        let counts = match old {
            State::Rqueued => Some(&self.queued),
            State::Ready => Some(&self.ready),
            _ => None,
        };
        if let Some(counts) = counts {
            if !counts.remove(&key) {
                warn!(
                    job = job.id(),
                    key = %key,
                    from = %old,
                    to = %new,
                    "fair-share counters out of sync: job left a state it was never counted in"
                );
            }
        }
        match new {
            State::Rqueued => self.queued.add(&key),
            State::Ready => self.ready.add(&key),
            _ => {}
        }
    }
}

impl TransferStrategy for FairShareTransferStrategy {
    fn can_transfer(&self, job: &dyn Job) -> bool {
        let ready_size = self.ready.total();
        let queued_size = self.queued.total();
        let max = self.max_ready_jobs;

        if ready_size + queued_size <= max {
            return true;
        }
        if ready_size >= max {
            return false;
        }

        let key = self.discriminator.discriminating_value(job);
        let job_ready = self.ready.count(&key);
        let ahead = self.ahead_of_job(job_ready);
        let allowed = ready_size + ahead < max;
        debug!(
            job = job.id(),
            key = %key,
            ready = ready_size,
            queued = queued_size,
            ahead,
            allowed,
            "fair-share admission"
        );
        allowed
    }
}

#[cfg(test)]
mod tests {
    use srm_sched_core::{DiscriminatorRegistry, JobId, JobRecord};

    use super::*;

    fn strategy(max: usize) -> FairShareTransferStrategy {
        let owner = DiscriminatorRegistry::with_defaults().get("owner").unwrap();
        FairShareTransferStrategy::new(owner, max)
    }

    fn job(id: JobId, owner: &str) -> JobRecord {
        JobRecord::with_id(id).owned_by(owner)
    }

    fn put(s: &FairShareTransferStrategy, owner: &str, state: State, n: usize, first_id: JobId) {
        for i in 0..n {
            let j = job(first_id + i as JobId, owner);
            if state == State::Ready {
                s.state_changed(&j, State::InProgress, State::Rqueued);
                s.state_changed(&j, State::Rqueued, State::Ready);
            } else {
                s.state_changed(&j, State::InProgress, state);
            }
        }
    }

    #[test]
    fn slack_admits_everyone() {
        let s = strategy(10);
        put(&s, "A", State::Ready, 3, 0);
        put(&s, "B", State::Rqueued, 2, 100);
        assert!(s.can_transfer(&job(1000, "A")));
        assert!(s.can_transfer(&job(1001, "nobody")));
    }

    #[test]
    fn no_free_slots_rejects() {
        let s = strategy(3);
        put(&s, "A", State::Ready, 3, 0);
        put(&s, "B", State::Rqueued, 1, 100);
        assert!(!s.can_transfer(&job(1000, "B")));
    }

    #[test]
    fn starved_group_is_admitted_before_heavy_group() {
        let s = strategy(4);
        put(&s, "A", State::Ready, 3, 0);
        put(&s, "A", State::Rqueued, 5, 100);
        put(&s, "B", State::Rqueued, 1, 200);

        // B holds nothing, nobody is ahead of it.
        assert!(s.can_transfer(&job(200, "B")));
    }

    #[test]
    fn heavy_group_waits_for_lighter_groups() {
        let s = strategy(4);
        put(&s, "A", State::Ready, 2, 0);
        put(&s, "A", State::Rqueued, 3, 100);
        put(&s, "B", State::Ready, 1, 200);
        put(&s, "B", State::Rqueued, 2, 300);

        // B may promote one more before matching A: ready 3 + ahead 1 == max.
        assert!(!s.can_transfer(&job(100, "A")));
        assert!(s.can_transfer(&job(300, "B")));
    }

    #[test]
    fn counters_follow_transitions() {
        let s = strategy(10);
        let j = job(1, "A");
        s.state_changed(&j, State::InProgress, State::Rqueued);
        assert_eq!(s.queued_count("A"), 1);
        s.state_changed(&j, State::Rqueued, State::Ready);
        assert_eq!((s.queued_count("A"), s.ready_count("A")), (0, 1));
        s.state_changed(&j, State::Ready, State::Transferring);
        assert_eq!(s.ready_count("A"), 0);
        s.state_changed(&j, State::Ready, State::Ready);
        assert_eq!(s.ready_count("A"), 0);
    }

    #[test]
    fn stray_exit_leaves_other_counts_alone() {
        let s = strategy(10);
        put(&s, "A", State::Ready, 1, 0);
        put(&s, "B", State::Rqueued, 1, 100);

        // Never counted: logged, nothing decremented.
        s.state_changed(&job(500, "C"), State::Ready, State::Done);
        s.state_changed(&job(501, "A"), State::Rqueued, State::Failed);

        assert_eq!((s.ready_count("A"), s.queued_count("A")), (1, 0));
        assert_eq!(s.queued_count("B"), 1);
        assert_eq!((s.ready_count("C"), s.queued_count("C")), (0, 0));
        assert!(s.can_transfer(&job(100, "B")));
    }
}
