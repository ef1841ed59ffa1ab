use std::sync::{Arc, Mutex};

use srm_sched_core::{Job, JobDiscriminator, JobId, State};
use tracing::debug;

use super::{SchedulingStrategy, StateChangeListener};
use crate::keyed::KeyedQueues;
use crate::locks::lock;
use crate::multiset::CountingMultiset;

/// States counted as "running" when balancing groups.
const RUNNING_STATES: [State; 4] = [
    State::InProgress,
    State::Rqueued,
    State::Ready,
    State::Transferring,
];

fn is_running(state: State) -> bool {
    RUNNING_STATES.contains(&state)
}

/// Least-loaded group first ("in-progress fair share").
///
/// Picks the oldest job of the group with the fewest jobs currently running,
/// so a group holding many long transfers does not also win new slots.
/// Ties go to the lexicographically smallest key.
pub struct InProgressFairShareStrategy {
    discriminator: Arc<dyn JobDiscriminator>,
    queues: Mutex<KeyedQueues>,
    running: CountingMultiset,
}

impl InProgressFairShareStrategy {
    pub fn new(discriminator: Arc<dyn JobDiscriminator>) -> Self {
        Self {
            queues: Mutex::new(KeyedQueues::new(Arc::clone(&discriminator))),
            discriminator,
            running: CountingMultiset::new(),
        }
    }

    /// Jobs of group `key` currently in a running state.
    pub fn running_count(&self, key: &str) -> usize {
        self.running.count(key)
    }
}

impl StateChangeListener for InProgressFairShareStrategy {
    fn state_changed(&self, job: &dyn Job, old: State, new: State) {
        if old == new || is_running(old) == is_running(new) {
            return;
        }
        let key = self.discriminator.discriminating_value(job);
        if is_running(old) {
            self.running.remove(&key);
        } else {
            self.running.add(&key);
        }
    }
}

impl SchedulingStrategy for InProgressFairShareStrategy {
    fn add(&self, job: &dyn Job) {
        let key = lock(&self.queues).push(job);
        debug!(job = job.id(), key = %key, "queued for least-loaded dispatch");
    }

    fn remove(&self) -> Option<JobId> {
        let mut queues = lock(&self.queues);
        let running = self.running.snapshot();
        let key = queues
            .non_empty_groups()
            .map(|(key, _)| (running.get(key).copied().unwrap_or(0), key))
            .min()
            .map(|(_, key)| key.to_string())?;
        let id = queues.pop(&key);
        queues.drop_if_empty(&key);
        debug!(key = %key, running = running.get(&key).copied().unwrap_or(0), "least-loaded group selected");
        id
    }

    fn size(&self) -> usize {
        lock(&self.queues).len()
    }
}
