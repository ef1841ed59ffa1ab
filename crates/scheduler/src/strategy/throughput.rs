use std::sync::{Arc, Mutex};

use srm_sched_core::{Job, JobDiscriminator, JobId};
use tracing::debug;

use super::{SchedulingStrategy, StateChangeListener};
use crate::keyed::KeyedQueues;
use crate::locks::lock;

/// Round-robin across groups ("throughput fair share").
///
/// Each group with pending work gets one dispatch per full rotation,
/// regardless of how deep its queue is. With a constant discriminator this
/// is plain FIFO.
pub struct ThroughputFairShareStrategy {
    inner: Mutex<RoundRobin>,
}

struct RoundRobin {
    queues: KeyedQueues,
    cursor: usize,
}

impl ThroughputFairShareStrategy {
    pub fn new(discriminator: Arc<dyn JobDiscriminator>) -> Self {
        Self {
            inner: Mutex::new(RoundRobin {
                queues: KeyedQueues::new(discriminator),
                cursor: 0,
            }),
        }
    }
}

impl RoundRobin {
    fn next(&mut self) -> Option<JobId> {
        if self.queues.is_empty() {
            return None;
        }
        // Terminates: at least one group is non-empty, so one full pass
        // after a wrap always finds it.
        loop {
            if self.cursor >= self.queues.group_count() {
                self.queues.drop_empty_groups();
                self.cursor = 0;
            }
            let index = self.cursor;
            self.cursor += 1;
            if let Some(id) = self.queues.pop_at(index) {
                return Some(id);
            }
        }
    }
}

impl StateChangeListener for ThroughputFairShareStrategy {}

impl SchedulingStrategy for ThroughputFairShareStrategy {
    fn add(&self, job: &dyn Job) {
        let key = lock(&self.inner).queues.push(job);
        debug!(job = job.id(), key = %key, "queued for round-robin dispatch");
    }

    fn remove(&self) -> Option<JobId> {
        lock(&self.inner).next()
    }

    fn size(&self) -> usize {
        lock(&self.inner).queues.len()
    }
}
