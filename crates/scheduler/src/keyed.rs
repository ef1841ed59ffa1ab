use std::collections::VecDeque;
use std::sync::Arc;

use indexmap::IndexMap;
use srm_sched_core::{Job, JobDiscriminator, JobId};

/// One FIFO queue of job ids per discriminator key.
///
/// Groups are kept in order of first appearance. A group is created lazily
/// by [`push`](KeyedQueues::push) and lingers once empty until the owning
/// strategy drops it, so the strategy decides when ordering may change.
pub struct KeyedQueues {
    discriminator: Arc<dyn JobDiscriminator>,
    groups: IndexMap<String, VecDeque<JobId>>,
    len: usize,
}

impl KeyedQueues {
    pub fn new(discriminator: Arc<dyn JobDiscriminator>) -> Self {
        Self {
            discriminator,
            groups: IndexMap::new(),
            len: 0,
        }
    }

    pub fn discriminator(&self) -> &Arc<dyn JobDiscriminator> {
        &self.discriminator
    }

    /// Append `job` to its group's queue, returning the group key.
    pub fn push(&mut self, job: &dyn Job) -> String {
        let key = self.discriminator.discriminating_value(job);
        self.groups.entry(key.clone()).or_default().push_back(job.id());
        self.len += 1;
        key
    }

    /// Pop the oldest job of the group at `index` (order of first appearance).
    pub fn pop_at(&mut self, index: usize) -> Option<JobId> {
        let (_, queue) = self.groups.get_index_mut(index)?;
        let id = queue.pop_front()?;
        self.len -= 1;
        Some(id)
    }

    /// Pop the oldest job of group `key`.
    pub fn pop(&mut self, key: &str) -> Option<JobId> {
        let id = self.groups.get_mut(key)?.pop_front()?;
        self.len -= 1;
        Some(id)
    }

    /// Keys with at least one queued job, with their queue lengths.
    pub fn non_empty_groups(&self) -> impl Iterator<Item = (&str, usize)> {
        self.groups
            .iter()
            .filter(|(_, queue)| !queue.is_empty())
            .map(|(key, queue)| (key.as_str(), queue.len()))
    }

    /// Number of groups currently tracked, empty ones included.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn queue_len(&self, key: &str) -> usize {
        self.groups.get(key).map_or(0, VecDeque::len)
    }

    /// Drop every empty group, preserving the order of the rest.
    pub fn drop_empty_groups(&mut self) {
        self.groups.retain(|_, queue| !queue.is_empty());
    }

    /// Drop group `key` if it has no queued jobs. Order of other groups may change.
    pub fn drop_if_empty(&mut self, key: &str) {
        if self.groups.get(key).is_some_and(VecDeque::is_empty) {
            self.groups.swap_remove(key);
        }
    }

    /// Total queued jobs across all groups.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use srm_sched_core::{DiscriminatorRegistry, JobRecord};

    use super::*;

    fn queues() -> KeyedQueues {
        KeyedQueues::new(DiscriminatorRegistry::with_defaults().get("owner").unwrap())
    }

    fn job(id: JobId, owner: &str) -> JobRecord {
        JobRecord::with_id(id).owned_by(owner)
    }

    #[test]
    fn groups_in_first_appearance_order() {
        let mut q = queues();
        q.push(&job(1, "b"));
        q.push(&job(2, "a"));
        q.push(&job(3, "b"));
        let keys: Vec<_> = q.non_empty_groups().collect();
        assert_eq!(keys, vec![("b", 2), ("a", 1)]);
        assert_eq!(q.len(), 3);
    }

    #[test]
    fn pop_is_fifo_within_group() {
        let mut q = queues();
        q.push(&job(1, "a"));
        q.push(&job(2, "a"));
        assert_eq!(q.pop("a"), Some(1));
        assert_eq!(q.pop("a"), Some(2));
        assert_eq!(q.pop("a"), None);
        assert!(q.is_empty());
    }

    #[test]
    fn empty_groups_linger_until_dropped() {
        let mut q = queues();
        q.push(&job(1, "a"));
        q.push(&job(2, "b"));
        q.pop_at(0);
        assert_eq!(q.group_count(), 2);
        q.drop_empty_groups();
        assert_eq!(q.group_count(), 1);
        assert_eq!(q.queue_len("b"), 1);
    }

    #[test]
    fn drop_if_empty_keeps_non_empty_group() {
        let mut q = queues();
        q.push(&job(1, "a"));
        q.drop_if_empty("a");
        assert_eq!(q.group_count(), 1);
        q.pop("a");
        q.drop_if_empty("a");
        assert_eq!(q.group_count(), 0);
    }

    #[test]
    fn pop_at_out_of_range() {
        let mut q = queues();
        assert_eq!(q.pop_at(3), None);
    }
}
