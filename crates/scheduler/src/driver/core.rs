use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use srm_sched_core::{
    Job, JobId, JobRecord, SchedResult, SchedulerSection, SchedulerSettings, State,
};
use tracing::info;

use crate::locks::read;
use crate::registry::{StrategyContext, StrategyRegistry};
use crate::strategy::{SchedulingStrategy, StateChangeListener};
use crate::transfer::TransferStrategy;

/// Live jobs by id, indexed by state. Jobs leave the table when they
/// reach a final state; only a per-state tally of them is kept.
#[derive(Debug, Default)]
pub(super) struct JobTable {
    by_id: HashMap<JobId, Arc<JobRecord>>,
    by_state: HashMap<State, BTreeSet<JobId>>,
    finished: BTreeMap<State, u64>,
}

impl JobTable {
    pub fn get(&self, id: JobId) -> Option<Arc<JobRecord>> {
        self.by_id.get(&id).cloned()
    }

    pub fn contains(&self, id: JobId) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn live(&self) -> usize {
        self.by_id.len()
    }

    /// Track `job`, currently in `state`.
    pub fn insert(&mut self, job: Arc<JobRecord>, state: State) {
        let id = job.id();
        self.by_state.entry(state).or_default().insert(id);
        self.by_id.insert(id, job);
    }

    /// Re-index `id` after a committed transition.
    pub fn moved(&mut self, id: JobId, old: State, new: State) {
        if let Some(ids) = self.by_state.get_mut(&old) {
            ids.remove(&id);
        }
        if new.is_final() {
            self.by_id.remove(&id);
            *self.finished.entry(new).or_default() += 1;
        } else {
            self.by_state.entry(new).or_default().insert(id);
        }
    }

    pub fn count(&self, state: State) -> usize {
        if state.is_final() {
            self.finished.get(&state).copied().unwrap_or(0) as usize
        } else {
            self.by_state.get(&state).map_or(0, BTreeSet::len)
        }
    }

    pub fn ids_in(&self, state: State) -> Vec<JobId> {
        self.by_state
            .get(&state)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }
}

/// Dispatch counters, updated with relaxed atomics.
#[derive(Debug, Default)]
pub(super) struct Counters {
    pub dispatched: AtomicU64,
    pub discarded: AtomicU64,
    pub rejected: AtomicU64,
    pub executed: AtomicU64,
    pub execution_failures: AtomicU64,
    pub retries: AtomicU64,
}

/// The scheduler driver. Shared as `Arc<Scheduler>` between the dispatch
/// loop, worker threads and whoever submits or cancels jobs.
pub struct Scheduler {
    pub(super) settings: SchedulerSection,
    pub(super) scheduling: Arc<dyn SchedulingStrategy>,
    pub(super) transfer: Arc<dyn TransferStrategy>,
    pub(super) jobs: RwLock<JobTable>,
    /// Extra listeners, notified after both strategies.
    pub(super) listeners: RwLock<Vec<Arc<dyn StateChangeListener>>>,
    /// RETRYWAIT jobs by the time they may be queued again.
    pub(super) retry_wait: Mutex<BTreeSet<(Instant, JobId)>>,
    pub(super) running: AtomicBool,
    /// Shutdown signal.
    pub(super) shutdown: Arc<AtomicBool>,
    /// Jobs currently executing on the worker pool.
    pub(super) active_workers: Arc<AtomicUsize>,
    pub(super) counters: Counters,
}

impl Scheduler {
    pub fn new(
        settings: SchedulerSection,
        scheduling: Arc<dyn SchedulingStrategy>,
        transfer: Arc<dyn TransferStrategy>,
    ) -> Self {
        Self {
            settings,
            scheduling,
            transfer,
            jobs: RwLock::new(JobTable::default()),
            listeners: RwLock::new(Vec::new()),
            retry_wait: Mutex::new(BTreeSet::new()),
            running: AtomicBool::new(false),
            shutdown: Arc::new(AtomicBool::new(false)),
            active_workers: Arc::new(AtomicUsize::new(0)),
            counters: Counters::default(),
        }
    }

    /// Build both strategies from `settings` and wire them into a driver.
    pub fn from_settings(
        settings: &SchedulerSettings,
        registry: &StrategyRegistry,
        ctx: &StrategyContext,
    ) -> SchedResult<Self> {
        let scheduling = registry.build_scheduling(&settings.scheduling, ctx)?;
        let transfer = registry.build_transfer(&settings.transfer, ctx)?;
        info!(
            id = %settings.scheduler.id,
            scheduling = %settings.scheduling.strategy,
            transfer = %settings.transfer.strategy,
            "scheduler constructed"
        );
        Ok(Self::new(settings.scheduler.clone(), scheduling, transfer))
    }

    pub fn id(&self) -> &str {
        &self.settings.id
    }

    pub fn settings(&self) -> &SchedulerSection {
        &self.settings
    }

    /// Register a listener for every committed state transition.
    pub fn add_listener(&self, listener: Arc<dyn StateChangeListener>) {
        crate::locks::write(&self.listeners).push(listener);
    }

    pub fn job(&self, id: JobId) -> Option<Arc<JobRecord>> {
        read(&self.jobs).get(id)
    }

    /// Live jobs in a non-final `state`, or the number of jobs that ended in
    /// a final `state` since the driver was created.
    pub fn total(&self, state: State) -> usize {
        read(&self.jobs).count(state)
    }

    /// Ids of live jobs currently in `state`, ascending.
    pub fn jobs_in(&self, state: State) -> Vec<JobId> {
        read(&self.jobs).ids_in(state)
    }

    /// Number of jobs not yet in a final state.
    pub fn live_jobs(&self) -> usize {
        read(&self.jobs).live()
    }

    /// Jobs still held by the scheduling strategy.
    pub fn queued_in_strategy(&self) -> usize {
        self.scheduling.size()
    }

    /// Get an Arc to the shutdown flag (for external shutdown signaling).
    pub fn shutdown_signal(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }
}
