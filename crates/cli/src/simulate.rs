//! Synthetic workload through the reference scheduler.
//!
//! Jobs are spread over a handful of owners with one dominant owner, each
//! recalls a file from one of a few synthetic tapes, and the simulation
//! plays the transfer client by moving READY jobs through to DONE.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use srm_sched::{
    ExecutionError, JobExecutor, Scheduler, SchedulerStats, StateChangeListener, StaticTapeInformant,
    StrategyRegistry,
};
use srm_sched_core::{Job, JobId, JobRecord, SchedulerSettings, State};
use tracing::{debug, info, warn};

use crate::config;

const FILE_SIZE: u64 = 2 * 1024 * 1024 * 1024;

/// Backlog window the synthetic jobs' creation times are spread over.
const BACKLOG: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone)]
pub struct SimulationParams {
    pub users: usize,
    pub jobs: usize,
    pub seconds: u64,
    pub execute_ms: u64,
    pub tapes: usize,
}

#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub scheduling: String,
    pub transfer: String,
    pub submitted: usize,
    /// False when the time limit or an interrupt ended the run.
    pub completed: bool,
    pub elapsed_ms: u128,
    pub submitted_per_owner: BTreeMap<String, usize>,
    /// Job ids per owner in the order they were dispatched.
    pub dispatch_order: BTreeMap<String, Vec<JobId>>,
    /// Position of each owner's first dispatch in the global order.
    pub first_dispatch: BTreeMap<String, usize>,
    pub stats: SchedulerStats,
}

/// Records every job entering INPROGRESS.
#[derive(Default)]
struct DispatchRecorder {
    order: Mutex<Vec<(String, JobId)>>,
}

impl StateChangeListener for DispatchRecorder {
    fn state_changed(&self, job: &dyn Job, _old: State, new: State) {
        if new != State::InProgress {
            return;
        }
        let owner = job
            .submitter()
            .and_then(|s| s.dn.clone())
            .unwrap_or_default();
        self.order
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((owner, job.id()));
    }
}

struct SleepExecutor {
    delay: Duration,
}

impl JobExecutor for SleepExecutor {
    fn execute(&self, _job: &JobRecord) -> Result<(), ExecutionError> {
        thread::sleep(self.delay);
        Ok(())
    }
}

/// Half of all jobs belong to `user0`, the rest are spread evenly.
fn owner_of(index: usize, users: usize) -> String {
    if users <= 1 || index % 2 == 0 {
        "user0".to_string()
    } else {
        format!("user{}", 1 + (index / 2) % (users - 1))
    }
}

fn synthetic_library(jobs: usize, tapes: usize) -> Arc<StaticTapeInformant> {
    let tapes = tapes.max(1);
    let informant = Arc::new(StaticTapeInformant::new());
    for i in 0..jobs {
        informant.insert_file(format!("file-{i}"), format!("T{:03}", i % tapes), FILE_SIZE);
    }
    let per_tape = (jobs / tapes).max(1) as u64;
    for t in 0..tapes {
        informant.insert_tape(format!("T{t:03}"), FILE_SIZE * per_tape * 4, FILE_SIZE * per_tape);
    }
    informant
}

fn finished(scheduler: &Scheduler) -> usize {
    scheduler.total(State::Done) + scheduler.total(State::Failed) + scheduler.total(State::Canceled)
}

/// Play the transfer client: every READY job is transferred and released.
fn complete_ready(scheduler: &Scheduler) {
    for id in scheduler.jobs_in(State::Ready) {
        let outcome = scheduler
            .change_state(id, State::Transferring)
            .and_then(|_| scheduler.change_state(id, State::Done));
        if let Err(e) = outcome {
            debug!(job = id, error = %e, "could not complete job");
        }
    }
}

pub async fn run(settings: SchedulerSettings, params: SimulationParams) -> Result<SimulationReport> {
    let informant = synthetic_library(params.jobs, params.tapes);
    let ctx = config::context(&settings, informant);
    let scheduler = Arc::new(
        Scheduler::from_settings(&settings, &StrategyRegistry::with_defaults(), &ctx)
            .context("failed to build scheduler")?,
    );
    let recorder = Arc::new(DispatchRecorder::default());
    scheduler.add_listener(recorder.clone());
    scheduler.start()?;

    let runner = {
        let scheduler = Arc::clone(&scheduler);
        let executor = Arc::new(SleepExecutor {
            delay: Duration::from_millis(params.execute_ms),
        });
        tokio::task::spawn_blocking(move || scheduler.run(executor))
    };

    let mut submitted_per_owner = BTreeMap::new();
    let start_of_backlog = Utc::now() - chrono::Duration::from_std(BACKLOG)?;
    let step = BACKLOG / u32::try_from(params.jobs.max(1)).unwrap_or(u32::MAX);
    for i in 0..params.jobs {
        let owner = owner_of(i, params.users);
        let offset = chrono::Duration::from_std(step * u32::try_from(i).unwrap_or(u32::MAX))?;
        let job = JobRecord::new()
            .owned_by(owner.clone())
            .for_file(format!("file-{i}"))
            .created_at(start_of_backlog + offset);
        scheduler.schedule(Arc::new(job))?;
        *submitted_per_owner.entry(owner).or_insert(0) += 1;
    }
    info!(jobs = params.jobs, users = params.users, "workload submitted");

    let started = Instant::now();
    let deadline = tokio::time::sleep(Duration::from_secs(params.seconds));
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(deadline, interrupted);
    let mut tick = tokio::time::interval(Duration::from_millis(10));

    let completed = loop {
        tokio::select! {
            _ = tick.tick() => {
                complete_ready(&scheduler);
                if finished(&scheduler) >= params.jobs {
                    break true;
                }
            }
            _ = &mut deadline => {
                warn!(seconds = params.seconds, "simulation time limit reached");
                break false;
            }
            _ = &mut interrupted => {
                info!("simulation interrupted");
                break false;
            }
        }
    };

    scheduler.shutdown();
    runner
        .await
        .context("dispatch loop panicked")?
        .context("dispatch loop failed")?;

    let order = recorder
        .order
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    let mut dispatch_order: BTreeMap<String, Vec<JobId>> = BTreeMap::new();
    let mut first_dispatch = BTreeMap::new();
    for (position, (owner, id)) in order.into_iter().enumerate() {
        first_dispatch.entry(owner.clone()).or_insert(position);
        dispatch_order.entry(owner).or_default().push(id);
    }

    Ok(SimulationReport {
        scheduling: settings.scheduling.strategy.clone(),
        transfer: settings.transfer.strategy.clone(),
        submitted: params.jobs,
        completed,
        elapsed_ms: started.elapsed().as_millis(),
        submitted_per_owner,
        dispatch_order,
        first_dispatch,
        stats: scheduler.stats(),
    })
}
