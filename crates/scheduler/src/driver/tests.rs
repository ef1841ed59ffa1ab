use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::thread;
use std::time::{Duration, Instant};

use srm_sched_core::{
    DiscriminatorRegistry, Job, JobId, JobRecord, SchedError, SchedulerSection, State,
};

use super::*;
use crate::strategy::{StateChangeListener, ThroughputFairShareStrategy};
use crate::transfer::FirstComeFirstServedStrategy;

fn section(max_requests: usize, max_in_progress: usize, max_ready_jobs: usize) -> SchedulerSection {
    SchedulerSection {
        id: "test".into(),
        max_requests,
        max_in_progress,
        max_ready_jobs,
        dispatch_interval_ms: 5,
        worker_threads: 2,
        ..SchedulerSection::default()
    }
}

fn with_retries(mut settings: SchedulerSection, max: u32, timeout_ms: u64) -> SchedulerSection {
    settings.max_number_of_retries = max;
    settings.retry_timeout_ms = timeout_ms;
    settings
}

fn fifo_scheduler(settings: SchedulerSection) -> Arc<Scheduler> {
    let none = DiscriminatorRegistry::with_defaults().get("none").unwrap();
    let max_ready = settings.max_ready_jobs;
    Arc::new(Scheduler::new(
        settings,
        Arc::new(ThroughputFairShareStrategy::new(none)),
        Arc::new(FirstComeFirstServedStrategy::new(max_ready)),
    ))
}

fn started(settings: SchedulerSection) -> Arc<Scheduler> {
    let scheduler = fifo_scheduler(settings);
    scheduler.start().unwrap();
    scheduler
}

fn submit(scheduler: &Scheduler, id: JobId) -> State {
    scheduler
        .schedule(Arc::new(JobRecord::with_id(id).owned_by("alice")))
        .unwrap()
}

fn ids(jobs: &[Arc<JobRecord>]) -> Vec<JobId> {
    jobs.iter().map(|job| job.id()).collect()
}

#[derive(Default)]
struct RecordingListener {
    seen: Mutex<Vec<(JobId, State, State)>>,
}

impl StateChangeListener for RecordingListener {
    fn state_changed(&self, job: &dyn Job, old: State, new: State) {
        self.seen.lock().unwrap().push((job.id(), old, new));
    }
}

#[test]
fn schedule_requires_start() {
    let scheduler = fifo_scheduler(section(10, 2, 2));
    let err = scheduler
        .schedule(Arc::new(JobRecord::with_id(1)))
        .unwrap_err();
    assert!(matches!(err, SchedError::NotRunning));
}

#[test]
fn start_twice_is_rejected() {
    let scheduler = started(section(10, 2, 2));
    assert!(matches!(scheduler.start(), Err(SchedError::AlreadyRunning)));
    scheduler.shutdown();
    assert!(!scheduler.is_running());
}

#[test]
fn scheduled_job_is_queued_in_strategy() {
    let scheduler = started(section(10, 2, 2));
    assert_eq!(submit(&scheduler, 1), State::Queued);
    assert_eq!(scheduler.total(State::Queued), 1);
    assert_eq!(scheduler.queued_in_strategy(), 1);
    assert_eq!(scheduler.job(1).unwrap().state(), State::Queued);
}

#[test]
fn full_scheduler_fails_new_jobs() {
    let scheduler = started(section(2, 2, 2));
    submit(&scheduler, 1);
    submit(&scheduler, 2);
    assert_eq!(submit(&scheduler, 3), State::Failed);

    let stats = scheduler.stats();
    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.total(State::Failed), 1);
    assert_eq!(stats.live_jobs, 2);
    assert!(scheduler.job(3).is_none());
}

#[test]
fn dispatch_respects_in_progress_limit() {
    let scheduler = started(section(100, 2, 10));
    for id in 1..=5 {
        submit(&scheduler, id);
    }
    assert_eq!(ids(&scheduler.dispatch()), vec![1, 2]);
    assert!(scheduler.dispatch().is_empty());

    scheduler.change_state(1, State::Rqueued).unwrap();
    assert_eq!(ids(&scheduler.dispatch()), vec![3]);
    assert_eq!(scheduler.total(State::InProgress), 2);
    assert_eq!(scheduler.queued_in_strategy(), 2);
}

#[test]
fn cancelled_jobs_are_discarded_on_dispatch() {
    let scheduler = started(section(100, 5, 10));
    submit(&scheduler, 1);
    submit(&scheduler, 2);
    scheduler.cancel(1).unwrap();

    assert_eq!(ids(&scheduler.dispatch()), vec![2]);
    let stats = scheduler.stats();
    assert_eq!(stats.discarded, 1);
    assert_eq!(stats.total(State::Canceled), 1);
    assert_eq!(stats.queued_in_strategy, 0);
}

#[test]
fn illegal_transition_leaves_job_untouched() {
    let scheduler = started(section(100, 5, 10));
    submit(&scheduler, 1);
    let err = scheduler.change_state(1, State::Transferring).unwrap_err();
    assert!(matches!(err, SchedError::IllegalStateTransition { job: 1, .. }));
    assert_eq!(scheduler.total(State::Queued), 1);
    assert!(matches!(
        scheduler.change_state(42, State::Done),
        Err(SchedError::JobNotFound(42))
    ));
}

#[test]
fn ready_promotion_is_gated_by_transfer_strategy() {
    let scheduler = started(section(100, 5, 1));
    submit(&scheduler, 1);
    submit(&scheduler, 2);
    scheduler.dispatch();
    scheduler.change_state(1, State::Rqueued).unwrap();
    scheduler.change_state(2, State::Rqueued).unwrap();

    assert_eq!(scheduler.promote_ready_queue(), 1);
    assert_eq!(scheduler.jobs_in(State::Ready), vec![1]);
    assert!(!scheduler.try_to_ready(2).unwrap());

    scheduler.change_state(1, State::Transferring).unwrap();
    scheduler.change_state(1, State::Done).unwrap();
    assert!(scheduler.try_to_ready(2).unwrap());
    assert_eq!(scheduler.total(State::Done), 1);
}

#[test]
fn listeners_see_every_transition_in_order() {
    let scheduler = started(section(100, 5, 10));
    let listener = Arc::new(RecordingListener::default());
    scheduler.add_listener(listener.clone());

    submit(&scheduler, 7);
    scheduler.dispatch();
    scheduler.change_state(7, State::InProgress).unwrap();
    scheduler.change_state(7, State::Failed).unwrap();

    let seen = listener.seen.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![
            (7, State::Unscheduled, State::Queued),
            (7, State::Queued, State::InProgress),
            (7, State::InProgress, State::Failed),
        ]
    );
}

/// On QUEUED → INPROGRESS, starts a second thread that looks at the job
/// while the notification is still running.
#[derive(Default)]
struct OutsideObserver {
    scheduler: OnceLock<Weak<Scheduler>>,
    notifying: Arc<AtomicBool>,
    in_progress_during: AtomicUsize,
    reader: Mutex<Option<thread::JoinHandle<(State, usize, bool)>>>,
}

impl StateChangeListener for OutsideObserver {
    fn state_changed(&self, job: &dyn Job, old: State, new: State) {
        if (old, new) != (State::Queued, State::InProgress) {
            return;
        }
        let Some(scheduler) = self.scheduler.get().and_then(Weak::upgrade) else {
            return;
        };
        self.in_progress_during
            .store(scheduler.total(State::InProgress), Ordering::SeqCst);

        let id = job.id();
        let notifying = Arc::clone(&self.notifying);
        notifying.store(true, Ordering::SeqCst);
        let reader = thread::spawn(move || {
            let job = scheduler.job(id).unwrap();
            let state = job.state();
            let in_progress = scheduler.total(State::InProgress);
            (state, in_progress, notifying.load(Ordering::SeqCst))
        });
        thread::sleep(Duration::from_millis(50));
        self.notifying.store(false, Ordering::SeqCst);
        *self.reader.lock().unwrap() = Some(reader);
    }
}

#[test]
fn new_state_is_hidden_until_listeners_return() {
    let scheduler = started(section(10, 2, 2));
    let observer = Arc::new(OutsideObserver::default());
    observer.scheduler.set(Arc::downgrade(&scheduler)).unwrap();
    scheduler.add_listener(observer.clone());

    submit(&scheduler, 1);
    assert_eq!(ids(&scheduler.dispatch()), vec![1]);

    assert_eq!(observer.in_progress_during.load(Ordering::SeqCst), 0);
    let reader = observer.reader.lock().unwrap().take().unwrap();
    let (state, in_progress, during_notification) = reader.join().unwrap();
    assert!(!during_notification, "job state was readable mid-notification");
    assert_eq!((state, in_progress), (State::InProgress, 1));
}

#[test]
fn retry_waits_out_timeout_before_requeue() {
    let scheduler = started(with_retries(section(100, 5, 10), 3, 40));
    submit(&scheduler, 1);
    let job = scheduler.dispatch().pop().unwrap();

    scheduler.finish_execution(&job, Err(ExecutionError::Retry("tape busy".into())));
    assert_eq!(job.state(), State::RetryWait);
    assert_eq!(job.retries(), 1);
    assert_eq!(scheduler.total(State::InProgress), 0);
    assert_eq!(scheduler.stats().retry_waiting, 1);

    assert_eq!(scheduler.requeue_due_retries(), 0);
    assert!(scheduler.dispatch().is_empty());

    thread::sleep(Duration::from_millis(60));
    assert_eq!(scheduler.requeue_due_retries(), 1);
    assert_eq!(job.state(), State::Queued);
    assert_eq!(ids(&scheduler.dispatch()), vec![1]);
}

#[test]
fn exhausted_retries_fail_job() {
    let scheduler = started(with_retries(section(100, 5, 10), 2, 0));
    submit(&scheduler, 1);

    for attempt in 1..=2 {
        let job = scheduler.dispatch().pop().unwrap();
        scheduler.finish_execution(&job, Err(ExecutionError::Retry("pool offline".into())));
        assert_eq!(job.state(), State::RetryWait);
        assert_eq!(job.retries(), attempt);
        assert_eq!(scheduler.requeue_due_retries(), 1);
    }

    let job = scheduler.dispatch().pop().unwrap();
    scheduler.finish_execution(&job, Err(ExecutionError::Retry("pool offline".into())));
    assert_eq!(job.state(), State::Failed);

    let stats = scheduler.stats();
    assert_eq!(stats.retries, 2);
    assert_eq!(stats.execution_failures, 1);
    assert_eq!(stats.total(State::Failed), 1);
    assert_eq!(stats.retry_waiting, 0);
}

#[test]
fn zero_retries_fail_on_first_temporary_error() {
    let scheduler = started(with_retries(section(100, 5, 10), 0, 0));
    submit(&scheduler, 1);
    let job = scheduler.dispatch().pop().unwrap();

    scheduler.finish_execution(&job, Err(ExecutionError::Retry("tape busy".into())));
    assert_eq!(job.state(), State::Failed);
    assert_eq!(job.retries(), 0);
}

#[test]
fn job_cancelled_in_retry_wait_is_not_requeued() {
    let scheduler = started(with_retries(section(100, 5, 10), 3, 0));
    submit(&scheduler, 1);
    let job = scheduler.dispatch().pop().unwrap();
    scheduler.finish_execution(&job, Err(ExecutionError::Retry("tape busy".into())));

    scheduler.cancel(1).unwrap();
    assert_eq!(scheduler.requeue_due_retries(), 0);
    assert_eq!(scheduler.queued_in_strategy(), 0);
    assert_eq!(scheduler.total(State::Canceled), 1);
}

#[test]
fn failed_execution_fails_job() {
    let scheduler = started(section(100, 5, 10));
    submit(&scheduler, 1);
    let job = scheduler.dispatch().pop().unwrap();

    scheduler.finish_execution(&job, Err(ExecutionError::Failed("no such file".into())));
    assert_eq!(job.state(), State::Failed);
    assert_eq!(scheduler.stats().execution_failures, 1);
}

#[test]
fn successful_execution_readies_job() {
    let scheduler = started(section(100, 5, 10));
    submit(&scheduler, 1);
    let job = scheduler.dispatch().pop().unwrap();

    scheduler.finish_execution(&job, Ok(()));
    assert_eq!(job.state(), State::Ready);
}

#[test]
fn run_requires_start() {
    struct Noop;
    impl JobExecutor for Noop {
        fn execute(&self, _job: &JobRecord) -> Result<(), ExecutionError> {
            Ok(())
        }
    }
    let scheduler = fifo_scheduler(section(10, 2, 2));
    assert!(matches!(
        scheduler.run(Arc::new(Noop)),
        Err(SchedError::NotRunning)
    ));
}

struct CountingExecutor {
    calls: AtomicUsize,
}

impl JobExecutor for CountingExecutor {
    fn execute(&self, _job: &JobRecord) -> Result<(), ExecutionError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        thread::sleep(Duration::from_millis(1));
        Ok(())
    }
}

#[test]
fn run_loop_drives_jobs_to_ready() {
    let scheduler = started(section(1000, 3, 4));
    let executor = Arc::new(CountingExecutor {
        calls: AtomicUsize::new(0),
    });

    let runner = {
        let scheduler = Arc::clone(&scheduler);
        let executor = Arc::clone(&executor);
        thread::spawn(move || scheduler.run(executor))
    };

    for id in 1..=20 {
        submit(&scheduler, id);
    }

    // Act as the transfer client: take every READY job through to DONE.
    let deadline = Instant::now() + Duration::from_secs(10);
    while scheduler.total(State::Done) < 20 && Instant::now() < deadline {
        for id in scheduler.jobs_in(State::Ready) {
            scheduler.change_state(id, State::Transferring).unwrap();
            scheduler.change_state(id, State::Done).unwrap();
        }
        thread::sleep(Duration::from_millis(2));
    }

    scheduler.shutdown();
    runner.join().unwrap().unwrap();

    assert_eq!(scheduler.total(State::Done), 20);
    assert_eq!(executor.calls.load(Ordering::Relaxed), 20);
    assert_eq!(scheduler.live_jobs(), 0);
    assert_eq!(scheduler.stats().dispatched, 20);
}

struct AlwaysRetry {
    calls: AtomicUsize,
}

impl JobExecutor for AlwaysRetry {
    fn execute(&self, _job: &JobRecord) -> Result<(), ExecutionError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Err(ExecutionError::Retry("tape busy".into()))
    }
}

#[test]
fn run_loop_gives_up_on_endlessly_retried_job() {
    let scheduler = started(with_retries(section(100, 1, 4), 3, 10));
    let executor = Arc::new(AlwaysRetry {
        calls: AtomicUsize::new(0),
    });
    let runner = {
        let scheduler = Arc::clone(&scheduler);
        let executor = Arc::clone(&executor);
        thread::spawn(move || scheduler.run(executor))
    };

    submit(&scheduler, 1);
    let deadline = Instant::now() + Duration::from_secs(5);
    while scheduler.total(State::Failed) == 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    scheduler.shutdown();
    runner.join().unwrap().unwrap();

    assert_eq!(scheduler.total(State::Failed), 1);
    assert_eq!(executor.calls.load(Ordering::Relaxed), 4);
    assert_eq!(scheduler.stats().retries, 3);
}
