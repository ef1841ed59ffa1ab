//! Concurrent notifications and dispatch: counters must match the result
//! of some serial order and no job may be dispatched twice.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::thread;

use srm_sched::{
    FairShareTransferStrategy, FirstComeFirstServedStrategy, InProgressFairShareStrategy,
    SchedulingStrategy, StateChangeListener, ThroughputFairShareStrategy, TransferStrategy,
};
use srm_sched_core::{DiscriminatorRegistry, JobId, JobRecord, State};

const THREADS: usize = 10;
const JOBS_PER_THREAD: usize = 200;

fn owner_key() -> Arc<dyn srm_sched_core::JobDiscriminator> {
    DiscriminatorRegistry::with_defaults().get("owner").unwrap()
}

/// Every job walks QUEUED → INPROGRESS → RQUEUED → READY; every other job
/// then finishes. Runs the walk from many threads at once.
fn hammer(listener: Arc<dyn StateChangeListener>) {
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let listener = Arc::clone(&listener);
            thread::spawn(move || {
                for i in 0..JOBS_PER_THREAD {
                    let id = (t * JOBS_PER_THREAD + i) as JobId;
                    let job = JobRecord::with_id(id).owned_by(format!("user{}", (i / 2) % 4));
                    listener.state_changed(&job, State::Queued, State::InProgress);
                    listener.state_changed(&job, State::InProgress, State::Rqueued);
                    listener.state_changed(&job, State::Rqueued, State::Ready);
                    if i % 2 == 0 {
                        listener.state_changed(&job, State::Ready, State::Transferring);
                        listener.state_changed(&job, State::Transferring, State::Done);
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn running_counts_survive_concurrent_notifications() {
    let s = Arc::new(InProgressFairShareStrategy::new(owner_key()));
    hammer(s.clone());

    // Half the jobs are still READY, spread evenly over four owners.
    let per_owner = THREADS * JOBS_PER_THREAD / 2 / 4;
    for u in 0..4 {
        assert_eq!(s.running_count(&format!("user{u}")), per_owner);
    }
}

#[test]
fn fair_share_counters_survive_concurrent_notifications() {
    let s = Arc::new(FairShareTransferStrategy::new(owner_key(), 10));
    hammer(s.clone());

    let per_owner = THREADS * JOBS_PER_THREAD / 2 / 4;
    for u in 0..4 {
        let key = format!("user{u}");
        assert_eq!(s.ready_count(&key), per_owner);
        assert_eq!(s.queued_count(&key), 0);
    }
}

#[test]
fn fcfs_counter_survives_concurrent_notifications() {
    let s = Arc::new(FirstComeFirstServedStrategy::new(usize::MAX));
    hammer(s.clone());
    assert_eq!(s.ready_jobs(), THREADS * JOBS_PER_THREAD / 2);
    assert!(s.can_transfer(&JobRecord::with_id(-1)));
}

#[test]
fn concurrent_add_and_remove_never_double_dispatch() {
    let s: Arc<dyn SchedulingStrategy> = Arc::new(ThroughputFairShareStrategy::new(owner_key()));
    let taken = Arc::new(Mutex::new(Vec::new()));

    let producers: Vec<_> = (0..4)
        .map(|t| {
            let s = Arc::clone(&s);
            thread::spawn(move || {
                for i in 0..500 {
                    let id = (t * 500 + i) as JobId;
                    s.add(&JobRecord::with_id(id).owned_by(format!("user{}", i % 7)));
                }
            })
        })
        .collect();
    let consumers: Vec<_> = (0..3)
        .map(|_| {
            let s = Arc::clone(&s);
            let taken = Arc::clone(&taken);
            thread::spawn(move || {
                let mut local = Vec::new();
                for _ in 0..2000 {
                    if let Some(id) = s.remove() {
                        local.push(id);
                    }
                }
                taken.lock().unwrap().extend(local);
            })
        })
        .collect();

    for handle in producers.into_iter().chain(consumers) {
        handle.join().unwrap();
    }
    let mut taken = taken.lock().unwrap().clone();
    taken.extend(std::iter::from_fn(|| s.remove()));

    let unique: HashSet<_> = taken.iter().copied().collect();
    assert_eq!(taken.len(), 2000);
    assert_eq!(unique.len(), 2000);
    assert_eq!(s.size(), 0);
}
