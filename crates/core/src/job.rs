use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::{PoisonError, RwLock, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{SchedError, SchedResult};
use crate::state::State;

/// Unique, monotonically assigned job identifier.
pub type JobId = i64;

static NEXT_JOB_ID: AtomicI64 = AtomicI64::new(1);

/// Allocate the next process-wide job id.
pub fn next_job_id() -> JobId {
    NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed)
}

/// Identity of whoever submitted a job. Every attribute is optional;
/// anonymous and system jobs carry none.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submitter {
    pub dn: Option<String>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub vo_group: Option<String>,
    pub vo_role: Option<String>,
}

impl Submitter {
    /// Submitter identified only by a distinguished name.
    pub fn with_dn(dn: impl Into<String>) -> Self {
        Self {
            dn: Some(dn.into()),
            ..Default::default()
        }
    }
}

/// What the scheduling core needs to know about a job.
///
/// Strategies read these values once at `add()` time (or when handling a
/// state-change notification) and keep only the id afterwards.
pub trait Job: Send + Sync {
    fn id(&self) -> JobId;

    fn creation_time(&self) -> DateTime<Utc>;

    fn state(&self) -> State;

    fn submitter(&self) -> Option<&Submitter>;

    fn client_host(&self) -> Option<&str>;

    /// SURL or local file path of the file the job operates on. Used by
    /// the tape recall strategy to resolve tape locations.
    fn surl_or_file_path(&self) -> Option<&str>;
}

/// Concrete job record used by the reference driver.
#[derive(Debug)]
pub struct JobRecord {
    id: JobId,
    created: DateTime<Utc>,
    submitter: Option<Submitter>,
    client_host: Option<String>,
    surl: Option<String>,
    state: RwLock<State>,
    retries: AtomicU32,
}

/// A committed state change that other threads cannot observe yet.
///
/// Holds the job's state write lock: `state()` callers on other threads
/// block until the guard is dropped, and concurrent transitions of the
/// same job wait for it. Code running under the guard must not read the
/// job's state.
#[must_use = "the new state becomes visible when the transition is dropped"]
pub struct StateTransition<'a> {
    guard: RwLockWriteGuard<'a, State>,
    previous: State,
}

impl StateTransition<'_> {
    pub fn previous(&self) -> State {
        self.previous
    }

    pub fn current(&self) -> State {
        *self.guard
    }

    /// The job was already in the requested state.
    pub fn is_noop(&self) -> bool {
        self.previous == *self.guard
    }
}

impl JobRecord {
    /// New unscheduled job with a freshly allocated id, created now.
    pub fn new() -> Self {
        Self::with_id(next_job_id())
    }

    /// New unscheduled job with an explicit id, created now.
    pub fn with_id(id: JobId) -> Self {
        Self {
            id,
            created: Utc::now(),
            submitter: None,
            client_host: None,
            surl: None,
            state: RwLock::new(State::Unscheduled),
            retries: AtomicU32::new(0),
        }
    }

    pub fn created_at(mut self, created: DateTime<Utc>) -> Self {
        self.created = created;
        self
    }

    pub fn submitted_by(mut self, submitter: Submitter) -> Self {
        self.submitter = Some(submitter);
        self
    }

    /// Shorthand for a submitter known only by DN.
    pub fn owned_by(self, dn: impl Into<String>) -> Self {
        self.submitted_by(Submitter::with_dn(dn))
    }

    pub fn from_host(mut self, host: impl Into<String>) -> Self {
        self.client_host = Some(host.into());
        self
    }

    pub fn for_file(mut self, surl: impl Into<String>) -> Self {
        self.surl = Some(surl.into());
        self
    }

    /// Move the job to `next`, returning the previous state.
    ///
    /// A transition to the current state is accepted and changes nothing;
    /// callers compare the returned state to detect it.
    pub fn transition(&self, next: State) -> SchedResult<State> {
        self.begin_transition(next).map(|t| t.previous())
    }

    /// Move the job to `next` and keep the change private until the
    /// returned guard is dropped. The driver notifies listeners while
    /// holding it.
    pub fn begin_transition(&self, next: State) -> SchedResult<StateTransition<'_>> {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let previous = *guard;
        if previous != next {
            if !previous.can_transition_to(next) {
                return Err(SchedError::IllegalStateTransition {
                    job: self.id,
                    from: previous,
                    to: next,
                });
            }
            *guard = next;
        }
        Ok(StateTransition { guard, previous })
    }

    /// How many times execution of this job was retried.
    pub fn retries(&self) -> u32 {
        self.retries.load(Ordering::Relaxed)
    }

    /// Count one more retry, returning the new total.
    pub fn record_retry(&self) -> u32 {
        self.retries.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl Default for JobRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl Job for JobRecord {
    fn id(&self) -> JobId {
        self.id
    }

    fn creation_time(&self) -> DateTime<Utc> {
        self.created
    }

    fn state(&self) -> State {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn submitter(&self) -> Option<&Submitter> {
        self.submitter.as_ref()
    }

    fn client_host(&self) -> Option<&str> {
        self.client_host.as_deref()
    }

    fn surl_or_file_path(&self) -> Option<&str> {
        self.surl.as_deref()
    }
}
