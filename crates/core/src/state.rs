use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a scheduled job.
///
/// The driver owns the authoritative state; strategies only observe
/// transitions through state-change notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum State {
    /// Known to the driver but not yet handed to a scheduling strategy.
    Unscheduled,
    /// Waiting in a scheduling strategy for an execution slot.
    Queued,
    /// Actively being processed.
    InProgress,
    /// Execution hit a temporary error; waiting out the retry timeout
    /// before going back to the queue.
    RetryWait,
    /// Ready-queued: eligible for a transfer slot but not holding one.
    Rqueued,
    /// Holds a transfer slot.
    Ready,
    Transferring,
    Done,
    Failed,
    Canceled,
}

impl State {
    pub const ALL: [State; 10] = [
        State::Unscheduled,
        State::Queued,
        State::InProgress,
        State::RetryWait,
        State::Rqueued,
        State::Ready,
        State::Transferring,
        State::Done,
        State::Failed,
        State::Canceled,
    ];

    /// Terminal states: no further transitions are possible.
    pub fn is_final(self) -> bool {
        matches!(self, State::Done | State::Failed | State::Canceled)
    }

    /// Whether a job in `self` may move to `next`.
    pub fn can_transition_to(self, next: State) -> bool {
        use State::*;
        match self {
            Unscheduled => matches!(next, Queued | InProgress | Done | Failed | Canceled),
            Queued => matches!(next, InProgress | Failed | Canceled),
            InProgress => {
                matches!(next, Queued | RetryWait | Rqueued | Ready | Done | Failed | Canceled)
            }
            RetryWait => matches!(next, Queued | Failed | Canceled),
            Rqueued => matches!(next, Ready | Failed | Canceled),
            Ready => matches!(next, Transferring | Done | Failed | Canceled),
            Transferring => matches!(next, Done | Failed | Canceled),
            Done | Failed | Canceled => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            State::Unscheduled => "UNSCHEDULED",
            State::Queued => "QUEUED",
            State::InProgress => "INPROGRESS",
            State::RetryWait => "RETRYWAIT",
            State::Rqueued => "RQUEUED",
            State::Ready => "READY",
            State::Transferring => "TRANSFERRING",
            State::Done => "DONE",
            State::Failed => "FAILED",
            State::Canceled => "CANCELED",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for State {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        State::ALL
            .iter()
            .copied()
            .find(|state| state.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown job state: {s}"))
    }
}
