use thiserror::Error;

use crate::job::JobId;
use crate::state::State;

#[derive(Error, Debug)]
pub enum SchedError {
    #[error("unknown discriminator: {0}")]
    UnknownDiscriminator(String),

    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error("invalid value '{value}' for option '{key}': {reason}")]
    InvalidOption {
        key: String,
        value: String,
        reason: String,
    },

    #[error("missing collaborator: {0}")]
    MissingCollaborator(String),

    #[error("illegal state transition for job {job}: {from} -> {to}")]
    IllegalStateTransition { job: JobId, from: State, to: State },

    #[error("job not found: {0}")]
    JobNotFound(JobId),

    #[error("config error: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config I/O error: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("scheduler is not running")]
    NotRunning,

    #[error("scheduler is already running")]
    AlreadyRunning,
}

pub type SchedResult<T> = Result<T, SchedError>;
