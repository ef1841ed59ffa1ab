pub mod config;
pub mod discriminator;
pub mod error;
pub mod job;
pub mod state;

pub use config::{load_dotenv, SchedulerSection, SchedulerSettings, StrategySection};
pub use discriminator::{DiscriminatorRegistry, JobDiscriminator};
pub use error::*;
pub use job::{Job, JobId, JobRecord, StateTransition, Submitter};
pub use state::State;
