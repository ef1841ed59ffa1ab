//! Scheduling and fair-dispatch engine for asynchronous transfer and recall jobs.
//!
//! - [`strategy`]: orders queued jobs (FIFO, throughput fair share,
//!   in-progress fair share, tape recall batching).
//! - [`transfer`]: admission gates deciding whether a job may take a
//!   transfer slot.
//! - [`registry`]: name → provider tables used to build both from settings.
//! - [`driver`]: reference scheduler owning job state and feeding the strategies.

pub mod driver;
pub mod keyed;
mod locks;
pub mod multiset;
pub mod registry;
pub mod strategy;
pub mod transfer;

pub use driver::{ExecutionError, JobExecutor, Scheduler, SchedulerStats};
pub use keyed::KeyedQueues;
pub use multiset::CountingMultiset;
pub use registry::{
    SchedulingStrategyProvider, StrategyContext, StrategyRegistry, TransferStrategyProvider,
};
pub use strategy::tape::{
    ConfiguredRequirementsChecker, InformantError, StaticTapeInformant, TapeInfo, TapeInformant,
    TapeRecallSchedulingStrategy, TapeRequirementsChecker, TapeStats, TapefileInfo,
};
pub use strategy::{
    InProgressFairShareStrategy, SchedulingStrategy, StateChangeListener,
    ThroughputFairShareStrategy,
};
pub use transfer::{FairShareTransferStrategy, FirstComeFirstServedStrategy, TransferStrategy};
