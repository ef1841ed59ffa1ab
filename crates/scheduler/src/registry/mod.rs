//! Name → provider tables for scheduling and transfer strategies.
//!
//! Providers are registered explicitly as factory closures at startup.
//! Building a strategy instantiates a fresh provider, applies the option
//! map of the matching settings section and asks it for the strategy.

mod options;
mod providers;

pub use options::{parse_duration, ProviderOptions};
pub use providers::{
    FairShareProvider, FifoProvider, FirstComeFirstServedProvider, InProgressFairShareProvider,
    SchedulingStrategyProvider, TapeRecallProvider, ThroughputFairShareProvider,
    TransferStrategyProvider, DEFAULT_DISCRIMINATOR, DISCRIMINATOR_OPTION,
};

use std::collections::BTreeMap;
use std::sync::Arc;

use srm_sched_core::{DiscriminatorRegistry, SchedError, SchedResult, SchedulerSettings, StrategySection};

use crate::strategy::tape::TapeInformant;
use crate::strategy::SchedulingStrategy;
use crate::transfer::TransferStrategy;

type SchedulingFactory = Box<dyn Fn() -> Box<dyn SchedulingStrategyProvider> + Send + Sync>;
type TransferFactory = Box<dyn Fn() -> Box<dyn TransferStrategyProvider> + Send + Sync>;

/// Everything a provider may need from its surroundings.
#[derive(Clone)]
pub struct StrategyContext {
    pub scheduler_id: String,
    pub max_ready_jobs: usize,
    pub discriminators: DiscriminatorRegistry,
    /// Only the tape recall strategy needs this.
    pub tape_informant: Option<Arc<dyn TapeInformant>>,
}

impl StrategyContext {
    pub fn new(scheduler_id: impl Into<String>, max_ready_jobs: usize) -> Self {
        Self {
            scheduler_id: scheduler_id.into(),
            max_ready_jobs,
            discriminators: DiscriminatorRegistry::with_defaults(),
            tape_informant: None,
        }
    }

    pub fn from_settings(settings: &SchedulerSettings) -> Self {
        Self::new(settings.scheduler.id.clone(), settings.scheduler.max_ready_jobs)
    }

    pub fn with_tape_informant(mut self, informant: Arc<dyn TapeInformant>) -> Self {
        self.tape_informant = Some(informant);
        self
    }

    pub fn with_discriminators(mut self, discriminators: DiscriminatorRegistry) -> Self {
        self.discriminators = discriminators;
        self
    }
}

pub struct StrategyRegistry {
    scheduling: BTreeMap<&'static str, SchedulingFactory>,
    transfer: BTreeMap<&'static str, TransferFactory>,
}

impl StrategyRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            scheduling: BTreeMap::new(),
            transfer: BTreeMap::new(),
        }
    }

    /// Registry holding every built-in provider.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_scheduling(|| Box::new(FifoProvider));
        registry.register_scheduling(|| Box::new(ThroughputFairShareProvider::default()));
        registry.register_scheduling(|| Box::new(InProgressFairShareProvider::default()));
        registry.register_scheduling(|| Box::new(TapeRecallProvider::default()));
        registry.register_transfer(|| Box::new(FirstComeFirstServedProvider));
        registry.register_transfer(|| Box::new(FairShareProvider::default()));
        registry
    }

    /// Register a scheduling provider factory under the provider's name.
    /// A later registration with the same name replaces the earlier one.
    pub fn register_scheduling<F>(&mut self, factory: F)
    where
        F: Fn() -> Box<dyn SchedulingStrategyProvider> + Send + Sync + 'static,
    {
        let name = factory().name();
        self.scheduling.insert(name, Box::new(factory));
    }

    pub fn register_transfer<F>(&mut self, factory: F)
    where
        F: Fn() -> Box<dyn TransferStrategyProvider> + Send + Sync + 'static,
    {
        let name = factory().name();
        self.transfer.insert(name, Box::new(factory));
    }

    pub fn scheduling_names(&self) -> Vec<&'static str> {
        self.scheduling.keys().copied().collect()
    }

    pub fn transfer_names(&self) -> Vec<&'static str> {
        self.transfer.keys().copied().collect()
    }

    pub fn build_scheduling(
        &self,
        section: &StrategySection,
        ctx: &StrategyContext,
    ) -> SchedResult<Arc<dyn SchedulingStrategy>> {
        let factory = self
            .scheduling
            .get(section.strategy.as_str())
            .ok_or_else(|| SchedError::UnknownStrategy(section.strategy.clone()))?;
        let mut provider = factory();
        provider.set_configuration(&section.options)?;
        provider.create_strategy(ctx)
    }

    pub fn build_transfer(
        &self,
        section: &StrategySection,
        ctx: &StrategyContext,
    ) -> SchedResult<Arc<dyn TransferStrategy>> {
        let factory = self
            .transfer
            .get(section.strategy.as_str())
            .ok_or_else(|| SchedError::UnknownStrategy(section.strategy.clone()))?;
        let mut provider = factory();
        provider.set_configuration(&section.options)?;
        provider.create_strategy(ctx)
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
