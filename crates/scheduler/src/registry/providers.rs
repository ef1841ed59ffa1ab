//! Built-in strategy providers.
//!
//! A provider is configured once from its option map and then builds a
//! strategy against a [`StrategyContext`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use srm_sched_core::{SchedError, SchedResult};
use tracing::{info, warn};

use super::options::ProviderOptions;
use super::StrategyContext;
use crate::strategy::tape::{ConfiguredRequirementsChecker, TapeRecallSchedulingStrategy};
use crate::strategy::{InProgressFairShareStrategy, SchedulingStrategy, ThroughputFairShareStrategy};
use crate::transfer::{FairShareTransferStrategy, FirstComeFirstServedStrategy, TransferStrategy};

pub const DISCRIMINATOR_OPTION: &str = "discriminator";
pub const DEFAULT_DISCRIMINATOR: &str = "owner";

pub trait SchedulingStrategyProvider: Send {
    fn name(&self) -> &'static str;
    fn set_configuration(&mut self, options: &HashMap<String, String>) -> SchedResult<()>;
    fn create_strategy(&self, ctx: &StrategyContext) -> SchedResult<Arc<dyn SchedulingStrategy>>;
}

pub trait TransferStrategyProvider: Send {
    fn name(&self) -> &'static str;
    fn set_configuration(&mut self, options: &HashMap<String, String>) -> SchedResult<()>;
    fn create_strategy(&self, ctx: &StrategyContext) -> SchedResult<Arc<dyn TransferStrategy>>;
}

fn warn_unknown(provider: &str, options: &ProviderOptions<'_>, known: &[&str]) {
    for key in options.unknown_keys(known) {
        warn!(provider, option = key, "ignoring unknown strategy option");
    }
}

/// Reads the `discriminator` option shared by the keyed providers.
fn discriminator_option(provider: &str, options: &HashMap<String, String>) -> String {
    let options = ProviderOptions::new(options);
    warn_unknown(provider, &options, &[DISCRIMINATOR_OPTION]);
    options.string(DISCRIMINATOR_OPTION, DEFAULT_DISCRIMINATOR)
}

// ── Scheduling ────────────────────────────────────────────────

/// Plain arrival order: round-robin over the constant discriminator.
#[derive(Debug, Default)]
pub struct FifoProvider;

impl SchedulingStrategyProvider for FifoProvider {
    fn name(&self) -> &'static str {
        "fifo"
    }

    fn set_configuration(&mut self, options: &HashMap<String, String>) -> SchedResult<()> {
        warn_unknown(self.name(), &ProviderOptions::new(options), &[]);
        Ok(())
    }

    fn create_strategy(&self, ctx: &StrategyContext) -> SchedResult<Arc<dyn SchedulingStrategy>> {
        let none = ctx.discriminators.get("none")?;
        info!(scheduler = %ctx.scheduler_id, "using fifo scheduling");
        Ok(Arc::new(ThroughputFairShareStrategy::new(none)))
    }
}

#[derive(Debug)]
pub struct ThroughputFairShareProvider {
    discriminator: String,
}

impl Default for ThroughputFairShareProvider {
    fn default() -> Self {
        Self {
            discriminator: DEFAULT_DISCRIMINATOR.into(),
        }
    }
}

impl SchedulingStrategyProvider for ThroughputFairShareProvider {
    fn name(&self) -> &'static str {
        "throughput-fair-share"
    }

    fn set_configuration(&mut self, options: &HashMap<String, String>) -> SchedResult<()> {
        self.discriminator = discriminator_option(self.name(), options);
        Ok(())
    }

    fn create_strategy(&self, ctx: &StrategyContext) -> SchedResult<Arc<dyn SchedulingStrategy>> {
        let discriminator = ctx.discriminators.get(&self.discriminator)?;
        info!(
            scheduler = %ctx.scheduler_id,
            discriminator = %self.discriminator,
            "using throughput fair-share scheduling"
        );
        Ok(Arc::new(ThroughputFairShareStrategy::new(discriminator)))
    }
}

#[derive(Debug)]
pub struct InProgressFairShareProvider {
    discriminator: String,
}

impl Default for InProgressFairShareProvider {
    fn default() -> Self {
        Self {
            discriminator: DEFAULT_DISCRIMINATOR.into(),
        }
    }
}

impl SchedulingStrategyProvider for InProgressFairShareProvider {
    fn name(&self) -> &'static str {
        "inprogress-fair-share"
    }

    fn set_configuration(&mut self, options: &HashMap<String, String>) -> SchedResult<()> {
        self.discriminator = discriminator_option(self.name(), options);
        Ok(())
    }

    fn create_strategy(&self, ctx: &StrategyContext) -> SchedResult<Arc<dyn SchedulingStrategy>> {
        let discriminator = ctx.discriminators.get(&self.discriminator)?;
        info!(
            scheduler = %ctx.scheduler_id,
            discriminator = %self.discriminator,
            "using in-progress fair-share scheduling"
        );
        Ok(Arc::new(InProgressFairShareStrategy::new(discriminator)))
    }
}

const TAPE_OPTIONS: [&str; 7] = [
    "max-active-tapes",
    "min-tape-recall-percentage",
    "min-number-of-requests",
    "min-job-waiting-time",
    "max-job-waiting-time",
    "tapeinfoless-job-waiting-time",
    "refresh-interval",
];

#[derive(Debug)]
pub struct TapeRecallProvider {
    checker: ConfiguredRequirementsChecker,
    refresh_interval: Duration,
}

impl Default for TapeRecallProvider {
    fn default() -> Self {
        Self {
            checker: ConfiguredRequirementsChecker::default(),
            refresh_interval: Duration::from_secs(60),
        }
    }
}

impl TapeRecallProvider {
    pub fn checker(&self) -> &ConfiguredRequirementsChecker {
        &self.checker
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }
}

impl SchedulingStrategyProvider for TapeRecallProvider {
    fn name(&self) -> &'static str {
        "tape-recall-scheduling"
    }

    fn set_configuration(&mut self, options: &HashMap<String, String>) -> SchedResult<()> {
        let o = ProviderOptions::new(options);
        warn_unknown(self.name(), &o, &TAPE_OPTIONS);
        let defaults = ConfiguredRequirementsChecker::default();

        let max_active_tapes = o.usize("max-active-tapes", defaults.max_active_tapes)?;
        if max_active_tapes == 0 {
            return Err(SchedError::InvalidOption {
                key: "max-active-tapes".into(),
                value: "0".into(),
                reason: "at least one tape must be allowed".into(),
            });
        }

        // Assign only once every option parsed.
        self.checker = ConfiguredRequirementsChecker {
            max_active_tapes,
            min_tape_recall_percentage: o
                .percentage("min-tape-recall-percentage", defaults.min_tape_recall_percentage)?,
            min_number_of_requests: o.optional_usize("min-number-of-requests")?,
            min_job_waiting_time: o.duration("min-job-waiting-time", defaults.min_job_waiting_time)?,
            max_job_waiting_time: o.duration("max-job-waiting-time", defaults.max_job_waiting_time)?,
            tapeinfoless_job_waiting_time: o.duration(
                "tapeinfoless-job-waiting-time",
                defaults.tapeinfoless_job_waiting_time,
            )?,
        };
        self.refresh_interval = o.duration("refresh-interval", Duration::from_secs(60))?;
        Ok(())
    }

    fn create_strategy(&self, ctx: &StrategyContext) -> SchedResult<Arc<dyn SchedulingStrategy>> {
        let informant = ctx
            .tape_informant
            .clone()
            .ok_or_else(|| SchedError::MissingCollaborator("tape informant".into()))?;
        info!(
            scheduler = %ctx.scheduler_id,
            max_active_tapes = self.checker.max_active_tapes,
            refresh_interval = ?self.refresh_interval,
            "using tape recall scheduling"
        );
        Ok(Arc::new(TapeRecallSchedulingStrategy::new(
            informant,
            Arc::new(self.checker.clone()),
            self.refresh_interval,
        )))
    }
}

// ── Transfer ──────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct FirstComeFirstServedProvider;

impl TransferStrategyProvider for FirstComeFirstServedProvider {
    fn name(&self) -> &'static str {
        "first-come-first-served"
    }

    fn set_configuration(&mut self, options: &HashMap<String, String>) -> SchedResult<()> {
        warn_unknown(self.name(), &ProviderOptions::new(options), &[]);
        Ok(())
    }

    fn create_strategy(&self, ctx: &StrategyContext) -> SchedResult<Arc<dyn TransferStrategy>> {
        info!(scheduler = %ctx.scheduler_id, max_ready_jobs = ctx.max_ready_jobs, "using fcfs admission");
        Ok(Arc::new(FirstComeFirstServedStrategy::new(ctx.max_ready_jobs)))
    }
}

#[derive(Debug)]
pub struct FairShareProvider {
    discriminator: String,
}

impl Default for FairShareProvider {
    fn default() -> Self {
        Self {
            discriminator: DEFAULT_DISCRIMINATOR.into(),
        }
    }
}

impl TransferStrategyProvider for FairShareProvider {
    fn name(&self) -> &'static str {
        "fair-share"
    }

    fn set_configuration(&mut self, options: &HashMap<String, String>) -> SchedResult<()> {
        self.discriminator = discriminator_option(self.name(), options);
        Ok(())
    }

    fn create_strategy(&self, ctx: &StrategyContext) -> SchedResult<Arc<dyn TransferStrategy>> {
        let discriminator = ctx.discriminators.get(&self.discriminator)?;
        info!(
            scheduler = %ctx.scheduler_id,
            discriminator = %self.discriminator,
            max_ready_jobs = ctx.max_ready_jobs,
            "using fair-share admission"
        );
        Ok(Arc::new(FairShareTransferStrategy::new(discriminator, ctx.max_ready_jobs)))
    }
}
