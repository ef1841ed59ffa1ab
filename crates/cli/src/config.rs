use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use srm_sched::{StaticTapeInformant, StrategyContext};
use srm_sched_core::SchedulerSettings;
use tracing::debug;

/// Load settings from `path`, or defaults with environment overrides.
pub fn load_settings(path: Option<&Path>) -> Result<SchedulerSettings> {
    let settings = match path {
        Some(path) => SchedulerSettings::from_file(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => {
            debug!("no settings file given, using defaults");
            let mut settings = SchedulerSettings::default();
            settings.apply_env_overrides();
            settings.validate().context("invalid settings")?;
            settings
        }
    };
    Ok(settings)
}

/// Strategy context with an in-memory tape informant, so every provider
/// (tape recall included) can be built from the command line.
pub fn context(settings: &SchedulerSettings, informant: Arc<StaticTapeInformant>) -> StrategyContext {
    StrategyContext::from_settings(settings).with_tape_informant(informant)
}
