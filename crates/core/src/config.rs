use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{SchedError, SchedResult};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

const ENV_PREFIX: &str = "SRM_SCHED";

// ── Top-level settings ────────────────────────────────────────

/// Scheduler settings, parsed from TOML with environment overrides.
///
/// ```toml
/// [scheduler]
/// id = "bring-online"
/// max_ready_jobs = 60
///
/// [scheduling]
/// strategy = "inprogress-fair-share"
/// options = { discriminator = "owner" }
///
/// [transfer]
/// strategy = "fair-share"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    #[serde(default)]
    pub scheduler: SchedulerSection,

    /// Which scheduling strategy orders queued jobs.
    #[serde(default = "default_scheduling")]
    pub scheduling: StrategySection,

    /// Which transfer strategy gates promotion to READY.
    #[serde(default = "default_transfer")]
    pub transfer: StrategySection,
}

// ── Sections ──────────────────────────────────────────────────

/// Driver limits and loop timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSection {
    #[serde(default = "default_id")]
    pub id: String,

    /// Upper bound on live (non-final) jobs; further jobs fail as "site busy".
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,

    /// Maximum number of jobs in INPROGRESS at once.
    #[serde(default = "default_max_in_progress")]
    pub max_in_progress: usize,

    /// Number of transfer slots (READY jobs).
    #[serde(default = "default_max_ready_jobs")]
    pub max_ready_jobs: usize,

    /// Dispatch loop tick in milliseconds.
    #[serde(default = "default_dispatch_interval_ms")]
    pub dispatch_interval_ms: u64,

    /// Worker threads executing jobs. 0 = available parallelism.
    #[serde(default)]
    pub worker_threads: usize,

    /// Retries granted to a job whose execution fails temporarily. Once
    /// used up, the next temporary failure fails the job.
    #[serde(default = "default_max_number_of_retries")]
    pub max_number_of_retries: u32,

    /// Time a job spends in RETRYWAIT before it is queued again.
    #[serde(default = "default_retry_timeout_ms")]
    pub retry_timeout_ms: u64,
}

/// Strategy selection: registry name plus provider-specific options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategySection {
    pub strategy: String,

    #[serde(default)]
    pub options: HashMap<String, String>,
}

fn default_id() -> String {
    "scheduler".into()
}
fn default_max_requests() -> usize {
    10_000
}
fn default_max_in_progress() -> usize {
    10
}
fn default_max_ready_jobs() -> usize {
    60
}
fn default_dispatch_interval_ms() -> u64 {
    100
}
fn default_max_number_of_retries() -> u32 {
    20
}
fn default_retry_timeout_ms() -> u64 {
    60_000
}

fn default_scheduling() -> StrategySection {
    StrategySection {
        strategy: "fifo".into(),
        options: HashMap::new(),
    }
}

fn default_transfer() -> StrategySection {
    StrategySection {
        strategy: "first-come-first-served".into(),
        options: HashMap::new(),
    }
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            id: default_id(),
            max_requests: default_max_requests(),
            max_in_progress: default_max_in_progress(),
            max_ready_jobs: default_max_ready_jobs(),
            dispatch_interval_ms: default_dispatch_interval_ms(),
            worker_threads: 0,
            max_number_of_retries: default_max_number_of_retries(),
            retry_timeout_ms: default_retry_timeout_ms(),
        }
    }
}

impl SchedulerSection {
    /// Resolve worker thread count (0 means use available parallelism).
    pub fn resolved_worker_threads(&self) -> usize {
        if self.worker_threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.worker_threads
        }
    }

    pub fn dispatch_interval(&self) -> Duration {
        Duration::from_millis(self.dispatch_interval_ms)
    }

    pub fn retry_timeout(&self) -> Duration {
        Duration::from_millis(self.retry_timeout_ms)
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            scheduler: SchedulerSection::default(),
            scheduling: default_scheduling(),
            transfer: default_transfer(),
        }
    }
}

// ── Loading & validation ──────────────────────────────────────

impl SchedulerSettings {
    /// Parse settings from a TOML string, apply env overrides and validate.
    pub fn from_toml(toml_str: &str) -> SchedResult<Self> {
        let mut settings: Self = toml::from_str(toml_str)?;
        settings.apply_env_overrides();
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> SchedResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Apply `SRM_SCHED_SECTION_KEY` environment overrides.
    ///
    /// - `SRM_SCHED_SCHEDULER_ID` → `scheduler.id`
    /// - `SRM_SCHED_SCHEDULER_MAX_REQUESTS` → `scheduler.max_requests`
    /// - `SRM_SCHED_SCHEDULER_MAX_IN_PROGRESS` → `scheduler.max_in_progress`
    /// - `SRM_SCHED_SCHEDULER_MAX_READY_JOBS` → `scheduler.max_ready_jobs`
    /// - `SRM_SCHED_SCHEDULER_DISPATCH_INTERVAL_MS` → `scheduler.dispatch_interval_ms`
    /// - `SRM_SCHED_SCHEDULER_WORKER_THREADS` → `scheduler.worker_threads`
    /// - `SRM_SCHED_SCHEDULER_MAX_NUMBER_OF_RETRIES` → `scheduler.max_number_of_retries`
    /// - `SRM_SCHED_SCHEDULER_RETRY_TIMEOUT_MS` → `scheduler.retry_timeout_ms`
    /// - `SRM_SCHED_SCHEDULING_STRATEGY` → `scheduling.strategy`
    /// - `SRM_SCHED_TRANSFER_STRATEGY` → `transfer.strategy`
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup (env vars in production).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |suffix: &str| lookup(&format!("{ENV_PREFIX}_{suffix}")).filter(|v| !v.is_empty());
        let parse_usize = |suffix: &str| get(suffix).and_then(|v| v.parse::<usize>().ok());

        if let Some(v) = get("SCHEDULER_ID") {
            self.scheduler.id = v;
        }
        if let Some(v) = parse_usize("SCHEDULER_MAX_REQUESTS") {
            self.scheduler.max_requests = v;
        }
        if let Some(v) = parse_usize("SCHEDULER_MAX_IN_PROGRESS") {
            self.scheduler.max_in_progress = v;
        }
        if let Some(v) = parse_usize("SCHEDULER_MAX_READY_JOBS") {
            self.scheduler.max_ready_jobs = v;
        }
        if let Some(v) = get("SCHEDULER_DISPATCH_INTERVAL_MS").and_then(|v| v.parse::<u64>().ok()) {
            self.scheduler.dispatch_interval_ms = v;
        }
        if let Some(v) = parse_usize("SCHEDULER_WORKER_THREADS") {
            self.scheduler.worker_threads = v;
        }
        if let Some(v) = get("SCHEDULER_MAX_NUMBER_OF_RETRIES").and_then(|v| v.parse::<u32>().ok()) {
            self.scheduler.max_number_of_retries = v;
        }
        if let Some(v) = get("SCHEDULER_RETRY_TIMEOUT_MS").and_then(|v| v.parse::<u64>().ok()) {
            self.scheduler.retry_timeout_ms = v;
        }
        if let Some(v) = get("SCHEDULING_STRATEGY") {
            self.scheduling.strategy = v;
        }
        if let Some(v) = get("TRANSFER_STRATEGY") {
            self.transfer.strategy = v;
        }
    }

    /// Check limits and names. Whether a strategy name is actually
    /// registered is checked when the strategies are built.
    pub fn validate(&self) -> SchedResult<()> {
        if self.scheduler.id.trim().is_empty() {
            return Err(SchedError::Config("scheduler.id must not be empty".into()));
        }
        for (name, value) in [
            ("scheduler.max_requests", self.scheduler.max_requests),
            ("scheduler.max_in_progress", self.scheduler.max_in_progress),
            ("scheduler.max_ready_jobs", self.scheduler.max_ready_jobs),
        ] {
            if value == 0 {
                return Err(SchedError::Config(format!("{name} must be positive")));
            }
        }
        if self.scheduling.strategy.trim().is_empty() {
            return Err(SchedError::Config("scheduling.strategy must not be empty".into()));
        }
        if self.transfer.strategy.trim().is_empty() {
            return Err(SchedError::Config("transfer.strategy must not be empty".into()));
        }
        Ok(())
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Scheduler settings (id: {}):", self.scheduler.id);
        tracing::info!(
            "  limits:      max_requests={}, max_in_progress={}, max_ready_jobs={}",
            self.scheduler.max_requests,
            self.scheduler.max_in_progress,
            self.scheduler.max_ready_jobs
        );
        tracing::info!(
            "  retries:     max={}, timeout={}ms",
            self.scheduler.max_number_of_retries,
            self.scheduler.retry_timeout_ms
        );
        tracing::info!("  scheduling:  {} {:?}", self.scheduling.strategy, self.scheduling.options);
        tracing::info!("  transfer:    {} {:?}", self.transfer.strategy, self.transfer.options);
    }
}
