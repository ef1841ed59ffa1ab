//! Typed access to provider option maps.

use std::collections::HashMap;
use std::time::Duration;

use srm_sched_core::{SchedError, SchedResult};

/// Sentinel accepted for optional numeric options.
const NO_VALUE: &str = "NO_VALUE";

/// Read-only view over a provider's `key → value` options.
#[derive(Debug, Clone, Copy)]
pub struct ProviderOptions<'a> {
    options: &'a HashMap<String, String>,
}

impl<'a> ProviderOptions<'a> {
    pub fn new(options: &'a HashMap<String, String>) -> Self {
        Self { options }
    }

    pub fn string(&self, key: &str, default: &str) -> String {
        self.options
            .get(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| default.to_string())
    }

    pub fn usize(&self, key: &str, default: usize) -> SchedResult<usize> {
        match self.options.get(key) {
            None => Ok(default),
            Some(raw) => parse_number(key, raw),
        }
    }

    /// `None` when the key is absent, empty or `NO_VALUE`.
    pub fn optional_usize(&self, key: &str) -> SchedResult<Option<usize>> {
        match self.options.get(key).map(|v| v.trim()) {
            None | Some("") => Ok(None),
            Some(v) if v.eq_ignore_ascii_case(NO_VALUE) => Ok(None),
            Some(v) => parse_number(key, v).map(Some),
        }
    }

    pub fn percentage(&self, key: &str, default: u8) -> SchedResult<u8> {
        let value = self.usize(key, usize::from(default))?;
        u8::try_from(value)
            .ok()
            .filter(|pct| *pct <= 100)
            .ok_or_else(|| invalid(key, &value.to_string(), "must be between 0 and 100"))
    }

    pub fn duration(&self, key: &str, default: Duration) -> SchedResult<Duration> {
        match self.options.get(key) {
            None => Ok(default),
            Some(raw) => parse_duration(raw).map_err(|reason| invalid(key, raw, &reason)),
        }
    }

    /// Keys not contained in `known`, sorted.
    pub fn unknown_keys(&self, known: &[&str]) -> Vec<&'a str> {
        let mut unknown: Vec<&str> = self
            .options
            .keys()
            .map(String::as_str)
            .filter(|key| !known.contains(key))
            .collect();
        unknown.sort_unstable();
        unknown
    }
}

fn invalid(key: &str, value: &str, reason: &str) -> SchedError {
    SchedError::InvalidOption {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_number(key: &str, raw: &str) -> SchedResult<usize> {
    raw.trim()
        .parse()
        .map_err(|_| invalid(key, raw, "expected a non-negative integer"))
}

/// Parse `"90"` (seconds) or a number with an `ms`, `s`, `m` or `h` suffix.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(raw.len());
    let (digits, unit) = raw.split_at(split);
    let amount: u64 = digits
        .parse()
        .map_err(|_| "expected a duration such as 90, 500ms, 30s, 5m or 2h".to_string())?;
    match unit.trim() {
        "" | "s" => Ok(Duration::from_secs(amount)),
        "ms" => Ok(Duration::from_millis(amount)),
        "m" => Ok(Duration::from_secs(amount.saturating_mul(60))),
        "h" => Ok(Duration::from_secs(amount.saturating_mul(3600))),
        other => Err(format!("unknown duration unit '{other}'")),
    }
}
