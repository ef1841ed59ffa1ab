//! Job discriminators: pure functions grouping jobs into fairness buckets.
//!
//! A discriminator maps a job to a string key (for example the owner's DN).
//! Jobs lacking the attribute fall into the empty-string group. Implementations
//! are looked up by name through a [`DiscriminatorRegistry`].

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{SchedError, SchedResult};
use crate::job::Job;

/// Groups jobs by some stable attribute.
pub trait JobDiscriminator: Send + Sync {
    /// Registry key identifying this discriminator (e.g. `"owner"`).
    fn key(&self) -> &str;

    /// Group of `job`. Never fails; missing attributes yield `""`.
    fn discriminating_value(&self, job: &dyn Job) -> String;
}

/// Discriminator reading a single job attribute.
pub struct AttributeDiscriminator {
    key: &'static str,
    extract: fn(&dyn Job) -> Option<String>,
}

impl AttributeDiscriminator {
    pub const fn new(key: &'static str, extract: fn(&dyn Job) -> Option<String>) -> Self {
        Self { key, extract }
    }
}

impl JobDiscriminator for AttributeDiscriminator {
    fn key(&self) -> &str {
        self.key
    }

    fn discriminating_value(&self, job: &dyn Job) -> String {
        (self.extract)(job).unwrap_or_default()
    }
}

fn owner(job: &dyn Job) -> Option<String> {
    job.submitter()?.dn.clone()
}

fn uid(job: &dyn Job) -> Option<String> {
    job.submitter()?.uid.map(|uid| uid.to_string())
}

fn gid(job: &dyn Job) -> Option<String> {
    job.submitter()?.gid.map(|gid| gid.to_string())
}

fn vo_group(job: &dyn Job) -> Option<String> {
    job.submitter()?.vo_group.clone()
}

fn vo_role(job: &dyn Job) -> Option<String> {
    job.submitter()?.vo_role.clone()
}

fn client_host(job: &dyn Job) -> Option<String> {
    job.client_host().map(str::to_string)
}

/// Puts every job in the same group. Round-robin over a single group is FIFO.
pub struct ConstantDiscriminator;

impl JobDiscriminator for ConstantDiscriminator {
    fn key(&self) -> &str {
        "none"
    }

    fn discriminating_value(&self, _job: &dyn Job) -> String {
        String::new()
    }
}

/// Name-keyed table of discriminators.
#[derive(Clone)]
pub struct DiscriminatorRegistry {
    entries: BTreeMap<String, Arc<dyn JobDiscriminator>>,
}

impl DiscriminatorRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Registry holding the built-in discriminators.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(AttributeDiscriminator::new("owner", owner)));
        registry.register(Arc::new(AttributeDiscriminator::new("uid", uid)));
        registry.register(Arc::new(AttributeDiscriminator::new("gid", gid)));
        registry.register(Arc::new(AttributeDiscriminator::new("vogroup", vo_group)));
        registry.register(Arc::new(AttributeDiscriminator::new("vorole", vo_role)));
        registry.register(Arc::new(AttributeDiscriminator::new("client-host", client_host)));
        registry.register(Arc::new(ConstantDiscriminator));
        registry
    }

    /// Register `discriminator` under its own key, replacing any previous entry.
    pub fn register(&mut self, discriminator: Arc<dyn JobDiscriminator>) {
        self.entries
            .insert(discriminator.key().to_string(), discriminator);
    }

    /// Look up a discriminator. An unknown key is a configuration error.
    pub fn get(&self, key: &str) -> SchedResult<Arc<dyn JobDiscriminator>> {
        self.entries
            .get(key)
            .cloned()
            .ok_or_else(|| SchedError::UnknownDiscriminator(key.to_string()))
    }

    /// Registered keys in sorted order.
    pub fn keys(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }
}

impl Default for DiscriminatorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
