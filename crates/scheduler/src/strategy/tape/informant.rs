use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::locks::{read, write};

/// Where a file lives on tape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapefileInfo {
    pub tape: String,
    pub file_size: u64,
}

/// Cached tape metadata. Sizes in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapeInfo {
    pub capacity: u64,
    pub used_space: u64,
}

#[derive(Debug, Error)]
pub enum InformantError {
    #[error("tape informant unavailable: {0}")]
    Unavailable(String),

    #[error("tape informant lookup failed: {0}")]
    Lookup(String),
}

/// Source of tape location metadata.
///
/// Calls may block. Both lookups may answer partially: a missing key means
/// "not known yet" and is retried on the next refresh.
pub trait TapeInformant: Send + Sync {
    fn tapefile_infos(
        &self,
        file_ids: &[String],
    ) -> Result<HashMap<String, TapefileInfo>, InformantError>;

    fn tape_infos(&self, tape_names: &[String]) -> Result<HashMap<String, TapeInfo>, InformantError>;
}

/// In-memory informant backed by fixed tables. Can be switched into a
/// failing mode to simulate an unreachable catalogue.
#[derive(Debug, Default)]
pub struct StaticTapeInformant {
    files: RwLock<HashMap<String, TapefileInfo>>,
    tapes: RwLock<HashMap<String, TapeInfo>>,
    failing: AtomicBool,
}

impl StaticTapeInformant {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `file_id` lives on `tape` with the given size.
    pub fn insert_file(&self, file_id: impl Into<String>, tape: impl Into<String>, file_size: u64) {
        write(&self.files).insert(
            file_id.into(),
            TapefileInfo {
                tape: tape.into(),
                file_size,
            },
        );
    }

    pub fn insert_tape(&self, tape: impl Into<String>, capacity: u64, used_space: u64) {
        write(&self.tapes).insert(tape.into(), TapeInfo { capacity, used_space });
    }

    /// Make every lookup fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    fn check(&self) -> Result<(), InformantError> {
        if self.failing.load(Ordering::Relaxed) {
            Err(InformantError::Unavailable("informant switched to failing mode".into()))
        } else {
            Ok(())
        }
    }
}

impl TapeInformant for StaticTapeInformant {
    fn tapefile_infos(
        &self,
        file_ids: &[String],
    ) -> Result<HashMap<String, TapefileInfo>, InformantError> {
        self.check()?;
        let files = read(&self.files);
        Ok(file_ids
            .iter()
            .filter_map(|id| files.get(id).map(|info| (id.clone(), info.clone())))
            .collect())
    }

    fn tape_infos(&self, tape_names: &[String]) -> Result<HashMap<String, TapeInfo>, InformantError> {
        self.check()?;
        let tapes = read(&self.tapes);
        Ok(tape_names
            .iter()
            .filter_map(|name| tapes.get(name).map(|info| (name.clone(), *info)))
            .collect())
    }
}
