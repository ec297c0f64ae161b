use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::record::BookRecord;

#[derive(Debug, Error)]
pub enum StagingError {
    /// Nothing was ever staged: upstream did not run, as opposed to producing zero records.
    #[error("no book data has been staged")]
    EmptyHandoff,

    #[error("a batch is already staged")]
    AlreadyStaged,

    #[error("staged batch was already consumed")]
    AlreadyConsumed,

    #[error("staging file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("staging file {path} is not a valid batch: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Records handed from extraction to load, with when and for what target they were produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedBatch {
    pub staged_at: DateTime<Utc>,
    pub target_count: usize,
    pub records: Vec<BookRecord>,
}

impl StagedBatch {
    pub fn new(target_count: usize, records: Vec<BookRecord>) -> Self {
        Self {
            staged_at: Utc::now(),
            target_count,
            records,
        }
    }
}

#[derive(Debug, Default)]
enum Slot {
    #[default]
    Empty,
    Staged(StagedBatch),
    Consumed,
}

/// Single-writer, single-reader handoff inside one process.
#[derive(Debug, Default)]
pub struct StagingSlot {
    slot: Slot,
}

impl StagingSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&mut self, batch: StagedBatch) -> Result<(), StagingError> {
        match self.slot {
            Slot::Empty => {
                self.slot = Slot::Staged(batch);
                Ok(())
            }
            Slot::Staged(_) | Slot::Consumed => Err(StagingError::AlreadyStaged),
        }
    }

    pub fn take(&mut self) -> Result<StagedBatch, StagingError> {
        match std::mem::replace(&mut self.slot, Slot::Consumed) {
            Slot::Staged(batch) => Ok(batch),
            Slot::Empty => {
                self.slot = Slot::Empty;
                Err(StagingError::EmptyHandoff)
            }
            Slot::Consumed => Err(StagingError::AlreadyConsumed),
        }
    }
}

/// Handoff across separate `extract` and `load` invocations. A missing file means
/// nothing was staged; taking the batch deletes the file. Staging over a batch that
/// was never taken replaces it, so a failed `load` does not block the next run.
pub struct StagingFile {
    path: PathBuf,
}

impl StagingFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn stage(&self, batch: &StagedBatch) -> Result<(), StagingError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io(e))?;
        }

        let json = serde_json::to_vec_pretty(batch).map_err(|source| StagingError::Decode {
            path: self.path.clone(),
            source,
        })?;

        if self.path.exists() {
            warn!(
                "Discarding unconsumed batch at {} from an earlier run",
                self.path.display()
            );
        }
        // write aside then rename, so a reader never sees a half-written batch
        let tmp = self.tmp_path();
        fs::write(&tmp, json).map_err(|e| self.io(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io(e))?;
        info!(
            "Staged {} books to {}",
            batch.records.len(),
            self.path.display()
        );
        Ok(())
    }

    pub fn take(&self) -> Result<StagedBatch, StagingError> {
        let bytes = match fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StagingError::EmptyHandoff)
            }
            Err(e) => return Err(self.io(e)),
        };
        let batch: StagedBatch =
            serde_json::from_slice(&bytes).map_err(|source| StagingError::Decode {
                path: self.path.clone(),
                source,
            })?;
        fs::remove_file(&self.path).map_err(|e| self.io(e))?;
        Ok(batch)
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }

    fn io(&self, source: io::Error) -> StagingError {
        StagingError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
