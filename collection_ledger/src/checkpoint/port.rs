//! Checkpoint storage backends

use super::{Checkpoint, OperationKind};
use crate::error::{CheckpointError, CheckpointResult};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Key-value storage for one checkpoint per operation kind
pub trait CheckpointPort: Send {
    /// Store the checkpoint, replacing any previous record of the same kind
    fn put(&mut self, kind: OperationKind, checkpoint: &Checkpoint) -> CheckpointResult<()>;

    fn get(&self, kind: OperationKind) -> CheckpointResult<Option<Checkpoint>>;

    /// Remove the record; clearing an absent record is not an error
    fn clear(&mut self, kind: OperationKind) -> CheckpointResult<()>;
}

fn check_quota(quota: Option<usize>, used_by_others: usize, needed: usize) -> CheckpointResult<()> {
    if let Some(limit) = quota {
        if used_by_others + needed > limit {
            return Err(CheckpointError::StorageFull {
                needed,
                available: limit.saturating_sub(used_by_others),
            });
        }
    }
    Ok(())
}

/// In-process storage holding serialized records, with an optional byte quota
/// shared by all kinds
#[derive(Debug, Default)]
pub struct MemoryCheckpointPort {
    records: HashMap<OperationKind, String>,
    quota: Option<usize>,
}

impl MemoryCheckpointPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(bytes: usize) -> Self {
        Self {
            records: HashMap::new(),
            quota: Some(bytes),
        }
    }

    pub fn set_quota(&mut self, quota: Option<usize>) {
        self.quota = quota;
    }

    /// Bytes currently stored across all kinds
    pub fn used_bytes(&self) -> usize {
        self.records.values().map(|r| r.len()).sum()
    }
}

impl CheckpointPort for MemoryCheckpointPort {
    fn put(&mut self, kind: OperationKind, checkpoint: &Checkpoint) -> CheckpointResult<()> {
        let json = serde_json::to_string(checkpoint)?;
        let used_by_others: usize = self
            .records
            .iter()
            .filter(|(k, _)| **k != kind)
            .map(|(_, r)| r.len())
            .sum();
        check_quota(self.quota, used_by_others, json.len())?;
        self.records.insert(kind, json);
        Ok(())
    }

    fn get(&self, kind: OperationKind) -> CheckpointResult<Option<Checkpoint>> {
        match self.records.get(&kind) {
            Some(json) => Ok(Some(serde_json::from_str(json)?)),
            None => Ok(None),
        }
    }

    fn clear(&mut self, kind: OperationKind) -> CheckpointResult<()> {
        self.records.remove(&kind);
        Ok(())
    }
}

/// One JSON file per kind inside a directory.
///
/// Writes go to a temp file that is synced and renamed over the target, so a
/// crash leaves either the old or the new record, never a torn one.
#[derive(Debug, Clone)]
pub struct FileCheckpointPort {
    dir: PathBuf,
    quota: Option<usize>,
}

impl FileCheckpointPort {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            quota: None,
        }
    }

    pub fn with_quota(dir: impl Into<PathBuf>, bytes: Option<usize>) -> Self {
        Self {
            dir: dir.into(),
            quota: bytes,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, kind: OperationKind) -> PathBuf {
        self.dir.join(format!("{}.checkpoint.json", kind.as_str()))
    }

    fn file_size(path: &Path) -> usize {
        fs::metadata(path).map(|m| m.len() as usize).unwrap_or(0)
    }
}

impl CheckpointPort for FileCheckpointPort {
    fn put(&mut self, kind: OperationKind, checkpoint: &Checkpoint) -> CheckpointResult<()> {
        let json = serde_json::to_string_pretty(checkpoint)?;
        let used_by_others = Self::file_size(&self.path_for(kind.other()));
        check_quota(self.quota, used_by_others, json.len())?;

        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(kind);
        let temp_path = path.with_extension("json.tmp");

        let mut file = fs::File::create(&temp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        drop(file);
        fs::rename(&temp_path, &path)?;

        log::debug!(
            "Saved {} checkpoint ({} bytes) to {}",
            kind.as_str(),
            json.len(),
            path.display()
        );
        Ok(())
    }

    fn get(&self, kind: OperationKind) -> CheckpointResult<Option<Checkpoint>> {
        let path = self.path_for(kind);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn clear(&mut self, kind: OperationKind) -> CheckpointResult<()> {
        match fs::remove_file(self.path_for(kind)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
