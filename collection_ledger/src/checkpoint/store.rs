//! Checkpoint store with graceful degradation when storage is full

use super::port::CheckpointPort;
use super::{Checkpoint, OperationKind};
use crate::error::CheckpointResult;
use std::collections::HashMap;

/// How durably the last `put` landed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    /// Full record written to storage
    Durable,
    /// Only the stripped record fit; the full record is kept in memory
    Stripped,
    /// Nothing fit; the record survives only for this process
    MemoryOnly,
}

impl PersistOutcome {
    pub fn is_degraded(&self) -> bool {
        !matches!(self, PersistOutcome::Durable)
    }
}

/// Wraps a [`CheckpointPort`] with the retry ladder used on full storage:
///
/// 1. write the record
/// 2. clear the other kind's checkpoint and write again
/// 3. write the stripped record
/// 4. keep the record in memory only
pub struct CheckpointStore<P: CheckpointPort> {
    port: P,
    fallback: HashMap<OperationKind, Checkpoint>,
}

impl<P: CheckpointPort> CheckpointStore<P> {
    pub fn new(port: P) -> Self {
        Self {
            port,
            fallback: HashMap::new(),
        }
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Persist a checkpoint, bumping its version first.
    ///
    /// Errors other than full storage are returned as-is.
    pub fn put(&mut self, checkpoint: &mut Checkpoint) -> CheckpointResult<PersistOutcome> {
        checkpoint.bump_version();
        let kind = checkpoint.kind();

        match self.port.put(kind, checkpoint) {
            Ok(()) => {
                self.fallback.remove(&kind);
                return Ok(PersistOutcome::Durable);
            }
            Err(e) if e.is_storage_full() => {
                log::warn!("{} checkpoint does not fit: {}", kind.as_str(), e)
            }
            Err(e) => return Err(e),
        }

        log::warn!(
            "Clearing {} checkpoint to make room for {}",
            kind.other().as_str(),
            kind.as_str()
        );
        self.port.clear(kind.other())?;
        match self.port.put(kind, checkpoint) {
            Ok(()) => {
                self.fallback.remove(&kind);
                return Ok(PersistOutcome::Durable);
            }
            Err(e) if e.is_storage_full() => {}
            Err(e) => return Err(e),
        }

        let stripped = checkpoint.stripped();
        match self.port.put(kind, &stripped) {
            Ok(()) => {
                log::warn!("Stored stripped {} checkpoint", kind.as_str());
                self.fallback.insert(kind, checkpoint.clone());
                return Ok(PersistOutcome::Stripped);
            }
            Err(e) if e.is_storage_full() => {}
            Err(e) => return Err(e),
        }

        log::warn!(
            "{} checkpoint kept in memory only; progress will not survive a restart",
            kind.as_str()
        );
        self.fallback.insert(kind, checkpoint.clone());
        Ok(PersistOutcome::MemoryOnly)
    }

    /// Current checkpoint of a kind, preferring the in-memory record
    pub fn get(&self, kind: OperationKind) -> CheckpointResult<Option<Checkpoint>> {
        if let Some(record) = self.fallback.get(&kind) {
            return Ok(Some(record.clone()));
        }
        self.port.get(kind)
    }

    pub fn clear(&mut self, kind: OperationKind) -> CheckpointResult<()> {
        self.fallback.remove(&kind);
        self.port.clear(kind)
    }

    /// Checkpoints that still have work left, in kind order
    pub fn pending(&self) -> CheckpointResult<Vec<Checkpoint>> {
        let mut pending = Vec::new();
        for kind in OperationKind::ALL {
            if let Some(record) = self.get(kind)? {
                if !record.is_complete() {
                    pending.push(record);
                }
            }
        }
        Ok(pending)
    }
}
