//! Resumable bulk operations
//!
//! Imports and deletes run as stage machines whose progress is checkpointed
//! after every unit of work. A process that dies mid-operation picks up from
//! the last checkpoint with [`BulkOperationController::resume`]; every stage is
//! safe to run again from its last persisted counters.
//!
//! The database lock is taken per unit of work and never held across a
//! catalog call.

pub mod delete;
pub mod guard;
pub mod import;
pub mod progress;

pub use guard::{GuardTicket, OperationGuard};
pub use progress::{LogProgress, ProgressReporter};

use crate::checkpoint::{
    Checkpoint, CheckpointPort, CheckpointStore, ImportCounters, ImportMode, OperationKind,
    PersistOutcome,
};
use crate::config::BulkConfig;
use crate::error::BulkResult;
use crate::models::ContainerKind;
use mtg_common::CardCatalog;
use rusqlite::Connection;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Import a decklist into a new container
#[derive(Debug, Clone, PartialEq)]
pub struct ImportRequest {
    pub container_name: String,
    pub kind: ContainerKind,
    /// Decklist text, one card per line
    pub text: String,
    pub include_sideboard: bool,
    pub mode: ImportMode,
}

impl ImportRequest {
    /// Import into a deck without format, keeping the sideboard
    pub fn deck(name: &str, text: &str) -> Self {
        Self {
            container_name: name.to_string(),
            kind: ContainerKind::Deck {
                format: None,
                commander: None,
            },
            text: text.to_string(),
            include_sideboard: true,
            mode: ImportMode::Collection,
        }
    }
}

/// Delete a container, optionally with the owned cards allocated to it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteRequest {
    pub container_id: i64,
    pub delete_cards: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OperationRequest {
    Import(ImportRequest),
    Delete(DeleteRequest),
}

impl OperationRequest {
    pub fn kind(&self) -> OperationKind {
        match self {
            OperationRequest::Import(_) => OperationKind::Import,
            OperationRequest::Delete(_) => OperationKind::Delete,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportReport {
    pub container_id: i64,
    pub container_name: String,
    /// Parsed decklist lines
    pub entries: usize,
    /// Distinct (card, section) pairs written to the inventory
    pub cards_saved: usize,
    pub counters: ImportCounters,
    /// Some checkpoint write did not land durably
    pub checkpoint_degraded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    pub container_id: i64,
    pub container_name: String,
    pub card_count: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub checkpoint_degraded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationReport {
    Import(ImportReport),
    Delete(DeleteReport),
}

/// How a `start` or `resume` call ended
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutcome {
    Completed(OperationReport),
    /// A stage failed; the checkpoint records it and the operation can be resumed
    Failed { stage: String, message: String },
    /// An operation of the same kind is already running
    Rejected,
    NothingToResume,
}

/// Per-run state shared by the stage functions
pub(crate) struct RunContext<'a> {
    progress: &'a dyn ProgressReporter,
    percent: u8,
    degraded: bool,
}

impl<'a> RunContext<'a> {
    fn new(progress: &'a dyn ProgressReporter) -> Self {
        Self {
            progress,
            percent: 0,
            degraded: false,
        }
    }

    fn update(&mut self, percent: u8, message: &str) {
        self.percent = percent;
        self.progress.update(percent, message);
    }
}

/// Runs imports and deletes against the shared database
pub struct BulkOperationController<C: CardCatalog, P: CheckpointPort> {
    db: Arc<Mutex<Connection>>,
    catalog: C,
    store: Mutex<CheckpointStore<P>>,
    guard: Arc<OperationGuard>,
    config: BulkConfig,
}

impl<C: CardCatalog, P: CheckpointPort> BulkOperationController<C, P> {
    pub fn new(
        db: Arc<Mutex<Connection>>,
        catalog: C,
        store: CheckpointStore<P>,
        guard: Arc<OperationGuard>,
        config: BulkConfig,
    ) -> Self {
        Self {
            db,
            catalog,
            store: Mutex::new(store),
            guard,
            config,
        }
    }

    pub fn db(&self) -> &Arc<Mutex<Connection>> {
        &self.db
    }

    pub fn guard(&self) -> &Arc<OperationGuard> {
        &self.guard
    }

    pub fn config(&self) -> &BulkConfig {
        &self.config
    }

    /// Current checkpoint of a kind
    pub async fn checkpoint(&self, kind: OperationKind) -> BulkResult<Option<Checkpoint>> {
        Ok(self.store.lock().await.get(kind)?)
    }

    /// Write a checkpoint through the store's retry policy
    pub async fn store_checkpoint(&self, checkpoint: &mut Checkpoint) -> BulkResult<PersistOutcome> {
        Ok(self.store.lock().await.put(checkpoint)?)
    }

    /// Unfinished operations, offered for resumption at startup
    pub async fn pending(&self) -> BulkResult<Vec<Checkpoint>> {
        Ok(self.store.lock().await.pending()?)
    }

    /// Start a new operation. Rejected while one of the same kind is running.
    ///
    /// Fails with `FatalStageFailure`, writing no checkpoint, when the import
    /// container cannot be created or the delete target does not exist.
    pub async fn start(
        &self,
        request: OperationRequest,
        progress: &dyn ProgressReporter,
    ) -> BulkResult<OperationOutcome> {
        let kind = request.kind();
        let Some(_ticket) = self.guard.try_acquire(kind) else {
            log::warn!("A {} is already running; request rejected", kind.as_str());
            return Ok(OperationOutcome::Rejected);
        };

        match request {
            OperationRequest::Import(request) => self.start_import(request, progress).await,
            OperationRequest::Delete(request) => self.start_delete(request, progress).await,
        }
    }

    /// Continue the operation recorded in the checkpoint of `kind`
    pub async fn resume(
        &self,
        kind: OperationKind,
        progress: &dyn ProgressReporter,
    ) -> BulkResult<OperationOutcome> {
        let Some(_ticket) = self.guard.try_acquire(kind) else {
            log::warn!("A {} is already running; resume rejected", kind.as_str());
            return Ok(OperationOutcome::Rejected);
        };

        let Some(record) = self.checkpoint(kind).await? else {
            return Ok(OperationOutcome::NothingToResume);
        };
        log::info!(
            "Resuming {} of '{}' at stage {}",
            kind.as_str(),
            record.container_name(),
            record.stage_name()
        );

        match record {
            Checkpoint::Import(state) => self.resume_import(state, progress).await,
            Checkpoint::Delete(state) => self.resume_delete(state, progress).await,
        }
    }

    /// Drop the checkpoint of `kind` without finishing it.
    ///
    /// Returns false when there was nothing to drop or the operation is running.
    pub async fn abandon(&self, kind: OperationKind) -> BulkResult<bool> {
        if self.guard.is_running(kind) {
            log::warn!("Cannot abandon a {} while it is running", kind.as_str());
            return Ok(false);
        }
        let Some(record) = self.checkpoint(kind).await? else {
            return Ok(false);
        };
        if let Checkpoint::Import(state) = &record {
            let conn = self.db.lock().await;
            import::clear_receipt(&conn, state.container_id)?;
        }
        self.store.lock().await.clear(kind)?;
        log::info!(
            "Abandoned {} of '{}' at stage {}",
            kind.as_str(),
            record.container_name(),
            record.stage_name()
        );
        Ok(true)
    }

    async fn persist(&self, record: &mut Checkpoint, ctx: &mut RunContext<'_>) -> BulkResult<()> {
        let outcome = self.store.lock().await.put(record)?;
        if outcome.is_degraded() {
            if !ctx.degraded {
                let message = match outcome {
                    PersistOutcome::Stripped => {
                        "Progress storage is full; saved a reduced checkpoint"
                    }
                    _ => "Progress storage is full; progress will not survive a restart",
                };
                ctx.progress.update(ctx.percent, message);
            }
            ctx.degraded = true;
        }
        Ok(())
    }

    async fn clear_checkpoint(&self, kind: OperationKind) {
        if let Err(e) = self.store.lock().await.clear(kind) {
            log::warn!("Failed to clear {} checkpoint: {}", kind.as_str(), e);
        }
    }
}

#[cfg(test)]
#[path = "bulk_tests.rs"]
mod tests;
