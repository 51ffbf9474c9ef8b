//! Durable progress records for bulk operations
//!
//! One checkpoint per operation kind. Records serialize to camelCase JSON;
//! the storage backend is behind [`CheckpointPort`] and the degradation
//! policy for full storage lives in [`CheckpointStore`].

pub mod port;
pub mod store;

pub use port::{CheckpointPort, FileCheckpointPort, MemoryCheckpointPort};
pub use store::{CheckpointStore, PersistOutcome};

use crate::decklist::DecklistEntry;
use crate::ledger::BulkAllocationItem;
use crate::models::{NewCard, Section};
use mtg_common::CardRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Kind of bulk operation; at most one checkpoint exists per kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Import,
    Delete,
}

impl OperationKind {
    pub const ALL: [OperationKind; 2] = [OperationKind::Import, OperationKind::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Import => "import",
            OperationKind::Delete => "delete",
        }
    }

    pub fn other(&self) -> OperationKind {
        match self {
            OperationKind::Import => OperationKind::Delete,
            OperationKind::Delete => OperationKind::Import,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStage {
    Fetching,
    Processing,
    Saving,
    Allocating,
    Complete,
    Error,
}

impl ImportStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStage::Fetching => "fetching",
            ImportStage::Processing => "processing",
            ImportStage::Saving => "saving",
            ImportStage::Allocating => "allocating",
            ImportStage::Complete => "complete",
            ImportStage::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteStage {
    DeletingCards,
    DeletingDeck,
    Complete,
    Error,
}

impl DeleteStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeleteStage::DeletingCards => "deleting_cards",
            DeleteStage::DeletingDeck => "deleting_deck",
            DeleteStage::Complete => "complete",
            DeleteStage::Error => "error",
        }
    }
}

/// Status imported cards are saved with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportMode {
    /// Cards are added to the collection and allocated to the container
    #[default]
    Collection,
    /// Cards are recorded as wanted; the container only shows demand
    Wishlist,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportCounters {
    pub skipped_lines: usize,
    pub lookup_misses: usize,
    pub fallback_lookups: usize,
    pub allocated: u32,
    pub wishlisted: u32,
    pub failed_allocations: usize,
}

/// Working data of the fetching and processing stages
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportPayload {
    pub entries: Vec<DecklistEntry>,
    /// Batch lookup results keyed by `CardIdentifier::key`
    #[serde(default)]
    pub batch_hits: HashMap<String, CardRecord>,
    /// One record per processed entry, in entry order
    #[serde(default)]
    pub resolved: Vec<CardRecord>,
}

/// One card row the saving stage will upsert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveItem {
    pub card: NewCard,
    pub section: Section,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportCheckpoint {
    #[serde(default)]
    pub version: u64,
    pub container_id: i64,
    pub container_name: String,
    pub stage: ImportStage,
    #[serde(default)]
    pub failed_stage: Option<ImportStage>,
    pub total_cards: usize,
    pub current_card: usize,
    #[serde(default)]
    pub created_cards: Vec<BulkAllocationItem>,
    pub allocated_count: usize,
    #[serde(default)]
    pub counters: ImportCounters,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub mode: ImportMode,
    #[serde(default)]
    pub include_sideboard: bool,
    /// Present only while fetching or processing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<ImportPayload>,
    /// Present only while saving
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_items: Option<Vec<SaveItem>>,
}

impl ImportCheckpoint {
    pub fn new(container_id: i64, container_name: &str, mode: ImportMode, include_sideboard: bool) -> Self {
        Self {
            version: 0,
            container_id,
            container_name: container_name.to_string(),
            stage: ImportStage::Fetching,
            failed_stage: None,
            total_cards: 0,
            current_card: 0,
            created_cards: Vec::new(),
            allocated_count: 0,
            counters: ImportCounters::default(),
            error: None,
            mode,
            include_sideboard,
            payload: None,
            save_items: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteCheckpoint {
    #[serde(default)]
    pub version: u64,
    pub container_id: i64,
    pub container_name: String,
    pub stage: DeleteStage,
    #[serde(default)]
    pub failed_stage: Option<DeleteStage>,
    pub delete_cards: bool,
    /// Number of cards to delete when the operation started
    pub card_count: usize,
    /// Cards still to delete
    #[serde(default)]
    pub card_ids: Vec<i64>,
    /// Set when `card_ids` was dropped to fit storage; recompute from the container
    #[serde(default)]
    pub card_ids_stripped: bool,
    pub succeeded: usize,
    pub failed: usize,
    #[serde(default)]
    pub error: Option<String>,
}

impl DeleteCheckpoint {
    pub fn new(container_id: i64, container_name: &str, delete_cards: bool, card_ids: Vec<i64>) -> Self {
        let stage = if delete_cards && !card_ids.is_empty() {
            DeleteStage::DeletingCards
        } else {
            DeleteStage::DeletingDeck
        };
        Self {
            version: 0,
            container_id,
            container_name: container_name.to_string(),
            stage,
            failed_stage: None,
            delete_cards,
            card_count: card_ids.len(),
            card_ids,
            card_ids_stripped: false,
            succeeded: 0,
            failed: 0,
            error: None,
        }
    }
}

/// Persisted progress of one bulk operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Checkpoint {
    Import(ImportCheckpoint),
    Delete(DeleteCheckpoint),
}

impl Checkpoint {
    pub fn kind(&self) -> OperationKind {
        match self {
            Checkpoint::Import(_) => OperationKind::Import,
            Checkpoint::Delete(_) => OperationKind::Delete,
        }
    }

    pub fn stage_name(&self) -> &'static str {
        match self {
            Checkpoint::Import(c) => c.stage.as_str(),
            Checkpoint::Delete(c) => c.stage.as_str(),
        }
    }

    pub fn container_name(&self) -> &str {
        match self {
            Checkpoint::Import(c) => &c.container_name,
            Checkpoint::Delete(c) => &c.container_name,
        }
    }

    /// Completed operations have nothing left to resume
    pub fn is_complete(&self) -> bool {
        match self {
            Checkpoint::Import(c) => c.stage == ImportStage::Complete,
            Checkpoint::Delete(c) => c.stage == DeleteStage::Complete,
        }
    }

    /// Write counter, incremented by the store on every put
    pub fn version(&self) -> u64 {
        match self {
            Checkpoint::Import(c) => c.version,
            Checkpoint::Delete(c) => c.version,
        }
    }

    pub(crate) fn bump_version(&mut self) {
        match self {
            Checkpoint::Import(c) => c.version += 1,
            Checkpoint::Delete(c) => c.version += 1,
        }
    }

    /// Copy without the bulky working data
    pub fn stripped(&self) -> Checkpoint {
        match self {
            Checkpoint::Import(c) => Checkpoint::Import(ImportCheckpoint {
                payload: None,
                ..c.clone()
            }),
            Checkpoint::Delete(c) => Checkpoint::Delete(DeleteCheckpoint {
                card_ids: Vec::new(),
                card_ids_stripped: c.card_ids_stripped || !c.card_ids.is_empty(),
                ..c.clone()
            }),
        }
    }
}
