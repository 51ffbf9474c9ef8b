//! Error types for collection_ledger

use thiserror::Error;

/// Errors raised by the inventory, container and allocation ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Database operation failed
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// Stored JSON could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Card {0} not found")]
    CardNotFound(i64),
    #[error("Container {0} not found")]
    ContainerNotFound(i64),
    /// Quantities handed to the ledger must be positive
    #[error("Quantity must be a positive integer, got {0}")]
    InvalidQuantity(u32),
    #[error("Container name must not be empty")]
    InvalidName,
    /// Adding copies would overflow the stored quantity
    #[error("Quantity of card {card_id} would exceed {max} copies")]
    QuantityOverflow { card_id: i64, max: u32 },
    /// A write would promise more copies than are owned
    #[error("Card {card_id} would have {allocated} copies allocated but only {owned} owned")]
    SupplyExceeded {
        card_id: i64,
        allocated: u64,
        owned: u32,
    },
}

/// Result alias for ledger operations
pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// Errors raised by checkpoint ports
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// The record does not fit into the remaining storage quota
    #[error("Checkpoint storage full: needed {needed} bytes, {available} available")]
    StorageFull { needed: usize, available: usize },
    #[error("Checkpoint I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Checkpoint serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CheckpointError {
    pub fn is_storage_full(&self) -> bool {
        matches!(self, CheckpointError::StorageFull { .. })
    }
}

/// Result alias for checkpoint operations
pub type CheckpointResult<T> = std::result::Result<T, CheckpointError>;

/// Errors raised by the bulk operation controller
#[derive(Debug, Error)]
pub enum BulkError {
    /// The target container could not be created or found; nothing was persisted
    #[error("Fatal: {0}")]
    FatalStageFailure(String),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error("Card catalog error: {0}")]
    Catalog(#[from] mtg_common::CatalogError),
    /// A resumed stage needs working data that was stripped from the checkpoint
    #[error("Checkpoint for stage '{0}' has no working data left; abandon it and start again")]
    MissingPayload(String),
}

/// Result alias for bulk operations
pub type BulkResult<T> = std::result::Result<T, BulkError>;

/// Errors raised while writing a CSV export
#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ExportResult<T> = std::result::Result<T, ExportError>;
