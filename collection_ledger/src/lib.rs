//! Collection Ledger - MTG card allocation and resumable bulk operations
//!
//! Tracks owned cards in a SQLite inventory, allocates copies of them to decks
//! and binders without ever promising more copies than are owned, and imports
//! or deletes whole containers through checkpointed pipelines that survive a
//! restart.

pub mod bulk;
pub mod checkpoint;
pub mod config;
pub mod containers;
pub mod database;
pub mod decklist;
pub mod error;
pub mod export;
pub mod inventory;
pub mod ledger;
pub mod models;
pub mod scryfall;

pub use bulk::{
    BulkOperationController, DeleteReport, DeleteRequest, ImportReport, ImportRequest,
    LogProgress, OperationGuard, OperationOutcome, OperationReport, OperationRequest,
    ProgressReporter,
};
pub use checkpoint::{
    Checkpoint, CheckpointPort, CheckpointStore, FileCheckpointPort, ImportMode,
    MemoryCheckpointPort, OperationKind, PersistOutcome,
};
pub use config::BulkConfig;
pub use database::{default_db_path, init_schema, open, open_in_memory};
pub use error::{BulkError, BulkResult, CheckpointError, LedgerError, LedgerResult};
pub use export::{CsvDialect, ExportScope};
pub use models::{Card, CardStatus, Container, ContainerEntry, ContainerKind, NewCard, Section};
pub use scryfall::ScryfallCatalog;
