//! SQLite schema and connection setup
//!
//! Uses parameterized queries exclusively (no SQL string concatenation).
//! Every multi-row write elsewhere in the crate runs inside one transaction.

use crate::error::LedgerResult;
use chrono::{SecondsFormat, Utc};
use rusqlite::Connection;
use std::path::{Path, PathBuf};

/// Returns the default database path: ~/.local/share/collection_ledger/collection.db
pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("collection_ledger")
        .join("collection.db")
}

/// Open (or create) the database at `path` and initialise the schema
pub fn open(path: &Path) -> LedgerResult<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).ok();
            log::info!("Created directory: {}", parent.display());
        }
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    init_schema(&conn)?;
    log::info!("Opened database: {}", path.display());
    Ok(conn)
}

/// In-memory database with the full schema, used by tests and dry runs
pub fn open_in_memory() -> LedgerResult<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

/// Initialize the database schema
///
/// Creates tables if they don't exist:
/// - `cards`: owned and wanted cards
/// - `containers`: decks and binders with their derived stats
/// - `allocations`: claims on card copies per container section
/// - `container_wishlist`: legacy free-standing wishlist lines
/// - `import_receipts`: saved-card lists that make import saving repeatable
pub fn init_schema(conn: &Connection) -> LedgerResult<()> {
    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS cards (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            set_code TEXT NOT NULL DEFAULT '',
            quantity INTEGER NOT NULL CHECK (quantity >= 0),
            status TEXT NOT NULL,
            price REAL NOT NULL DEFAULT 0,
            foil INTEGER NOT NULL DEFAULT 0,
            condition TEXT NOT NULL DEFAULT 'NM',
            language TEXT NOT NULL DEFAULT 'en',
            scryfall_id TEXT,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_cards_identity
            ON cards(name COLLATE NOCASE, set_code COLLATE NOCASE, foil, status);

        CREATE TABLE IF NOT EXISTS containers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            kind TEXT NOT NULL,
            format TEXT,
            commander TEXT,
            created_at TEXT NOT NULL,
            stat_total INTEGER NOT NULL DEFAULT 0,
            stat_owned INTEGER NOT NULL DEFAULT 0,
            stat_wishlist INTEGER NOT NULL DEFAULT 0,
            completion REAL NOT NULL DEFAULT 0
        );

        -- One row per (card, container, section); zero quantities are never stored
        CREATE TABLE IF NOT EXISTS allocations (
            card_id INTEGER NOT NULL,
            container_id INTEGER NOT NULL,
            section TEXT NOT NULL,
            quantity INTEGER NOT NULL CHECK (quantity > 0),
            added_at TEXT NOT NULL,
            PRIMARY KEY (card_id, container_id, section),
            FOREIGN KEY (card_id) REFERENCES cards(id) ON DELETE CASCADE,
            FOREIGN KEY (container_id) REFERENCES containers(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_allocations_container ON allocations(container_id);

        CREATE TABLE IF NOT EXISTS container_wishlist (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            container_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            set_code TEXT NOT NULL DEFAULT '',
            scryfall_id TEXT,
            section TEXT NOT NULL,
            quantity INTEGER NOT NULL CHECK (quantity > 0),
            FOREIGN KEY (container_id) REFERENCES containers(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS import_receipts (
            container_id INTEGER PRIMARY KEY,
            created_cards TEXT NOT NULL,
            saved_at TEXT NOT NULL,
            FOREIGN KEY (container_id) REFERENCES containers(id) ON DELETE CASCADE
        );
        ",
    )?;

    log::debug!("Database schema initialized");
    Ok(())
}

/// Current UTC time as a fixed-width RFC 3339 string.
///
/// Fixed width keeps lexicographic order equal to chronological order, which
/// the ledger relies on when ordering containers by creation time.
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
