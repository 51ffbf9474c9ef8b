//! Runtime configuration

use std::path::{Path, PathBuf};

/// Default Scryfall API endpoint
pub const DEFAULT_SCRYFALL_URL: &str = "https://api.scryfall.com";

/// Tuning knobs for the bulk operation controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkConfig {
    /// Individual catalog lookups allowed per import for batch misses
    pub lookup_fallback_limit: usize,
    /// Cards per `bulk_allocate` call; the checkpoint is written after each
    pub allocation_chunk: usize,
    /// Cards retired between delete checkpoints
    pub delete_batch_size: usize,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            lookup_fallback_limit: 20,
            allocation_chunk: 50,
            delete_batch_size: 10,
        }
    }
}

/// Checkpoint directory used when none is given: `checkpoints/` next to the database
pub fn default_checkpoint_dir(db_path: &Path) -> PathBuf {
    db_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .join("checkpoints")
}
