//! Import pipeline: fetching → processing → saving → allocating → complete

use super::progress::scaled;
use super::{
    BulkOperationController, ImportReport, ImportRequest, OperationOutcome, OperationReport,
    ProgressReporter, RunContext,
};
use crate::checkpoint::{
    Checkpoint, CheckpointPort, ImportCheckpoint, ImportCounters, ImportMode, ImportPayload,
    ImportStage, OperationKind, SaveItem,
};
use crate::containers;
use crate::database::timestamp_now;
use crate::decklist::{parse_decklist, DecklistEntry};
use crate::error::{BulkError, BulkResult, LedgerError, LedgerResult};
use crate::inventory;
use crate::ledger::{self, BulkAllocationItem};
use crate::models::{CardStatus, NewCard, Section};
use mtg_common::{CardCatalog, CardIdentifier, CardRecord};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::{HashMap, HashSet};

// ── Import receipts ──────────────────────────────────────────────────────
//
// The saving stage records the (card, section) quantities it wrote in the
// same transaction as the card upserts. Running the stage again finds the
// receipt and reuses it instead of adding the quantities a second time.

fn load_receipt(conn: &Connection, container_id: i64) -> LedgerResult<Option<Vec<BulkAllocationItem>>> {
    let json: Option<String> = conn
        .query_row(
            "SELECT created_cards FROM import_receipts WHERE container_id = ?1",
            params![container_id],
            |row| row.get(0),
        )
        .optional()?;
    match json {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

fn store_receipt(conn: &Connection, container_id: i64, created: &[BulkAllocationItem]) -> LedgerResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO import_receipts (container_id, created_cards, saved_at)
         VALUES (?1, ?2, ?3)",
        params![container_id, serde_json::to_string(created)?, timestamp_now()],
    )?;
    Ok(())
}

/// Remove the saving receipt of a finished or abandoned import
pub(crate) fn clear_receipt(conn: &Connection, container_id: i64) -> LedgerResult<()> {
    conn.execute(
        "DELETE FROM import_receipts WHERE container_id = ?1",
        params![container_id],
    )?;
    Ok(())
}

/// Upsert every save item in one transaction and return the aggregated
/// (card, section) quantities to allocate
fn save_cards(conn: &mut Connection, container_id: i64, items: &[SaveItem]) -> LedgerResult<Vec<BulkAllocationItem>> {
    let tx = conn.transaction()?;
    if let Some(created) = load_receipt(&tx, container_id)? {
        log::info!(
            "Cards for container {} were already saved; reusing receipt",
            container_id
        );
        return Ok(created);
    }

    let mut created: Vec<BulkAllocationItem> = Vec::new();
    let mut index: HashMap<(i64, Section), usize> = HashMap::new();
    for item in items {
        let card_id = inventory::upsert_card(&tx, &item.card)?;
        match index.get(&(card_id, item.section)) {
            Some(&i) => {
                created[i].quantity = created[i]
                    .quantity
                    .checked_add(item.card.quantity)
                    .ok_or(LedgerError::QuantityOverflow {
                        card_id,
                        max: u32::MAX,
                    })?;
            }
            None => {
                index.insert((card_id, item.section), created.len());
                created.push(BulkAllocationItem {
                    card_id,
                    section: item.section,
                    quantity: item.card.quantity,
                });
            }
        }
    }
    store_receipt(&tx, container_id, &created)?;
    tx.commit()?;
    Ok(created)
}

fn save_item(entry: &DecklistEntry, record: &CardRecord, mode: ImportMode) -> SaveItem {
    let status = match mode {
        ImportMode::Collection => CardStatus::Collection,
        ImportMode::Wishlist => CardStatus::Wishlist,
    };
    let mut card = NewCard::collection(&record.name, &record.set_code, entry.quantity).with_status(status);
    card.price = record.price;
    card.foil = entry.foil;
    card.scryfall_id = record.scryfall_id.clone();
    SaveItem {
        card,
        section: entry.section,
    }
}

fn unique_identifiers(entries: &[DecklistEntry]) -> Vec<CardIdentifier> {
    let mut seen = HashSet::new();
    entries
        .iter()
        .map(DecklistEntry::identifier)
        .filter(|id| seen.insert(id.key()))
        .collect()
}

fn report(state: &ImportCheckpoint, degraded: bool) -> ImportReport {
    ImportReport {
        container_id: state.container_id,
        container_name: state.container_name.clone(),
        entries: state.total_cards,
        cards_saved: state.created_cards.len(),
        counters: state.counters,
        checkpoint_degraded: degraded,
    }
}

fn missing(stage: ImportStage) -> BulkError {
    BulkError::MissingPayload(stage.as_str().to_string())
}

impl<C: CardCatalog, P: CheckpointPort> BulkOperationController<C, P> {
    pub(super) async fn start_import(
        &self,
        request: ImportRequest,
        progress: &dyn ProgressReporter,
    ) -> BulkResult<OperationOutcome> {
        let container_id = {
            let conn = self.db.lock().await;
            containers::create_container(&conn, &request.container_name, &request.kind)
        }
        .map_err(|e| {
            BulkError::FatalStageFailure(format!(
                "Could not create container '{}': {}",
                request.container_name, e
            ))
        })?;

        let parsed = parse_decklist(&request.text, request.include_sideboard);
        log::info!(
            "Importing {} lines ({} cards) into '{}', {} skipped",
            parsed.entries.len(),
            parsed.total_quantity(),
            request.container_name,
            parsed.skipped_lines
        );

        let mut state = ImportCheckpoint::new(
            container_id,
            request.container_name.trim(),
            request.mode,
            request.include_sideboard,
        );
        state.total_cards = parsed.entries.len();
        state.counters.skipped_lines = parsed.skipped_lines;
        state.payload = Some(ImportPayload {
            entries: parsed.entries,
            ..ImportPayload::default()
        });

        let mut ctx = RunContext::new(progress);
        ctx.update(0, &format!("Importing into '{}'", state.container_name));
        if let Err(e) = self.save_import(&mut state, &mut ctx).await {
            let conn = self.db.lock().await;
            if let Err(cleanup) = containers::delete_container(&conn, container_id) {
                log::warn!("Could not remove container {}: {}", container_id, cleanup);
            }
            return Err(BulkError::FatalStageFailure(format!(
                "Could not record import checkpoint: {}",
                e
            )));
        }
        self.run_import(state, ctx).await
    }

    pub(super) async fn resume_import(
        &self,
        mut state: ImportCheckpoint,
        progress: &dyn ProgressReporter,
    ) -> BulkResult<OperationOutcome> {
        if state.stage == ImportStage::Error {
            state.stage = self.import_restart_stage(&state).await?;
            state.error = None;
            log::info!("Re-entering import at stage {}", state.stage.as_str());
        }
        self.run_import(state, RunContext::new(progress)).await
    }

    /// Safe stage to re-enter after a failure
    async fn import_restart_stage(&self, state: &ImportCheckpoint) -> BulkResult<ImportStage> {
        if !state.created_cards.is_empty() || state.failed_stage == Some(ImportStage::Allocating) {
            return Ok(ImportStage::Allocating);
        }
        if state.save_items.is_some() {
            return Ok(ImportStage::Saving);
        }
        match state.failed_stage {
            Some(stage @ (ImportStage::Fetching | ImportStage::Processing)) if state.payload.is_some() => {
                Ok(stage)
            }
            Some(ImportStage::Saving) => {
                let conn = self.db.lock().await;
                if load_receipt(&conn, state.container_id)?.is_some() {
                    Ok(ImportStage::Saving)
                } else {
                    Err(missing(ImportStage::Saving))
                }
            }
            Some(stage) => Err(missing(stage)),
            None => Err(missing(ImportStage::Error)),
        }
    }

    async fn run_import(
        &self,
        mut state: ImportCheckpoint,
        mut ctx: RunContext<'_>,
    ) -> BulkResult<OperationOutcome> {
        loop {
            let stage = state.stage;
            let result = match stage {
                ImportStage::Fetching => self.import_fetch(&mut state, &mut ctx).await,
                ImportStage::Processing => self.import_process(&mut state, &mut ctx).await,
                ImportStage::Saving => self.import_save(&mut state, &mut ctx).await,
                ImportStage::Allocating => self.import_allocate(&mut state, &mut ctx).await,
                ImportStage::Complete => break,
                ImportStage::Error => Err(missing(ImportStage::Error)),
            };
            if let Err(e) = result {
                if matches!(e, BulkError::MissingPayload(_)) {
                    return Err(e);
                }
                return Ok(self.fail_import(state, stage, e, &mut ctx).await);
            }
        }

        self.clear_checkpoint(OperationKind::Import).await;
        {
            let conn = self.db.lock().await;
            if let Err(e) = clear_receipt(&conn, state.container_id) {
                log::warn!("Failed to clear import receipt: {}", e);
            }
        }

        let report = report(&state, ctx.degraded);
        let message = format!(
            "Imported {} cards into '{}': {} owned, {} wishlisted, {} not found",
            report.cards_saved,
            report.container_name,
            report.counters.allocated,
            report.counters.wishlisted,
            report.counters.lookup_misses
        );
        log::info!("{}", message);
        ctx.progress.complete(&message);
        Ok(OperationOutcome::Completed(OperationReport::Import(report)))
    }

    async fn fail_import(
        &self,
        mut state: ImportCheckpoint,
        stage: ImportStage,
        error: BulkError,
        ctx: &mut RunContext<'_>,
    ) -> OperationOutcome {
        let message = format!("Import failed while {}: {}", stage.as_str(), error);
        log::error!("{}", message);
        state.failed_stage = Some(stage);
        state.stage = ImportStage::Error;
        state.error = Some(error.to_string());
        if let Err(e) = self.save_import(&mut state, ctx).await {
            log::error!("Could not record import failure: {}", e);
        }
        ctx.progress.error(&message);
        OperationOutcome::Failed {
            stage: stage.as_str().to_string(),
            message: error.to_string(),
        }
    }

    async fn save_import(&self, state: &mut ImportCheckpoint, ctx: &mut RunContext<'_>) -> BulkResult<()> {
        let mut record = Checkpoint::Import(state.clone());
        self.persist(&mut record, ctx).await?;
        state.version = record.version();
        Ok(())
    }

    /// One batch lookup over every distinct identifier
    async fn import_fetch(&self, state: &mut ImportCheckpoint, ctx: &mut RunContext<'_>) -> BulkResult<()> {
        let identifiers = {
            let payload = state.payload.as_ref().ok_or_else(|| missing(ImportStage::Fetching))?;
            unique_identifiers(&payload.entries)
        };
        ctx.update(5, &format!("Looking up {} cards", identifiers.len()));

        let hits = match self.catalog.resolve_batch(&identifiers).await {
            Ok(hits) => hits,
            Err(e) => {
                log::warn!("Batch lookup failed, falling back to single lookups: {}", e);
                HashMap::new()
            }
        };
        log::info!("Batch lookup matched {} of {} identifiers", hits.len(), identifiers.len());

        if let Some(payload) = state.payload.as_mut() {
            payload.batch_hits = hits;
            payload.resolved.clear();
        }
        state.current_card = 0;
        state.stage = ImportStage::Processing;
        self.save_import(state, ctx).await
    }

    /// Resolve each entry: batch hit, bounded single lookup, then placeholder
    async fn import_process(&self, state: &mut ImportCheckpoint, ctx: &mut RunContext<'_>) -> BulkResult<()> {
        {
            let current = state.current_card;
            let payload = state.payload.as_mut().ok_or_else(|| missing(ImportStage::Processing))?;
            payload.resolved.truncate(current);
        }

        while state.current_card < state.total_cards {
            let index = state.current_card;
            let (entry, hit) = {
                let payload = state.payload.as_ref().ok_or_else(|| missing(ImportStage::Processing))?;
                let entry = payload.entries[index].clone();
                let hit = payload.batch_hits.get(&entry.identifier().key()).cloned();
                (entry, hit)
            };

            let record = match hit {
                Some(record) => record,
                None => self.lookup_fallback(&entry, &mut state.counters).await,
            };
            log::debug!("Resolved '{}' as {} ({})", entry.name, record.name, record.set_code);

            if let Some(payload) = state.payload.as_mut() {
                payload.resolved.push(record);
            }
            state.current_card += 1;
            self.save_import(state, ctx).await?;
            ctx.update(
                scaled(10, 50, state.current_card, state.total_cards),
                &format!("Processed {} of {} cards", state.current_card, state.total_cards),
            );
        }

        let payload = state.payload.take().ok_or_else(|| missing(ImportStage::Processing))?;
        let items: Vec<SaveItem> = payload
            .entries
            .iter()
            .zip(&payload.resolved)
            .map(|(entry, record)| save_item(entry, record, state.mode))
            .collect();
        state.save_items = Some(items);
        state.stage = ImportStage::Saving;
        self.save_import(state, ctx).await
    }

    async fn lookup_fallback(&self, entry: &DecklistEntry, counters: &mut ImportCounters) -> CardRecord {
        if counters.fallback_lookups < self.config.lookup_fallback_limit {
            counters.fallback_lookups += 1;
            match self.catalog.resolve(&entry.name, entry.set_code.as_deref()).await {
                Ok(Some(record)) => return record,
                Ok(None) => {}
                Err(e) => log::warn!("Lookup of '{}' failed: {}", entry.name, e),
            }
        }
        log::warn!("'{}' not found; saving without price", entry.name);
        counters.lookup_misses += 1;
        CardRecord::placeholder(&entry.name, entry.set_code.as_deref())
    }

    /// Upsert all cards in one transaction
    async fn import_save(&self, state: &mut ImportCheckpoint, ctx: &mut RunContext<'_>) -> BulkResult<()> {
        ctx.update(55, "Saving cards");
        let items = state.save_items.clone().unwrap_or_default();
        let created = {
            let mut conn = self.db.lock().await;
            save_cards(&mut conn, state.container_id, &items)?
        };
        log::info!(
            "Saved {} cards for '{}'",
            created.len(),
            state.container_name
        );

        state.created_cards = created;
        state.save_items = None;
        state.allocated_count = 0;
        state.stage = ImportStage::Allocating;
        self.save_import(state, ctx).await
    }

    /// Allocate saved cards to the container in chunks
    async fn import_allocate(&self, state: &mut ImportCheckpoint, ctx: &mut RunContext<'_>) -> BulkResult<()> {
        let chunk_size = self.config.allocation_chunk.max(1);
        let total = state.created_cards.len();

        while state.allocated_count < total {
            let start = state.allocated_count;
            let end = (start + chunk_size).min(total);
            let chunk = state.created_cards[start..end].to_vec();

            let report = {
                let mut conn = self.db.lock().await;
                ledger::bulk_allocate(&mut conn, state.container_id, &chunk, |done, of| {
                    log::debug!("Allocated {} of {} in chunk", done, of);
                })?
            };
            state.counters.allocated = state.counters.allocated.saturating_add(report.allocated);
            state.counters.wishlisted = state.counters.wishlisted.saturating_add(report.wishlisted);
            state.counters.failed_allocations += report.failed;
            state.allocated_count = end;

            self.save_import(state, ctx).await?;
            ctx.update(
                scaled(60, 95, state.allocated_count, total),
                &format!("Allocated {} of {} cards", state.allocated_count, total),
            );
        }

        {
            let conn = self.db.lock().await;
            containers::recompute_stats(&conn, state.container_id)?;
        }
        state.stage = ImportStage::Complete;
        self.save_import(state, ctx).await
    }
}
