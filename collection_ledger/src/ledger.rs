//! Allocation ledger
//!
//! Splits owned card quantity across containers. Every write runs in one
//! transaction and checks, before committing, that no non-wishlist card has
//! more copies allocated than owned. Shortfalls never fail: they are recorded
//! as demand on the card's wishlist twin (a wishlist-status card with the same
//! name, set and finish) in the same container section.

use crate::containers;
use crate::database::timestamp_now;
use crate::error::{LedgerError, LedgerResult};
use crate::inventory;
use crate::models::{Card, CardStatus, NewCard, Section};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How often `bulk_allocate` reports progress, in items
pub const PROGRESS_INTERVAL: usize = 25;

/// Result of an allocate call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct AllocationOutcome {
    /// Copies committed from owned supply
    pub allocated: u32,
    /// Copies recorded as wishlist demand because supply ran out
    pub wishlisted: u32,
}

/// Result of an update call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationUpdate {
    pub requested: u32,
    /// Quantity actually stored (0 means the allocation was removed)
    pub quantity: u32,
    /// True when `requested` exceeded what was available
    pub clamped: bool,
}

/// One line of a bulk allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkAllocationItem {
    pub card_id: i64,
    pub section: Section,
    pub quantity: u32,
}

/// Aggregate result of a bulk allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BulkAllocationReport {
    pub allocated: u32,
    pub wishlisted: u32,
    pub succeeded: usize,
    pub failed: usize,
}

/// One allocation changed by `reduce_allocations_for_card`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationTrim {
    pub container_id: i64,
    pub section: Section,
    pub from: u32,
    pub to: u32,
}

/// Result of moving a card's allocations onto its wishlist twin
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConversionReport {
    /// Containers that received wishlist demand, ascending
    pub containers: Vec<i64>,
    /// Copies moved from owned to wishlist
    pub quantity: u32,
    pub wishlist_card_id: Option<i64>,
}

/// A card with more copies allocated than owned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupplyViolation {
    pub card_id: i64,
    pub owned: u32,
    pub allocated: u64,
}

// ── Row helpers (run inside the caller's transaction) ────────────────────

fn allocation_quantity(
    conn: &Connection,
    container_id: i64,
    card_id: i64,
    section: Section,
) -> LedgerResult<u32> {
    let quantity = conn
        .query_row(
            "SELECT quantity FROM allocations
             WHERE container_id = ?1 AND card_id = ?2 AND section = ?3",
            params![container_id, card_id, section],
            |row| row.get(0),
        )
        .optional()?;
    Ok(quantity.unwrap_or(0))
}

/// Store an allocation quantity; zero removes the row
fn set_allocation(
    conn: &Connection,
    container_id: i64,
    card_id: i64,
    section: Section,
    quantity: u32,
) -> LedgerResult<()> {
    if quantity == 0 {
        conn.execute(
            "DELETE FROM allocations WHERE container_id = ?1 AND card_id = ?2 AND section = ?3",
            params![container_id, card_id, section],
        )?;
        return Ok(());
    }
    conn.execute(
        "INSERT INTO allocations (card_id, container_id, section, quantity, added_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(card_id, container_id, section) DO UPDATE SET
             quantity = excluded.quantity",
        params![card_id, container_id, section, quantity, timestamp_now()],
    )?;
    Ok(())
}

fn add_to_allocation(
    conn: &Connection,
    container_id: i64,
    card_id: i64,
    section: Section,
    quantity: u32,
) -> LedgerResult<()> {
    let existing = allocation_quantity(conn, container_id, card_id, section)?;
    let total = existing
        .checked_add(quantity)
        .ok_or(LedgerError::QuantityOverflow { card_id, max: u32::MAX })?;
    set_allocation(conn, container_id, card_id, section, total)
}

fn unallocated(conn: &Connection, card: &Card) -> LedgerResult<u32> {
    let allocated = inventory::allocated_total(conn, card.id)?;
    Ok(u64::from(card.quantity).saturating_sub(allocated) as u32)
}

fn find_twin(conn: &Connection, card: &Card) -> LedgerResult<Option<i64>> {
    Ok(
        inventory::find_by_identity(conn, &card.name, &card.set_code, card.foil, CardStatus::Wishlist)?
            .map(|twin| twin.id),
    )
}

/// Wishlist-status card carrying demand for `card`, created on first use
fn wishlist_twin(conn: &Connection, card: &Card) -> LedgerResult<i64> {
    if card.status.is_wishlist() {
        return Ok(card.id);
    }
    if let Some(id) = find_twin(conn, card)? {
        return Ok(id);
    }
    let twin = NewCard {
        name: card.name.clone(),
        set_code: card.set_code.clone(),
        quantity: 0,
        status: CardStatus::Wishlist,
        price: card.price,
        foil: card.foil,
        condition: card.condition.clone(),
        language: card.language.clone(),
        scryfall_id: card.scryfall_id.clone(),
    };
    let id = inventory::insert_card(conn, &twin)?;
    log::debug!("Created wishlist twin {} for card {}", id, card.id);
    Ok(id)
}

fn ensure_within_supply(conn: &Connection, card_id: i64) -> LedgerResult<()> {
    let card = inventory::require_card(conn, card_id)?;
    if card.status.is_wishlist() {
        return Ok(());
    }
    let allocated = inventory::allocated_total(conn, card_id)?;
    if allocated > u64::from(card.quantity) {
        return Err(LedgerError::SupplyExceeded {
            card_id,
            allocated,
            owned: card.quantity,
        });
    }
    Ok(())
}

fn containers_holding(conn: &Connection, card_id: i64) -> LedgerResult<Vec<i64>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT container_id FROM allocations WHERE card_id = ?1 ORDER BY container_id",
    )?;
    let ids = stmt
        .query_map(params![card_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;
    Ok(ids)
}

fn refresh_stats(conn: &Connection, container_ids: impl IntoIterator<Item = i64>) -> LedgerResult<()> {
    for id in container_ids {
        if containers::get_container(conn, id)?.is_some() {
            containers::recompute_stats(conn, id)?;
        }
    }
    Ok(())
}

// ── Public operations ────────────────────────────────────────────────────

/// Copies of a card not yet allocated anywhere
pub fn available_quantity(conn: &Connection, card_id: i64) -> LedgerResult<u32> {
    let card = inventory::require_card(conn, card_id)?;
    unallocated(conn, &card)
}

/// Allocate copies of a card to a container section.
///
/// Commits `min(quantity, available)` and records the rest as wishlist demand.
/// Adds to an existing allocation in the same section.
pub fn allocate(
    conn: &mut Connection,
    container_id: i64,
    card_id: i64,
    quantity: u32,
    section: Section,
) -> LedgerResult<AllocationOutcome> {
    if quantity == 0 {
        return Err(LedgerError::InvalidQuantity(quantity));
    }
    let tx = conn.transaction()?;
    let outcome = allocate_tx(&tx, container_id, card_id, quantity, section)?;
    containers::recompute_stats(&tx, container_id)?;
    tx.commit()?;

    log::debug!(
        "Allocated card {} to container {} ({}): {} committed, {} wishlisted",
        card_id,
        container_id,
        section.as_str(),
        outcome.allocated,
        outcome.wishlisted
    );
    Ok(outcome)
}

fn allocate_tx(
    conn: &Connection,
    container_id: i64,
    card_id: i64,
    quantity: u32,
    section: Section,
) -> LedgerResult<AllocationOutcome> {
    containers::require_container(conn, container_id)?;
    let card = inventory::require_card(conn, card_id)?;

    if card.status.is_wishlist() {
        add_to_allocation(conn, container_id, card.id, section, quantity)?;
        return Ok(AllocationOutcome {
            allocated: 0,
            wishlisted: quantity,
        });
    }

    let allocated = quantity.min(unallocated(conn, &card)?);
    let wishlisted = quantity - allocated;
    if allocated > 0 {
        add_to_allocation(conn, container_id, card.id, section, allocated)?;
    }
    if wishlisted > 0 {
        let twin = wishlist_twin(conn, &card)?;
        add_to_allocation(conn, container_id, twin, section, wishlisted)?;
    }
    ensure_within_supply(conn, card.id)?;

    Ok(AllocationOutcome {
        allocated,
        wishlisted,
    })
}

/// Remove an allocation entirely. Returns false when there was nothing to remove.
pub fn deallocate(
    conn: &mut Connection,
    container_id: i64,
    card_id: i64,
    section: Section,
) -> LedgerResult<bool> {
    let tx = conn.transaction()?;
    let removed = tx.execute(
        "DELETE FROM allocations WHERE container_id = ?1 AND card_id = ?2 AND section = ?3",
        params![container_id, card_id, section],
    )?;
    if removed > 0 {
        containers::recompute_stats(&tx, container_id)?;
    }
    tx.commit()?;
    Ok(removed > 0)
}

/// Set an allocation to `new_quantity`, clamped to what the card can supply.
///
/// The ceiling is the existing allocation plus the card's unallocated copies.
/// `clamped` reports when the request was cut down. Zero removes the allocation.
pub fn update_allocation(
    conn: &mut Connection,
    container_id: i64,
    card_id: i64,
    section: Section,
    new_quantity: u32,
) -> LedgerResult<AllocationUpdate> {
    let tx = conn.transaction()?;
    containers::require_container(&tx, container_id)?;
    let card = inventory::require_card(&tx, card_id)?;

    let ceiling = if card.status.is_wishlist() {
        new_quantity
    } else {
        let existing = allocation_quantity(&tx, container_id, card_id, section)?;
        existing.saturating_add(unallocated(&tx, &card)?)
    };
    let quantity = new_quantity.min(ceiling);
    set_allocation(&tx, container_id, card_id, section, quantity)?;
    ensure_within_supply(&tx, card_id)?;
    containers::recompute_stats(&tx, container_id)?;
    tx.commit()?;

    let update = AllocationUpdate {
        requested: new_quantity,
        quantity,
        clamped: new_quantity > quantity,
    };
    if update.clamped {
        log::info!(
            "Allocation of card {} in container {} clamped from {} to {}",
            card_id,
            container_id,
            new_quantity,
            quantity
        );
    }
    Ok(update)
}

/// Allocate a batch of cards to one container in a single commit.
///
/// Each item *sets* its (card, section) allocation rather than adding to it, so
/// re-sending the same batch after an interruption changes nothing. Items that
/// fail (unknown card, zero quantity) are rolled back individually and counted
/// in `failed`; the rest of the batch still commits.
pub fn bulk_allocate<F>(
    conn: &mut Connection,
    container_id: i64,
    items: &[BulkAllocationItem],
    mut progress: F,
) -> LedgerResult<BulkAllocationReport>
where
    F: FnMut(usize, usize),
{
    let mut tx = conn.transaction()?;
    containers::require_container(&tx, container_id)?;

    let mut report = BulkAllocationReport::default();
    let total = items.len();
    for (index, item) in items.iter().enumerate() {
        let sp = tx.savepoint()?;
        match upsert_item(&sp, container_id, item) {
            Ok(outcome) => {
                sp.commit()?;
                report.allocated = report.allocated.saturating_add(outcome.allocated);
                report.wishlisted = report.wishlisted.saturating_add(outcome.wishlisted);
                report.succeeded += 1;
            }
            Err(e) => {
                log::warn!(
                    "Skipping allocation of card {} to container {}: {}",
                    item.card_id,
                    container_id,
                    e
                );
                report.failed += 1;
            }
        }
        let done = index + 1;
        if done % PROGRESS_INTERVAL == 0 || done == total {
            progress(done, total);
        }
    }

    containers::recompute_stats(&tx, container_id)?;
    tx.commit()?;

    log::info!(
        "Bulk allocation into container {}: {} items ok, {} failed ({} committed, {} wishlisted)",
        container_id,
        report.succeeded,
        report.failed,
        report.allocated,
        report.wishlisted
    );
    Ok(report)
}

fn upsert_item(
    conn: &Connection,
    container_id: i64,
    item: &BulkAllocationItem,
) -> LedgerResult<AllocationOutcome> {
    if item.quantity == 0 {
        return Err(LedgerError::InvalidQuantity(0));
    }
    let card = inventory::require_card(conn, item.card_id)?;

    if card.status.is_wishlist() {
        set_allocation(conn, container_id, card.id, item.section, item.quantity)?;
        return Ok(AllocationOutcome {
            allocated: 0,
            wishlisted: item.quantity,
        });
    }

    let existing = allocation_quantity(conn, container_id, card.id, item.section)?;
    let elsewhere = inventory::allocated_total(conn, card.id)? - u64::from(existing);
    let available = u64::from(card.quantity).saturating_sub(elsewhere) as u32;
    let allocated = item.quantity.min(available);
    let wishlisted = item.quantity - allocated;

    set_allocation(conn, container_id, card.id, item.section, allocated)?;
    if wishlisted > 0 {
        let twin = wishlist_twin(conn, &card)?;
        set_allocation(conn, container_id, twin, item.section, wishlisted)?;
    } else if let Some(twin) = find_twin(conn, &card)? {
        set_allocation(conn, container_id, twin, item.section, 0)?;
    }
    ensure_within_supply(conn, card.id)?;

    Ok(AllocationOutcome {
        allocated,
        wishlisted,
    })
}

/// Change a card's owned quantity, trimming allocations that no longer fit.
///
/// When the new quantity is below the total allocated, every allocation keeps
/// `floor(q * new_owned / total)` copies and the leftover copies are handed
/// back one at a time in ascending container creation order (then container
/// id, then mainboard before sideboard). Allocations reaching zero are removed.
pub fn reduce_allocations_for_card(
    conn: &mut Connection,
    card_id: i64,
    new_owned: u32,
) -> LedgerResult<Vec<AllocationTrim>> {
    let tx = conn.transaction()?;
    let card = inventory::require_card(&tx, card_id)?;
    inventory::set_quantity(&tx, card_id, new_owned)?;

    if card.status.is_wishlist() {
        tx.commit()?;
        return Ok(Vec::new());
    }

    let holdings: Vec<(i64, Section, u32)> = {
        let mut stmt = tx.prepare(
            "SELECT a.container_id, a.section, a.quantity
             FROM allocations a
             JOIN containers c ON c.id = a.container_id
             WHERE a.card_id = ?1
             ORDER BY c.created_at, c.id,
                      CASE a.section WHEN 'mainboard' THEN 0 ELSE 1 END",
        )?;
        let rows = stmt
            .query_map(params![card_id], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows
    };

    let total: u64 = holdings.iter().map(|(_, _, q)| u64::from(*q)).sum();
    if total <= u64::from(new_owned) {
        tx.commit()?;
        return Ok(Vec::new());
    }

    let target = u64::from(new_owned);
    let mut keep: Vec<u32> = holdings
        .iter()
        .map(|(_, _, q)| (u64::from(*q) * target / total) as u32)
        .collect();
    let mut leftover = target - keep.iter().map(|k| u64::from(*k)).sum::<u64>();
    while leftover > 0 {
        let mut handed_out = false;
        for (i, (_, _, q)) in holdings.iter().enumerate() {
            if leftover == 0 {
                break;
            }
            if keep[i] < *q {
                keep[i] += 1;
                leftover -= 1;
                handed_out = true;
            }
        }
        if !handed_out {
            break;
        }
    }

    let mut trims = Vec::new();
    let mut touched = BTreeSet::new();
    for ((container_id, section, from), to) in holdings.iter().zip(keep) {
        if to != *from {
            set_allocation(&tx, *container_id, card_id, *section, to)?;
            touched.insert(*container_id);
            trims.push(AllocationTrim {
                container_id: *container_id,
                section: *section,
                from: *from,
                to,
            });
        }
    }
    ensure_within_supply(&tx, card_id)?;
    refresh_stats(&tx, touched)?;
    tx.commit()?;

    log::info!(
        "Card {} reduced to {} owned: trimmed {} allocation(s)",
        card_id,
        new_owned,
        trims.len()
    );
    Ok(trims)
}

/// Move every allocation of a card onto its wishlist twin in the same
/// container and section, so containers keep showing the demand.
pub fn convert_allocations_to_wishlist(
    conn: &mut Connection,
    card_id: i64,
) -> LedgerResult<ConversionReport> {
    let tx = conn.transaction()?;
    let report = convert_tx(&tx, card_id, None)?;
    refresh_stats(&tx, report.containers.iter().copied())?;
    tx.commit()?;
    Ok(report)
}

fn convert_tx(
    conn: &Connection,
    card_id: i64,
    except_container: Option<i64>,
) -> LedgerResult<ConversionReport> {
    let card = inventory::require_card(conn, card_id)?;
    if card.status.is_wishlist() {
        return Ok(ConversionReport::default());
    }

    let holdings: Vec<(i64, Section, u32)> = {
        let mut stmt = conn.prepare(
            "SELECT container_id, section, quantity FROM allocations
             WHERE card_id = ?1
             ORDER BY container_id, section",
        )?;
        let rows = stmt
            .query_map(params![card_id], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows
    };

    let mut report = ConversionReport::default();
    let mut touched = BTreeSet::new();
    for (container_id, section, quantity) in holdings {
        if Some(container_id) == except_container {
            continue;
        }
        let twin = wishlist_twin(conn, &card)?;
        add_to_allocation(conn, container_id, twin, section, quantity)?;
        set_allocation(conn, container_id, card.id, section, 0)?;
        report.wishlist_card_id = Some(twin);
        report.quantity = report.quantity.saturating_add(quantity);
        touched.insert(container_id);
    }
    report.containers = touched.into_iter().collect();

    if report.quantity > 0 {
        log::info!(
            "Converted {} allocated copies of card {} to wishlist in {} container(s)",
            report.quantity,
            card_id,
            report.containers.len()
        );
    }
    Ok(report)
}

/// Delete a card from the inventory, keeping container demand visible.
///
/// Allocations are first converted to wishlist demand, except in
/// `except_container` (used when that container is about to be deleted too).
pub fn retire_card(
    conn: &mut Connection,
    card_id: i64,
    except_container: Option<i64>,
) -> LedgerResult<ConversionReport> {
    let tx = conn.transaction()?;
    let holding = containers_holding(&tx, card_id)?;
    let report = convert_tx(&tx, card_id, except_container)?;
    inventory::delete_card_row(&tx, card_id)?;
    refresh_stats(&tx, holding)?;
    tx.commit()?;

    log::debug!("Retired card {}", card_id);
    Ok(report)
}

/// Delete a container together with the zero-quantity wishlist cards that
/// only it referenced. Returns false when the container was already gone.
pub fn remove_container(conn: &mut Connection, container_id: i64) -> LedgerResult<bool> {
    let tx = conn.transaction()?;
    let referenced = containers::card_ids_in_container(&tx, container_id)?;
    let removed = containers::delete_container(&tx, container_id)?;

    let mut pruned = 0;
    for card_id in referenced {
        let Some(card) = inventory::get_card(&tx, card_id)? else {
            continue;
        };
        if card.status.is_wishlist()
            && card.quantity == 0
            && inventory::allocated_total(&tx, card_id)? == 0
        {
            inventory::delete_card_row(&tx, card_id)?;
            pruned += 1;
        }
    }
    tx.commit()?;

    if pruned > 0 {
        log::debug!(
            "Pruned {} unreferenced wishlist cards of container {}",
            pruned,
            container_id
        );
    }
    Ok(removed)
}

/// Turn a container's legacy wishlist lines into wishlist cards with
/// allocations. Returns the number of lines migrated.
pub fn migrate_legacy_wishlist(conn: &mut Connection, container_id: i64) -> LedgerResult<usize> {
    let tx = conn.transaction()?;
    containers::require_container(&tx, container_id)?;
    let entries = containers::legacy_wishlist_entries(&tx, container_id)?;

    for (row_id, entry) in &entries {
        let existing = inventory::find_by_identity(
            &tx,
            &entry.name,
            &entry.set_code,
            false,
            CardStatus::Wishlist,
        )?;
        let card_id = match existing {
            Some(card) => card.id,
            None => {
                let mut wanted =
                    NewCard::collection(&entry.name, &entry.set_code, 0).with_status(CardStatus::Wishlist);
                wanted.scryfall_id = entry.scryfall_id.clone();
                inventory::insert_card(&tx, &wanted)?
            }
        };
        add_to_allocation(&tx, container_id, card_id, entry.section, entry.quantity)?;
        tx.execute(
            "DELETE FROM container_wishlist WHERE id = ?1",
            params![row_id],
        )?;
    }
    containers::recompute_stats(&tx, container_id)?;
    tx.commit()?;

    if !entries.is_empty() {
        log::info!(
            "Migrated {} legacy wishlist line(s) in container {}",
            entries.len(),
            container_id
        );
    }
    Ok(entries.len())
}

/// Every non-wishlist card whose allocations exceed its owned quantity
pub fn verify_supply(conn: &Connection) -> LedgerResult<Vec<SupplyViolation>> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.quantity, SUM(a.quantity)
         FROM cards c
         JOIN allocations a ON a.card_id = c.id
         WHERE c.status != 'wishlist'
         GROUP BY c.id, c.quantity
         HAVING SUM(a.quantity) > c.quantity
         ORDER BY c.id",
    )?;
    let violations = stmt
        .query_map([], |row| {
            Ok(SupplyViolation {
                card_id: row.get(0)?,
                owned: row.get(1)?,
                allocated: row.get::<_, i64>(2)? as u64,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(violations)
}

#[cfg(test)]
#[path = "ledger_tests.rs"]
mod tests;
