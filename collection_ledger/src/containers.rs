//! Container store: decks and binders
//!
//! Containers reference allocations by id; the allocation rows themselves are
//! written by the ledger. Stats are derived and stored on the container row.

use crate::database::timestamp_now;
use crate::error::{LedgerError, LedgerResult};
use crate::models::{
    Allocation, Container, ContainerEntry, ContainerKind, ContainerStats, LegacyWishlistEntry,
};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

const CONTAINER_COLUMNS: &str = "id, name, kind, format, commander, created_at, \
                                 stat_total, stat_owned, stat_wishlist, completion";

fn row_to_container(row: &Row<'_>) -> rusqlite::Result<Container> {
    let kind_name: String = row.get(2)?;
    let kind = match kind_name.as_str() {
        "deck" => ContainerKind::Deck {
            format: row.get(3)?,
            commander: row.get(4)?,
        },
        "binder" => ContainerKind::Binder,
        other => {
            return Err(rusqlite::Error::FromSqlConversionFailure(
                2,
                Type::Text,
                format!("unknown container kind: {}", other).into(),
            ))
        }
    };
    Ok(Container {
        id: row.get(0)?,
        name: row.get(1)?,
        kind,
        created_at: row.get(5)?,
        stats: ContainerStats {
            total: row.get(6)?,
            owned: row.get(7)?,
            wishlist: row.get(8)?,
            completion: row.get(9)?,
        },
    })
}

/// Create a container and return its id
pub fn create_container(conn: &Connection, name: &str, kind: &ContainerKind) -> LedgerResult<i64> {
    let name = name.trim();
    if name.is_empty() {
        return Err(LedgerError::InvalidName);
    }
    let (format, commander) = match kind {
        ContainerKind::Deck { format, commander } => (format.as_deref(), commander.as_deref()),
        ContainerKind::Binder => (None, None),
    };
    conn.execute(
        "INSERT INTO containers (name, kind, format, commander, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![name, kind.as_str(), format, commander, timestamp_now()],
    )?;
    let id = conn.last_insert_rowid();
    log::info!("Created {} '{}' (id {})", kind.as_str(), name, id);
    Ok(id)
}

/// Get a container by id
pub fn get_container(conn: &Connection, container_id: i64) -> LedgerResult<Option<Container>> {
    let container = conn
        .query_row(
            &format!(
                "SELECT {} FROM containers WHERE id = ?1",
                CONTAINER_COLUMNS
            ),
            params![container_id],
            row_to_container,
        )
        .optional()?;
    Ok(container)
}

/// Get a container by id, failing with `ContainerNotFound` when absent
pub fn require_container(conn: &Connection, container_id: i64) -> LedgerResult<Container> {
    get_container(conn, container_id)?.ok_or(LedgerError::ContainerNotFound(container_id))
}

/// All containers in creation order
pub fn list_containers(conn: &Connection) -> LedgerResult<Vec<Container>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM containers ORDER BY created_at, id",
        CONTAINER_COLUMNS
    ))?;
    let containers = stmt
        .query_map([], row_to_container)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(containers)
}

/// Rename a container
pub fn rename_container(conn: &Connection, container_id: i64, name: &str) -> LedgerResult<()> {
    let name = name.trim();
    if name.is_empty() {
        return Err(LedgerError::InvalidName);
    }
    let changed = conn.execute(
        "UPDATE containers SET name = ?1 WHERE id = ?2",
        params![name, container_id],
    )?;
    if changed == 0 {
        return Err(LedgerError::ContainerNotFound(container_id));
    }
    Ok(())
}

/// Delete a container. Its allocations, legacy wishlist lines and import
/// receipt go with it; the cards stay in the inventory.
///
/// Returns false when the container did not exist.
pub fn delete_container(conn: &Connection, container_id: i64) -> LedgerResult<bool> {
    let removed = conn.execute(
        "DELETE FROM containers WHERE id = ?1",
        params![container_id],
    )?;
    if removed > 0 {
        log::info!("Deleted container {}", container_id);
    }
    Ok(removed > 0)
}

/// Count owned and wished copies in a container without storing them
pub fn compute_stats(conn: &Connection, container_id: i64) -> LedgerResult<ContainerStats> {
    let (owned, wished): (i64, i64) = conn.query_row(
        "SELECT
             COALESCE(SUM(CASE WHEN c.status != 'wishlist' THEN a.quantity ELSE 0 END), 0),
             COALESCE(SUM(CASE WHEN c.status = 'wishlist' THEN a.quantity ELSE 0 END), 0)
         FROM allocations a
         JOIN cards c ON c.id = a.card_id
         WHERE a.container_id = ?1",
        params![container_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    let legacy: i64 = conn.query_row(
        "SELECT COALESCE(SUM(quantity), 0) FROM container_wishlist WHERE container_id = ?1",
        params![container_id],
        |row| row.get(0),
    )?;
    Ok(ContainerStats::from_counts(
        owned as u32,
        (wished + legacy) as u32,
    ))
}

/// Recompute and store the derived stats of a container
pub fn recompute_stats(conn: &Connection, container_id: i64) -> LedgerResult<ContainerStats> {
    let stats = compute_stats(conn, container_id)?;
    let changed = conn.execute(
        "UPDATE containers
         SET stat_total = ?1, stat_owned = ?2, stat_wishlist = ?3, completion = ?4
         WHERE id = ?5",
        params![
            stats.total,
            stats.owned,
            stats.wishlist,
            stats.completion,
            container_id
        ],
    )?;
    if changed == 0 {
        return Err(LedgerError::ContainerNotFound(container_id));
    }
    log::debug!(
        "Container {} stats: {} owned, {} wishlist ({:.1}%)",
        container_id,
        stats.owned,
        stats.wishlist,
        stats.completion
    );
    Ok(stats)
}

/// All allocation rows of a container
pub fn allocations_for_container(
    conn: &Connection,
    container_id: i64,
) -> LedgerResult<Vec<Allocation>> {
    let mut stmt = conn.prepare(
        "SELECT card_id, container_id, section, quantity, added_at
         FROM allocations
         WHERE container_id = ?1
         ORDER BY card_id, section",
    )?;
    let rows = stmt
        .query_map(params![container_id], |row| {
            Ok(Allocation {
                card_id: row.get(0)?,
                container_id: row.get(1)?,
                section: row.get(2)?,
                quantity: row.get(3)?,
                added_at: row.get(4)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Distinct ids of cards allocated in a container, ascending
pub fn card_ids_in_container(conn: &Connection, container_id: i64) -> LedgerResult<Vec<i64>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT card_id FROM allocations WHERE container_id = ?1 ORDER BY card_id",
    )?;
    let ids = stmt
        .query_map(params![container_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;
    Ok(ids)
}

/// Distinct ids of non-wishlist cards allocated in a container, ascending
pub fn owned_card_ids_in_container(
    conn: &Connection,
    container_id: i64,
) -> LedgerResult<Vec<i64>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT a.card_id
         FROM allocations a
         JOIN cards c ON c.id = a.card_id
         WHERE a.container_id = ?1 AND c.status != 'wishlist'
         ORDER BY a.card_id",
    )?;
    let ids = stmt
        .query_map(params![container_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;
    Ok(ids)
}

/// Container listing as owned/wishlist entries, mainboard first then by name
pub fn entries(conn: &Connection, container_id: i64) -> LedgerResult<Vec<ContainerEntry>> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.name, c.set_code, c.status, a.section, a.quantity, c.price, c.foil,
                c.scryfall_id
         FROM allocations a
         JOIN cards c ON c.id = a.card_id
         WHERE a.container_id = ?1",
    )?;
    let mut listing = stmt
        .query_map(params![container_id], |row| {
            let status: crate::models::CardStatus = row.get(3)?;
            let entry = if status.is_wishlist() {
                ContainerEntry::Wishlist {
                    card_id: Some(row.get(0)?),
                    name: row.get(1)?,
                    set_code: row.get(2)?,
                    section: row.get(4)?,
                    requested_quantity: row.get(5)?,
                    scryfall_id: row.get(8)?,
                }
            } else {
                ContainerEntry::Owned {
                    card_id: row.get(0)?,
                    name: row.get(1)?,
                    set_code: row.get(2)?,
                    section: row.get(4)?,
                    allocated_quantity: row.get(5)?,
                    price: row.get(6)?,
                    foil: row.get(7)?,
                }
            };
            Ok(entry)
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    for (_, legacy) in legacy_wishlist_entries(conn, container_id)? {
        listing.push(ContainerEntry::Wishlist {
            card_id: None,
            name: legacy.name,
            set_code: legacy.set_code,
            section: legacy.section,
            requested_quantity: legacy.quantity,
            scryfall_id: legacy.scryfall_id,
        });
    }

    listing.sort_by(|a, b| {
        a.section()
            .rank()
            .cmp(&b.section().rank())
            .then_with(|| entry_name(a).to_lowercase().cmp(&entry_name(b).to_lowercase()))
    });
    Ok(listing)
}

fn entry_name(entry: &ContainerEntry) -> &str {
    match entry {
        ContainerEntry::Owned { name, .. } | ContainerEntry::Wishlist { name, .. } => name,
    }
}

/// Add a free-standing wishlist line to a container
pub fn add_legacy_wishlist_entry(
    conn: &Connection,
    container_id: i64,
    entry: &LegacyWishlistEntry,
) -> LedgerResult<i64> {
    if entry.quantity == 0 {
        return Err(LedgerError::InvalidQuantity(0));
    }
    require_container(conn, container_id)?;
    conn.execute(
        "INSERT INTO container_wishlist (container_id, name, set_code, scryfall_id, section, quantity)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            container_id,
            entry.name.trim(),
            entry.set_code.trim().to_uppercase(),
            &entry.scryfall_id,
            entry.section,
            entry.quantity
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Legacy wishlist lines of a container with their row ids
pub fn legacy_wishlist_entries(
    conn: &Connection,
    container_id: i64,
) -> LedgerResult<Vec<(i64, LegacyWishlistEntry)>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, set_code, scryfall_id, section, quantity
         FROM container_wishlist
         WHERE container_id = ?1
         ORDER BY id",
    )?;
    let rows = stmt
        .query_map(params![container_id], |row| {
            Ok((
                row.get(0)?,
                LegacyWishlistEntry {
                    name: row.get(1)?,
                    set_code: row.get(2)?,
                    scryfall_id: row.get(3)?,
                    section: row.get(4)?,
                    quantity: row.get(5)?,
                },
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}
