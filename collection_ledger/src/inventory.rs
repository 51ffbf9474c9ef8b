//! Inventory store: owned and wanted card rows
//!
//! Reads are free functions over a connection. Writes that can only grow
//! supply (insert, upsert) live here; anything that lowers a quantity or
//! removes a card goes through [`crate::ledger`] so the supply invariant has a
//! single choke point.

use crate::database::timestamp_now;
use crate::error::{LedgerError, LedgerResult};
use crate::models::{Card, CardStatus, NewCard};
use rusqlite::{params, Connection, OptionalExtension, Row};

const CARD_COLUMNS: &str = "id, name, set_code, quantity, status, price, foil, condition, \
                            language, scryfall_id, created_at";

fn row_to_card(row: &Row<'_>) -> rusqlite::Result<Card> {
    Ok(Card {
        id: row.get(0)?,
        name: row.get(1)?,
        set_code: row.get(2)?,
        quantity: row.get(3)?,
        status: row.get(4)?,
        price: row.get(5)?,
        foil: row.get(6)?,
        condition: row.get(7)?,
        language: row.get(8)?,
        scryfall_id: row.get(9)?,
        created_at: row.get(10)?,
    })
}

/// Get a card by id
pub fn get_card(conn: &Connection, card_id: i64) -> LedgerResult<Option<Card>> {
    let card = conn
        .query_row(
            &format!("SELECT {} FROM cards WHERE id = ?1", CARD_COLUMNS),
            params![card_id],
            row_to_card,
        )
        .optional()?;
    Ok(card)
}

/// Get a card by id, failing with `CardNotFound` when absent
pub fn require_card(conn: &Connection, card_id: i64) -> LedgerResult<Card> {
    get_card(conn, card_id)?.ok_or(LedgerError::CardNotFound(card_id))
}

/// All cards, ordered by name then id
pub fn list_cards(conn: &Connection) -> LedgerResult<Vec<Card>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM cards ORDER BY name COLLATE NOCASE, id",
        CARD_COLUMNS
    ))?;
    let cards = stmt
        .query_map([], row_to_card)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(cards)
}

/// Find a card by its identity (name, set, foil, status), case-insensitive
pub fn find_by_identity(
    conn: &Connection,
    name: &str,
    set_code: &str,
    foil: bool,
    status: CardStatus,
) -> LedgerResult<Option<Card>> {
    let card = conn
        .query_row(
            &format!(
                "SELECT {} FROM cards
                 WHERE name = ?1 COLLATE NOCASE
                   AND set_code = ?2 COLLATE NOCASE
                   AND foil = ?3
                   AND status = ?4
                 ORDER BY id
                 LIMIT 1",
                CARD_COLUMNS
            ),
            params![name.trim(), set_code.trim(), foil, status],
            row_to_card,
        )
        .optional()?;
    Ok(card)
}

/// Insert a new card row and return its id
pub fn insert_card(conn: &Connection, card: &NewCard) -> LedgerResult<i64> {
    if card.name.trim().is_empty() {
        return Err(LedgerError::InvalidName);
    }
    conn.execute(
        "INSERT INTO cards
         (name, set_code, quantity, status, price, foil, condition, language, scryfall_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            card.name.trim(),
            card.set_code.trim().to_uppercase(),
            card.quantity,
            card.status,
            card.price,
            card.foil,
            &card.condition,
            &card.language,
            &card.scryfall_id,
            timestamp_now(),
        ],
    )?;
    let id = conn.last_insert_rowid();
    log::debug!("Inserted card {} ({} x{})", id, card.name, card.quantity);
    Ok(id)
}

/// Insert a card, or add its quantity to the existing row with the same identity.
///
/// A non-zero price and a known catalog id refresh the stored values; they are
/// never overwritten with blanks.
pub fn upsert_card(conn: &Connection, card: &NewCard) -> LedgerResult<i64> {
    let existing = find_by_identity(conn, &card.name, &card.set_code, card.foil, card.status)?;
    match existing {
        Some(found) => {
            if found.quantity.checked_add(card.quantity).is_none() {
                return Err(LedgerError::QuantityOverflow {
                    card_id: found.id,
                    max: u32::MAX,
                });
            }
            conn.execute(
                "UPDATE cards
                 SET quantity = quantity + ?1,
                     price = CASE WHEN ?2 > 0 THEN ?2 ELSE price END,
                     scryfall_id = COALESCE(?3, scryfall_id)
                 WHERE id = ?4",
                params![card.quantity, card.price, &card.scryfall_id, found.id],
            )?;
            log::debug!(
                "Upserted card {} ({}): +{} copies",
                found.id,
                found.name,
                card.quantity
            );
            Ok(found.id)
        }
        None => insert_card(conn, card),
    }
}

/// Edit the descriptive fields of a card. Quantity changes go through the ledger.
pub fn update_details(
    conn: &Connection,
    card_id: i64,
    price: f64,
    condition: &str,
    language: &str,
) -> LedgerResult<()> {
    let changed = conn.execute(
        "UPDATE cards SET price = ?1, condition = ?2, language = ?3 WHERE id = ?4",
        params![price, condition, language, card_id],
    )?;
    if changed == 0 {
        return Err(LedgerError::CardNotFound(card_id));
    }
    Ok(())
}

/// Total quantity allocated for a card across all containers
pub fn allocated_total(conn: &Connection, card_id: i64) -> LedgerResult<u64> {
    let total: i64 = conn.query_row(
        "SELECT COALESCE(SUM(quantity), 0) FROM allocations WHERE card_id = ?1",
        params![card_id],
        |row| row.get(0),
    )?;
    Ok(total.max(0) as u64)
}

/// Total number of card rows
pub fn get_card_count(conn: &Connection) -> LedgerResult<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM cards", [], |row| row.get(0))?)
}

/// Remove a card row; allocations cascade. Callers go through `ledger::retire_card`.
pub(crate) fn delete_card_row(conn: &Connection, card_id: i64) -> LedgerResult<bool> {
    let removed = conn.execute("DELETE FROM cards WHERE id = ?1", params![card_id])?;
    Ok(removed > 0)
}

/// Set the owned quantity column. Callers go through `ledger::reduce_allocations_for_card`.
pub(crate) fn set_quantity(conn: &Connection, card_id: i64, quantity: u32) -> LedgerResult<()> {
    let changed = conn.execute(
        "UPDATE cards SET quantity = ?1 WHERE id = ?2",
        params![quantity, card_id],
    )?;
    if changed == 0 {
        return Err(LedgerError::CardNotFound(card_id));
    }
    Ok(())
}
