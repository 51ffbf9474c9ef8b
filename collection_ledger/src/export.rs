//! CSV export of the collection or of one container

use crate::containers;
use crate::error::ExportResult;
use crate::inventory;
use crate::models::Card;
use csv::WriterBuilder;
use rusqlite::Connection;
use std::collections::BTreeMap;
use std::io::Write;

pub const HEADERS: [&str; 8] = [
    "name",
    "setCode",
    "quantity",
    "foil",
    "scryfallId",
    "price",
    "condition",
    "language",
];

/// Separator, boolean and decimal conventions of an export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CsvDialect {
    /// Comma separated, `true`/`false`, `.` decimal
    #[default]
    Standard,
    /// Semicolon separated, `1`/`0`, `,` decimal
    Cardmarket,
}

impl CsvDialect {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "standard" | "csv" => Some(CsvDialect::Standard),
            "cardmarket" | "mkm" => Some(CsvDialect::Cardmarket),
            _ => None,
        }
    }

    fn delimiter(&self) -> u8 {
        match self {
            CsvDialect::Standard => b',',
            CsvDialect::Cardmarket => b';',
        }
    }

    fn flag(&self, value: bool) -> &'static str {
        match (self, value) {
            (CsvDialect::Standard, true) => "true",
            (CsvDialect::Standard, false) => "false",
            (CsvDialect::Cardmarket, true) => "1",
            (CsvDialect::Cardmarket, false) => "0",
        }
    }

    fn price(&self, price: f64) -> String {
        let formatted = format!("{:.2}", price);
        match self {
            CsvDialect::Standard => formatted,
            CsvDialect::Cardmarket => formatted.replace('.', ","),
        }
    }
}

/// What to export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportScope {
    /// Every owned card with its full quantity
    Collection,
    /// Owned cards allocated to one container, with the allocated quantity
    Container(i64),
}

/// Cards and quantities in `scope`. Wishlist cards never appear.
pub fn export_rows(conn: &Connection, scope: ExportScope) -> ExportResult<Vec<(Card, u32)>> {
    let rows = match scope {
        ExportScope::Collection => inventory::list_cards(conn)?
            .into_iter()
            .filter(|c| !c.status.is_wishlist() && c.quantity > 0)
            .map(|c| {
                let quantity = c.quantity;
                (c, quantity)
            })
            .collect(),
        ExportScope::Container(container_id) => {
            containers::require_container(conn, container_id)?;
            let owned = containers::owned_card_ids_in_container(conn, container_id)?;
            let mut quantities: BTreeMap<i64, u32> = BTreeMap::new();
            for allocation in containers::allocations_for_container(conn, container_id)? {
                if owned.binary_search(&allocation.card_id).is_ok() {
                    let total = quantities.entry(allocation.card_id).or_default();
                    *total = total.saturating_add(allocation.quantity);
                }
            }
            let mut rows = Vec::with_capacity(quantities.len());
            for (card_id, quantity) in quantities {
                rows.push((inventory::require_card(conn, card_id)?, quantity));
            }
            rows.sort_by(|(a, _), (b, _)| {
                a.name
                    .to_lowercase()
                    .cmp(&b.name.to_lowercase())
                    .then_with(|| a.set_code.cmp(&b.set_code))
            });
            rows
        }
    };
    Ok(rows)
}

/// Write `scope` as CSV to `writer`, returning the number of data rows
pub fn write_csv<W: Write>(
    conn: &Connection,
    scope: ExportScope,
    dialect: CsvDialect,
    writer: W,
) -> ExportResult<usize> {
    let rows = export_rows(conn, scope)?;
    let mut wtr = WriterBuilder::new()
        .has_headers(true)
        .delimiter(dialect.delimiter())
        .from_writer(writer);

    wtr.write_record(HEADERS)?;
    for (card, quantity) in &rows {
        let quantity = quantity.to_string();
        let price = dialect.price(card.price);
        wtr.write_record([
            card.name.as_str(),
            card.set_code.as_str(),
            quantity.as_str(),
            dialect.flag(card.foil),
            card.scryfall_id.as_deref().unwrap_or(""),
            price.as_str(),
            card.condition.as_str(),
            card.language.as_str(),
        ])?;
    }
    wtr.flush()?;

    log::info!("Exported {} rows ({:?}, {:?})", rows.len(), scope, dialect);
    Ok(rows.len())
}

/// Render `scope` as a CSV string
pub fn to_csv_string(conn: &Connection, scope: ExportScope, dialect: CsvDialect) -> ExportResult<String> {
    let mut buffer = Vec::new();
    write_csv(conn, scope, dialect, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
