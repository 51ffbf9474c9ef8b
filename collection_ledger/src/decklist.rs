//! Decklist text parser
//!
//! One card per line: `<qty>[x] <name>[ (<SET>)][ *F*]`. A line mentioning
//! "sideboard" switches every following line to the sideboard. Blank lines and
//! `//` comments are ignored; anything else that does not parse is skipped and
//! counted.

use crate::models::Section;
use mtg_common::CardIdentifier;
use serde::{Deserialize, Serialize};

/// Largest quantity a single line may carry; bigger counts are skipped
pub const MAX_LINE_QUANTITY: u32 = 9_999;

/// One parsed decklist line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecklistEntry {
    pub quantity: u32,
    pub name: String,
    #[serde(default)]
    pub set_code: Option<String>,
    #[serde(default)]
    pub foil: bool,
    pub section: Section,
}

impl DecklistEntry {
    /// Identifier used for catalog lookups
    pub fn identifier(&self) -> CardIdentifier {
        CardIdentifier::named(&self.name, self.set_code.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedDecklist {
    pub entries: Vec<DecklistEntry>,
    /// Lines that looked like cards but could not be parsed
    pub skipped_lines: usize,
}

impl ParsedDecklist {
    pub fn total_quantity(&self) -> u64 {
        self.entries.iter().map(|e| u64::from(e.quantity)).sum()
    }
}

/// Parse a whole decklist. With `include_sideboard` off, sideboard lines are dropped.
pub fn parse_decklist(text: &str, include_sideboard: bool) -> ParsedDecklist {
    let mut parsed = ParsedDecklist::default();
    let mut section = Section::Mainboard;

    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if line.to_lowercase().contains("sideboard") {
            section = Section::Sideboard;
            continue;
        }
        if line.starts_with("//") {
            continue;
        }
        match parse_line(line) {
            Some((quantity, name, set_code, foil)) => {
                if section == Section::Sideboard && !include_sideboard {
                    continue;
                }
                parsed.entries.push(DecklistEntry {
                    quantity,
                    name,
                    set_code,
                    foil,
                    section,
                });
            }
            None => {
                log::debug!("Skipping unrecognized line {}: {}", index + 1, line);
                parsed.skipped_lines += 1;
            }
        }
    }

    parsed
}

fn parse_line(line: &str) -> Option<(u32, String, Option<String>, bool)> {
    let (qty_token, rest) = line.split_once(char::is_whitespace)?;
    let qty_token = qty_token
        .strip_suffix('x')
        .or_else(|| qty_token.strip_suffix('X'))
        .unwrap_or(qty_token);
    let quantity: u32 = qty_token.parse().ok()?;
    if quantity == 0 || quantity > MAX_LINE_QUANTITY {
        return None;
    }

    let mut rest = rest.trim();
    let mut foil = false;
    if let Some(stripped) = rest.strip_suffix("*F*") {
        foil = true;
        rest = stripped.trim_end();
    }

    let mut set_code = None;
    if rest.ends_with(')') {
        if let Some(open) = rest.rfind(" (") {
            let code = rest[open + 2..rest.len() - 1].trim();
            if !code.is_empty() {
                set_code = Some(code.to_uppercase());
            }
            rest = rest[..open].trim_end();
        }
    }

    if rest.is_empty() {
        return None;
    }
    Some((quantity, rest.to_string(), set_code, foil))
}
