//! Card catalog contract
//!
//! The collection ledger only needs two things from a catalog: resolve one
//! card by name (or catalog id) and resolve many identifiers in one round
//! trip. Query syntax, ranking and caching stay inside the adapter.

use crate::error::CatalogResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identifier sent to a catalog batch lookup
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CardIdentifier {
    pub name: String,
    #[serde(default)]
    pub set_code: Option<String>,
    #[serde(default)]
    pub scryfall_id: Option<String>,
}

impl CardIdentifier {
    pub fn named(name: &str, set_code: Option<&str>) -> Self {
        Self {
            name: name.trim().to_string(),
            set_code: set_code
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            scryfall_id: None,
        }
    }

    pub fn by_id(scryfall_id: &str) -> Self {
        Self {
            name: String::new(),
            set_code: None,
            scryfall_id: Some(scryfall_id.to_string()),
        }
    }

    /// Lookup key used in `resolve_batch` results.
    ///
    /// Case-insensitive on name and set so "lightning bolt (lea)" and
    /// "Lightning Bolt (LEA)" collapse onto one request.
    pub fn key(&self) -> String {
        if let Some(id) = &self.scryfall_id {
            return format!("id:{}", id.to_lowercase());
        }
        format!(
            "name:{}|{}",
            self.name.to_lowercase(),
            self.set_code.as_deref().unwrap_or("").to_lowercase()
        )
    }
}

/// Canonical card metadata returned by a catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardRecord {
    #[serde(default)]
    pub scryfall_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub set_code: String,
    #[serde(default)]
    pub set_name: Option<String>,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl CardRecord {
    /// Zero-price stand-in for a card the catalog could not find
    pub fn placeholder(name: &str, set_code: Option<&str>) -> Self {
        Self {
            scryfall_id: None,
            name: name.trim().to_string(),
            set_code: set_code.unwrap_or("").trim().to_uppercase(),
            set_name: None,
            price: 0.0,
            image_url: None,
        }
    }

    pub fn has_price(&self) -> bool {
        self.price > 0.0
    }

    pub fn has_image(&self) -> bool {
        self.image_url.as_deref().is_some_and(|u| !u.is_empty())
    }

    fn rank(&self) -> u8 {
        u8::from(self.has_price()) + u8::from(self.has_image())
    }
}

/// Pick the most useful printing out of several candidates.
///
/// A record with both a price and an image beats one with only one of them,
/// which beats one with neither. Ties keep the earlier candidate.
pub fn pick_best(candidates: Vec<CardRecord>) -> Option<CardRecord> {
    let mut best: Option<CardRecord> = None;
    for candidate in candidates {
        match &best {
            Some(current) if current.rank() >= candidate.rank() => {}
            _ => best = Some(candidate),
        }
    }
    best
}

/// Narrow contract the collection ledger depends on
#[allow(async_fn_in_trait)]
pub trait CardCatalog {
    /// Resolve a single card by name (or catalog id), optionally pinned to a set
    async fn resolve(
        &self,
        name_or_id: &str,
        set_hint: Option<&str>,
    ) -> CatalogResult<Option<CardRecord>>;

    /// Resolve many identifiers in one round trip.
    ///
    /// The returned map is keyed by [`CardIdentifier::key`]; identifiers the
    /// catalog does not know are simply absent.
    async fn resolve_batch(
        &self,
        identifiers: &[CardIdentifier],
    ) -> CatalogResult<HashMap<String, CardRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, price: f64, image: Option<&str>) -> CardRecord {
        CardRecord {
            scryfall_id: None,
            name: name.to_string(),
            set_code: "LEA".to_string(),
            set_name: None,
            price,
            image_url: image.map(|s| s.to_string()),
        }
    }

    #[test]
    fn key_is_case_insensitive() {
        let a = CardIdentifier::named("Lightning Bolt", Some("LEA"));
        let b = CardIdentifier::named("lightning bolt ", Some("lea"));
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn key_distinguishes_sets() {
        let a = CardIdentifier::named("Lightning Bolt", Some("LEA"));
        let b = CardIdentifier::named("Lightning Bolt", None);
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn key_prefers_scryfall_id() {
        let id = CardIdentifier::by_id("ABC-123");
        assert_eq!(id.key(), "id:abc-123");
    }

    #[test]
    fn pick_best_prefers_price_and_image() {
        let best = pick_best(vec![
            record("no data", 0.0, None),
            record("price only", 1.0, None),
            record("both", 2.0, Some("https://example.com/a.jpg")),
        ])
        .unwrap();
        assert_eq!(best.name, "both");
    }

    #[test]
    fn pick_best_keeps_first_on_tie() {
        let best = pick_best(vec![
            record("first", 0.0, Some("https://example.com/a.jpg")),
            record("second", 3.0, None),
        ])
        .unwrap();
        assert_eq!(best.name, "first");
    }

    #[test]
    fn pick_best_empty() {
        assert!(pick_best(Vec::new()).is_none());
    }

    #[test]
    fn placeholder_has_zero_price() {
        let p = CardRecord::placeholder(" Negate ", Some("m20"));
        assert_eq!(p.name, "Negate");
        assert_eq!(p.set_code, "M20");
        assert!(!p.has_price());
        assert!(!p.has_image());
    }
}
