use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// What a card row represents in the collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardStatus {
    Collection,
    Sale,
    Trade,
    /// Wanted, not owned. Allocations against these cards are demand, not supply.
    Wishlist,
}

impl CardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardStatus::Collection => "collection",
            CardStatus::Sale => "sale",
            CardStatus::Trade => "trade",
            CardStatus::Wishlist => "wishlist",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "collection" => Some(CardStatus::Collection),
            "sale" => Some(CardStatus::Sale),
            "trade" => Some(CardStatus::Trade),
            "wishlist" => Some(CardStatus::Wishlist),
            _ => None,
        }
    }

    pub fn is_wishlist(&self) -> bool {
        matches!(self, CardStatus::Wishlist)
    }
}

/// Part of a container an allocation belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Mainboard,
    Sideboard,
}

impl Section {
    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Mainboard => "mainboard",
            Section::Sideboard => "sideboard",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "mainboard" | "main" => Some(Section::Mainboard),
            "sideboard" | "side" => Some(Section::Sideboard),
            _ => None,
        }
    }

    /// Sort rank used by deterministic orderings (mainboard first)
    pub fn rank(&self) -> u8 {
        match self {
            Section::Mainboard => 0,
            Section::Sideboard => 1,
        }
    }
}

fn unknown_value(what: &str, value: &str) -> FromSqlError {
    FromSqlError::Other(format!("unknown {}: {}", what, value).into())
}

impl ToSql for CardStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for CardStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        CardStatus::parse(s).ok_or_else(|| unknown_value("card status", s))
    }
}

impl ToSql for Section {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for Section {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        Section::parse(s).ok_or_else(|| unknown_value("section", s))
    }
}

/// An owned (or wanted) card in the inventory
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Card {
    pub id: i64,
    pub name: String,
    pub set_code: String,
    pub quantity: u32,
    pub status: CardStatus,
    pub price: f64,
    pub foil: bool,
    pub condition: String,
    pub language: String,
    pub scryfall_id: Option<String>,
    pub created_at: String,
}

/// Card data used to insert or upsert an inventory row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCard {
    pub name: String,
    #[serde(default)]
    pub set_code: String,
    pub quantity: u32,
    pub status: CardStatus,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub foil: bool,
    #[serde(default = "default_condition")]
    pub condition: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub scryfall_id: Option<String>,
}

fn default_condition() -> String {
    "NM".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

impl NewCard {
    /// A collection card with default condition and language
    pub fn collection(name: &str, set_code: &str, quantity: u32) -> Self {
        Self {
            name: name.trim().to_string(),
            set_code: set_code.trim().to_uppercase(),
            quantity,
            status: CardStatus::Collection,
            price: 0.0,
            foil: false,
            condition: default_condition(),
            language: default_language(),
            scryfall_id: None,
        }
    }

    pub fn with_status(mut self, status: CardStatus) -> Self {
        self.status = status;
        self
    }
}

/// Kind-specific container attributes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContainerKind {
    Deck {
        #[serde(default)]
        format: Option<String>,
        #[serde(default)]
        commander: Option<String>,
    },
    Binder,
}

impl ContainerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerKind::Deck { .. } => "deck",
            ContainerKind::Binder => "binder",
        }
    }
}

/// Derived container counts
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ContainerStats {
    pub total: u32,
    pub owned: u32,
    pub wishlist: u32,
    /// Owned share of `total` in percent, one decimal
    pub completion: f64,
}

impl ContainerStats {
    pub fn from_counts(owned: u32, wishlist: u32) -> Self {
        let total = owned + wishlist;
        let completion = if total == 0 {
            0.0
        } else {
            (f64::from(owned) / f64::from(total) * 1000.0).round() / 10.0
        };
        Self {
            total,
            owned,
            wishlist,
            completion,
        }
    }
}

/// A deck or binder
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Container {
    pub id: i64,
    pub name: String,
    pub kind: ContainerKind,
    pub created_at: String,
    pub stats: ContainerStats,
}

/// A claim on owned copies of a card inside one container section
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Allocation {
    pub card_id: i64,
    pub container_id: i64,
    pub section: Section,
    pub quantity: u32,
    pub added_at: String,
}

/// Free-standing wishlist line stored directly on a container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyWishlistEntry {
    pub name: String,
    #[serde(default)]
    pub set_code: String,
    #[serde(default)]
    pub scryfall_id: Option<String>,
    pub section: Section,
    pub quantity: u32,
}

/// One line of a container listing
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContainerEntry {
    Owned {
        card_id: i64,
        name: String,
        set_code: String,
        section: Section,
        allocated_quantity: u32,
        price: f64,
        foil: bool,
    },
    Wishlist {
        /// `None` for legacy free-standing entries
        card_id: Option<i64>,
        name: String,
        set_code: String,
        section: Section,
        requested_quantity: u32,
        scryfall_id: Option<String>,
    },
}

impl ContainerEntry {
    pub fn quantity(&self) -> u32 {
        match self {
            ContainerEntry::Owned {
                allocated_quantity, ..
            } => *allocated_quantity,
            ContainerEntry::Wishlist {
                requested_quantity, ..
            } => *requested_quantity,
        }
    }

    pub fn section(&self) -> Section {
        match self {
            ContainerEntry::Owned { section, .. } | ContainerEntry::Wishlist { section, .. } => {
                *section
            }
        }
    }
}
