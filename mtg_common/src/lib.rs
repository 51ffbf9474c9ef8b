//! Shared types for MTG collection tooling.
//!
//! Holds the card catalog contract the collection ledger depends on, the
//! Scryfall wire types that back the production catalog, and the error type
//! catalog adapters return.

pub mod catalog;
pub mod error;
pub mod scryfall;

pub use catalog::{pick_best, CardCatalog, CardIdentifier, CardRecord};
pub use error::{CatalogError, CatalogResult};
pub use scryfall::{CardFace, ImageUris, ScryfallCard, ScryfallPrices};
