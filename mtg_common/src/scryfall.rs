//! Scryfall wire types
//!
//! Only the fields the collection ledger consumes are modelled; everything is
//! defaulted so partial responses still deserialize.

use crate::catalog::CardRecord;
use serde::{Deserialize, Serialize};

/// Scryfall card response
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScryfallCard {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub set: String,
    #[serde(default)]
    pub set_name: Option<String>,
    #[serde(default)]
    pub collector_number: Option<String>,
    #[serde(default)]
    pub prices: ScryfallPrices,
    #[serde(default)]
    pub image_uris: Option<ImageUris>,
    /// For double-faced cards, images are in card_faces
    #[serde(default)]
    pub card_faces: Option<Vec<CardFace>>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ScryfallPrices {
    pub eur: Option<String>,
    pub eur_foil: Option<String>,
    pub usd: Option<String>,
    pub usd_foil: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ImageUris {
    pub small: Option<String>,
    pub normal: Option<String>,
    pub large: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CardFace {
    pub name: String,
    #[serde(default)]
    pub image_uris: Option<ImageUris>,
}

/// Paginated list returned by `/cards/search`
#[derive(Debug, Deserialize)]
pub struct ScryfallList {
    #[serde(default)]
    pub data: Vec<ScryfallCard>,
    #[serde(default)]
    pub has_more: bool,
}

/// Response of `POST /cards/collection`
#[derive(Debug, Deserialize)]
pub struct CollectionResponse {
    #[serde(default)]
    pub data: Vec<ScryfallCard>,
    #[serde(default)]
    pub not_found: Vec<serde_json::Value>,
}

/// Scryfall API error response
#[derive(Debug, Deserialize)]
pub struct ScryfallError {
    pub status: u16,
    pub code: String,
    pub details: String,
}

impl ScryfallCard {
    /// Get the primary image URL (normal size)
    pub fn image_url(&self) -> Option<&str> {
        // Try direct image_uris first
        if let Some(ref uris) = self.image_uris {
            return uris.normal.as_deref();
        }
        // For double-faced cards, get front face image
        if let Some(ref faces) = self.card_faces {
            if let Some(face) = faces.first() {
                if let Some(ref uris) = face.image_uris {
                    return uris.normal.as_deref();
                }
            }
        }
        None
    }

    /// Best available non-foil price, EUR first then USD. Missing prices are 0.
    pub fn price(&self) -> f64 {
        [&self.prices.eur, &self.prices.usd]
            .into_iter()
            .flatten()
            .filter_map(|p| match p.parse::<f64>() {
                Ok(price) => Some(price),
                Err(_) => {
                    log::debug!("Ignoring unparsable price '{}' of {}", p, self.name);
                    None
                }
            })
            .find(|p| *p > 0.0)
            .unwrap_or(0.0)
    }

    /// Convert to the catalog record the ledger stores
    pub fn to_record(&self) -> CardRecord {
        CardRecord {
            scryfall_id: self.id.clone(),
            name: self.name.clone(),
            set_code: self.set.to_uppercase(),
            set_name: self.set_name.clone(),
            price: self.price(),
            image_url: self.image_url().map(|s| s.to_string()),
        }
    }
}
