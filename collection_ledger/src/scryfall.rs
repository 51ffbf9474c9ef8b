//! Scryfall-backed card catalog
//!
//! Uses async reqwest for non-blocking HTTP requests. Batch lookups go through
//! `POST /cards/collection`; single lookups search all printings of an exact
//! name and keep the most useful one.

use mtg_common::scryfall::{CollectionResponse, ScryfallError, ScryfallList};
use mtg_common::{pick_best, CardCatalog, CardIdentifier, CardRecord, ScryfallCard};
use mtg_common::{CatalogError, CatalogResult};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;

/// Scryfall accepts at most this many identifiers per collection request
pub const COLLECTION_CHUNK: usize = 75;

const USER_AGENT: &str = "CollectionLedger/1.0";

/// Production [`CardCatalog`] talking to the Scryfall REST API
#[derive(Debug, Clone)]
pub struct ScryfallCatalog {
    client: reqwest::Client,
    base_url: String,
}

impl ScryfallCatalog {
    pub fn new(base_url: &str) -> CatalogResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch one card by its Scryfall id
    pub async fn card_by_id(&self, scryfall_id: &str) -> CatalogResult<Option<ScryfallCard>> {
        let url = format!(
            "{}/cards/{}",
            self.base_url,
            urlencoding::encode(scryfall_id)
        );
        log::debug!("Fetching card from Scryfall: {}", url);
        let response = self.client.get(&url).send().await?;
        read_optional(response).await
    }

    /// Every printing of an exactly named card, optionally limited to one set
    pub async fn search_prints(&self, name: &str, set_code: Option<&str>) -> CatalogResult<Vec<ScryfallCard>> {
        let url = format!(
            "{}/cards/search?q={}&unique=prints",
            self.base_url,
            urlencoding::encode(&search_query(name, set_code))
        );
        log::debug!("Searching Scryfall: {}", url);
        let response = self.client.get(&url).send().await?;
        let list: Option<ScryfallList> = read_optional(response).await?;
        Ok(match list {
            Some(list) => {
                if list.has_more {
                    log::debug!("Only the first page of printings of '{}' is used", name);
                }
                list.data
            }
            None => Vec::new(),
        })
    }

    /// One `POST /cards/collection` round trip, at most [`COLLECTION_CHUNK`] identifiers
    async fn fetch_collection(&self, identifiers: &[CardIdentifier]) -> CatalogResult<CollectionResponse> {
        let url = format!("{}/cards/collection", self.base_url);
        let body = json!({
            "identifiers": identifiers.iter().map(wire_identifier).collect::<Vec<_>>()
        });
        log::debug!("Posting {} identifiers to Scryfall", identifiers.len());
        let response = self.client.post(&url).json(&body).send().await?;
        read_required(response).await
    }
}

impl CardCatalog for ScryfallCatalog {
    async fn resolve(
        &self,
        name_or_id: &str,
        set_hint: Option<&str>,
    ) -> CatalogResult<Option<CardRecord>> {
        let query = name_or_id.trim();
        if looks_like_scryfall_id(query) {
            return Ok(self.card_by_id(query).await?.map(|c| c.to_record()));
        }

        let set_hint = set_hint.map(str::trim).filter(|s| !s.is_empty());
        let mut prints = self.search_prints(query, set_hint).await?;
        if prints.is_empty() && set_hint.is_some() {
            log::debug!("No printing of '{}' in {:?}; searching all sets", query, set_hint);
            prints = self.search_prints(query, None).await?;
        }
        Ok(pick_best(prints.iter().map(ScryfallCard::to_record).collect()))
    }

    async fn resolve_batch(
        &self,
        identifiers: &[CardIdentifier],
    ) -> CatalogResult<HashMap<String, CardRecord>> {
        let mut found = HashMap::new();
        let mut fetched = 0;
        let mut last_error = None;
        for (index, chunk) in identifiers.chunks(COLLECTION_CHUNK).enumerate() {
            let response = match self.fetch_collection(chunk).await {
                Ok(response) => response,
                Err(e) => {
                    log::warn!(
                        "Collection lookup of chunk {} ({} identifiers) failed: {}",
                        index + 1,
                        chunk.len(),
                        e
                    );
                    last_error = Some(e);
                    continue;
                }
            };
            fetched += 1;
            if !response.not_found.is_empty() {
                log::debug!("Scryfall did not find {} identifiers", response.not_found.len());
            }
            for identifier in chunk {
                let candidates: Vec<CardRecord> = response
                    .data
                    .iter()
                    .filter(|card| matches_identifier(card, identifier))
                    .map(ScryfallCard::to_record)
                    .collect();
                if let Some(record) = pick_best(candidates) {
                    found.insert(identifier.key(), record);
                }
            }
        }
        // Only a lookup where no chunk came back at all is an error
        if fetched == 0 {
            if let Some(e) = last_error {
                return Err(e);
            }
        }
        log::info!(
            "Scryfall resolved {} of {} identifiers",
            found.len(),
            identifiers.len()
        );
        Ok(found)
    }
}

fn search_query(name: &str, set_code: Option<&str>) -> String {
    let name = name.replace('"', "");
    match set_code {
        Some(set) => format!("!\"{}\" set:{}", name, set.to_lowercase()),
        None => format!("!\"{}\"", name),
    }
}

fn wire_identifier(identifier: &CardIdentifier) -> Value {
    if let Some(id) = &identifier.scryfall_id {
        return json!({ "id": id });
    }
    match &identifier.set_code {
        Some(set) => json!({ "name": identifier.name, "set": set.to_lowercase() }),
        None => json!({ "name": identifier.name }),
    }
}

/// Whether a returned card answers an identifier. Double-faced cards also
/// match on their front face name.
fn matches_identifier(card: &ScryfallCard, identifier: &CardIdentifier) -> bool {
    if let Some(id) = &identifier.scryfall_id {
        return card.id.as_deref().is_some_and(|c| c.eq_ignore_ascii_case(id));
    }
    let front = card.name.split(" // ").next().unwrap_or(&card.name);
    let name_matches =
        card.name.eq_ignore_ascii_case(&identifier.name) || front.eq_ignore_ascii_case(&identifier.name);
    let set_matches = identifier
        .set_code
        .as_deref()
        .map_or(true, |set| card.set.eq_ignore_ascii_case(set));
    name_matches && set_matches
}

/// Scryfall ids are lowercase hyphenated UUIDs
fn looks_like_scryfall_id(s: &str) -> bool {
    s.len() == 36
        && s.char_indices().all(|(i, c)| match i {
            8 | 13 | 18 | 23 => c == '-',
            _ => c.is_ascii_hexdigit(),
        })
}

async fn read_optional<T: DeserializeOwned>(response: Response) -> CatalogResult<Option<T>> {
    if response.status() == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    read_required(response).await.map(Some)
}

async fn read_required<T: DeserializeOwned>(response: Response) -> CatalogResult<T> {
    let status = response.status();
    let body = response.text().await?;
    if status.is_success() {
        return Ok(serde_json::from_str(&body)?);
    }
    match serde_json::from_str::<ScryfallError>(&body) {
        Ok(error) => Err(CatalogError::ApiResponse {
            code: error.code,
            details: error.details,
        }),
        Err(_) => Err(CatalogError::HttpStatus(status)),
    }
}

#[cfg(test)]
#[path = "scryfall_tests.rs"]
mod tests;
