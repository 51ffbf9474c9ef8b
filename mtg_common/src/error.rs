//! Error types for card catalog lookups

use thiserror::Error;

/// Errors a card catalog adapter can return
#[derive(Debug, Error)]
pub enum CatalogError {
    /// HTTP request failed (network error, timeout, etc.)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    /// Failed to parse a catalog response
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    /// Catalog answered with a non-success status
    #[error("HTTP error: {0}")]
    HttpStatus(reqwest::StatusCode),
    /// Catalog returned a structured error body
    #[error("{code}: {details}")]
    ApiResponse { code: String, details: String },
}

/// Result alias for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;
