//! The built-in stage catalog.

use crate::models::Stage;

use super::ProgressionError;

const DEFAULT_CATALOG: &str = include_str!("stages.json");

/// Parse a catalog document.
///
/// Statuses are not part of the document; every stage comes back `Locked` and
/// the engine opens the first one.
pub fn parse_catalog(json: &str) -> Result<Vec<Stage>, ProgressionError> {
    serde_json::from_str(json).map_err(|e| ProgressionError::InvalidCatalog(e.to_string()))
}

/// The fourteen stages shipped with the game.
pub fn default_catalog() -> Result<Vec<Stage>, ProgressionError> {
    parse_catalog(DEFAULT_CATALOG)
}
