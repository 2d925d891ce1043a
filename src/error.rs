//! Error taxonomy for the collector. Library code returns [`CollectorError`];
//! `main.rs` wraps startup failures in `anyhow` for top-level `?` propagation.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, CollectorError>;

/// Errors surfaced by the config loader, scrape pipeline, and store façade.
///
/// Per-fetch variants (`Fetch`, `Parse`, `Persist`) are never propagated past a
/// worker's own `tick` — they are logged and the scrape continues. `ConfigParse`
/// is fatal at initial load and logged-and-swallowed on watch updates.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("failed to parse collector config: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    #[error("scrape fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("profile payload could not be decoded: {0}")]
    InvalidProfile(String),

    #[error("parsed profile has zero sample-type descriptors")]
    EmptySampleTypes,

    #[error("store rejected write: {0}")]
    Persist(String),

    #[error("profile not found: {0}")]
    ProfileNotFound(String),

    #[error("invalid label filter: {0}")]
    InvalidLabelFilter(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
