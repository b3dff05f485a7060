//! Typed errors for the crawl pipeline.
//!
//! Everything below the orchestrator returns one of these; the orchestrator
//! folds them into a `CrawlOutcome` with `status=error`.

use thiserror::Error;

/// Why the last fetch attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchFailure {
    #[error("HTTP {0}")]
    Status(u16),

    #[error("network error: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum FetchError {
    /// Every attempt failed
    #[error("failed to fetch {url} after {attempts} attempts: {last}")]
    Exhausted {
        url: String,
        attempts: u32,
        last: FetchFailure,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// A listing row that does not carry the fixed leading fields.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RowError {
    #[error("malformed row: expected {expected} text fields, found {found}")]
    TooFewFields { found: usize, expected: usize },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("store directory could not be created: {0}")]
    Io(#[from] std::io::Error),

    #[error("store lock poisoned")]
    Poisoned,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Why one facility's run could not complete.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("No URL configured for {0}")]
    NoUrlConfigured(String),

    #[error("Failed to fetch facility page: {0}")]
    Fetch(#[from] FetchError),

    #[error("Storage failure: {0}")]
    Store(#[from] StoreError),
}
