//! Custom error types for rustwos.
//!
//! Per-row failures in a scrape run are `WosError` values that the batch
//! driver turns into a row status and a log line; they never abort the run.

use thiserror::Error;

/// Main error type for rustwos operations.
#[derive(Debug, Error)]
pub enum WosError {
    /// Session setup or teardown failed
    #[error("Session error: {0}")]
    Session(String),

    /// Network/HTTP request error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// HTML parsing error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Rate limited by the citation database
    #[error("Rate limited, retry after {0}s")]
    RateLimited(u64),

    /// Remote site returned an error status
    #[error("API error: {code} - {message}")]
    Api {
        /// HTTP status code
        code: i32,
        /// Error message
        message: String,
    },

    /// CAPTCHA page served instead of results
    #[error("CAPTCHA detected, please refresh cookies")]
    Captcha,

    /// Search or record page had nothing usable
    #[error("Not found: {0}")]
    NotFound(String),

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV read/write error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type alias using `WosError`
pub type Result<T> = std::result::Result<T, WosError>;

/// Extension trait for adding context to Option types
pub trait OptionExt<T> {
    /// Convert Option to Result with a parse error message
    fn ok_or_parse(self, msg: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_parse(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| WosError::Parse(msg.to_string()))
    }
}
