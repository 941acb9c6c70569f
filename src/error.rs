// src/error.rs

//! Error taxonomy for the relay.
//!
//! Every variant except [`RelayError::Config`] is recoverable: the dispatch
//! loop logs it and moves on to the next item or source.

use std::fmt;

use thiserror::Error;

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

#[derive(Error, Debug)]
pub enum RelayError {
    /// Source unreachable or its page could not be parsed.
    #[error("fetch failed for {source_id}: {message}")]
    Fetch { source_id: String, message: String },

    /// Notifier unreachable or payload rejected.
    #[error("post failed for {source_id}: {message}")]
    Post { source_id: String, message: String },

    /// Cursor persistence failed. The in-memory cursor has still advanced.
    #[error("cursor write to {path} failed: {message}")]
    StoreWrite { path: String, message: String },

    /// Missing or invalid configuration. Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),
}

impl RelayError {
    pub fn fetch(source: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Fetch {
            source_id: source.into(),
            message: message.to_string(),
        }
    }

    pub fn post(source: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Post {
            source_id: source.into(),
            message: message.to_string(),
        }
    }

    pub fn store_write(path: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::StoreWrite {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Short kind label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Fetch { .. } => "fetch",
            Self::Post { .. } => "post",
            Self::StoreWrite { .. } => "store_write",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Http(_) => "http",
            Self::Json(_) => "json",
            Self::Toml(_) => "toml",
            Self::Url(_) => "url",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_source_and_message() {
        let e = RelayError::fetch("discudemy", "timeout");
        assert_eq!(e.to_string(), "fetch failed for discudemy: timeout");
        assert_eq!(e.kind(), "fetch");
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        let e: RelayError = io.into();
        assert_eq!(e.kind(), "io");
    }
}
