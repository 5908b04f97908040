//! Typed errors for the falcon-uber crate.
//!
//! `FalconError` only covers failures that happen while *building* a client:
//! loading configuration, parsing the endpoint manifest, constructing the
//! HTTP transport. Once a `FalconClient` exists, nothing on the dispatch
//! surface returns an error. Authentication problems, unknown operations and
//! network failures all come back as an [`ApiResult`](crate::result::ApiResult)
//! with a `status_code` the caller inspects.

use std::path::PathBuf;

/// Errors raised while constructing clients, registries and configuration.
#[derive(Debug, thiserror::Error)]
pub enum FalconError {
    /// A configuration value is missing or malformed.
    #[error("configuration error: {0}")]
    Config(String),

    /// The endpoint manifest violates a structural invariant (duplicate
    /// operation name, empty name, route without a leading slash, ...).
    #[error("endpoint registry error: {0}")]
    Registry(String),

    /// A manual `"METHOD,/path"` override could not be parsed.
    #[error("invalid override '{value}': {reason}")]
    InvalidOverride {
        /// The raw override string supplied by the caller.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Reading a configuration file failed.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A TOML document (configuration or manifest) failed to parse.
    #[error("failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// The HTTP client could not be built (invalid proxy URL, TLS backend
    /// initialisation failure, ...).
    #[error("failed to build HTTP client: {0}")]
    Network(#[from] reqwest::Error),
}

/// Convenience alias used throughout the library.
pub type Result<T> = std::result::Result<T, FalconError>;
