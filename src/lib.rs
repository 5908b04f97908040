//! Async Rust client for the CrowdStrike Falcon API built around one generic
//! dispatcher.
//!
//! Every Falcon operation is a row in the endpoint registry (name, HTTP verb,
//! route template). [`client::FalconClient::dispatch`] resolves the row,
//! keeps an OAuth2 token fresh, sends the request and hands back an
//! [`result::ApiResult`]: always `{status_code, headers, body}`, whether the
//! call succeeded, the API rejected it, or the network failed.
//!
//! # Modules
//!
//! - [`auth`]: OAuth2 client-credentials token lifecycle with a renewal window.
//! - [`client`]: the dispatcher.
//! - [`config`]: client settings and the Falcon cloud region table.
//! - [`credentials`]: API client ID and secret.
//! - [`error`]: construction-time errors (`FalconError`).
//! - [`hosts`]: typed wrappers for the host endpoints.
//! - [`registry`]: operation table, bundled from `manifest/endpoints.toml`.
//! - [`request`]: `CallArguments` and request assembly.
//! - [`result`]: the uniform result shape.
//! - [`transport`]: the HTTP seam and its reqwest implementation.
//!
//! # Quick Start
//!
//! ```no_run
//! use falcon_uber::client::FalconClient;
//! use falcon_uber::config::ClientConfig;
//! use falcon_uber::credentials::Credentials;
//! use falcon_uber::request::CallArguments;
//!
//! # async fn run() -> falcon_uber::error::Result<()> {
//! let config = ClientConfig::with_base_url("us-2");
//! let falcon = FalconClient::new(Credentials::new("client-id", "secret"), &config)?;
//!
//! let result = falcon
//!     .dispatch("QueryDevicesByFilter", CallArguments::new().query("limit", 10))
//!     .await;
//! println!("{} {:?}", result.status_code, result.resources());
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod hosts;
pub mod registry;
pub mod request;
pub mod result;
pub mod transport;
