//! Client configuration and the Falcon cloud region table.
//!
//! `ClientConfig` can be built in code, read from a TOML file, or overlaid
//! from the environment. Durations are expressed in whole seconds in TOML:
//!
//! ```toml
//! base_url = "us-2"
//! timeout = 60
//! connect_timeout = 10
//! renew_window = 20
//! proxy = "http://proxy.internal:3128"
//! ssl_verify = true
//! ca_bundle = "/etc/ssl/certs/corp-root.pem"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FalconError, Result};

/// Environment variable that overrides the configured base URL.
pub const ENV_BASE_URL: &str = "FALCON_BASE_URL";

/// Default safety margin subtracted from a token's TTL before renewal.
pub const DEFAULT_RENEW_WINDOW: Duration = Duration::from_secs(20);

/// Overall per-request timeout. Covers connect, send and body download.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// TCP + TLS handshake timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// `User-Agent` sent with every request unless overridden.
pub const DEFAULT_USER_AGENT: &str = concat!("falcon-uber/", env!("CARGO_PKG_VERSION"));

// ── Cloud regions ─────────────────────────────────────────────────────

/// Falcon cloud regions with a well-known API host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cloud {
    Us1,
    Us2,
    Eu1,
    UsGov1,
    UsGov2,
}

impl Cloud {
    pub const ALL: [Cloud; 5] = [Cloud::Us1, Cloud::Us2, Cloud::Eu1, Cloud::UsGov1, Cloud::UsGov2];

    /// API host for this region (no scheme).
    pub fn host(self) -> &'static str {
        match self {
            Cloud::Us1 => "api.crowdstrike.com",
            Cloud::Us2 => "api.us-2.crowdstrike.com",
            Cloud::Eu1 => "api.eu-1.crowdstrike.com",
            Cloud::UsGov1 => "api.laggar.gcw.crowdstrike.com",
            Cloud::UsGov2 => "api.us-gov-2.crowdstrike.mil",
        }
    }

    pub fn base_url(self) -> String {
        format!("https://{}", self.host())
    }

    /// Parses a region short name. Dashes and case are ignored, so `us-2`,
    /// `US2` and `Us-2` all resolve to [`Cloud::Us2`].
    pub fn from_name(name: &str) -> Option<Cloud> {
        match name.replace('-', "").to_ascii_lowercase().as_str() {
            "us1" => Some(Cloud::Us1),
            "us2" => Some(Cloud::Us2),
            "eu1" => Some(Cloud::Eu1),
            "usgov1" => Some(Cloud::UsGov1),
            "usgov2" => Some(Cloud::UsGov2),
            _ => None,
        }
    }

    /// Identifies the region served by `base_url`, if it is one of ours.
    pub fn from_base_url(base_url: &str) -> Option<Cloud> {
        let host = base_url
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/')
            .to_ascii_lowercase();
        Cloud::ALL.into_iter().find(|c| c.host() == host)
    }
}

/// Normalizes a user-supplied base URL.
///
/// - Region names (`us1`, `US-2`, `eu-1`, `usgov1`, ...) map to their API URL.
/// - Values without a scheme get `https://` prepended.
/// - A trailing `/` is removed so routes can be appended verbatim.
pub fn confirm_base_url(value: &str) -> String {
    let value = value.trim();
    let url = if value.contains("://") {
        value.to_string()
    } else if let Some(cloud) = Cloud::from_name(value) {
        cloud.base_url()
    } else {
        format!("https://{value}")
    };
    url.trim_end_matches('/').to_string()
}

// ── Client configuration ─────────────────────────────────────────────

/// Connection settings shared by the token manager and the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// API base URL or region short name. Normalized by [`confirm_base_url`].
    pub base_url: String,
    /// Per-request timeout.
    #[serde(with = "seconds")]
    pub timeout: Duration,
    /// Connection establishment timeout.
    #[serde(with = "seconds")]
    pub connect_timeout: Duration,
    /// Value of the `User-Agent` header.
    pub user_agent: String,
    /// Optional HTTP(S) proxy applied to all requests.
    pub proxy: Option<String>,
    /// Safety margin subtracted from the token TTL.
    #[serde(with = "seconds")]
    pub renew_window: Duration,
    /// Verify server certificates. Turn off only for TLS-intercepting
    /// proxies you trust.
    pub ssl_verify: bool,
    /// Extra PEM root certificate(s) trusted alongside the system store.
    pub ca_bundle: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            base_url: Cloud::Us1.base_url(),
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            proxy: None,
            renew_window: DEFAULT_RENEW_WINDOW,
            ssl_verify: true,
            ca_bundle: None,
        }
    }
}

impl ClientConfig {
    /// Default configuration pointed at `base_url`. Used by tests to target
    /// a local mock server.
    pub fn with_base_url(base_url: &str) -> Self {
        ClientConfig {
            base_url: confirm_base_url(base_url),
            ..ClientConfig::default()
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let mut config: ClientConfig = toml::from_str(text)?;
        config.base_url = confirm_base_url(&config.base_url);
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| FalconError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Applies `FALCON_BASE_URL` on top of `self` when it is set.
    pub fn overlay_env(mut self) -> Self {
        if let Ok(base) = std::env::var(ENV_BASE_URL) {
            if !base.trim().is_empty() {
                self.base_url = confirm_base_url(&base);
            }
        }
        self
    }

    /// Default configuration with environment overrides applied.
    pub fn from_env() -> Self {
        ClientConfig::default().overlay_env()
    }

    fn validate(&self) -> Result<()> {
        // An empty value normalizes to the bare scheme "https:".
        if self.base_url.is_empty() || self.base_url.ends_with(':') {
            return Err(FalconError::Config("base_url must not be empty".to_string()));
        }
        if self.timeout.is_zero() {
            return Err(FalconError::Config("timeout must be greater than zero".to_string()));
        }
        Ok(())
    }
}

/// Serde adapter storing a `Duration` as whole seconds.
mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
