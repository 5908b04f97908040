//! Endpoint registry: operation ID → HTTP verb + route template.
//!
//! The registry is immutable data loaded once at startup, either from the
//! manifest compiled into the crate ([`EndpointRegistry::bundled`]) or from a
//! caller-supplied table. Construction validates the table: names must be
//! unique and non-empty, and every route must start with `/`. Lookups are a
//! single hash-map probe.
//!
//! ## Manifest schema
//!
//! ```toml
//! [meta]
//! schema_version = 1
//!
//! [[operations]]
//! name = "QueryDevicesByFilter"
//! method = "GET"
//! path = "/devices/queries/devices/v1"
//! collection = "devices"
//! description = "Search for hosts in your environment"
//! ids_in_body = false          # optional
//! ```

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{FalconError, Result};

/// Manifest compiled into the crate.
const BUNDLED_MANIFEST: &str = include_str!("../manifest/endpoints.toml");

/// Operation name used for manual `"METHOD,/path"` overrides.
pub const MANUAL_OPERATION: &str = "Manual";

// ── HTTP method ──────────────────────────────────────────────────────

/// HTTP verbs accepted by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Patch,
    Delete,
    Put,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Put => "PUT",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            "PUT" => Ok(HttpMethod::Put),
            other => Err(format!("unsupported HTTP method '{other}'")),
        }
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Put => reqwest::Method::PUT,
        }
    }
}

// ── Operation descriptor ─────────────────────────────────────────────

/// Static description of one API operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// Operation ID, matched exactly by the dispatcher.
    pub name: String,
    pub method: HttpMethod,
    /// Route relative to the base URL. May contain one `{}` slot.
    #[serde(rename = "path")]
    pub path_template: String,
    /// Service collection the operation belongs to (e.g. `"devices"`).
    #[serde(default)]
    pub collection: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Send the caller's ID list as a JSON body `ids` array rather than in
    /// the query string.
    #[serde(default)]
    pub ids_in_body: bool,
}

impl Operation {
    pub fn new(name: impl Into<String>, method: HttpMethod, path_template: impl Into<String>) -> Self {
        Operation {
            name: name.into(),
            method,
            path_template: path_template.into(),
            collection: None,
            description: None,
            ids_in_body: false,
        }
    }

    /// Parses a manual override of the form `"METHOD,/route"`.
    ///
    /// The route is used verbatim; it bypasses the registry entirely so
    /// callers can reach endpoints that are not in the manifest yet.
    pub fn from_override(value: &str) -> Result<Self> {
        let invalid = |reason: &str| FalconError::InvalidOverride {
            value: value.to_string(),
            reason: reason.to_string(),
        };
        let (method, route) = value
            .split_once(',')
            .ok_or_else(|| invalid("expected the form 'METHOD,/path'"))?;
        let method = method.parse::<HttpMethod>().map_err(|e| invalid(&e))?;
        let route = route.trim();
        if !route.starts_with('/') {
            return Err(invalid("route must start with '/'"));
        }
        Ok(Operation::new(MANUAL_OPERATION, method, route))
    }
}

// ── Registry ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Manifest {
    meta: ManifestMeta,
    #[serde(default)]
    operations: Vec<Operation>,
}

#[derive(Debug, Deserialize)]
struct ManifestMeta {
    schema_version: u32,
}

const SUPPORTED_SCHEMA_VERSION: u32 = 1;

/// Immutable operation lookup table.
#[derive(Debug, Clone, Default)]
pub struct EndpointRegistry {
    operations: HashMap<String, Operation>,
}

impl EndpointRegistry {
    /// Builds a registry from descriptors, rejecting duplicates and
    /// malformed entries.
    pub fn from_operations(operations: impl IntoIterator<Item = Operation>) -> Result<Self> {
        let mut table = HashMap::new();
        for op in operations {
            if op.name.trim().is_empty() {
                return Err(FalconError::Registry("operation with empty name".to_string()));
            }
            if !op.path_template.starts_with('/') {
                return Err(FalconError::Registry(format!(
                    "operation '{}' has route '{}' without a leading '/'",
                    op.name, op.path_template
                )));
            }
            if op.path_template.matches("{}").count() > 1 {
                return Err(FalconError::Registry(format!(
                    "operation '{}' has more than one substitution slot",
                    op.name
                )));
            }
            if table.contains_key(&op.name) {
                return Err(FalconError::Registry(format!("duplicate operation '{}'", op.name)));
            }
            table.insert(op.name.clone(), op);
        }
        Ok(EndpointRegistry { operations: table })
    }

    /// Parses a TOML manifest.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let manifest: Manifest = toml::from_str(text)?;
        if manifest.meta.schema_version != SUPPORTED_SCHEMA_VERSION {
            return Err(FalconError::Registry(format!(
                "unsupported manifest schema_version {} (expected {SUPPORTED_SCHEMA_VERSION})",
                manifest.meta.schema_version
            )));
        }
        Self::from_operations(manifest.operations)
    }

    /// The manifest shipped with the crate.
    pub fn bundled() -> Result<Self> {
        Self::from_toml_str(BUNDLED_MANIFEST)
    }

    /// Exact-name lookup.
    pub fn resolve(&self, name: &str) -> Option<&Operation> {
        self.operations.get(name)
    }

    /// Case-insensitive substring search over operation names, sorted by name.
    pub fn search(&self, fragment: &str) -> Vec<&Operation> {
        let needle = fragment.to_ascii_lowercase();
        let mut found: Vec<&Operation> = self
            .operations
            .values()
            .filter(|op| op.name.to_ascii_lowercase().contains(&needle))
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        found
    }

    /// All operations in `collection` (case-insensitive), sorted by name.
    pub fn collection(&self, collection: &str) -> Vec<&Operation> {
        let mut found: Vec<&Operation> = self
            .operations
            .values()
            .filter(|op| {
                op.collection
                    .as_deref()
                    .is_some_and(|c| c.eq_ignore_ascii_case(collection))
            })
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        found
    }

    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.operations.values()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}
