//! Uniform result shape returned by every dispatch.
//!
//! Whatever happens during a call (a real response, an upstream 4xx/5xx, a
//! local failure) the caller receives an [`ApiResult`] with exactly three
//! fields: `status_code`, `headers`, `body`. Serializing it produces the
//! same three keys, which is the compatibility contract external tooling
//! relies on.
//!
//! Synthetic results (built locally, never seen on the wire) always use
//! status 500. Transport failures keep the failure text verbatim as a
//! string body. Lookup and authentication failures use the API's own error
//! envelope, `{"errors": [{"message": ...}]}`.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::Serialize;
use serde_json::{Value, json};

use crate::transport::TransportResponse;

/// Body of the operation is not in the registry.
pub const INVALID_OPERATION_MESSAGE: &str = "Invalid API service method.";

/// Body of a dispatch attempted without a valid token.
pub const TOKEN_FAILURE_MESSAGE: &str = "Failed to issue token.";

/// Status code used for every locally generated result.
pub const SYNTHETIC_STATUS: u16 = 500;

/// Response payload in whichever shape the server (or local failure) produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponseBody {
    /// Decoded JSON document.
    Json(Value),
    /// UTF-8 text, including transport failure descriptions.
    Text(String),
    /// Opaque binary content (downloads, archives, ...).
    Bytes(Bytes),
}

impl From<Value> for ResponseBody {
    fn from(value: Value) -> Self {
        ResponseBody::Json(value)
    }
}

impl From<String> for ResponseBody {
    fn from(value: String) -> Self {
        ResponseBody::Text(value)
    }
}

impl From<&str> for ResponseBody {
    fn from(value: &str) -> Self {
        ResponseBody::Text(value.to_string())
    }
}

impl From<Bytes> for ResponseBody {
    fn from(value: Bytes) -> Self {
        ResponseBody::Bytes(value)
    }
}

impl From<Vec<u8>> for ResponseBody {
    fn from(value: Vec<u8>) -> Self {
        ResponseBody::Bytes(Bytes::from(value))
    }
}

/// `{status_code, headers, body}`: the one shape every caller sees.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResult {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: ResponseBody,
}

impl ApiResult {
    /// Builds a result from its three parts. Pure; no inspection of `body`.
    pub fn normalize(
        status_code: u16,
        headers: BTreeMap<String, String>,
        body: impl Into<ResponseBody>,
    ) -> Self {
        ApiResult {
            status_code,
            headers,
            body: body.into(),
        }
    }

    /// Converts a transport response, decoding the body by content type:
    /// JSON types are parsed (falling back to text if the payload is not
    /// valid JSON), `text/*` becomes text, anything else stays binary.
    /// Without a `Content-Type` header a body that parses as JSON is decoded.
    pub fn from_transport(response: TransportResponse) -> Self {
        let Some(content_type) = response.header("content-type").map(str::to_ascii_lowercase) else {
            let body = match serde_json::from_slice::<Value>(&response.body) {
                Ok(value) => ResponseBody::Json(value),
                Err(_) => ResponseBody::Bytes(response.body),
            };
            return ApiResult::normalize(response.status, response.headers, body);
        };
        let body = if content_type.starts_with("application/json") || content_type.contains("+json") {
            match serde_json::from_slice::<Value>(&response.body) {
                Ok(value) => ResponseBody::Json(value),
                Err(_) => ResponseBody::Text(String::from_utf8_lossy(&response.body).into_owned()),
            }
        } else if content_type.starts_with("text/") {
            ResponseBody::Text(String::from_utf8_lossy(&response.body).into_owned())
        } else {
            ResponseBody::Bytes(response.body)
        };
        ApiResult::normalize(response.status, response.headers, body)
    }

    /// Synthetic 500 carrying a transport failure description verbatim.
    pub fn transport_failure(reason: impl Into<String>) -> Self {
        ApiResult::normalize(SYNTHETIC_STATUS, BTreeMap::new(), ResponseBody::Text(reason.into()))
    }

    /// Result in the API error envelope: `{"errors": [{"message": ...}]}`.
    pub fn error(status_code: u16, message: &str) -> Self {
        ApiResult::normalize(
            status_code,
            BTreeMap::new(),
            json!({ "errors": [{ "message": message }] }),
        )
    }

    pub fn invalid_operation() -> Self {
        ApiResult::error(SYNTHETIC_STATUS, INVALID_OPERATION_MESSAGE)
    }

    pub fn token_failure() -> Self {
        ApiResult::error(SYNTHETIC_STATUS, TOKEN_FAILURE_MESSAGE)
    }

    /// True for 2xx status codes.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// The decoded JSON body, if the body is JSON.
    pub fn json(&self) -> Option<&Value> {
        match &self.body {
            ResponseBody::Json(value) => Some(value),
            _ => None,
        }
    }

    /// `errors[].message` values from a JSON body, in order.
    pub fn error_messages(&self) -> Vec<&str> {
        self.json()
            .and_then(|body| body.get("errors"))
            .and_then(Value::as_array)
            .map(|errors| {
                errors
                    .iter()
                    .filter_map(|e| e.get("message").and_then(Value::as_str))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The `resources` array from a JSON body.
    pub fn resources(&self) -> Option<&Vec<Value>> {
        self.json()
            .and_then(|body| body.get("resources"))
            .and_then(Value::as_array)
    }
}
