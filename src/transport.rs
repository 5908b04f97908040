//! HTTP transport seam.
//!
//! The dispatcher and the token manager never talk to `reqwest` directly.
//! They hand a fully-assembled [`TransportRequest`] to a [`Transport`] and get
//! back a [`TransportOutcome`]: either a buffered response or the text of
//! whatever went wrong on the way (DNS, connect, TLS, timeout, body read).
//! Nothing here returns `Err` or panics, so a network failure can never
//! escape past the dispatcher as anything but a normalized result.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{FalconError, Result};
use crate::registry::HttpMethod;

/// A file attached to a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttachment {
    /// Multipart field name (usually `"file"`).
    pub field_name: String,
    /// File name reported to the server.
    pub file_name: String,
    pub content: Bytes,
    /// MIME type, e.g. `"application/octet-stream"`.
    pub content_type: String,
}

impl FileAttachment {
    pub fn new(
        file_name: impl Into<String>,
        content: impl Into<Bytes>,
        content_type: impl Into<String>,
    ) -> Self {
        FileAttachment {
            field_name: "file".to_string(),
            file_name: file_name.into(),
            content: content.into(),
            content_type: content_type.into(),
        }
    }

    pub fn with_field_name(mut self, field_name: impl Into<String>) -> Self {
        self.field_name = field_name.into();
        self
    }
}

/// Request payload, one shape per request.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(serde_json::Value),
    /// `application/x-www-form-urlencoded` pairs.
    Form(Vec<(String, String)>),
    /// `multipart/form-data` with text fields and file parts.
    Multipart {
        fields: Vec<(String, String)>,
        files: Vec<FileAttachment>,
    },
}

/// A fully-resolved HTTP request.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub method: HttpMethod,
    /// Absolute URL. May already carry a query string.
    pub url: String,
    pub headers: BTreeMap<String, String>,
    /// Additional query pairs, appended to any query already in `url`.
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
}

impl TransportRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        TransportRequest {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            query: Vec::new(),
            body: RequestBody::Empty,
        }
    }
}

/// A buffered HTTP response.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    /// Header names are lower-case; repeated headers are joined with `", "`.
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

impl TransportResponse {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Result of handing a request to the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportOutcome {
    /// The server answered (any status code).
    Success(TransportResponse),
    /// No usable response: the text describes the failure.
    Failure(String),
}

/// Sends requests over the wire. Implemented by [`ReqwestTransport`] in
/// production and by call-counting fakes in tests.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> TransportOutcome;
}

/// `reqwest`-backed transport.
///
/// Timeouts, proxy, TLS trust and user agent come from [`ClientConfig`]; the timeout
/// is the only cancellation mechanism for an in-flight request.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone());
        if let Some(proxy) = &config.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy.as_str())?);
        }
        if !config.ssl_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }
        if let Some(path) = &config.ca_bundle {
            let pem = std::fs::read(path).map_err(|source| FalconError::Io {
                path: path.clone(),
                source,
            })?;
            builder = builder.add_root_certificate(reqwest::Certificate::from_pem(&pem)?);
        }
        Ok(ReqwestTransport {
            client: builder.build()?,
        })
    }

    /// Wraps an already-configured client.
    pub fn from_client(client: Client) -> Self {
        ReqwestTransport { client }
    }

    fn build(&self, request: TransportRequest) -> reqwest::RequestBuilder {
        let mut builder = self.client.request(request.method.into(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Form(pairs) => builder.form(&pairs),
            RequestBody::Multipart { fields, files } => {
                let mut form = Form::new();
                for (name, value) in fields {
                    form = form.text(name, value);
                }
                for file in files {
                    let typed = Part::bytes(file.content.to_vec())
                        .file_name(file.file_name.clone())
                        .mime_str(&file.content_type);
                    // An unparsable MIME type falls back to reqwest's default.
                    let part = match typed {
                        Ok(part) => part,
                        Err(_) => Part::bytes(file.content.to_vec()).file_name(file.file_name),
                    };
                    form = form.part(file.field_name, part);
                }
                builder.multipart(form)
            }
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> TransportOutcome {
        let method = request.method;
        let url = request.url.clone();
        let response = match self.build(request).send().await {
            Ok(response) => response,
            Err(e) => return TransportOutcome::Failure(e.to_string()),
        };

        let status = response.status().as_u16();
        let mut headers: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in response.headers() {
            let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
            match headers.entry(name.as_str().to_string()) {
                Entry::Occupied(mut existing) => {
                    let joined = existing.get_mut();
                    joined.push_str(", ");
                    joined.push_str(&value);
                }
                Entry::Vacant(slot) => {
                    slot.insert(value);
                }
            }
        }

        match response.bytes().await {
            Ok(body) => {
                debug!(%method, %url, status, bytes = body.len(), "response received");
                TransportOutcome::Success(TransportResponse {
                    status,
                    headers,
                    body,
                })
            }
            Err(e) => TransportOutcome::Failure(e.to_string()),
        }
    }
}

/// Call-recording transport used by the unit tests of the token manager and
/// the dispatcher.
#[cfg(test)]
pub(crate) mod spy {
    use std::sync::Mutex;

    use serde_json::{Value, json};

    use super::*;

    /// Answers requests by matching the URL path suffix against registered
    /// routes. Unmatched requests get a 404 error envelope.
    #[derive(Default)]
    pub(crate) struct SpyTransport {
        routes: Vec<(String, TransportOutcome)>,
        seen: Mutex<Vec<TransportRequest>>,
    }

    impl SpyTransport {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn on(mut self, path: &str, outcome: TransportOutcome) -> Self {
            self.routes.push((path.to_string(), outcome));
            self
        }

        pub(crate) fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }

        pub(crate) fn calls_to(&self, path: &str) -> usize {
            self.requests()
                .iter()
                .filter(|r| route_of(&r.url).ends_with(path))
                .count()
        }

        pub(crate) fn requests(&self) -> Vec<TransportRequest> {
            self.seen.lock().unwrap().clone()
        }

        pub(crate) fn last_request(&self) -> TransportRequest {
            self.requests().pop().expect("no request was sent")
        }
    }

    fn route_of(url: &str) -> &str {
        url.split('?').next().unwrap_or(url)
    }

    #[async_trait]
    impl Transport for SpyTransport {
        async fn send(&self, request: TransportRequest) -> TransportOutcome {
            let route = route_of(&request.url).to_string();
            self.seen.lock().unwrap().push(request);
            self.routes
                .iter()
                .find(|(path, _)| route.ends_with(path.as_str()))
                .map(|(_, outcome)| outcome.clone())
                .unwrap_or_else(|| json_response(404, json!({"errors": [{"message": "route not mocked"}]})))
        }
    }

    /// A JSON response with an `application/json` content type.
    pub(crate) fn json_response(status: u16, body: Value) -> TransportOutcome {
        TransportOutcome::Success(TransportResponse {
            status,
            headers: BTreeMap::from([("content-type".to_string(), "application/json".to_string())]),
            body: Bytes::from(body.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_ignores_case() {
        let response = TransportResponse {
            status: 201,
            headers: BTreeMap::from([("x-cs-region".to_string(), "us-2".to_string())]),
            body: Bytes::new(),
        };
        assert_eq!(response.header("X-Cs-Region"), Some("us-2"));
        assert_eq!(response.header("content-type"), None);
    }

    #[test]
    fn file_attachment_defaults_to_file_field() {
        let file = FileAttachment::new("sample.bin", vec![1u8, 2, 3], "application/octet-stream");
        assert_eq!(file.field_name, "file");
        assert_eq!(file.content.as_ref(), &[1, 2, 3]);
        let renamed = file.with_field_name("sample");
        assert_eq!(renamed.field_name, "sample");
    }

    #[test]
    fn invalid_proxy_url_fails_construction() {
        let config = ClientConfig {
            proxy: Some("not a url at all".to_string()),
            ..ClientConfig::default()
        };
        assert!(ReqwestTransport::new(&config).is_err());
    }

    #[test]
    fn disabled_verification_still_builds() {
        let config = ClientConfig {
            ssl_verify: false,
            ..ClientConfig::default()
        };
        assert!(ReqwestTransport::new(&config).is_ok());
    }

    #[test]
    fn missing_ca_bundle_reports_path() {
        let config = ClientConfig {
            ca_bundle: Some("/definitely/not/here.pem".into()),
            ..ClientConfig::default()
        };
        let err = ReqwestTransport::new(&config).unwrap_err();
        assert!(matches!(err, FalconError::Io { .. }));
        assert!(err.to_string().contains("/definitely/not/here.pem"));
    }

    #[test]
    fn unparsable_ca_bundle_is_rejected() {
        let path = std::env::temp_dir().join(format!("falcon-uber-bad-ca-{}.pem", std::process::id()));
        std::fs::write(&path, b"-----BEGIN CERTIFICATE-----\nnot base64 at all!\n-----END CERTIFICATE-----\n")
            .unwrap();
        let config = ClientConfig {
            ca_bundle: Some(path.clone()),
            ..ClientConfig::default()
        };
        let result = ReqwestTransport::new(&config);
        let _ = std::fs::remove_file(&path);
        assert!(matches!(result, Err(FalconError::Network(_))));
    }
}
