//! OAuth2 client-credentials token lifecycle for the Falcon API.
//!
//! `TokenManager` exchanges [`Credentials`] for a bearer token at
//! `{base_url}/oauth2/token`, remembers when it was issued, and reports it as
//! expired `renew_window` before the advertised TTL runs out so no request is
//! built with a token that dies mid-flight. Renewal is lazy: the dispatcher
//! calls [`TokenManager::ensure_valid`] at the start of every operation.
//!
//! None of the operations here return `Err`. A failed exchange leaves the
//! manager unauthenticated and records why in [`TokenManager::fail_reason`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{ClientConfig, Cloud};
use crate::credentials::Credentials;
use crate::registry::HttpMethod;
use crate::transport::{RequestBody, Transport, TransportOutcome, TransportRequest, TransportResponse};

const TOKEN_ROUTE: &str = "/oauth2/token";
const REVOKE_ROUTE: &str = "/oauth2/revoke";

/// Response header naming the cloud that actually owns the API client.
const REGION_HEADER: &str = "x-cs-region";

/// Fields of the token response we rely on. Everything else is ignored.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// The currently issued token. Only `authenticate()` replaces it and only
/// `revoke()` (or a failed exchange) clears it.
#[derive(Debug, Clone)]
struct TokenState {
    value: String,
    issued_at: Instant,
    ttl: Duration,
}

impl TokenState {
    fn is_expired_at(&self, now: Instant, renew_window: Duration) -> bool {
        let lifetime = self.ttl.saturating_sub(renew_window);
        now.saturating_duration_since(self.issued_at) >= lifetime
    }
}

/// Owns the credentials and the token issued for them.
///
/// States: unauthenticated (no token) and authenticated (token present).
/// An expired token stays stored until the next `ensure_valid()` replaces
/// it, or clears it when re-authentication fails.
pub struct TokenManager {
    transport: Arc<dyn Transport>,
    credentials: Credentials,
    base_url: String,
    renew_window: Duration,
    state: Option<TokenState>,
    fail_reason: Option<String>,
    token_status: Option<u16>,
}

impl TokenManager {
    pub fn new(credentials: Credentials, transport: Arc<dyn Transport>, config: &ClientConfig) -> Self {
        TokenManager {
            transport,
            credentials,
            base_url: config.base_url.clone(),
            renew_window: config.renew_window,
            state: None,
            fail_reason: None,
            token_status: None,
        }
    }

    /// Installs a token issued elsewhere, treated as freshly issued with the
    /// given TTL. Without valid credentials it cannot be renewed: once it
    /// expires the manager drops to unauthenticated.
    pub fn with_token(mut self, value: impl Into<String>, ttl: Duration) -> Self {
        self.state = Some(TokenState {
            value: value.into(),
            issued_at: Instant::now(),
            ttl,
        });
        self
    }

    /// Exchanges the credentials for a new token.
    ///
    /// Returns `false` without touching the network when the credentials are
    /// incomplete. Any failure clears the stored token.
    pub async fn authenticate(&mut self) -> bool {
        if !self.credentials.is_valid() {
            self.fail(None, "Invalid credentials specified".to_string());
            return false;
        }

        let mut form = vec![
            ("client_id".to_string(), self.credentials.client_id().to_string()),
            ("client_secret".to_string(), self.credentials.client_secret().to_string()),
        ];
        if let Some(cid) = self.credentials.member_cid() {
            form.push(("member_cid".to_string(), cid.to_string()));
        }
        let mut request = TransportRequest::new(HttpMethod::Post, format!("{}{TOKEN_ROUTE}", self.base_url));
        request.body = RequestBody::Form(form);

        match self.transport.send(request).await {
            TransportOutcome::Success(response) => self.accept(response),
            TransportOutcome::Failure(reason) => {
                self.fail(None, reason);
                false
            }
        }
    }

    fn accept(&mut self, response: TransportResponse) -> bool {
        let status = response.status;
        if !(200..300).contains(&status) {
            let reason = first_error_message(&response.body)
                .unwrap_or_else(|| format!("token request failed with status {status}"));
            self.fail(Some(status), reason);
            return false;
        }

        let token = match serde_json::from_slice::<TokenResponse>(&response.body) {
            Ok(token) if !token.access_token.is_empty() => token,
            Ok(_) => {
                self.fail(Some(status), "token response carried an empty access_token".to_string());
                return false;
            }
            Err(e) => {
                self.fail(Some(status), format!("malformed token response: {e}"));
                return false;
            }
        };

        self.discover_region(&response);
        self.state = Some(TokenState {
            value: token.access_token,
            issued_at: Instant::now(),
            ttl: Duration::from_secs(token.expires_in),
        });
        self.fail_reason = None;
        self.token_status = Some(status);
        debug!(status, expires_in = token.expires_in, "token issued");
        true
    }

    /// Follows the region the API reports for this client, but only when
    /// we are talking to one of the known clouds to begin with.
    fn discover_region(&mut self, response: &TransportResponse) {
        let Some(current) = Cloud::from_base_url(&self.base_url) else {
            return;
        };
        let Some(region) = response.header(REGION_HEADER).and_then(Cloud::from_name) else {
            return;
        };
        if region != current {
            info!(from = %self.base_url, to = %region.base_url(), "switching to the client's home region");
            self.base_url = region.base_url();
        }
    }

    fn fail(&mut self, status: Option<u16>, reason: String) {
        warn!(status, %reason, "authentication failed");
        self.state = None;
        self.token_status = status;
        self.fail_reason = Some(reason);
    }

    /// Revokes `token_value` at `{base_url}/oauth2/revoke`.
    ///
    /// Local token state is cleared whatever happens. Returns whether the
    /// revoke request completed without a transport failure; the server's
    /// status code does not matter. Incomplete credentials skip the call and
    /// return `false`.
    pub async fn revoke(&mut self, token_value: &str) -> bool {
        self.state = None;
        if !self.credentials.is_valid() {
            return false;
        }

        let mut request = TransportRequest::new(HttpMethod::Post, format!("{}{REVOKE_ROUTE}", self.base_url));
        // The revoke endpoint authenticates the API client, not the token.
        request.headers.insert(
            "Authorization".to_string(),
            format!("basic {}", self.credentials.basic_auth_value()),
        );
        request.body = RequestBody::Form(vec![("token".to_string(), token_value.to_string())]);

        match self.transport.send(request).await {
            TransportOutcome::Success(response) => {
                debug!(status = response.status, "token revoked");
                true
            }
            TransportOutcome::Failure(reason) => {
                warn!(%reason, "token revocation failed");
                false
            }
        }
    }

    /// Revokes the current token. `false` when there is none.
    pub async fn logout(&mut self) -> bool {
        match self.state.as_ref().map(|s| s.value.clone()) {
            Some(value) => self.revoke(&value).await,
            None => false,
        }
    }

    /// True when no token exists or it is within `renew_window` of its TTL.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    pub(crate) fn is_expired_at(&self, now: Instant) -> bool {
        self.state
            .as_ref()
            .is_none_or(|state| state.is_expired_at(now, self.renew_window))
    }

    /// Re-authenticates when the token is expired and returns the token to
    /// use, or `None` when the manager is not authenticated.
    pub async fn ensure_valid(&mut self) -> Option<String> {
        if self.is_expired() && !self.authenticate().await {
            return None;
        }
        self.token_value().map(str::to_string)
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.is_some()
    }

    pub fn token_value(&self) -> Option<&str> {
        self.state.as_ref().map(|s| s.value.as_str())
    }

    /// Why the last exchange failed, if it did.
    pub fn fail_reason(&self) -> Option<&str> {
        self.fail_reason.as_deref()
    }

    /// HTTP status of the last token exchange that got a response.
    pub fn token_status(&self) -> Option<u16> {
        self.token_status
    }

    /// Base URL in effect, after any region autodiscovery.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn renew_window(&self) -> Duration {
        self.renew_window
    }
}

fn first_error_message(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    value
        .get("errors")?
        .as_array()?
        .iter()
        .find_map(|e| e.get("message").and_then(Value::as_str))
        .map(str::to_string)
}
