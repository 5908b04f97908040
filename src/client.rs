//! The generic request dispatcher ("Uber" command router).
//!
//! `FalconClient` turns an operation name plus [`CallArguments`] into one
//! HTTP call and always answers with an [`ApiResult`]:
//!
//! 1. Resolve the operation in the [`EndpointRegistry`]. Unknown names get a
//!    synthetic 500 and never touch the network.
//! 2. Make sure a valid token exists, re-authenticating when it is expired.
//!    Without one the call short-circuits to a synthetic 500
//!    ("Failed to issue token.").
//! 3. Assemble the request and hand it to the [`Transport`].
//! 4. Normalize the response, or the transport failure, into an `ApiResult`.
//!
//! Token lifecycle:
//! - The [`TokenManager`] lives behind a `tokio::sync::Mutex`. The lock covers
//!   the expiry check and renewal, never the operation's own HTTP call, so
//!   concurrent dispatches on a shared client only serialize on renewal.
//! - No retries happen here. An upstream 401 comes back to the caller as-is.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::auth::TokenManager;
use crate::config::ClientConfig;
use crate::credentials::Credentials;
use crate::error::{FalconError, Result};
use crate::registry::{EndpointRegistry, Operation};
use crate::request::{CallArguments, build_request};
use crate::result::{ApiResult, SYNTHETIC_STATUS};
use crate::transport::{ReqwestTransport, Transport, TransportOutcome};

/// Lifetime assumed for a token supplied directly by the caller. Falcon
/// issues tokens valid for 30 minutes.
pub const SUPPLIED_TOKEN_TTL: Duration = Duration::from_secs(1800);

/// Authenticated dispatcher for every operation in the registry.
pub struct FalconClient {
    auth: Mutex<TokenManager>,
    transport: Arc<dyn Transport>,
    registry: EndpointRegistry,
}

impl FalconClient {
    /// Production client: reqwest transport and the bundled registry.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built (e.g. a malformed proxy URL)
    /// or the bundled manifest does not validate.
    pub fn new(credentials: Credentials, config: &ClientConfig) -> Result<Self> {
        let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(config)?);
        let registry = EndpointRegistry::bundled()?;
        Ok(Self::with_transport(credentials, config, transport, registry))
    }

    /// Production client with credentials and base URL taken from the
    /// environment (`FALCON_CLIENT_ID`, `FALCON_CLIENT_SECRET`,
    /// `FALCON_MEMBER_CID`, `FALCON_BASE_URL`).
    ///
    /// # Errors
    ///
    /// Fails when the credential variables are missing, or for the same
    /// reasons as [`FalconClient::new`].
    pub fn from_env(config: ClientConfig) -> Result<Self> {
        let credentials = Credentials::from_env().ok_or_else(|| {
            FalconError::Config("FALCON_CLIENT_ID and FALCON_CLIENT_SECRET must be set".to_string())
        })?;
        Self::new(credentials, &config.overlay_env())
    }

    pub fn with_transport(
        credentials: Credentials,
        config: &ClientConfig,
        transport: Arc<dyn Transport>,
        registry: EndpointRegistry,
    ) -> Self {
        let auth = TokenManager::new(credentials, transport.clone(), config);
        Self::assemble(auth, transport, registry)
    }

    /// Client using a bearer token obtained elsewhere. It cannot renew the
    /// token: once [`SUPPLIED_TOKEN_TTL`] has passed, dispatches fail with
    /// "Failed to issue token.".
    pub fn with_token(
        token: impl Into<String>,
        config: &ClientConfig,
        transport: Arc<dyn Transport>,
        registry: EndpointRegistry,
    ) -> Self {
        let auth = TokenManager::new(Credentials::new("", ""), transport.clone(), config)
            .with_token(token, SUPPLIED_TOKEN_TTL);
        Self::assemble(auth, transport, registry)
    }

    fn assemble(auth: TokenManager, transport: Arc<dyn Transport>, registry: EndpointRegistry) -> Self {
        FalconClient {
            auth: Mutex::new(auth),
            transport,
            registry,
        }
    }

    /// Calls `operation` by its registry name.
    pub async fn dispatch(&self, operation: &str, args: CallArguments) -> ApiResult {
        let Some(resolved) = self.registry.resolve(operation) else {
            debug!(operation, "unknown operation");
            return ApiResult::invalid_operation();
        };
        self.execute(resolved, args).await
    }

    /// Calls an arbitrary route given as `"METHOD,/path"`, bypassing the
    /// registry. A malformed override yields a synthetic 500.
    pub async fn dispatch_override(&self, route: &str, args: CallArguments) -> ApiResult {
        match Operation::from_override(route) {
            Ok(operation) => self.execute(&operation, args).await,
            Err(e) => {
                warn!(route, error = %e, "rejected route override");
                ApiResult::error(SYNTHETIC_STATUS, &e.to_string())
            }
        }
    }

    async fn execute(&self, operation: &Operation, args: CallArguments) -> ApiResult {
        let (token, base_url) = {
            let mut auth = self.auth.lock().await;
            match auth.ensure_valid().await {
                Some(token) => (token, auth.base_url().to_string()),
                None => {
                    warn!(operation = %operation.name, "not authenticated, call skipped");
                    return ApiResult::token_failure();
                }
            }
        };

        let request = build_request(&base_url, operation, args, &token);
        debug!(operation = %operation.name, method = %operation.method, url = %request.url, "dispatching");
        match self.transport.send(request).await {
            TransportOutcome::Success(response) => ApiResult::from_transport(response),
            TransportOutcome::Failure(reason) => {
                error!(operation = %operation.name, %reason, "transport failure");
                ApiResult::transport_failure(reason)
            }
        }
    }

    /// Authenticates now instead of on the first dispatch.
    pub async fn login(&self) -> bool {
        self.auth.lock().await.authenticate().await
    }

    /// Revokes the current token.
    pub async fn logout(&self) -> bool {
        self.auth.lock().await.logout().await
    }

    pub async fn is_authenticated(&self) -> bool {
        self.auth.lock().await.is_authenticated()
    }

    pub async fn token_expired(&self) -> bool {
        self.auth.lock().await.is_expired()
    }

    pub async fn fail_reason(&self) -> Option<String> {
        self.auth.lock().await.fail_reason().map(str::to_string)
    }

    /// Base URL in effect, after any region autodiscovery.
    pub async fn base_url(&self) -> String {
        self.auth.lock().await.base_url().to_string()
    }

    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }
}
