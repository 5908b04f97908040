//! API client credentials.
//!
//! A `Credentials` value is immutable once built. Missing fields are not an
//! error at construction time: the token manager checks [`Credentials::is_valid`]
//! lazily and simply refuses to authenticate (without touching the network)
//! when either the client ID or the secret is empty.

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

/// Environment variable holding the API client ID.
pub const ENV_CLIENT_ID: &str = "FALCON_CLIENT_ID";
/// Environment variable holding the API client secret.
pub const ENV_CLIENT_SECRET: &str = "FALCON_CLIENT_SECRET";
/// Environment variable holding an optional MSSP child CID.
pub const ENV_MEMBER_CID: &str = "FALCON_MEMBER_CID";

/// OAuth2 client-credentials pair, optionally scoped to an MSSP child tenant.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    client_id: String,
    client_secret: String,
    member_cid: Option<String>,
}

impl Credentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Credentials {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            member_cid: None,
        }
    }

    /// Targets a child CID. The token exchange will carry `member_cid` so
    /// the issued token acts on behalf of that tenant.
    pub fn with_member_cid(mut self, member_cid: impl Into<String>) -> Self {
        self.member_cid = Some(member_cid.into());
        self
    }

    /// Reads credentials from `FALCON_CLIENT_ID` / `FALCON_CLIENT_SECRET`
    /// (plus `FALCON_MEMBER_CID` when set). Returns `None` unless both the
    /// ID and the secret are present.
    pub fn from_env() -> Option<Self> {
        let client_id = std::env::var(ENV_CLIENT_ID).ok()?;
        let client_secret = std::env::var(ENV_CLIENT_SECRET).ok()?;
        let mut creds = Credentials::new(client_id, client_secret);
        if let Ok(cid) = std::env::var(ENV_MEMBER_CID) {
            if !cid.trim().is_empty() {
                creds.member_cid = Some(cid);
            }
        }
        Some(creds)
    }

    /// True when both the client ID and secret are non-blank.
    pub fn is_valid(&self) -> bool {
        !self.client_id.trim().is_empty() && !self.client_secret.trim().is_empty()
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub(crate) fn client_secret(&self) -> &str {
        &self.client_secret
    }

    pub fn member_cid(&self) -> Option<&str> {
        self.member_cid.as_deref()
    }

    /// `base64(client_id:client_secret)`, presented as `basic` authorization
    /// when revoking a token.
    pub(crate) fn basic_auth_value(&self) -> String {
        STANDARD.encode(format!("{}:{}", self.client_id, self.client_secret))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("member_cid", &self.member_cid)
            .finish()
    }
}
