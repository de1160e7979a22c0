//! Sessions, credentials and token refresh.
use std::{
    collections::HashMap,
    fmt::Debug,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;
use tracing::{debug, instrument, trace};
use url::Url;

use crate::{
    errors::Error,
    transport::{header::HeaderMap, Body, HttpTransport, Method, Request, Transport},
};

/// User key used by an [`Authenticator`] until somebody logs in.
pub const DEFAULT_USER: &str = "default";

/// Access tokens expiring within this window are refreshed before use, so
/// a token handed out is never seconds from dying.
const REFRESH_GRACE: Duration = Duration::minutes(5);

/// The credential bundle issued by the authentication endpoints.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    /// Username the credential belongs to.
    pub username: String,
    /// Bearer token sent with every API request.
    pub access_token: String,
    /// When the access token stops being accepted.
    #[serde(with = "time::serde::rfc3339")]
    pub access_token_expiration: OffsetDateTime,
    /// Token exchanged for fresh credentials.
    pub refresh_token: String,
    /// When the refresh token stops being accepted. Past this point only
    /// a new login helps.
    #[serde(with = "time::serde::rfc3339")]
    pub refresh_token_expiration: OffsetDateTime,
}

impl Credential {
    /// The access token carried by this credential.
    #[must_use]
    pub fn access_token(&self) -> AccessToken {
        AccessToken::new(self.access_token.clone(), self.access_token_expiration)
    }

    fn refresh_expired(&self) -> bool {
        self.refresh_token_expiration < OffsetDateTime::now_utc()
    }

    fn fresh(&self) -> bool {
        self.access_token_expiration >= OffsetDateTime::now_utc() + REFRESH_GRACE
    }
}

/// A short-lived bearer token.
#[derive(Debug, Clone)]
pub struct AccessToken {
    value: String,
    exp: OffsetDateTime,
}

impl AccessToken {
    /// Construct a new access token.
    #[must_use]
    pub fn new(value: String, exp: OffsetDateTime) -> Self {
        Self { value, exp }
    }

    /// Expiration time.
    #[must_use]
    pub fn exp(&self) -> OffsetDateTime {
        self.exp
    }
}

impl std::fmt::Display for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// Credential persistence, keyed by username.
///
/// The default [`MemoryStore`] keeps credentials in process memory.
/// Multi-tenant deployments can plug in a shared store and run one
/// [`Authenticator`] per user on top of it.
#[async_trait]
pub trait CredentialStore: Debug + Send + Sync {
    /// The credential stored for `username`, if any.
    async fn get(&self, username: &str) -> crate::Result<Option<Credential>>;

    /// Store `credential` under `username`, replacing any previous one.
    async fn set(&self, username: &str, credential: Credential) -> crate::Result<()>;
}

/// An in-process [`CredentialStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    credentials: RwLock<HashMap<String, Credential>>,
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn get(&self, username: &str) -> crate::Result<Option<Credential>> {
        Ok(self.credentials.read().unwrap().get(username).cloned())
    }

    async fn set(&self, username: &str, credential: Credential) -> crate::Result<()> {
        self.credentials
            .write()
            .unwrap()
            .insert(username.to_owned(), credential);

        Ok(())
    }
}

/// Manages the credential lifecycle: login, storage and proactive refresh.
///
/// Every credential read goes through one async mutex, so concurrent
/// callers observe a consistent credential and at most one refresh is in
/// flight per expiry window.
#[derive(Debug)]
pub struct Authenticator {
    base: Url,
    transport: Arc<dyn Transport>,
    store: Box<dyn CredentialStore>,
    current: Mutex<String>,
}

impl Authenticator {
    /// Authenticator for the service at `base`, with the default HTTP
    /// transport and an in-process credential store.
    #[must_use]
    pub fn new(base: Url) -> Self {
        Self {
            base: normalize(base),
            transport: Arc::new(HttpTransport::new()),
            store: Box::new(MemoryStore::default()),
            current: Mutex::new(DEFAULT_USER.to_owned()),
        }
    }

    /// Replace the transport.
    #[must_use]
    pub fn with_transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Arc::new(transport);
        self
    }

    /// Replace the credential store.
    #[must_use]
    pub fn with_store(mut self, store: impl CredentialStore + 'static) -> Self {
        self.store = Box::new(store);
        self
    }

    /// Make `username` the current user without logging in. Only useful
    /// with a store that already holds a credential for the account.
    #[must_use]
    pub fn with_user(self, username: impl Into<String>) -> Self {
        Self {
            current: Mutex::new(username.into()),
            ..self
        }
    }

    /// Base URL of the service, always ending in `/`.
    #[must_use]
    pub fn base(&self) -> &Url {
        &self.base
    }

    pub(crate) fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    /// Authenticate with username and password, making the account the
    /// current user. `otp` is the two-factor code, if the account has
    /// two-factor authentication enabled.
    ///
    /// # Errors
    ///
    /// - rejected credentials ([`Error::AuthFailed`])
    /// - network errors
    #[instrument(skip(self, password, otp))]
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        otp: Option<&str>,
    ) -> crate::Result<()> {
        debug!("authenticating user");

        let res = self
            .transport
            .execute(Request {
                method: Method::POST,
                url: self.base.join("api/v1/auth/authenticate-user")?,
                headers: HeaderMap::new(),
                body: Body::Json(json!({
                    "username": username,
                    "password": password,
                    "twoFactorCode": otp.unwrap_or_default(),
                })),
            })
            .await?;

        if !res.status().is_success() {
            return Err(Error::AuthFailed(res.status()));
        }

        let credential = res.json::<Credential>().await?;

        let mut current = self.current.lock().await;
        self.store.set(username, credential).await?;
        *current = username.to_owned();

        Ok(())
    }

    /// Exchange the current refresh token for a fresh credential.
    ///
    /// [`access_token`](Self::access_token) calls this automatically;
    /// there is rarely a reason to call it by hand. The backend
    /// invalidates the old refresh token on use, so a failed refresh must
    /// not be retried blindly.
    ///
    /// # Errors
    ///
    /// - no credential stored ([`Error::NoToken`])
    /// - backend refusal ([`Error::AuthFailed`])
    pub async fn refresh(&self) -> crate::Result<()> {
        let current = self.current.lock().await;

        let credential = self.store.get(&current).await?.ok_or(Error::NoToken)?;

        self.refresh_locked(&current, &credential).await?;

        Ok(())
    }

    /// Refresh the credential and store the replacement. Must be called
    /// with the `current` lock held.
    async fn refresh_locked(
        &self,
        username: &str,
        credential: &Credential,
    ) -> crate::Result<Credential> {
        trace!("renewing access token");

        let res = self
            .transport
            .execute(Request {
                method: Method::POST,
                url: self.base.join("api/v1/auth/refresh-token")?,
                headers: HeaderMap::new(),
                body: Body::Json(json!({"token": credential.refresh_token})),
            })
            .await?;

        if !res.status().is_success() {
            return Err(Error::AuthFailed(res.status()));
        }

        let refreshed = res.json::<Credential>().await?;
        self.store.set(username, refreshed.clone()).await?;

        Ok(refreshed)
    }

    /// A valid access token for the current user, refreshing first if the
    /// cached one expires within the next five minutes.
    ///
    /// # Errors
    ///
    /// - no credential stored ([`Error::NoToken`])
    /// - refresh token past its expiry ([`Error::RefreshExpired`]); the
    ///   check happens before any request is made, and only a new login
    ///   clears the state
    /// - refresh failure
    #[instrument(level = "trace", skip_all)]
    pub async fn access_token(&self) -> crate::Result<AccessToken> {
        let current = self.current.lock().await;

        let credential = self.store.get(&current).await?.ok_or(Error::NoToken)?;

        if credential.refresh_expired() {
            debug!("refresh token expired, login required");
            return Err(Error::RefreshExpired);
        }

        if credential.fresh() {
            trace!("found fresh cached access token");
            return Ok(credential.access_token());
        }

        debug!("access token expires soon, refreshing");

        let refreshed = self.refresh_locked(&current, &credential).await?;

        Ok(refreshed.access_token())
    }
}

fn normalize(mut base: Url) -> Url {
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }

    base
}
