//! Speech credential cache.
//!
//! A token/region pair is served from the persisted store while it is still
//! valid; otherwise one request is made to the backend's token endpoint and
//! the result is cached for a fixed TTL. Failures degrade to
//! [`Credential::unavailable`] instead of an error.

use async_trait::async_trait;
use chrono::Duration;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use edu_avatar_core::types::Credential;

use crate::error::{Result, SpeechError};
use crate::store::KeyValueStore;

/// Store entry holding the authorization token.
pub const TOKEN_KEY: &str = "azureToken";
/// Store entry holding the service region.
pub const REGION_KEY: &str = "azureRegion";
/// Backend path issuing speech tokens.
pub const TOKEN_PATH: &str = "/streaming-avatar/get-speech-token";
/// Default token lifetime in minutes.
pub const DEFAULT_TTL_MINUTES: i64 = 9;

/// Body returned by the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IssuedToken {
    pub token: String,
    pub region: String,
}

/// Remote issuer of speech tokens.
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    async fn issue(&self) -> Result<IssuedToken>;
}

/// Fetches tokens from `GET {base_url}/streaming-avatar/get-speech-token`.
pub struct HttpTokenIssuer {
    url: String,
    client: reqwest::Client,
}

impl HttpTokenIssuer {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    pub fn with_client(base_url: &str, client: reqwest::Client) -> Self {
        Self {
            url: format!("{}{TOKEN_PATH}", base_url.trim_end_matches('/')),
            client,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl TokenIssuer for HttpTokenIssuer {
    async fn issue(&self) -> Result<IssuedToken> {
        debug!(url = %self.url, "Requesting speech token");
        let resp = self.client.get(&self.url).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Err(SpeechError::Token(format!(
                "token endpoint returned {status}"
            )));
        }

        let issued: IssuedToken = resp.json().await?;
        if issued.token.is_empty() || issued.region.is_empty() {
            return Err(SpeechError::Token(
                "token endpoint returned an empty token or region".into(),
            ));
        }
        Ok(issued)
    }
}

/// Anything that can hand out a speech credential.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Never fails: an unusable credential is returned as
    /// [`Credential::unavailable`].
    async fn get_credential(&self) -> Credential;
}

/// Store-first credential provider backed by a [`TokenIssuer`].
pub struct CredentialCache<S, I> {
    store: S,
    issuer: I,
    ttl: Duration,
    // Serializes check-fetch-persist so concurrent callers share one fetch.
    fetch_lock: Mutex<()>,
}

impl<S: KeyValueStore, I: TokenIssuer> CredentialCache<S, I> {
    pub fn new(store: S, issuer: I) -> Self {
        Self::with_ttl(store, issuer, Duration::minutes(DEFAULT_TTL_MINUTES))
    }

    pub fn with_ttl(store: S, issuer: I, ttl: Duration) -> Self {
        Self {
            store,
            issuer,
            ttl,
            fetch_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn cached(&self) -> Option<Credential> {
        let token = self.store.get(TOKEN_KEY).filter(|t| !t.is_empty())?;
        let region = self.store.get(REGION_KEY).filter(|r| !r.is_empty())?;
        Some(Credential::new(token, region))
    }

    fn persist(&self, issued: &IssuedToken) {
        if let Err(e) = self
            .store
            .set(TOKEN_KEY, &issued.token, self.ttl)
            .and_then(|_| self.store.set(REGION_KEY, &issued.region, self.ttl))
        {
            warn!(error = %e, "Failed to persist speech credential");
        }
    }
}

#[async_trait]
impl<S: KeyValueStore, I: TokenIssuer> CredentialProvider for CredentialCache<S, I> {
    async fn get_credential(&self) -> Credential {
        let _guard = self.fetch_lock.lock().await;

        if let Some(credential) = self.cached() {
            debug!("Using cached speech credential");
            return credential;
        }

        match self.issuer.issue().await {
            Ok(issued) => {
                self.persist(&issued);
                info!(region = %issued.region, ttl_minutes = self.ttl.num_minutes(), "Fetched speech credential");
                Credential::new(issued.token, issued.region)
            }
            Err(e) => {
                warn!(error = %e, "Speech token fetch failed");
                Credential::unavailable()
            }
        }
    }
}
