//! services/pipeline/src/credentials.rs
//!
//! Resolves, refreshes, and persists the OAuth credential used against the
//! remote forms API, and hands out HTTP clients that carry it.
//!
//! Resolution order is fixed: a mounted deployment secret wins over the
//! local cache file, and only when neither exists does the interactive
//! consent flow run. All of that happens under one lock, so concurrent
//! callers during startup trigger at most one consent prompt and one
//! refresh.

use quizform_core::domain::Credential;
use quizform_core::ports::{ConsentError, ConsentFlow};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Google's token endpoint, used for the refresh-token grant.
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// A failure to produce a usable credential.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// A stored credential is expired and carries no refresh token; only a
    /// new consent grant can fix it.
    #[error("stored credential is expired and has no refresh token; re-authorization required")]
    ExpiredNoRefresh,

    /// The token endpoint rejected or failed the refresh exchange.
    #[error("credential refresh failed: {0}")]
    RefreshFailed(String),

    /// The interactive consent flow did not produce a credential.
    #[error("authorization flow failed: {0}")]
    ConsentFailed(#[from] ConsentError),

    /// A credential file exists but could not be read or parsed.
    #[error("credential file {path} is unusable: {message}")]
    Storage { path: PathBuf, message: String },
}

/// An HTTP client bound to a bearer token. Short-lived: callers get a fresh
/// one per unit of work so a refresh mid-pipeline is picked up.
#[derive(Clone)]
pub struct AuthedClient {
    http: reqwest::Client,
    bearer: String,
}

impl AuthedClient {
    pub fn post(&self, url: &str) -> reqwest::RequestBuilder {
        self.http.post(url).bearer_auth(&self.bearer)
    }

    pub fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.http.get(url).bearer_auth(&self.bearer)
    }
}

/// The shape of a successful token-endpoint reply.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    refresh_token: Option<String>,
    scope: Option<String>,
}

#[derive(Default)]
struct StoreState {
    credential: Option<Credential>,
}

/// Owns credential resolution for the whole process.
pub struct CredentialStore {
    secret_path: PathBuf,
    cache_path: PathBuf,
    token_url: String,
    client_id: String,
    client_secret: String,
    consent: Arc<dyn ConsentFlow>,
    http: reqwest::Client,
    state: Mutex<StoreState>,
}

impl CredentialStore {
    pub fn new(
        secret_path: PathBuf,
        cache_path: PathBuf,
        client_id: String,
        client_secret: String,
        consent: Arc<dyn ConsentFlow>,
    ) -> Self {
        Self::with_token_url(
            secret_path,
            cache_path,
            GOOGLE_TOKEN_URL.to_string(),
            client_id,
            client_secret,
            consent,
        )
    }

    pub fn with_token_url(
        secret_path: PathBuf,
        cache_path: PathBuf,
        token_url: String,
        client_id: String,
        client_secret: String,
        consent: Arc<dyn ConsentFlow>,
    ) -> Self {
        Self {
            secret_path,
            cache_path,
            token_url,
            client_id,
            client_secret,
            consent,
            http: reqwest::Client::new(),
            state: Mutex::new(StoreState::default()),
        }
    }

    /// Returns an HTTP client carrying a currently valid bearer token,
    /// resolving or refreshing the credential first if needed.
    pub async fn authenticated_client(&self) -> Result<AuthedClient, AuthError> {
        let credential = self.current_credential().await?;
        Ok(AuthedClient {
            http: self.http.clone(),
            bearer: credential.access_token,
        })
    }

    /// Resolves the credential, refreshing it when it is within the expiry
    /// margin. Holds the store lock for the full resolve-refresh-persist
    /// sequence.
    pub async fn current_credential(&self) -> Result<Credential, AuthError> {
        let mut state = self.state.lock().await;

        if state.credential.is_none() {
            state.credential = Some(self.acquire().await?);
        }

        // Just populated above; the lock is still held.
        let credential = state.credential.as_mut().ok_or(AuthError::ExpiredNoRefresh)?;
        if credential.expires_soon(chrono::Utc::now()) {
            let refreshed = self.refresh(credential).await?;
            *credential = refreshed;
            // Refreshed tokens land in the local cache; the mounted
            // secret is never written.
            persist_best_effort(&self.cache_path, credential);
        }

        Ok(credential.clone())
    }

    /// First-time acquisition: mounted secret, then local cache, then the
    /// interactive consent flow. A consent-minted credential is persisted
    /// to the local cache.
    async fn acquire(&self) -> Result<Credential, AuthError> {
        for path in [&self.secret_path, &self.cache_path] {
            match load_credential(path).await? {
                Some(credential) => {
                    info!(path = %path.display(), "loaded stored credential");
                    return Ok(credential);
                }
                None => debug!(path = %path.display(), "no credential file"),
            }
        }

        info!("no stored credential found, starting authorization flow");
        let credential = self.consent.obtain_credential().await?;
        persist_best_effort(&self.cache_path, &credential);
        Ok(credential)
    }

    /// Exchanges the refresh token for a new access token. Fields the token
    /// endpoint omits (notably the refresh token itself) are carried over
    /// from the old credential.
    async fn refresh(&self, credential: &Credential) -> Result<Credential, AuthError> {
        let Some(refresh_token) = credential.refresh_token.clone() else {
            return Err(AuthError::ExpiredNoRefresh);
        };

        debug!("refreshing access token");
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| AuthError::RefreshFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::RefreshFailed(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::RefreshFailed(e.to_string()))?;

        info!(expires_in = token.expires_in, "access token refreshed");
        Ok(Credential {
            access_token: token.access_token,
            refresh_token: token.refresh_token.or(Some(refresh_token)),
            expiry: chrono::Utc::now() + chrono::Duration::seconds(token.expires_in),
            scopes: token
                .scope
                .map(|s| s.split_whitespace().map(str::to_string).collect())
                .unwrap_or_else(|| credential.scopes.clone()),
        })
    }
}

/// Reads a credential file if it exists. A missing file is `Ok(None)`; a
/// present but unreadable or unparseable file is an error, because silently
/// re-consenting over a corrupt mounted secret would mask a deployment bug.
async fn load_credential(path: &Path) -> Result<Option<Credential>, AuthError> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(AuthError::Storage {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
        }
    };
    let credential = serde_json::from_str(&raw).map_err(|e| AuthError::Storage {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(Some(credential))
}

/// Persists the credential, warning on failure instead of failing the run:
/// a working in-memory token beats an up-to-date cache file.
fn persist_best_effort(path: &Path, credential: &Credential) {
    let serialized = match serde_json::to_string_pretty(credential) {
        Ok(s) => s,
        Err(e) => {
            warn!(path = %path.display(), "could not serialize credential: {e}");
            return;
        }
    };
    if let Err(e) = std::fs::write(path, serialized) {
        warn!(path = %path.display(), "could not persist credential: {e}");
    }
}
