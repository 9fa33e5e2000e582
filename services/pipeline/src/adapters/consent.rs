//! services/pipeline/src/adapters/consent.rs
//!
//! This module contains the interactive OAuth consent adapter for
//! installed-app (terminal) use. It implements the `ConsentFlow` port:
//! print the authorization URL, wait for the user to paste the code back,
//! then exchange the code for a credential at the token endpoint.

use crate::credentials::GOOGLE_TOKEN_URL;
use async_trait::async_trait;
use chrono::Utc;
use quizform_core::domain::Credential;
use quizform_core::ports::{ConsentError, ConsentFlow};
use serde::Deserialize;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
/// Out-of-band redirect: Google shows the code for the user to copy.
const REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";
/// How long to wait for the pasted authorization code.
const CODE_ENTRY_TIMEOUT: Duration = Duration::from_secs(300);

/// Scopes the pipeline needs: form editing, response readout, and Drive
/// (forms live in Drive).
pub const OAUTH_SCOPES: [&str; 3] = [
    "https://www.googleapis.com/auth/forms.body",
    "https://www.googleapis.com/auth/forms.responses.readonly",
    "https://www.googleapis.com/auth/drive",
];

#[derive(Debug, Deserialize)]
struct CodeExchangeResponse {
    access_token: String,
    expires_in: i64,
    refresh_token: Option<String>,
    scope: Option<String>,
}

pub struct InstalledAppConsent {
    client_id: String,
    client_secret: String,
    token_url: String,
    http: reqwest::Client,
}

impl InstalledAppConsent {
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            client_id,
            client_secret,
            token_url: GOOGLE_TOKEN_URL.to_string(),
            http: reqwest::Client::new(),
        }
    }

    fn authorization_url(&self) -> String {
        format!(
            "{AUTH_URL}?client_id={}&redirect_uri={REDIRECT_URI}&response_type=code&scope={}&access_type=offline&prompt=consent",
            self.client_id,
            OAUTH_SCOPES.join("%20"),
        )
    }

    /// Reads one line from stdin, bounded by the entry timeout.
    async fn read_code(&self) -> Result<String, ConsentError> {
        let mut line = String::new();
        let mut reader = BufReader::new(tokio::io::stdin());
        let read = tokio::time::timeout(CODE_ENTRY_TIMEOUT, reader.read_line(&mut line))
            .await
            .map_err(|_| ConsentError::TimedOut)?;
        match read {
            Ok(0) => Err(ConsentError::Declined("input closed".to_string())),
            Ok(_) => {
                let code = line.trim().to_string();
                if code.is_empty() {
                    Err(ConsentError::Declined("no authorization code entered".to_string()))
                } else {
                    Ok(code)
                }
            }
            Err(e) => Err(ConsentError::Declined(format!("could not read input: {e}"))),
        }
    }

    async fn exchange_code(&self, code: &str) -> Result<Credential, ConsentError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
                ("redirect_uri", REDIRECT_URI),
            ])
            .send()
            .await
            .map_err(|e| ConsentError::Declined(format!("token exchange failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ConsentError::Declined(format!(
                "authorization code rejected ({status}): {body}"
            )));
        }

        let token: CodeExchangeResponse = response
            .json()
            .await
            .map_err(|e| ConsentError::Declined(format!("unreadable token reply: {e}")))?;

        Ok(Credential {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expiry: Utc::now() + chrono::Duration::seconds(token.expires_in),
            scopes: token
                .scope
                .map(|s| s.split_whitespace().map(str::to_string).collect())
                .unwrap_or_else(|| OAUTH_SCOPES.iter().map(|s| s.to_string()).collect()),
        })
    }
}

#[async_trait]
impl ConsentFlow for InstalledAppConsent {
    async fn obtain_credential(&self) -> Result<Credential, ConsentError> {
        println!("\nAuthorize this app by visiting:\n\n  {}\n", self.authorization_url());
        println!("Then paste the authorization code here and press Enter:");

        let code = self.read_code().await?;
        let credential = self.exchange_code(&code).await?;
        info!("authorization complete");
        Ok(credential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorization_url_requests_offline_access_and_all_scopes() {
        let consent = InstalledAppConsent::new("id-123".to_string(), "secret".to_string());
        let url = consent.authorization_url();
        assert!(url.starts_with(AUTH_URL));
        assert!(url.contains("client_id=id-123"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("prompt=consent"));
        for scope in OAUTH_SCOPES {
            assert!(url.contains(scope));
        }
    }
}
