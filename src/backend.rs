//! Auth backend contract and its HTTP client.
//!
//! ARCHITECTURE
//! ============
//! Four JSON endpoints under `/api/token`: `new` issues a nonce-bearing
//! draft, `verify` checks a signature, `status` revalidates without rotating
//! the nonce, and `DELETE` revokes. The backend keys its state off a session
//! cookie set by `new`, so the HTTP client keeps a cookie jar.
//!
//! ERROR HANDLING
//! ==============
//! Non-2xx responses become `AuthError::Backend` carrying the `detail` field
//! of the body, or the raw body when it has no such field.

#[cfg(test)]
#[path = "backend_test.rs"]
mod tests;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{AuthConfig, Timeouts};
use crate::error::{AuthError, Result};
use crate::token::SessionToken;
use crate::wallet::SignedMessage;

pub const STATUS_PATH: &str = "/api/token/status";
pub const NEW_PATH: &str = "/api/token/new";
pub const VERIFY_PATH: &str = "/api/token/verify";
pub const REVOKE_PATH: &str = "/api/token";

/// Signed challenge in the shape the verify endpoint expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureSubmission {
    #[serde(flatten)]
    pub signed: SignedMessage,
    #[serde(rename = "publicKey")]
    pub public_key: String,
}

impl SignatureSubmission {
    #[must_use]
    pub fn new(signed: SignedMessage, public_key: String) -> Self {
        Self { signed, public_key }
    }
}

/// Backend auth service.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Revalidate `token`. Must not rotate the nonce.
    async fn status(&self, token: &SessionToken) -> Result<SessionToken>;

    /// Issue a draft token with a fresh nonce for the account in `draft`.
    async fn issue(&self, draft: &SessionToken) -> Result<SessionToken>;

    /// Check a signature over the issued nonce.
    async fn verify(&self, submission: &SignatureSubmission) -> Result<SessionToken>;

    /// Revoke the current session server-side.
    async fn revoke(&self) -> Result<bool>;
}

// =============================================================================
// HTTP CLIENT
// =============================================================================

pub struct HttpAuthBackend {
    http: reqwest::Client,
    base_url: String,
}

impl HttpAuthBackend {
    /// Build a client rooted at `base_url` (trailing slash ignored).
    ///
    /// # Errors
    ///
    /// Returns `AuthError::HttpClientBuild` if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeouts: Timeouts) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeouts.request_secs))
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .cookie_store(true)
            .build()
            .map_err(|e| AuthError::HttpClientBuild(e.to_string()))?;
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Ok(Self { http, base_url })
    }

    /// # Errors
    ///
    /// Returns `AuthError::HttpClientBuild` if the HTTP client cannot be built.
    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        Self::new(config.base_url.clone(), config.timeouts)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn post_token<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<SessionToken> {
        let response = self
            .http
            .post(self.url(path))
            .header(reqwest::header::ACCEPT, "application/json")
            .json(body)
            .send()
            .await?;
        let text = read_success(response).await?;
        serde_json::from_str(&text).map_err(|e| AuthError::Parse(e.to_string()))
    }
}

async fn read_success(response: reqwest::Response) -> Result<String> {
    let status = response.status().as_u16();
    let text = response.text().await?;
    if !(200..300).contains(&status) {
        return Err(AuthError::Backend { status, detail: error_detail(&text) });
    }
    Ok(text)
}

/// Pull the human-readable message out of an error body.
pub(crate) fn error_detail(body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::Object(map)) => match map.get("detail") {
            Some(serde_json::Value::String(detail)) => detail.clone(),
            Some(other) => other.to_string(),
            None => serde_json::Value::Object(map).to_string(),
        },
        Ok(serde_json::Value::String(s)) => s,
        Ok(other) => other.to_string(),
        Err(_) => body.trim().to_owned(),
    }
}

#[async_trait]
impl AuthBackend for HttpAuthBackend {
    async fn status(&self, token: &SessionToken) -> Result<SessionToken> {
        self.post_token(STATUS_PATH, token).await
    }

    async fn issue(&self, draft: &SessionToken) -> Result<SessionToken> {
        self.post_token(NEW_PATH, draft).await
    }

    async fn verify(&self, submission: &SignatureSubmission) -> Result<SessionToken> {
        self.post_token(VERIFY_PATH, submission).await
    }

    async fn revoke(&self) -> Result<bool> {
        let response = self
            .http
            .delete(self.url(REVOKE_PATH))
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;
        let text = read_success(response).await?;
        serde_json::from_str(&text).map_err(|e| AuthError::Parse(e.to_string()))
    }
}
