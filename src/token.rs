//! The persisted proof-of-auth record.
//!
//! DESIGN
//! ======
//! `SessionToken` is a plain value. Every change returns a new token, so the
//! session can swap its state in one assignment and never observes a
//! half-merged record.

#[cfg(test)]
#[path = "token_test.rs"]
mod tests;

use serde::{Deserialize, Serialize};

/// Storage key the record lives under.
pub const STORAGE_KEY: &str = "auth_token";

/// Backend-issued session record bound to one wallet account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionToken {
    /// Opaque bearer credential; `None` until a challenge has been issued.
    #[serde(default)]
    pub token: Option<String>,
    /// Wallet address the token is bound to.
    #[serde(default)]
    pub account: Option<String>,
    /// Single-use challenge for the handshake in flight.
    #[serde(default)]
    pub nonce: Option<String>,
    /// Set only after the backend checked a signature over `nonce`.
    #[serde(default, rename = "verified_token", alias = "verified")]
    pub verified: bool,
    /// Issuance time in seconds. Echoed back verbatim; the backend compares
    /// the whole record.
    #[serde(default)]
    pub created_at: Option<f64>,
}

impl SessionToken {
    /// Draft token carrying only the account, as sent to the nonce endpoint.
    #[must_use]
    pub fn with_account(account: impl Into<String>) -> Self {
        Self { account: Some(account.into()), ..Self::default() }
    }

    /// True when there is something worth revalidating.
    #[must_use]
    pub fn is_present(&self) -> bool {
        self.token.is_some() && self.account.is_some()
    }

    /// Overlay a backend response onto this token.
    ///
    /// Fields the backend left empty keep their local value, except
    /// `verified`, which is always taken from the response.
    #[must_use]
    pub fn merge(&self, incoming: SessionToken) -> Self {
        Self {
            token: incoming.token.or_else(|| self.token.clone()),
            account: incoming.account.or_else(|| self.account.clone()),
            nonce: incoming.nonce.or_else(|| self.nonce.clone()),
            verified: incoming.verified,
            created_at: incoming.created_at.or(self.created_at),
        }
        .normalized()
    }

    /// Drop a `verified` flag that is not backed by a token and an account.
    #[must_use]
    pub fn normalized(self) -> Self {
        if self.verified && !self.is_present() {
            return Self { verified: false, ..self };
        }
        self
    }
}
