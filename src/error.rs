//! Error taxonomy for the auth session.
//!
//! ERROR HANDLING
//! ==============
//! Only protocol-level failures become `AuthError`s: backend rejections,
//! signature mismatches, wrong network, transport and wallet faults. A missing
//! wallet or a declined signature is a plain `false`, and corrupt persisted
//! state is recovered inside the store.

use crate::machine::{Event, Phase};

/// Errors produced by session, store and collaborator operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// A required environment variable is not set.
    #[error("missing config: env var {var} not set")]
    MissingConfig { var: String },

    /// A configuration value could not be parsed.
    #[error("config parse failed: {0}")]
    ConfigParse(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),

    /// The HTTP request could not be sent or its body read.
    #[error("request failed: {0}")]
    Transport(String),

    /// The backend answered with a non-success status.
    #[error("{status}: {detail}")]
    Backend { status: u16, detail: String },

    /// A response body did not have the expected shape.
    #[error("response parse failed: {0}")]
    Parse(String),

    /// The backend issued a draft token without a nonce.
    #[error("backend issued a token without a nonce")]
    MissingNonce,

    /// The backend accepted the request but rejected the signature.
    #[error("signature verification failed")]
    VerificationFailed,

    /// The wallet is on a different network than the configured one.
    #[error(
        "Please connect to the Lumio network and switch to the correct chain. RPC: {expected_rpc}, chain id: {expected_chain_id}"
    )]
    WrongNetwork { expected_rpc: String, expected_chain_id: String },

    /// The wallet refused or failed to submit the deposit.
    #[error("Failed to top up the balance")]
    TopUpFailed,

    /// The wallet collaborator reported a failure.
    #[error("wallet error: {0}")]
    Wallet(String),

    /// The persisted token could not be written or removed.
    #[error("storage error: {0}")]
    Storage(String),

    /// The handshake machine received an event it has no edge for.
    #[error("invalid transition: {event:?} in {phase:?}")]
    InvalidTransition { phase: Phase, event: Event },
}

impl AuthError {
    /// Whether retrying the same call could reasonably succeed.
    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Backend { status: 429 | 500..=599, .. })
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

pub type Result<T, E = AuthError> = std::result::Result<T, E>;

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
