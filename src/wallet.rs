//! Wallet collaborator contract.
//!
//! SYSTEM CONTEXT
//! ==============
//! The wallet holds the private key and prompts the user before signing. The
//! session only sees this trait; a session built without a signer behaves as
//! if no wallet extension is installed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Network the wallet currently points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    /// RPC base URL.
    pub api: String,
    pub chain_id: String,
}

/// Message the wallet is asked to sign.
///
/// The boolean flags ask the wallet to fold the account address, the
/// application domain and the chain id into the signed text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignMessagePayload {
    pub address: bool,
    pub application: bool,
    pub chain_id: bool,
    pub message: String,
    /// Backend-issued nonce. Never generated locally.
    pub nonce: String,
}

impl SignMessagePayload {
    /// Challenge embedding every context flag.
    #[must_use]
    pub fn challenge(message: String, nonce: String) -> Self {
        Self { address: true, application: true, chain_id: true, message, nonce }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignOptions {
    pub use_new_format: bool,
}

impl Default for SignOptions {
    fn default() -> Self {
        Self { use_new_format: true }
    }
}

/// Signed message as returned by the wallet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedMessage {
    pub message: String,
    pub nonce: String,
    pub signature: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<serde_json::Value>,
    /// Exact text the key signed, including the wallet's prefix and context lines.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignMessageResponse {
    /// False when the user rejected or dismissed the prompt.
    pub success: bool,
    #[serde(default)]
    pub result: Option<SignedMessage>,
}

/// On-chain entry function call submitted through the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryFunctionPayload {
    pub function: String,
    pub arguments: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub success: bool,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
}

/// Browser-injected wallet able to report identity and sign on user consent.
#[async_trait]
pub trait WalletSigner: Send + Sync {
    async fn is_connected(&self) -> Result<bool>;

    async fn connect(&self) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;

    /// Address of the selected account.
    async fn account(&self) -> Result<String>;

    async fn network(&self) -> Result<Network>;

    /// Hex-encoded public key of the selected account.
    async fn public_key(&self) -> Result<String>;

    /// Ask the user to sign `payload`. May wait indefinitely on the prompt.
    async fn sign_message(&self, payload: SignMessagePayload, options: SignOptions) -> Result<SignMessageResponse>;

    async fn sign_and_submit(&self, payload: EntryFunctionPayload) -> Result<SubmitResponse>;
}
