//! Session configuration parsed from environment variables.

use std::path::PathBuf;

use crate::error::{AuthError, Result};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:3000";
pub const DEFAULT_STORAGE_DIR: &str = ".";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

/// Chain the wallet must be on before value-moving calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    /// RPC base URL, no trailing slash.
    pub rpc_url: String,
    pub chain_id: String,
    /// Address of the module publishing `vibe_balance`.
    pub contract_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    /// Origin of the auth backend, no trailing slash.
    pub base_url: String,
    pub chain: ChainConfig,
    pub storage_dir: PathBuf,
    pub timeouts: Timeouts,
}

impl AuthConfig {
    /// Build typed config from environment variables.
    ///
    /// Required:
    /// - `LUMIO_RPC_URL`
    /// - `LUMIO_CHAIN_ID`
    /// - `VIBE_BALANCE_CONTRACT`
    ///
    /// Optional:
    /// - `WALLET_AUTH_BASE_URL`: default `http://127.0.0.1:3000`
    /// - `WALLET_AUTH_STORAGE_DIR`: default `.`
    /// - `WALLET_AUTH_REQUEST_TIMEOUT_SECS`: default 30
    /// - `WALLET_AUTH_CONNECT_TIMEOUT_SECS`: default 10
    ///
    /// # Errors
    ///
    /// Returns `MissingConfig` for an unset required variable and
    /// `ConfigParse` for a malformed timeout.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("WALLET_AUTH_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_owned())
            .trim_end_matches('/')
            .to_owned();
        let chain = ChainConfig {
            rpc_url: required("LUMIO_RPC_URL")?.trim_end_matches('/').to_owned(),
            chain_id: required("LUMIO_CHAIN_ID")?,
            contract_address: required("VIBE_BALANCE_CONTRACT")?,
        };
        let storage_dir = std::env::var("WALLET_AUTH_STORAGE_DIR")
            .map_or_else(|_| PathBuf::from(DEFAULT_STORAGE_DIR), PathBuf::from);
        let timeouts = Timeouts {
            request_secs: env_parse_u64("WALLET_AUTH_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?,
            connect_secs: env_parse_u64("WALLET_AUTH_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS)?,
        };

        Ok(Self { base_url, chain, storage_dir, timeouts })
    }
}

fn required(key: &str) -> Result<String> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v.trim().to_owned()),
        _ => Err(AuthError::MissingConfig { var: key.to_owned() }),
    }
}

fn env_parse_u64(key: &str, default: u64) -> Result<u64> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| AuthError::ConfigParse(format!("{key} must be a whole number of seconds, got {raw:?}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
