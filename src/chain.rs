//! Read-only chain queries for the vibe-balance module.
//!
//! Thin HTTP wrapper over the node's `/v1/view` endpoint. Pure parsing in
//! `parse_balance` for testability.

#[cfg(test)]
#[path = "chain_test.rs"]
mod tests;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Timeouts;
use crate::error::{AuthError, Result};

/// Decimal places of the on-chain balance integer.
pub const BALANCE_DECIMALS: i32 = 8;
/// Decimal places kept for display.
pub const DISPLAY_DECIMALS: i32 = 4;

/// A view-function call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewRequest {
    pub function: String,
    pub type_arguments: Vec<String>,
    pub arguments: Vec<String>,
}

impl ViewRequest {
    /// `{contract}::vibe_balance::get_balance(account)`.
    #[must_use]
    pub fn balance_of(contract_address: &str, account: &str) -> Self {
        Self {
            function: format!("{contract_address}::vibe_balance::get_balance"),
            type_arguments: Vec::new(),
            arguments: vec![account.to_owned()],
        }
    }
}

#[async_trait]
pub trait ChainView: Send + Sync {
    /// Run a view function and return its raw JSON result.
    async fn view(&self, request: &ViewRequest) -> Result<serde_json::Value>;
}

// =============================================================================
// HTTP CLIENT
// =============================================================================

pub struct HttpChainView {
    http: reqwest::Client,
    rpc_url: String,
}

impl HttpChainView {
    /// # Errors
    ///
    /// Returns `AuthError::HttpClientBuild` if the HTTP client cannot be built.
    pub fn new(rpc_url: impl Into<String>, timeouts: Timeouts) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeouts.request_secs))
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()
            .map_err(|e| AuthError::HttpClientBuild(e.to_string()))?;
        let rpc_url = rpc_url.into().trim_end_matches('/').to_owned();
        Ok(Self { http, rpc_url })
    }
}

#[async_trait]
impl ChainView for HttpChainView {
    async fn view(&self, request: &ViewRequest) -> Result<serde_json::Value> {
        let response = self
            .http
            .post(format!("{}/v1/view", self.rpc_url))
            .header(reqwest::header::ACCEPT, "application/json")
            .json(request)
            .send()
            .await?;

        let status = response.status().as_u16();
        let text = response.text().await?;
        if !(200..300).contains(&status) {
            return Err(AuthError::Backend { status, detail: crate::backend::error_detail(&text) });
        }
        serde_json::from_str(&text).map_err(|e| AuthError::Parse(e.to_string()))
    }
}

// =============================================================================
// PARSING
// =============================================================================

/// Display balance from a `get_balance` result, or 0 when the shape is wrong.
///
/// Nodes encode `u64` results as decimal strings; plain numbers are accepted
/// as well.
#[must_use]
pub fn parse_balance(result: &serde_json::Value) -> f64 {
    let raw = match result.as_array().and_then(|items| items.first()) {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    raw.map_or(0.0, to_display_units)
}

/// Scale base units down to display units, rounded to `DISPLAY_DECIMALS`.
#[must_use]
pub fn to_display_units(base_units: f64) -> f64 {
    let step = 10f64.powi(BALANCE_DECIMALS - DISPLAY_DECIMALS);
    let display = 10f64.powi(DISPLAY_DECIMALS);
    (base_units / step).round() / display
}
