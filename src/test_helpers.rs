//! Deterministic collaborators for session tests.
//!
//! `MockWallet` signs by echoing the nonce bytes; `MockBackend` accepts a
//! signature only if it is exactly those bytes under the wallet's public key,
//! and only for the nonce it issued last.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use crate::backend::{AuthBackend, SignatureSubmission};
use crate::chain::{ChainView, ViewRequest};
use crate::config::ChainConfig;
use crate::error::{AuthError, Result};
use crate::session::AuthSession;
use crate::store::{MemoryTokenStore, TokenStore};
use crate::token::SessionToken;
use crate::wallet::{
    EntryFunctionPayload, Network, SignMessagePayload, SignMessageResponse, SignOptions, SignedMessage,
    SubmitResponse, WalletSigner,
};

pub const ACCOUNT: &str = "0xa11ce";
pub const PUBLIC_KEY: &str = "0xpub";
pub const RPC_URL: &str = "https://api.testnet.lumio.io";
pub const CHAIN_ID: &str = "2";
pub const CONTRACT: &str = "0xcafe";

#[must_use]
pub fn chain_config() -> ChainConfig {
    ChainConfig { rpc_url: RPC_URL.into(), chain_id: CHAIN_ID.into(), contract_address: CONTRACT.into() }
}

// =============================================================================
// WALLET
// =============================================================================

pub struct MockWallet {
    pub connected: AtomicBool,
    pub declines_left: AtomicUsize,
    pub sign_delay: Mutex<Option<Duration>>,
    pub network: Mutex<Network>,
    pub submit_succeeds: AtomicBool,
    pub signed: Mutex<Vec<SignMessagePayload>>,
    pub submitted: Mutex<Vec<EntryFunctionPayload>>,
    pub connect_calls: AtomicUsize,
    pub disconnect_calls: AtomicUsize,
    pub is_connected_calls: AtomicUsize,
}

impl MockWallet {
    #[must_use]
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            declines_left: AtomicUsize::new(0),
            sign_delay: Mutex::new(None),
            network: Mutex::new(Network { api: format!("{RPC_URL}/"), chain_id: CHAIN_ID.into() }),
            submit_succeeds: AtomicBool::new(true),
            signed: Mutex::new(Vec::new()),
            submitted: Mutex::new(Vec::new()),
            connect_calls: AtomicUsize::new(0),
            disconnect_calls: AtomicUsize::new(0),
            is_connected_calls: AtomicUsize::new(0),
        }
    }

    /// Reject the next `n` signing prompts.
    pub fn decline_next(&self, n: usize) {
        self.declines_left.store(n, Ordering::SeqCst);
    }

    #[must_use]
    pub fn signed_nonces(&self) -> Vec<String> {
        self.signed.lock().unwrap().iter().map(|p| p.nonce.clone()).collect()
    }
}

impl Default for MockWallet {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WalletSigner for MockWallet {
    async fn is_connected(&self) -> Result<bool> {
        self.is_connected_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.connected.load(Ordering::SeqCst))
    }

    async fn connect(&self) -> Result<()> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn account(&self) -> Result<String> {
        Ok(ACCOUNT.into())
    }

    async fn network(&self) -> Result<Network> {
        Ok(self.network.lock().unwrap().clone())
    }

    async fn public_key(&self) -> Result<String> {
        Ok(PUBLIC_KEY.into())
    }

    async fn sign_message(&self, payload: SignMessagePayload, _options: SignOptions) -> Result<SignMessageResponse> {
        let delay = *self.sign_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.signed.lock().unwrap().push(payload.clone());

        let declined = self
            .declines_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if declined {
            return Ok(SignMessageResponse { success: false, result: None });
        }

        let full_message = format!("APTOS\nmessage: {}\nnonce: {}", payload.message, payload.nonce);
        Ok(SignMessageResponse {
            success: true,
            result: Some(SignedMessage {
                signature: payload.nonce.as_bytes().to_vec(),
                message: payload.message,
                nonce: payload.nonce,
                address: Some(ACCOUNT.into()),
                application: Some("https://app.example.test".into()),
                chain_id: Some(serde_json::json!(2)),
                full_message: Some(full_message),
                prefix: Some("APTOS".into()),
            }),
        })
    }

    async fn sign_and_submit(&self, payload: EntryFunctionPayload) -> Result<SubmitResponse> {
        self.submitted.lock().unwrap().push(payload);
        Ok(SubmitResponse { success: self.submit_succeeds.load(Ordering::SeqCst), result: None })
    }
}

// =============================================================================
// BACKEND
// =============================================================================

#[derive(Default)]
pub struct MockBackend {
    /// Last token handed out by `issue`, as the backend stores it.
    pub current: Mutex<Option<SessionToken>>,
    pub reject_signatures: AtomicBool,
    pub issue_failure: Mutex<Option<(u16, String)>>,
    pub status_failure: Mutex<Option<(u16, String)>>,
    pub status_delay: Mutex<Option<Duration>>,
    pub status_calls: AtomicUsize,
    pub issue_calls: AtomicUsize,
    pub verify_calls: AtomicUsize,
    pub revoke_calls: AtomicUsize,
}

impl MockBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn counts(&self) -> (usize, usize, usize) {
        (
            self.status_calls.load(Ordering::SeqCst),
            self.issue_calls.load(Ordering::SeqCst),
            self.verify_calls.load(Ordering::SeqCst),
        )
    }

    /// Invalidate the stored session as an expiry would.
    pub fn expire(&self) {
        if let Some(token) = self.current.lock().unwrap().as_mut() {
            token.verified = false;
        }
    }
}

fn random_nonce() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[async_trait]
impl AuthBackend for MockBackend {
    async fn status(&self, token: &SessionToken) -> Result<SessionToken> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.status_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some((status, detail)) = self.status_failure.lock().unwrap().clone() {
            return Err(AuthError::Backend { status, detail });
        }
        match self.current.lock().unwrap().as_ref() {
            Some(current) if current.token == token.token && current.account == token.account => Ok(current.clone()),
            _ => Ok(SessionToken { verified: false, ..token.clone() }),
        }
    }

    async fn issue(&self, draft: &SessionToken) -> Result<SessionToken> {
        self.issue_calls.fetch_add(1, Ordering::SeqCst);
        if let Some((status, detail)) = self.issue_failure.lock().unwrap().clone() {
            return Err(AuthError::Backend { status, detail });
        }
        let Some(account) = draft.account.clone() else {
            return Err(AuthError::Backend { status: 400, detail: "Account address is required".into() });
        };
        let token = SessionToken {
            token: Some(uuid::Uuid::new_v4().to_string()),
            account: Some(account),
            nonce: Some(random_nonce()),
            verified: false,
            created_at: Some(1_700_000_000.0),
        };
        *self.current.lock().unwrap() = Some(token.clone());
        Ok(token)
    }

    async fn verify(&self, submission: &SignatureSubmission) -> Result<SessionToken> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        let mut current = self.current.lock().unwrap();
        let Some(stored) = current.as_mut() else {
            return Err(AuthError::Backend { status: 500, detail: "Settings not found".into() });
        };
        let signed = &submission.signed;
        let nonce_ok = stored.nonce.as_deref() == Some(signed.nonce.as_str());
        let signature_ok = signed.signature == signed.nonce.as_bytes() && submission.public_key == PUBLIC_KEY;
        if nonce_ok && signature_ok && !self.reject_signatures.load(Ordering::SeqCst) {
            stored.verified = true;
            return Ok(stored.clone());
        }
        Ok(SessionToken { verified: false, ..stored.clone() })
    }

    async fn revoke(&self) -> Result<bool> {
        self.revoke_calls.fetch_add(1, Ordering::SeqCst);
        *self.current.lock().unwrap() = None;
        Ok(true)
    }
}

// =============================================================================
// CHAIN
// =============================================================================

pub struct MockChain {
    pub result: Mutex<serde_json::Value>,
    pub requests: Mutex<Vec<ViewRequest>>,
}

impl MockChain {
    #[must_use]
    pub fn new(result: serde_json::Value) -> Self {
        Self { result: Mutex::new(result), requests: Mutex::new(Vec::new()) }
    }
}

#[async_trait]
impl ChainView for MockChain {
    async fn view(&self, request: &ViewRequest) -> Result<serde_json::Value> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(self.result.lock().unwrap().clone())
    }
}

// =============================================================================
// SESSION
// =============================================================================

/// A session wired to fresh mocks, with handles to each of them.
pub struct Harness {
    pub wallet: Arc<MockWallet>,
    pub backend: Arc<MockBackend>,
    pub chain: Arc<MockChain>,
    pub store: Arc<MemoryTokenStore>,
    pub session: Arc<AuthSession>,
}

impl Harness {
    #[must_use]
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryTokenStore::new()))
    }

    #[must_use]
    pub fn with_store(store: Arc<MemoryTokenStore>) -> Self {
        let wallet = Arc::new(MockWallet::new());
        let backend = Arc::new(MockBackend::new());
        let chain = Arc::new(MockChain::new(serde_json::json!(["123450000"])));
        let session = Arc::new(build_session(&wallet, &backend, &chain, &store, true));
        Self { wallet, backend, chain, store, session }
    }

    /// A second session over the same collaborators, as after a restart.
    #[must_use]
    pub fn restart(&self) -> AuthSession {
        build_session(&self.wallet, &self.backend, &self.chain, &self.store, true)
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a session; `with_wallet = false` models a missing extension.
#[must_use]
pub fn build_session(
    wallet: &Arc<MockWallet>,
    backend: &Arc<MockBackend>,
    chain: &Arc<MockChain>,
    store: &Arc<MemoryTokenStore>,
    with_wallet: bool,
) -> AuthSession {
    let store: Arc<dyn TokenStore> = store.clone();
    let wallet: Option<Arc<dyn WalletSigner>> = with_wallet.then(|| wallet.clone() as Arc<dyn WalletSigner>);
    AuthSession::new(backend.clone(), chain.clone(), store, chain_config(), wallet)
}
