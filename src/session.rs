//! Wallet auth session: challenge/response handshake and revalidation.
//!
//! ARCHITECTURE
//! ============
//! `AuthSession` drives the pure machine in `crate::machine` against three
//! collaborators: the wallet (optional; absent means no extension installed),
//! the auth backend and the token store. Every phase change goes through
//! `advance`, which rejects illegal edges, so a `disconnect` that lands in
//! the middle of a handshake makes the handshake's next step fail instead of
//! persisting a stale token.
//!
//! CONCURRENCY
//! ===========
//! In-memory state sits behind a `std::sync::Mutex` that is never held
//! across an await. `connect`, `check` and `handshake` share a single-flight
//! guard. A call that waited behind a `connect` or `handshake` which left
//! the session connected returns that result instead of starting a second
//! handshake with a second nonce; after anything else it runs normally.
//! `disconnect` bypasses the guard so it can abort a handshake that is
//! parked on the signing prompt.
//!
//! TRADE-OFFS
//! ==========
//! A missing wallet and a declined signature both surface as `false` from
//! `connect`/`handshake`. `handshake_outcome` keeps them apart for callers
//! that need to tell the user which one happened.

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::backend::{AuthBackend, HttpAuthBackend, SignatureSubmission};
use crate::chain::{ChainView, HttpChainView, ViewRequest, parse_balance};
use crate::config::{AuthConfig, ChainConfig};
use crate::error::{AuthError, Result};
use crate::machine::{Effect, Event, Phase, transition};
use crate::store::{FileTokenStore, TokenStore};
use crate::token::SessionToken;
use crate::wallet::{EntryFunctionPayload, Network, SignMessagePayload, SignMessageResponse, SignOptions, WalletSigner};

/// How a handshake ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeOutcome {
    Verified,
    /// No wallet extension; the backend was never contacted.
    WalletUnavailable,
    /// The user rejected or dismissed the signing prompt.
    UserDeclined,
    /// Another connect/handshake was in flight; this call waited for it.
    Shared { connected: bool },
}

impl HandshakeOutcome {
    #[must_use]
    pub fn is_verified(self) -> bool {
        matches!(self, Self::Verified | Self::Shared { connected: true })
    }
}

/// Point-in-time view of the session for consumers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    /// Startup revalidation has finished; before this, "logged out" is not final.
    pub initialized: bool,
    pub connected: bool,
    pub phase: Phase,
    pub account: Option<String>,
}

#[derive(Debug, Default)]
struct SessionState {
    connected: bool,
    initialized: bool,
    phase: Phase,
    token: SessionToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlightKind {
    Check,
    Connect,
    Handshake,
}

/// Holds the single-flight lock; records on release whether waiters may
/// reuse the result, then bumps the completion counter.
struct Flight<'a> {
    session: &'a AuthSession,
    kind: FlightKind,
    _guard: tokio::sync::MutexGuard<'a, ()>,
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        let shareable = self.kind != FlightKind::Check && self.session.is_connected();
        self.session.shareable.store(shareable, Ordering::Release);
        self.session.completed.fetch_add(1, Ordering::AcqRel);
    }
}

pub struct AuthSession {
    wallet: Option<Arc<dyn WalletSigner>>,
    backend: Arc<dyn AuthBackend>,
    chain: Arc<dyn ChainView>,
    store: Arc<dyn TokenStore>,
    chain_config: ChainConfig,
    state: Mutex<SessionState>,
    flight: tokio::sync::Mutex<()>,
    completed: AtomicU64,
    /// The last flight was a connect or handshake that ended connected.
    shareable: AtomicBool,
}

impl AuthSession {
    /// Build a session and load whatever record the store holds.
    ///
    /// A corrupt record is dropped by the store; the session starts
    /// disconnected either way until `init` or `connect` runs.
    pub fn new(
        backend: Arc<dyn AuthBackend>,
        chain: Arc<dyn ChainView>,
        store: Arc<dyn TokenStore>,
        chain_config: ChainConfig,
        wallet: Option<Arc<dyn WalletSigner>>,
    ) -> Self {
        let token = store.load();
        Self {
            wallet,
            backend,
            chain,
            store,
            chain_config,
            state: Mutex::new(SessionState { token, ..SessionState::default() }),
            flight: tokio::sync::Mutex::new(()),
            completed: AtomicU64::new(0),
            shareable: AtomicBool::new(false),
        }
    }

    /// Session over HTTP collaborators and a file store, as configured.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::HttpClientBuild` if an HTTP client cannot be built.
    pub fn from_config(config: &AuthConfig, wallet: Option<Arc<dyn WalletSigner>>) -> Result<Self> {
        let backend = Arc::new(HttpAuthBackend::from_config(config)?);
        let chain = Arc::new(HttpChainView::new(config.chain.rpc_url.clone(), config.timeouts)?);
        let store = Arc::new(FileTokenStore::in_dir(&config.storage_dir));
        Ok(Self::new(backend, chain, store, config.chain.clone(), wallet))
    }

    // =========================================================================
    // STATE
    // =========================================================================

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state();
        SessionSnapshot {
            initialized: state.initialized,
            connected: state.connected,
            phase: state.phase,
            account: state.token.account.clone(),
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().connected
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state().initialized
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.state().phase
    }

    /// Current in-memory token.
    #[must_use]
    pub fn token(&self) -> SessionToken {
        self.state().token.clone()
    }

    fn advance(&self, event: Event) -> Result<Effect> {
        let mut state = self.state();
        let step = transition(state.phase, event)?;
        tracing::debug!(from = ?state.phase, to = ?step.phase, ?event, "auth phase");
        state.phase = step.phase;
        Ok(step.effect)
    }

    /// Advance along an edge whose effect the caller performs inline.
    fn advance_expecting(&self, event: Event, expected: Effect) -> Result<()> {
        let effect = self.advance(event)?;
        debug_assert_eq!(effect, expected, "driver out of step with machine on {event:?}");
        Ok(())
    }

    fn apply(&self, effect: Effect) -> Result<()> {
        if effect == Effect::ClearSession {
            {
                let mut state = self.state();
                state.token = SessionToken::default();
                state.connected = false;
            }
            self.store.clear()?;
        }
        Ok(())
    }

    fn reset(&self) -> Result<()> {
        let effect = self.advance(Event::Reset)?;
        self.apply(effect)
    }

    /// Persist `token` and make it current. Callers advance first.
    fn commit(&self, token: SessionToken) -> Result<()> {
        self.store.save(&token)?;
        self.state().token = token;
        Ok(())
    }

    fn set_connected(&self, connected: bool) {
        self.state().connected = connected;
    }

    /// Take the single-flight lock, or `None` when a connect or handshake
    /// finished while we waited and left the session connected.
    async fn enter(&self, kind: FlightKind) -> Option<Flight<'_>> {
        let observed = self.completed.load(Ordering::Acquire);
        let guard = self.flight.lock().await;
        let finished_meanwhile = self.completed.load(Ordering::Acquire) != observed;
        if finished_meanwhile && self.shareable.load(Ordering::Acquire) && self.is_connected() {
            return None;
        }
        Some(Flight { session: self, kind, _guard: guard })
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Reconcile the persisted record with the live wallet. Never fails.
    ///
    /// Marks the session initialized whatever the outcome; revalidation
    /// errors are logged and leave the session disconnected.
    pub async fn init(&self) -> bool {
        let wallet_ready = match &self.wallet {
            None => false,
            Some(wallet) => wallet.is_connected().await.unwrap_or_else(|e| {
                tracing::warn!(error = %e, "wallet connection state unavailable");
                false
            }),
        };

        let connected = if wallet_ready {
            self.check().await.unwrap_or_else(|e| {
                tracing::warn!(error = %e, "session revalidation failed during init");
                false
            })
        } else {
            false
        };

        let mut state = self.state();
        state.connected = connected;
        state.initialized = true;
        connected
    }

    /// Revalidate the current token with the backend.
    ///
    /// Read-only with respect to the handshake: no nonce is requested and the
    /// local nonce is kept. A token the backend no longer accepts is cleared.
    ///
    /// # Errors
    ///
    /// Propagates backend and transport failures.
    pub async fn check(&self) -> Result<bool> {
        let Some(_flight) = self.enter(FlightKind::Check).await else {
            return Ok(true);
        };
        self.check_inner().await
    }

    async fn check_inner(&self) -> Result<bool> {
        let current = self.token();
        if !current.is_present() {
            self.reset()?;
            return Ok(false);
        }

        self.advance_expecting(Event::Revalidate, Effect::RequestStatus)?;
        let refreshed = match self.backend.status(&current).await {
            Ok(token) => token,
            Err(e) => {
                self.advance_expecting(Event::Failed, Effect::None)?;
                self.set_connected(false);
                return Err(e);
            }
        };
        let merged = SessionToken { nonce: current.nonce.clone(), ..current.merge(refreshed) };

        if merged.verified {
            self.advance_expecting(Event::StillValid, Effect::None)?;
            self.commit(merged)?;
            self.set_connected(true);
            Ok(true)
        } else {
            tracing::info!(account = ?current.account, "session no longer valid; clearing");
            let effect = self.advance(Event::Revoked)?;
            self.apply(effect)?;
            Ok(false)
        }
    }

    /// Revalidate, falling back to a full handshake.
    ///
    /// Asks a present but disconnected wallet to connect first.
    ///
    /// # Errors
    ///
    /// Propagates backend rejections, verification failures and wallet
    /// faults. A missing wallet or a declined signature is `Ok(false)`.
    pub async fn connect(&self) -> Result<bool> {
        let Some(_flight) = self.enter(FlightKind::Connect).await else {
            return Ok(true);
        };

        self.set_connected(false);
        let Some(wallet) = &self.wallet else {
            return Ok(false);
        };
        if !wallet.is_connected().await? {
            wallet.connect().await?;
        }

        let connected = self.check_inner().await? || self.handshake_inner().await?.is_verified();
        self.set_connected(connected);
        Ok(connected)
    }

    /// Run a full challenge/response handshake; `true` once verified.
    ///
    /// # Errors
    ///
    /// See [`AuthSession::handshake_outcome`].
    pub async fn handshake(&self) -> Result<bool> {
        Ok(self.handshake_outcome().await?.is_verified())
    }

    /// Run a full handshake and report how it ended.
    ///
    /// # Errors
    ///
    /// - `AuthError::Backend` when the nonce or verify endpoint rejects.
    /// - `AuthError::MissingNonce` when the issued draft has no nonce.
    /// - `AuthError::VerificationFailed` when the backend does not accept the signature.
    /// - `AuthError::Wallet` when the wallet itself fails.
    pub async fn handshake_outcome(&self) -> Result<HandshakeOutcome> {
        let Some(_flight) = self.enter(FlightKind::Handshake).await else {
            return Ok(HandshakeOutcome::Shared { connected: true });
        };
        self.handshake_inner().await
    }

    async fn handshake_inner(&self) -> Result<HandshakeOutcome> {
        self.reset()?;

        let Some(wallet) = self.wallet.clone() else {
            tracing::debug!("no wallet extension; skipping handshake");
            return Ok(HandshakeOutcome::WalletUnavailable);
        };
        let account = wallet.account().await?;

        self.advance_expecting(Event::Start, Effect::RequestNonce)?;
        let outcome = self.run_handshake(wallet.as_ref(), account).await;
        if outcome.is_err() && self.phase().is_pending() {
            self.advance_expecting(Event::Failed, Effect::None)?;
        }
        let outcome = outcome?;
        self.set_connected(outcome.is_verified());
        Ok(outcome)
    }

    async fn run_handshake(&self, wallet: &dyn WalletSigner, account: String) -> Result<HandshakeOutcome> {
        let draft = SessionToken::with_account(account);
        let issued = self.backend.issue(&draft).await?;
        let nonce = issued.nonce.clone().ok_or(AuthError::MissingNonce)?;
        let message = serde_json::to_string(&issued).map_err(|e| AuthError::Parse(e.to_string()))?;

        self.advance_expecting(Event::NonceIssued, Effect::RequestSignature)?;
        self.commit(draft.merge(issued))?;

        let payload = SignMessagePayload::challenge(message, nonce);
        let signed = match wallet.sign_message(payload, SignOptions::default()).await? {
            SignMessageResponse { success: true, result: Some(signed) } => signed,
            _ => {
                tracing::info!("wallet signature declined");
                let effect = self.advance(Event::Declined)?;
                self.apply(effect)?;
                return Ok(HandshakeOutcome::UserDeclined);
            }
        };

        let public_key = wallet.public_key().await?;
        let submission = SignatureSubmission::new(signed, public_key);

        self.advance_expecting(Event::Signed, Effect::SubmitSignature)?;
        let verified = self.backend.verify(&submission).await?;
        let token = self.token().merge(verified);

        if !token.verified {
            self.advance_expecting(Event::Rejected, Effect::None)?;
            self.commit(token)?;
            tracing::warn!("backend rejected wallet signature");
            return Err(AuthError::VerificationFailed);
        }

        self.advance_expecting(Event::Accepted, Effect::None)?;
        tracing::info!(account = ?token.account, "wallet session verified");
        self.commit(token)?;
        Ok(HandshakeOutcome::Verified)
    }

    /// Drop the session locally, in storage, at the wallet and at the backend.
    ///
    /// Best-effort: wallet and backend failures are logged. Always `true`.
    pub async fn disconnect(&self) -> bool {
        if let Err(e) = self.reset() {
            tracing::warn!(error = %e, "failed to clear persisted session");
        }

        if let Some(wallet) = &self.wallet {
            if let Err(e) = wallet.disconnect().await {
                tracing::warn!(error = %e, "wallet disconnect failed");
            }
        }

        match self.backend.revoke().await {
            Ok(true) => {}
            Ok(false) => tracing::warn!("backend declined session revocation"),
            Err(e) => tracing::warn!(error = %e, "session revocation failed"),
        }
        true
    }

    // =========================================================================
    // BALANCE
    // =========================================================================

    /// Display balance of the bound account; 0 when not connected.
    ///
    /// # Errors
    ///
    /// Propagates RPC failures.
    pub async fn balance(&self) -> Result<f64> {
        let snapshot = self.snapshot();
        if !snapshot.connected || self.wallet.is_none() {
            return Ok(0.0);
        }
        let Some(account) = snapshot.account else {
            return Ok(0.0);
        };

        let request = ViewRequest::balance_of(&self.chain_config.contract_address, &account);
        let result = self.chain.view(&request).await?;
        Ok(parse_balance(&result))
    }

    /// Deposit `amount` base units through the wallet.
    ///
    /// No-op when not connected or no wallet is present.
    ///
    /// # Errors
    ///
    /// - `AuthError::WrongNetwork` when the wallet is not on the configured RPC and chain.
    /// - `AuthError::TopUpFailed` when the wallet does not submit the deposit.
    pub async fn top_up_balance(&self, amount: u64) -> Result<()> {
        let Some(wallet) = &self.wallet else {
            return Ok(());
        };
        if !self.is_connected() {
            return Ok(());
        }

        let network = wallet.network().await?;
        if !network_matches(&network, &self.chain_config) {
            tracing::warn!(api = %network.api, chain_id = %network.chain_id, "wallet on unexpected network");
            return Err(AuthError::WrongNetwork {
                expected_rpc: self.chain_config.rpc_url.clone(),
                expected_chain_id: self.chain_config.chain_id.clone(),
            });
        }

        let payload = EntryFunctionPayload {
            function: format!("{}::vibe_balance::deposit", self.chain_config.contract_address),
            arguments: vec![amount.to_string()],
        };
        let response = wallet.sign_and_submit(payload).await?;
        if !response.success {
            return Err(AuthError::TopUpFailed);
        }
        tracing::info!(amount, "balance top-up submitted");
        Ok(())
    }
}

fn normalize_rpc(url: &str) -> String {
    url.trim().trim_end_matches('/').to_ascii_lowercase()
}

/// Same RPC (case and trailing slash ignored) and same chain id.
pub(crate) fn network_matches(network: &Network, expected: &ChainConfig) -> bool {
    normalize_rpc(&network.api) == normalize_rpc(&expected.rpc_url)
        && network.chain_id.trim().eq_ignore_ascii_case(expected.chain_id.trim())
}
