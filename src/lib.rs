//! Wallet challenge/response session manager.
//!
//! DESIGN
//! ======
//! Proves control of a wallet key to the auth backend by signing a
//! backend-issued nonce, keeps the resulting token on disk, and revalidates
//! it on startup. The wallet, backend and chain RPC are traits so the
//! session can run against HTTP in production and mocks in tests.
//!
//! ```text
//! SessionBinding ─ AuthSession ─┬─ WalletSigner  (sign, network, submit)
//!                               ├─ AuthBackend   (new / verify / status / revoke)
//!                               ├─ ChainView     (balance view call)
//!                               └─ TokenStore    (persisted SessionToken)
//! ```

pub mod backend;
pub mod binding;
pub mod chain;
pub mod config;
pub mod error;
pub mod machine;
pub mod session;
pub mod store;
pub mod token;
pub mod wallet;

#[cfg(test)]
pub mod test_helpers;

pub use backend::{AuthBackend, HttpAuthBackend, SignatureSubmission};
pub use binding::SessionBinding;
pub use chain::{ChainView, HttpChainView};
pub use config::{AuthConfig, ChainConfig, Timeouts};
pub use error::{AuthError, Result};
pub use machine::Phase;
pub use session::{AuthSession, HandshakeOutcome, SessionSnapshot};
pub use store::{FileTokenStore, MemoryTokenStore, TokenStore};
pub use token::SessionToken;
pub use wallet::WalletSigner;
