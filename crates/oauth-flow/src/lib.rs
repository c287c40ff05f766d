//! Authorization-code flow primitives
//!
//! PKCE generation, tagged state tokens, the pending-authorization store,
//! and the token endpoint exchange. No HTTP server code lives here; the
//! broker service wires these into routes.
//!
//! PKCE flow lifecycle:
//! 1. `pkce::generate_verifier()` + `pkce::compute_challenge()`
//! 2. `StateToken::new_pkce()` keys the verifier via `VerifierStore::put()`
//! 3. Browser returns with `code` + `state`; `StateToken::parse()` names the provider
//! 4. `VerifierStore::take()` redeems the verifier exactly once
//! 5. `token::exchange_code()` sends code + verifier to the token endpoint

pub mod error;
pub mod pkce;
pub mod state;
pub mod store;
pub mod token;

pub use error::{Error, Result};
pub use pkce::{compute_challenge, generate_nonce, generate_verifier};
pub use state::StateToken;
pub use store::{MemoryVerifierStore, PendingAuthorization, VerifierStore, spawn_sweeper};
pub use token::{ExchangeRequest, TokenPayload, TokenResult, exchange_code};
