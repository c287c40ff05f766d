//! Tagged OAuth `state` parameter
//!
//! All providers share one callback URL, so the `state` value has to say
//! which provider the returning code belongs to. Rather than inferring that
//! from whether the value happens to be in the verifier store, the provider is
//! encoded explicitly:
//!
//! - `webex`: bare provider tag, for flows with nothing to track server-side
//! - `snowflake.<nonce>`: provider tag plus a random nonce keying the PKCE
//!   verifier in the store
//!
//! The callback decodes the tag first and only then decides whether to look
//! anything up.

use std::fmt;

use provider::ProviderKind;

use crate::pkce::generate_nonce;

const SEPARATOR: char = '.';
const MAX_NONCE_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StateToken {
    /// Constant per-provider state; no pending authorization behind it
    Fixed(ProviderKind),
    /// Random per-flow state; keys a pending PKCE verifier
    Pkce { provider: ProviderKind, nonce: String },
}

impl StateToken {
    /// Fresh PKCE state with a random nonce.
    pub fn new_pkce(provider: ProviderKind) -> Self {
        StateToken::Pkce {
            provider,
            nonce: generate_nonce(),
        }
    }

    pub fn provider(&self) -> ProviderKind {
        match self {
            StateToken::Fixed(provider) => *provider,
            StateToken::Pkce { provider, .. } => *provider,
        }
    }

    /// Decode a `state` value received on the callback.
    ///
    /// Returns `None` for anything that is not a well-formed token: unknown
    /// provider tag, empty nonce, or a nonce outside the base64url alphabet.
    /// Syntax only; whether the provider actually uses PKCE is the caller's
    /// check.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.split_once(SEPARATOR) {
            None => raw.parse().ok().map(StateToken::Fixed),
            Some((tag, nonce)) => {
                let provider = tag.parse().ok()?;
                if !is_valid_nonce(nonce) {
                    return None;
                }
                Some(StateToken::Pkce {
                    provider,
                    nonce: nonce.to_owned(),
                })
            }
        }
    }
}

fn is_valid_nonce(nonce: &str) -> bool {
    !nonce.is_empty()
        && nonce.len() <= MAX_NONCE_LEN
        && nonce
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

impl fmt::Display for StateToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateToken::Fixed(provider) => f.write_str(provider.as_str()),
            StateToken::Pkce { provider, nonce } => write!(f, "{provider}{SEPARATOR}{nonce}"),
        }
    }
}
