//! Shared-callback disambiguation
//!
//! Every provider redirects to the same `/callback`. `resolve` decides which
//! flow a callback belongs to, in this order:
//!
//! 1. `error` present: the provider refused; relay it. The store is untouched.
//! 2. `state` missing or not a well-formed tagged token: unrecognized.
//! 3. `code` missing: reject before any store access, so a malformed
//!    callback never burns a pending authorization.
//! 4. `Pkce` token for a PKCE provider: redeem the verifier (take-and-delete).
//!    Absent means unrecognized; present but past its TTL means expired.
//! 5. `Fixed` token for a non-PKCE provider: simple exchange.
//! 6. Anything else (tag/flow mismatch): unrecognized.
//!
//! The provider is decoded from the state itself, so the PKCE namespace and
//! the fixed tags cannot shadow each other regardless of check order.

use std::collections::HashMap;

use common::Secret;
use oauth_flow::{StateToken, VerifierStore};
use provider::{ProviderConfig, ProviderKind};
use serde::Deserialize;
use tracing::debug;

use crate::error::ApiError;

/// Query parameters on the shared callback.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// A callback matched to a provider flow, ready for token exchange.
#[derive(Debug)]
pub enum Resolution<'a> {
    Pkce {
        provider: &'a ProviderConfig,
        code: &'a str,
        verifier: Secret<String>,
    },
    Fixed {
        provider: &'a ProviderConfig,
        code: &'a str,
    },
}

impl Resolution<'_> {
    pub fn provider(&self) -> &ProviderConfig {
        match self {
            Resolution::Pkce { provider, .. } | Resolution::Fixed { provider, .. } => *provider,
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Resolution::Pkce { code, .. } | Resolution::Fixed { code, .. } => *code,
        }
    }

    pub fn verifier(&self) -> Option<&str> {
        match self {
            Resolution::Pkce { verifier, .. } => Some(verifier.expose().as_str()),
            Resolution::Fixed { .. } => None,
        }
    }
}

pub async fn resolve<'a>(
    params: &'a CallbackParams,
    store: &dyn VerifierStore,
    providers: &'a HashMap<ProviderKind, ProviderConfig>,
) -> Result<Resolution<'a>, ApiError> {
    if let Some(error) = params.error.as_ref().filter(|e| !e.is_empty()) {
        return Err(ApiError::ProviderError {
            error: error.clone(),
            description: params.error_description.clone(),
        });
    }

    let raw_state = params.state.as_deref().ok_or(ApiError::UnrecognizedState)?;
    let token = StateToken::parse(raw_state).ok_or(ApiError::UnrecognizedState)?;
    let provider = providers
        .get(&token.provider())
        .ok_or(ApiError::UnrecognizedState)?;

    let code = params
        .code
        .as_deref()
        .filter(|c| !c.is_empty())
        .ok_or(ApiError::MissingCode)?;

    match token {
        StateToken::Pkce { .. } if provider.pkce => {
            let pending = store
                .take(raw_state)
                .await
                .ok_or(ApiError::UnrecognizedState)?;
            if pending.is_expired(store.ttl()) {
                debug!(provider = %provider.kind, "pending authorization expired");
                return Err(ApiError::ExpiredState);
            }
            Ok(Resolution::Pkce {
                provider,
                code,
                verifier: pending.verifier,
            })
        }
        StateToken::Fixed(_) if !provider.pkce => Ok(Resolution::Fixed { provider, code }),
        _ => Err(ApiError::UnrecognizedState),
    }
}
