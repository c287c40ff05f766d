//! Identity provider descriptors
//!
//! Each upstream authorization server the broker talks to is described by a
//! `ProviderConfig`: where to send the browser, where to exchange the code,
//! which client credentials to present, and whether the flow is bound with
//! PKCE. `ProviderKind` is the closed set of providers the broker knows about;
//! its tag doubles as the route segment (`/login/<tag>`), the discriminator in
//! the OAuth `state` parameter, and the `provider` field of token responses.

pub mod constants;

use std::fmt;
use std::str::FromStr;

use common::Secret;
use serde::Serialize;
use url::Url;

use crate::constants::CODE_CHALLENGE_METHOD;

/// Errors from building provider requests.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid authorize endpoint for {provider}: {source}")]
    AuthorizeUrl {
        provider: ProviderKind,
        #[source]
        source: url::ParseError,
    },

    #[error("unknown provider: {0}")]
    Unknown(String),
}

/// Result alias for provider operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The identity providers this broker can front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Webex collaboration API (confidential client, no PKCE)
    Webex,
    /// Snowflake data warehouse (confidential client + PKCE)
    Snowflake,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::Webex, ProviderKind::Snowflake];

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Webex => "webex",
            ProviderKind::Snowflake => "snowflake",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "webex" => Ok(ProviderKind::Webex),
            "snowflake" => Ok(ProviderKind::Snowflake),
            other => Err(Error::Unknown(other.to_owned())),
        }
    }
}

/// Everything needed to run the authorization-code grant against one provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub authorize_url: String,
    pub token_url: String,
    pub client_id: String,
    pub client_secret: Secret<String>,
    pub scope: String,
    /// Bind the authorization code to a server-held verifier (RFC 7636)
    pub pkce: bool,
}

impl ProviderConfig {
    /// Build the browser redirect target for this provider.
    ///
    /// Parameter order: `response_type`, `client_id`, `redirect_uri`, `scope`,
    /// then `code_challenge` + `code_challenge_method` when a challenge is
    /// given, and `state` last. Values are form-encoded, so the scope's spaces
    /// and colons survive the round trip.
    pub fn authorization_url(
        &self,
        redirect_uri: &str,
        state: &str,
        challenge: Option<&str>,
    ) -> Result<Url> {
        let mut url = Url::parse(&self.authorize_url).map_err(|source| Error::AuthorizeUrl {
            provider: self.kind,
            source,
        })?;

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.client_id)
                .append_pair("redirect_uri", redirect_uri)
                .append_pair("scope", &self.scope);
            if let Some(challenge) = challenge {
                query
                    .append_pair("code_challenge", challenge)
                    .append_pair("code_challenge_method", CODE_CHALLENGE_METHOD);
            }
            query.append_pair("state", state);
        }

        Ok(url)
    }
}
