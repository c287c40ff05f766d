//! Error types for authorization-code flow operations

/// Errors from the PKCE store and the token endpoint exchange.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport-level failure: connect error, timeout, broken body
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The token endpoint answered with a non-2xx status
    #[error("token endpoint returned {status}: {body}")]
    TokenEndpoint {
        status: u16,
        /// Upstream body, parsed as JSON when possible, else a JSON string
        body: serde_json::Value,
    },

    #[error("invalid token response: {0}")]
    InvalidTokenResponse(String),

    /// A pending authorization already exists under this state key
    #[error("state collision for pending authorization")]
    StateCollision,
}

impl Error {
    /// Detail suitable for relaying to the caller of a failed exchange.
    ///
    /// Upstream bodies are relayed verbatim; everything else is the message.
    pub fn detail(&self) -> serde_json::Value {
        match self {
            Error::TokenEndpoint { body, .. } => body.clone(),
            other => serde_json::Value::String(other.to_string()),
        }
    }
}

/// Result alias for flow operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_relays_upstream_body_verbatim() {
        let err = Error::TokenEndpoint {
            status: 400,
            body: serde_json::json!({"error": "invalid_grant"}),
        };
        assert_eq!(err.detail(), serde_json::json!({"error": "invalid_grant"}));
        assert!(err.to_string().contains("400"));
    }

    #[test]
    fn detail_falls_back_to_message() {
        let err = Error::Http("connection refused".into());
        assert_eq!(
            err.detail(),
            serde_json::json!("HTTP request failed: connection refused")
        );
    }
}
