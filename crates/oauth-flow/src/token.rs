//! Authorization code exchange
//!
//! Server-to-server POST of the authorization-code grant to a provider's
//! token endpoint. One attempt, no retry: a failure is returned to the
//! caller immediately with whatever the upstream said.

use std::time::Duration;

use provider::{ProviderConfig, ProviderKind};
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::error::{Error, Result};

/// Token endpoint response, every field preserved as sent.
pub type TokenPayload = serde_json::Map<String, serde_json::Value>;

/// Callback parameters needed for the grant.
#[derive(Debug, Clone, Copy)]
pub struct ExchangeRequest<'a> {
    pub code: &'a str,
    pub redirect_uri: &'a str,
    /// PKCE verifier, sent as `code_verifier` when present
    pub verifier: Option<&'a str>,
}

/// Provider-tagged token payload relayed to the browser.
///
/// Serializes flat: `{"provider": "snowflake", "access_token": ..., ...}`.
#[derive(Debug, Clone, Serialize)]
pub struct TokenResult {
    pub provider: ProviderKind,
    #[serde(flatten)]
    pub payload: TokenPayload,
}

impl TokenResult {
    /// The broker's provider tag wins over any `provider` key from upstream.
    pub fn new(provider: ProviderKind, mut payload: TokenPayload) -> Self {
        payload.remove("provider");
        Self { provider, payload }
    }
}

/// Exchange an authorization code for tokens.
///
/// Sends `grant_type=authorization_code` with the provider's client
/// credentials as an `application/x-www-form-urlencoded` body. A 2xx response
/// must carry a JSON object; anything else is an error carrying the upstream
/// body (JSON if it parses, raw text otherwise).
#[instrument(skip_all, fields(provider = %provider.kind, pkce = request.verifier.is_some()))]
pub async fn exchange_code(
    client: &reqwest::Client,
    provider: &ProviderConfig,
    request: &ExchangeRequest<'_>,
    timeout: Duration,
) -> Result<TokenPayload> {
    let mut form = vec![
        ("grant_type", "authorization_code"),
        ("client_id", provider.client_id.as_str()),
        ("client_secret", provider.client_secret.expose().as_str()),
        ("code", request.code),
        ("redirect_uri", request.redirect_uri),
    ];
    if let Some(verifier) = request.verifier {
        form.push(("code_verifier", verifier));
    }

    let response = client
        .post(&provider.token_url)
        .form(&form)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                Error::Http(format!(
                    "token endpoint timed out after {}s",
                    timeout.as_secs_f64()
                ))
            } else {
                Error::Http(format!("token exchange request failed: {e}"))
            }
        })?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| Error::Http(format!("reading token response: {e}")))?;

    if !status.is_success() {
        warn!(status = status.as_u16(), "token endpoint rejected exchange");
        // An empty body carries nothing to relay, so describe the status instead
        let body = if body.trim().is_empty() {
            serde_json::Value::String(format!("token endpoint returned {status}"))
        } else {
            serde_json::from_str(&body).unwrap_or(serde_json::Value::String(body))
        };
        return Err(Error::TokenEndpoint {
            status: status.as_u16(),
            body,
        });
    }

    match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(serde_json::Value::Object(payload)) => {
            debug!(fields = payload.len(), "token exchange succeeded");
            Ok(payload)
        }
        Ok(other) => Err(Error::InvalidTokenResponse(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(Error::InvalidTokenResponse(e.to_string())),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use axum::Form;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use tokio::net::TcpListener;

    #[derive(Debug, Clone, Default)]
    struct Captured {
        form: HashMap<String, String>,
        content_type: String,
    }

    /// Start a mock token endpoint that records the request and replies with
    /// the given status and body.
    async fn start_token_server(
        status: StatusCode,
        body: &'static str,
    ) -> (String, Arc<Mutex<Option<Captured>>>) {
        let captured = Arc::new(Mutex::new(None));
        let sink = captured.clone();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let app = axum::Router::new().route(
            "/token",
            axum::routing::post(
                move |headers: HeaderMap, Form(form): Form<HashMap<String, String>>| {
                    let sink = sink.clone();
                    async move {
                        let content_type = headers
                            .get("content-type")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or("")
                            .to_string();
                        *sink.lock().unwrap() = Some(Captured { form, content_type });
                        (status, [("content-type", "application/json")], body).into_response()
                    }
                },
            ),
        );
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{addr}/token"), captured)
    }

    fn provider(kind: ProviderKind, token_url: String) -> ProviderConfig {
        ProviderConfig {
            kind,
            authorize_url: "https://idp.example/authorize".into(),
            token_url,
            client_id: "client-1".into(),
            client_secret: "secret-1".into(),
            scope: "openid".into(),
            pkce: kind == ProviderKind::Snowflake,
        }
    }

    fn request(verifier: Option<&str>) -> ExchangeRequest<'_> {
        ExchangeRequest {
            code: "abc",
            redirect_uri: "http://localhost:3000/callback",
            verifier,
        }
    }

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn pkce_exchange_sends_verifier() {
        let (url, captured) =
            start_token_server(StatusCode::OK, r#"{"access_token":"t","expires_in":600}"#).await;
        let provider = provider(ProviderKind::Snowflake, url);

        let payload = exchange_code(
            &reqwest::Client::new(),
            &provider,
            &request(Some("the-verifier")),
            TIMEOUT,
        )
        .await
        .unwrap();

        assert_eq!(payload["access_token"], "t");
        assert_eq!(payload["expires_in"], 600);

        let captured = captured.lock().unwrap().clone().unwrap();
        assert_eq!(captured.content_type, "application/x-www-form-urlencoded");
        assert_eq!(captured.form["grant_type"], "authorization_code");
        assert_eq!(captured.form["client_id"], "client-1");
        assert_eq!(captured.form["client_secret"], "secret-1");
        assert_eq!(captured.form["code"], "abc");
        assert_eq!(captured.form["redirect_uri"], "http://localhost:3000/callback");
        assert_eq!(captured.form["code_verifier"], "the-verifier");
    }

    #[tokio::test]
    async fn simple_exchange_omits_verifier() {
        let (url, captured) = start_token_server(StatusCode::OK, r#"{"access_token":"w"}"#).await;
        let provider = provider(ProviderKind::Webex, url);

        exchange_code(&reqwest::Client::new(), &provider, &request(None), TIMEOUT)
            .await
            .unwrap();

        let captured = captured.lock().unwrap().clone().unwrap();
        assert!(!captured.form.contains_key("code_verifier"));
        assert_eq!(captured.form.len(), 5);
    }

    #[tokio::test]
    async fn non_2xx_carries_upstream_json_body() {
        let (url, _) = start_token_server(
            StatusCode::BAD_REQUEST,
            r#"{"error":"invalid_grant","error_description":"code expired"}"#,
        )
        .await;
        let provider = provider(ProviderKind::Snowflake, url);

        let err = exchange_code(
            &reqwest::Client::new(),
            &provider,
            &request(Some("v")),
            TIMEOUT,
        )
        .await
        .unwrap_err();

        match err {
            Error::TokenEndpoint { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body["error"], "invalid_grant");
            }
            other => panic!("expected TokenEndpoint, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_2xx_plain_text_body_is_kept_as_string() {
        let (url, _) = start_token_server(StatusCode::BAD_GATEWAY, "upstream down").await;
        let provider = provider(ProviderKind::Webex, url);

        let err = exchange_code(&reqwest::Client::new(), &provider, &request(None), TIMEOUT)
            .await
            .unwrap_err();
        assert_eq!(err.detail(), serde_json::json!("upstream down"));
    }

    #[tokio::test]
    async fn non_2xx_empty_body_falls_back_to_status_message() {
        let (url, _) = start_token_server(StatusCode::BAD_GATEWAY, "").await;
        let provider = provider(ProviderKind::Webex, url);

        let err = exchange_code(&reqwest::Client::new(), &provider, &request(None), TIMEOUT)
            .await
            .unwrap_err();
        assert_eq!(
            err.detail(),
            serde_json::json!("token endpoint returned 502 Bad Gateway")
        );
    }

    #[tokio::test]
    async fn success_with_non_object_body_is_invalid() {
        let (url, _) = start_token_server(StatusCode::OK, r#"["not","an","object"]"#).await;
        let provider = provider(ProviderKind::Webex, url);

        let err = exchange_code(&reqwest::Client::new(), &provider, &request(None), TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTokenResponse(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn connection_refused_is_http_error() {
        // Bind then drop to get a port nothing listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let provider = provider(ProviderKind::Webex, format!("http://{addr}/token"));
        let err = exchange_code(&reqwest::Client::new(), &provider, &request(None), TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Http(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn slow_endpoint_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = axum::Router::new().route(
            "/token",
            axum::routing::post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "{}"
            }),
        );
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let provider = provider(ProviderKind::Webex, format!("http://{addr}/token"));
        let err = exchange_code(
            &reqwest::Client::new(),
            &provider,
            &request(None),
            Duration::from_millis(100),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("timed out"), "got {err}");
    }

    #[test]
    fn token_result_serializes_flat_with_provider_tag() {
        let mut payload = TokenPayload::new();
        payload.insert("access_token".into(), "t".into());
        payload.insert("provider".into(), "spoofed".into());

        let json = serde_json::to_value(TokenResult::new(ProviderKind::Snowflake, payload)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"provider": "snowflake", "access_token": "t"})
        );
    }
}
