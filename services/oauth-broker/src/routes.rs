//! HTTP surface
//!
//! Endpoints:
//! - GET /login/{provider} - redirect the browser to the provider's authorize URL
//! - GET /callback         - shared redirect target; exchange code for tokens
//! - GET /health           - liveness plus pending-authorization count
//! - GET /metrics          - Prometheus text exposition

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use oauth_flow::{
    ExchangeRequest, PendingAuthorization, StateToken, TokenResult, VerifierStore,
    compute_challenge, exchange_code, generate_verifier,
};
use provider::{ProviderConfig, ProviderKind};
use tracing::{Instrument, info, info_span, warn};

use crate::callback::{CallbackParams, resolve};
use crate::error::ApiError;
use crate::metrics;

/// Attempts at drawing a fresh PKCE state before giving up on a collision.
const STATE_ATTEMPTS: usize = 3;

/// Shared application state accessible from all handlers
#[derive(Clone)]
pub struct AppState {
    pub providers: Arc<HashMap<ProviderKind, ProviderConfig>>,
    pub redirect_uri: Arc<str>,
    pub store: Arc<dyn VerifierStore>,
    pub http_client: reqwest::Client,
    pub exchange_timeout: Duration,
    pub started_at: Instant,
    pub prometheus: PrometheusHandle,
}

/// Build the axum router with all routes and shared state.
///
/// A concurrency limit layer caps in-flight requests at `max_connections`.
pub fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/login/{provider}", get(login_handler))
        .route("/callback", get(callback_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

/// GET /login/{provider} - start an authorization-code flow.
///
/// Non-PKCE providers get their bare tag as `state`. PKCE providers get a
/// fresh verifier stored under a random tagged state, and the S256
/// challenge in the redirect.
async fn login_handler(
    State(state): State<AppState>,
    Path(tag): Path<String>,
) -> Result<Response, ApiError> {
    let kind: ProviderKind = tag.parse().map_err(|_| ApiError::UnknownProvider)?;
    let provider = state
        .providers
        .get(&kind)
        .ok_or(ApiError::UnknownProvider)?;

    let url = if provider.pkce {
        let url = begin_pkce(state.store.as_ref(), provider, &state.redirect_uri).await?;
        metrics::set_pending_authorizations(state.store.len().await);
        url
    } else {
        let state_token = StateToken::Fixed(kind).to_string();
        provider
            .authorization_url(&state.redirect_uri, &state_token, None)
            .map_err(|e| ApiError::Internal(e.to_string()))?
    };

    metrics::record_login(kind.as_str());
    info!(provider = %kind, pkce = provider.pkce, "redirecting to authorize endpoint");
    Ok(found(url.as_str()))
}

/// Generate verifier + challenge and record the pending authorization.
///
/// The authorize URL is built before anything is stored, so a failure there
/// leaves no orphaned entry. A colliding state is redrawn rather than
/// overwriting the existing entry.
async fn begin_pkce(
    store: &dyn VerifierStore,
    provider: &ProviderConfig,
    redirect_uri: &str,
) -> Result<url::Url, ApiError> {
    for _ in 0..STATE_ATTEMPTS {
        let verifier = generate_verifier();
        let challenge = compute_challenge(&verifier);
        let state_token = StateToken::new_pkce(provider.kind).to_string();
        let url = provider
            .authorization_url(redirect_uri, &state_token, Some(&challenge))
            .map_err(|e| ApiError::Internal(e.to_string()))?;

        match store
            .put(&state_token, PendingAuthorization::new(verifier))
            .await
        {
            Ok(()) => return Ok(url),
            Err(oauth_flow::Error::StateCollision) => {
                warn!(provider = %provider.kind, "state collision, drawing a new nonce");
            }
            Err(e) => return Err(ApiError::Internal(e.to_string())),
        }
    }
    Err(ApiError::Internal(
        "could not allocate a unique authorization state".into(),
    ))
}

/// GET /callback - disambiguate by state, exchange the code, relay tokens.
async fn callback_handler(
    State(state): State<AppState>,
    query: Result<Query<CallbackParams>, QueryRejection>,
) -> Response {
    let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
    let span = info_span!("callback", request_id = %request_id);
    match query {
        Ok(Query(params)) => handle_callback(&state, &params).instrument(span).await,
        Err(rejection) => {
            let err = ApiError::MalformedQuery;
            metrics::record_callback("unknown", err.outcome());
            span.in_scope(|| {
                warn!(outcome = err.outcome(), error = %rejection, "callback rejected");
            });
            err.into_response()
        }
    }
}

/// Provider label for callback metrics and logs.
///
/// A state that was not recognized is never attributed to the provider it
/// claims to be from.
fn callback_label(
    params: &CallbackParams,
    result: &Result<TokenResult, ApiError>,
) -> &'static str {
    if matches!(result, Err(ApiError::UnrecognizedState)) {
        return "unknown";
    }
    params
        .state
        .as_deref()
        .and_then(StateToken::parse)
        .map(|t| t.provider().as_str())
        .unwrap_or("unknown")
}

async fn handle_callback(state: &AppState, params: &CallbackParams) -> Response {
    let result = complete_flow(state, params).await;
    metrics::set_pending_authorizations(state.store.len().await);

    let provider_label = callback_label(params, &result);

    match result {
        Ok(tokens) => {
            metrics::record_callback(provider_label, "success");
            info!(provider = provider_label, outcome = "success", "token exchange completed");
            (StatusCode::OK, axum::Json(tokens)).into_response()
        }
        Err(err) => {
            metrics::record_callback(provider_label, err.outcome());
            warn!(
                provider = provider_label,
                outcome = err.outcome(),
                error = %err,
                "callback rejected"
            );
            err.into_response()
        }
    }
}

async fn complete_flow(
    state: &AppState,
    params: &CallbackParams,
) -> Result<TokenResult, ApiError> {
    let resolution = resolve(params, state.store.as_ref(), &state.providers).await?;
    let provider = resolution.provider();

    let request = ExchangeRequest {
        code: resolution.code(),
        redirect_uri: &state.redirect_uri,
        verifier: resolution.verifier(),
    };

    let started = Instant::now();
    let result =
        exchange_code(&state.http_client, provider, &request, state.exchange_timeout).await;
    metrics::record_exchange_duration(provider.kind.as_str(), started.elapsed().as_secs_f64());

    let payload = result.map_err(|source| ApiError::ExchangeFailed {
        provider: provider.kind,
        source,
    })?;
    Ok(TokenResult::new(provider.kind, payload))
}

/// GET /health - process liveness. Never exposes store contents, only the count.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let pending = state.store.len().await;
    axum::Json(serde_json::json!({
        "status": "healthy",
        "pending_authorizations": pending,
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    }))
}

/// GET /metrics - Prometheus text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}
