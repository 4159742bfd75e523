// SPDX-FileCopyrightText: 2026 Zaprelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use std::sync::Arc;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use zaprelay_agent::Relay;
use zaprelay_config::model::RelayConfig;
use zaprelay_core::RelayError;

use crate::auth::{auth_middleware, AuthConfig};
use crate::handlers;
use crate::webhooks;

/// Webhook verification settings.
#[derive(Clone, Default)]
pub struct WebhookConfig {
    /// Token expected in the Cloud API `GET` handshake.
    pub verify_token: Option<String>,
    /// Token expected in the Whapi `GET` handshake. Falls back to `verify_token`.
    pub whapi_verify_token: Option<String>,
    /// Meta app secret for `X-Hub-Signature-256`.
    pub app_secret: Option<String>,
    /// Reject (401) payloads whose signature does not verify.
    pub enforce_signature: bool,
}

impl WebhookConfig {
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            verify_token: config.whatsapp.verify_token.clone(),
            whapi_verify_token: config.whapi.verify_token.clone(),
            app_secret: config.whatsapp.app_secret.clone(),
            enforce_signature: config.whatsapp.enforce_signature,
        }
    }

    pub(crate) fn whapi_token(&self) -> Option<&str> {
        self.whapi_verify_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .or(self.verify_token.as_deref())
    }
}

impl std::fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("verify_token", &self.verify_token.as_ref().map(|_| "[redacted]"))
            .field(
                "whapi_verify_token",
                &self.whapi_verify_token.as_ref().map(|_| "[redacted]"),
            )
            .field("app_secret", &self.app_secret.as_ref().map(|_| "[redacted]"))
            .field("enforce_signature", &self.enforce_signature)
            .finish()
    }
}

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    /// The relay pipeline.
    pub relay: Arc<Relay>,
    /// Operator API authentication.
    pub auth: AuthConfig,
    /// Webhook verification settings.
    pub webhooks: WebhookConfig,
    /// Process start time for uptime calculation.
    pub start_time: std::time::Instant,
}

impl GatewayState {
    pub fn new(relay: Arc<Relay>, config: &RelayConfig) -> Self {
        Self {
            relay,
            auth: AuthConfig {
                bearer_token: config.gateway.bearer_token.clone(),
            },
            webhooks: WebhookConfig::from_config(config),
            start_time: std::time::Instant::now(),
        }
    }
}

/// Gateway server configuration (mirrors GatewayConfig from zaprelay-config).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
}

/// Builds the application router.
///
/// - `GET /health` (public)
/// - `GET|POST /webhook/whatsapp`, `GET|POST /webhook/whapi` (public, provider-verified)
/// - `/v1/*` operator API (bearer auth)
pub fn build_router(state: GatewayState) -> Router {
    let auth_state = state.auth.clone();

    let public_routes = Router::new()
        .route("/health", get(handlers::get_public_health))
        .route(
            "/webhook/whatsapp",
            get(webhooks::verify_whatsapp).post(webhooks::receive_whatsapp),
        )
        .route(
            "/webhook/whapi",
            get(webhooks::verify_whapi).post(webhooks::receive_whapi),
        )
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/v1/conversations", get(handlers::list_conversations))
        .route(
            "/v1/conversations/{id}/messages",
            get(handlers::get_messages).post(handlers::post_message),
        )
        .route("/v1/conversations/{id}/transfer", post(handlers::transfer))
        .route("/v1/conversations/{id}/close", post(handlers::close))
        .route("/v1/notifications", get(handlers::list_notifications))
        .route(
            "/v1/notifications/{id}/dismiss",
            post(handlers::dismiss_notification),
        )
        .route("/v1/alerts/run", post(handlers::run_alerts))
        .route("/v1/alerts/management", post(handlers::management_alert))
        .route("/v1/recovery/reprocess", post(handlers::reprocess))
        .route("/v1/recovery/sessions", post(handlers::recover_sessions))
        .route("/v1/recovery/sync", post(handlers::sync_messages))
        .route("/v1/llm/probe", post(handlers::probe_llm))
        .route_layer(axum_middleware::from_fn_with_state(
            auth_state,
            auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Start the gateway HTTP server and serve until `cancel` fires.
pub async fn start_server(
    config: &ServerConfig,
    state: GatewayState,
    cancel: CancellationToken,
) -> Result<(), RelayError> {
    let app = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| RelayError::Channel {
            message: format!("failed to bind gateway to {addr}: {e}"),
            source: Some(Box::new(e)),
        })?;

    tracing::info!("Gateway server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| RelayError::Channel {
            message: format!("gateway server error: {e}"),
            source: Some(Box::new(e)),
        })?;

    tracing::info!("Gateway server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_config_debug_redacts_secrets() {
        let config = WebhookConfig {
            verify_token: Some("verify-secret".into()),
            whapi_verify_token: None,
            app_secret: Some("app-secret".into()),
            enforce_signature: true,
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("verify-secret"));
        assert!(!debug.contains("app-secret"));
        assert!(debug.contains("[redacted]"));
    }

    #[test]
    fn whapi_handshake_token_falls_back_to_shared_token() {
        let mut config = WebhookConfig {
            verify_token: Some("shared".into()),
            ..WebhookConfig::default()
        };
        assert_eq!(config.whapi_token(), Some("shared"));
        config.whapi_verify_token = Some("whapi-only".into());
        assert_eq!(config.whapi_token(), Some("whapi-only"));
    }

    #[test]
    fn state_maps_config() {
        let mut config = RelayConfig::default();
        config.gateway.bearer_token = Some("tok".into());
        config.whatsapp.enforce_signature = true;
        config.whatsapp.app_secret = Some("s".into());
        let webhooks = WebhookConfig::from_config(&config);
        assert!(webhooks.enforce_signature);
        assert_eq!(webhooks.app_secret.as_deref(), Some("s"));
    }

    #[test]
    fn server_config_debug() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 3000,
        };
        let debug = format!("{config:?}");
        assert!(debug.contains("127.0.0.1"));
    }
}
