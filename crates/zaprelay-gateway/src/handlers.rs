// SPDX-FileCopyrightText: 2026 Zaprelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the operator REST API.

use std::str::FromStr;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use zaprelay_agent::{ManagementAlert, ManualReply};
use zaprelay_core::types::{ConversationStatus, ProviderRequest};
use zaprelay_core::RelayError;

use crate::server::GatewayState;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 500;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error description.
    pub error: String,
}

/// A [`RelayError`] rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub RelayError);

impl From<RelayError> for ApiError {
    fn from(e: RelayError) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            RelayError::NotFound { .. } => StatusCode::NOT_FOUND,
            RelayError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            RelayError::AdapterNotFound { .. } => StatusCode::SERVICE_UNAVAILABLE,
            RelayError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            RelayError::Provider { .. } | RelayError::Channel { .. } => StatusCode::BAD_GATEWAY,
            RelayError::Config(_) | RelayError::Storage { .. } | RelayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self.0, "operator API request failed");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Health status string.
    pub status: String,
    /// Binary version.
    pub version: String,
    /// Uptime in seconds.
    pub uptime_secs: u64,
    /// Whether an LLM is wired in.
    pub llm: bool,
}

/// GET /health
pub async fn get_public_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        llm: state.relay.provider().is_some(),
    })
}

/// Query of GET /v1/conversations.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
}

fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

/// GET /v1/conversations?status=&limit=
pub async fn list_conversations(
    State(state): State<GatewayState>,
    Query(query): Query<ListQuery>,
) -> Response {
    let status = match query.status.as_deref().map(ConversationStatus::from_str) {
        None => None,
        Some(Ok(s)) => Some(s),
        Some(Err(_)) => {
            return ApiError(RelayError::InvalidInput(format!(
                "unknown conversation status: {}",
                query.status.unwrap_or_default()
            )))
            .into_response();
        }
    };
    match state
        .relay
        .storage()
        .list_conversations(status, clamp_limit(query.limit))
        .await
    {
        Ok(conversations) => Json(serde_json::json!({ "conversations": conversations })).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

/// GET /v1/conversations/{id}/messages
pub async fn get_messages(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Query(query): Query<ListQuery>,
) -> ApiResult<serde_json::Value> {
    let storage = state.relay.storage();
    if storage.get_conversation(&id).await?.is_none() {
        return Err(RelayError::not_found("conversation", id).into());
    }
    let messages = storage.get_messages(&id, query.limit.map(|l| l.clamp(1, MAX_LIMIT))).await?;
    Ok(Json(serde_json::json!({ "messages": messages })))
}

/// POST /v1/conversations/{id}/messages
///
/// Answers `{success, message_id}` or `{success: false, error}`; provider
/// failures are not HTTP errors.
pub async fn post_message(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(reply): Json<ManualReply>,
) -> ApiResult<zaprelay_agent::SendOutcome> {
    Ok(Json(state.relay.send_manual_reply(&id, reply).await?))
}

/// Body of POST /v1/conversations/{id}/transfer.
#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub seller_id: String,
    #[serde(default)]
    pub actor: Option<String>,
}

/// POST /v1/conversations/{id}/transfer
pub async fn transfer(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(body): Json<TransferRequest>,
) -> ApiResult<zaprelay_agent::TransferOutcome> {
    let outcome = state
        .relay
        .transfer_to_seller(&id, &body.seller_id, body.actor.as_deref())
        .await?;
    Ok(Json(outcome))
}

/// POST /v1/conversations/{id}/close
pub async fn close(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> ApiResult<serde_json::Value> {
    state
        .relay
        .storage()
        .set_conversation_status(&id, ConversationStatus::Closed)
        .await?;
    info!(conversation_id = %id, "conversation closed");
    Ok(Json(serde_json::json!({ "id": id, "status": ConversationStatus::Closed })))
}

/// Query of the notification endpoints.
#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    pub user_id: String,
    #[serde(default)]
    pub limit: Option<i64>,
}

/// GET /v1/notifications?user_id=&limit=
pub async fn list_notifications(
    State(state): State<GatewayState>,
    Query(query): Query<NotificationQuery>,
) -> ApiResult<serde_json::Value> {
    let notifications = state
        .relay
        .storage()
        .list_notifications(&query.user_id, clamp_limit(query.limit))
        .await?;
    Ok(Json(serde_json::json!({ "notifications": notifications })))
}

/// POST /v1/notifications/{id}/dismiss?user_id=
pub async fn dismiss_notification(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Query(query): Query<NotificationQuery>,
) -> Result<StatusCode, ApiError> {
    state
        .relay
        .storage()
        .dismiss_notification(&id, &query.user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/alerts/run
pub async fn run_alerts(State(state): State<GatewayState>) -> ApiResult<zaprelay_agent::MonitorReport> {
    Ok(Json(state.relay.run_alert_monitor().await?))
}

/// POST /v1/alerts/management
pub async fn management_alert(
    State(state): State<GatewayState>,
    Json(alert): Json<ManagementAlert>,
) -> ApiResult<zaprelay_agent::AlertDelivery> {
    Ok(Json(state.relay.send_management_alert(alert).await?))
}

/// POST /v1/recovery/reprocess
pub async fn reprocess(State(state): State<GatewayState>) -> ApiResult<zaprelay_agent::RecoveryReport> {
    Ok(Json(state.relay.reprocess_lost_messages().await?))
}

/// POST /v1/recovery/sessions
pub async fn recover_sessions(
    State(state): State<GatewayState>,
) -> ApiResult<zaprelay_agent::RecoveryReport> {
    Ok(Json(state.relay.recover_llm_sessions().await?))
}

/// POST /v1/recovery/sync
pub async fn sync_messages(
    State(state): State<GatewayState>,
) -> ApiResult<zaprelay_agent::RecoveryReport> {
    Ok(Json(state.relay.sync_messages().await?))
}

/// Body of POST /v1/llm/probe.
#[derive(Debug, Deserialize)]
pub struct ProbeRequest {
    pub query: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// Response body for POST /v1/llm/probe.
#[derive(Debug, Serialize)]
pub struct ProbeResponse {
    pub answer: String,
    pub conversation_id: String,
    pub latency_ms: u64,
}

/// POST /v1/llm/probe
///
/// Sends one query to the LLM and reports the raw outcome, errors included.
pub async fn probe_llm(
    State(state): State<GatewayState>,
    Json(body): Json<ProbeRequest>,
) -> ApiResult<ProbeResponse> {
    let provider = state
        .relay
        .provider()
        .ok_or_else(|| RelayError::AdapterNotFound {
            adapter_type: "provider".into(),
            name: "dify".into(),
        })?;
    if body.query.trim().is_empty() {
        return Err(RelayError::InvalidInput("query is empty".into()).into());
    }
    let started = std::time::Instant::now();
    let request = ProviderRequest::new(body.query, body.user.unwrap_or_else(|| "probe".into()))
        .with_conversation(body.conversation_id);
    let resp = provider.complete(request).await?;
    Ok(Json(ProbeResponse {
        answer: resp.answer,
        conversation_id: resp.conversation_id,
        latency_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_map_to_status_codes() {
        assert_eq!(
            ApiError(RelayError::not_found("conversation", "x")).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError(RelayError::InvalidInput("bad".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError(RelayError::Provider {
                message: "down".into(),
                source: None
            })
            .status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError(RelayError::AdapterNotFound {
                adapter_type: "provider".into(),
                name: "dify".into()
            })
            .status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn limits_are_clamped() {
        assert_eq!(clamp_limit(None), DEFAULT_LIMIT);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(10_000)), MAX_LIMIT);
    }

    #[test]
    fn transfer_request_actor_is_optional() {
        let req: TransferRequest = serde_json::from_str(r#"{"seller_id": "s1"}"#).unwrap();
        assert_eq!(req.seller_id, "s1");
        assert!(req.actor.is_none());
    }

    #[test]
    fn error_response_serializes() {
        let resp = ErrorResponse {
            error: "something went wrong".to_string(),
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("something went wrong"));
    }
}
