// SPDX-FileCopyrightText: 2026 Zaprelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider webhook endpoints.
//!
//! `GET` answers the registration handshake. `POST` always acknowledges
//! with 200 once the body has been read, whatever happens downstream, so
//! providers never retry a delivery the relay already saw. The one
//! exception is an unverifiable Cloud API signature under
//! `enforce_signature`, which is rejected with 401.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use tracing::{debug, info, warn};
use zaprelay_whatsapp::{
    parse_cloud_payload, parse_whapi_payload, verify_handshake, verify_signature,
    HandshakeQuery, SignatureCheck, SIGNATURE_HEADER,
};

use crate::server::GatewayState;

/// Query of a Whapi `POST`: which seller account the events belong to.
#[derive(Debug, Default, Deserialize)]
pub struct WhapiQuery {
    pub seller: Option<String>,
}

fn handshake(query: &HandshakeQuery, expected: Option<&str>, provider: &str) -> Response {
    match verify_handshake(query, expected) {
        Some(challenge) => {
            info!(provider, "webhook handshake accepted");
            (StatusCode::OK, challenge).into_response()
        }
        None => {
            warn!(provider, mode = ?query.mode, "webhook handshake rejected");
            StatusCode::FORBIDDEN.into_response()
        }
    }
}

fn acknowledged(events: usize) -> Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({ "status": "ok", "events": events })),
    )
        .into_response()
}

/// GET /webhook/whatsapp
pub async fn verify_whatsapp(
    State(state): State<GatewayState>,
    Query(query): Query<HandshakeQuery>,
) -> Response {
    handshake(&query, state.webhooks.verify_token.as_deref(), "whatsapp-cloud")
}

/// GET /webhook/whapi
pub async fn verify_whapi(
    State(state): State<GatewayState>,
    Query(query): Query<HandshakeQuery>,
) -> Response {
    handshake(&query, state.webhooks.whapi_token(), "whapi")
}

/// POST /webhook/whatsapp
pub async fn receive_whatsapp(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    let check = verify_signature(state.webhooks.app_secret.as_deref(), signature, &body);
    match check {
        SignatureCheck::Valid => debug!("webhook signature verified"),
        SignatureCheck::Skipped => debug!("no app secret configured, signature not checked"),
        SignatureCheck::Missing | SignatureCheck::Invalid => {
            warn!(?check, enforced = state.webhooks.enforce_signature, "webhook signature did not verify");
            if state.webhooks.enforce_signature {
                return StatusCode::UNAUTHORIZED.into_response();
            }
        }
    }

    let events = match parse_cloud_payload(&body) {
        Ok(events) => events,
        Err(e) => {
            warn!(error = %e, "unreadable Cloud API payload acknowledged");
            return acknowledged(0);
        }
    };
    let count = events.len();
    if count > 0 {
        let source = state.relay.cloud_source();
        state.relay.handle_events(&source, events).await;
    }
    acknowledged(count)
}

/// POST /webhook/whapi?seller=<id>
pub async fn receive_whapi(
    State(state): State<GatewayState>,
    Query(query): Query<WhapiQuery>,
    body: Bytes,
) -> Response {
    let Some(seller_id) = query.seller.filter(|s| !s.trim().is_empty()) else {
        warn!("Whapi webhook without seller parameter acknowledged");
        return acknowledged(0);
    };
    let events = match parse_whapi_payload(&body) {
        Ok(events) => events,
        Err(e) => {
            warn!(seller_id, error = %e, "unreadable Whapi payload acknowledged");
            return acknowledged(0);
        }
    };
    let source = match state.relay.whapi_source(&seller_id).await {
        Ok(source) => source,
        Err(e) => {
            warn!(seller_id, error = %e, "Whapi webhook for unknown seller acknowledged");
            return acknowledged(0);
        }
    };
    let count = events.len();
    if count > 0 {
        state.relay.handle_events(&source, events).await;
    }
    acknowledged(count)
}
