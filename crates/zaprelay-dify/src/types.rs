// SPDX-FileCopyrightText: 2026 Zaprelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dify chat-messages API request/response types.

use serde::{Deserialize, Serialize};

// --- Request types ---

/// Body of `POST /chat-messages`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    /// App input variables. Dify rejects the request if this is missing.
    pub inputs: serde_json::Value,

    /// The end-user message.
    pub query: String,

    /// Always `"blocking"`; the relay never streams.
    pub response_mode: String,

    /// Stable end-user identifier.
    pub user: String,

    /// Existing Dify conversation to continue. Omitted to start a new one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl ChatRequest {
    /// Builds a blocking request.
    pub fn blocking(
        query: impl Into<String>,
        user: impl Into<String>,
        conversation_id: Option<String>,
        inputs: serde_json::Value,
    ) -> Self {
        Self {
            inputs,
            query: query.into(),
            response_mode: "blocking".to_string(),
            user: user.into(),
            conversation_id: conversation_id.filter(|c| !c.is_empty()),
        }
    }
}

// --- Response types ---

/// Blocking-mode reply. Every field is optional on the wire; the provider
/// decides what is mandatory.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
}

/// Error body returned on non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: Option<u16>,
}
