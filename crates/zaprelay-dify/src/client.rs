// SPDX-FileCopyrightText: 2026 Zaprelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Dify chat-messages API.
//!
//! Provides [`DifyClient`] which handles request construction,
//! bearer authentication and the overall request timeout. Requests are
//! never retried.

use std::fmt;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use tracing::debug;
use zaprelay_core::RelayError;

use crate::types::{ApiErrorResponse, ChatRequest, ChatResponse};

/// HTTP client for Dify API communication.
#[derive(Clone)]
pub struct DifyClient {
    client: reqwest::Client,
    base_url: String,
}

impl fmt::Debug for DifyClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DifyClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"[redacted]")
            .finish()
    }
}

impl DifyClient {
    /// Creates a new Dify API client.
    ///
    /// `base_url` is the API root (for example `https://api.dify.ai/v1`);
    /// a trailing slash is tolerated.
    pub fn new(api_key: &str, base_url: &str, timeout: Duration) -> Result<Self, RelayError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|e| {
                RelayError::Config(format!("invalid Dify API key header value: {e}"))
            })?,
        );
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Sends a blocking `POST /chat-messages` and returns the parsed body.
    pub async fn chat_messages(&self, request: &ChatRequest) -> Result<ChatResponse, RelayError> {
        let url = format!("{}/chat-messages", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RelayError::Provider {
                        message: "Dify request timed out".into(),
                        source: Some(Box::new(e)),
                    }
                } else {
                    RelayError::Provider {
                        message: format!("HTTP request failed: {e}"),
                        source: Some(Box::new(e)),
                    }
                }
            })?;

        let status = response.status();
        debug!(status = %status, "Dify response received");

        let body = response.text().await.map_err(|e| RelayError::Provider {
            message: format!("failed to read response body: {e}"),
            source: Some(Box::new(e)),
        })?;

        if !status.is_success() {
            let message = match serde_json::from_str::<ApiErrorResponse>(&body) {
                Ok(api_err) => format!("Dify API error ({}): {}", api_err.code, api_err.message),
                Err(_) => format!("Dify returned {status}: {body}"),
            };
            return Err(RelayError::Provider {
                message,
                source: None,
            });
        }

        serde_json::from_str(&body).map_err(|e| RelayError::Provider {
            message: format!("failed to parse Dify response: {e}"),
            source: Some(Box::new(e)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: &str) -> DifyClient {
        DifyClient::new("app-test-key", base_url, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn chat_messages_success() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat-messages"))
            .and(header("authorization", "Bearer app-test-key"))
            .and(body_partial_json(serde_json::json!({
                "query": "Oi",
                "response_mode": "blocking",
                "user": "5511999990000"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "event": "message",
                "answer": "Olá! Como posso ajudar?",
                "conversation_id": "conv-123",
                "message_id": "msg-1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&format!("{}/", server.uri()));
        let req = ChatRequest::blocking("Oi", "5511999990000", None, serde_json::json!({}));
        let resp = client.chat_messages(&req).await.unwrap();

        assert_eq!(resp.answer.as_deref(), Some("Olá! Como posso ajudar?"));
        assert_eq!(resp.conversation_id.as_deref(), Some("conv-123"));
        assert_eq!(resp.message_id.as_deref(), Some("msg-1"));
    }

    #[tokio::test]
    async fn chat_messages_does_not_retry_on_500() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat-messages"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let req = ChatRequest::blocking("Oi", "u", None, serde_json::json!({}));
        let err = client.chat_messages(&req).await.unwrap_err().to_string();
        assert!(err.contains("500"), "got: {err}");
    }

    #[tokio::test]
    async fn chat_messages_surfaces_api_error_code() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat-messages"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "code": "not_found",
                "message": "Conversation Not Exists.",
                "status": 404
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let req = ChatRequest::blocking("Oi", "u", Some("gone".into()), serde_json::json!({}));
        let err = client.chat_messages(&req).await.unwrap_err().to_string();
        assert!(err.contains("not_found"), "got: {err}");
    }

    #[tokio::test]
    async fn chat_messages_times_out() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat-messages"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(2))
                    .set_body_json(serde_json::json!({"answer": "late"})),
            )
            .mount(&server)
            .await;

        let client =
            DifyClient::new("app-test-key", &server.uri(), Duration::from_millis(200)).unwrap();
        let req = ChatRequest::blocking("Oi", "u", None, serde_json::json!({}));
        let err = client.chat_messages(&req).await.unwrap_err().to_string();
        assert!(err.contains("timed out"), "got: {err}");
    }

    #[test]
    fn debug_redacts_api_key() {
        let client = DifyClient::new("app-secret", "https://api.dify.ai/v1", Duration::from_secs(1))
            .unwrap();
        let debug = format!("{client:?}");
        assert!(!debug.contains("app-secret"));
        assert!(debug.contains("[redacted]"));
    }
}
