// SPDX-FileCopyrightText: 2026 Zaprelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dify provider adapter for the zaprelay sales relay.
//!
//! This crate implements [`ProviderAdapter`] for Dify's blocking
//! chat-messages endpoint. The Dify conversation id returned on the first
//! turn is the relay's LLM session id.

pub mod client;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};
use zaprelay_config::model::DifyConfig;
use zaprelay_core::types::{ProviderRequest, ProviderResponse};
use zaprelay_core::{AdapterType, HealthStatus, PluginAdapter, ProviderAdapter, RelayError};

use crate::client::DifyClient;
use crate::types::ChatRequest;

/// Dify provider implementing [`ProviderAdapter`].
#[derive(Debug)]
pub struct DifyProvider {
    client: DifyClient,
}

impl DifyProvider {
    /// Creates a provider from configuration.
    ///
    /// Returns `Ok(None)` when no API key is configured: bot replies are
    /// disabled rather than failing every request.
    pub fn from_config(config: &DifyConfig) -> Result<Option<Self>, RelayError> {
        let Some(api_key) = config.api_key.as_deref().filter(|k| !k.is_empty()) else {
            info!("dify.api_key not set, bot replies disabled");
            return Ok(None);
        };
        let client = DifyClient::new(
            api_key,
            &config.base_url,
            Duration::from_secs(config.timeout_secs),
        )?;
        info!(base_url = %client.base_url(), "Dify provider initialized");
        Ok(Some(Self { client }))
    }

    /// Creates a provider with an existing client.
    pub fn with_client(client: DifyClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PluginAdapter for DifyProvider {
    fn name(&self) -> &str {
        "dify"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, RelayError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), RelayError> {
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for DifyProvider {
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, RelayError> {
        let body = ChatRequest::blocking(
            request.query,
            request.user,
            request.conversation_id.clone(),
            request.inputs,
        );
        let resp = self.client.chat_messages(&body).await?;

        let answer = resp
            .answer
            .filter(|a| !a.trim().is_empty())
            .ok_or_else(|| RelayError::Provider {
                message: "Dify response has no answer".into(),
                source: None,
            })?;

        // Dify echoes the session id; keep the caller's when it is absent.
        let conversation_id = resp
            .conversation_id
            .filter(|c| !c.is_empty())
            .or(request.conversation_id)
            .ok_or_else(|| RelayError::Provider {
                message: "Dify response has no conversation_id".into(),
                source: None,
            })?;

        debug!(conversation_id = %conversation_id, "Dify answer received");
        Ok(ProviderResponse {
            answer,
            conversation_id,
            message_id: resp.message_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(uri: &str) -> DifyProvider {
        DifyProvider::with_client(
            DifyClient::new("app-key", uri, Duration::from_secs(5)).unwrap(),
        )
    }

    #[test]
    fn missing_api_key_disables_provider() {
        let config = DifyConfig::default();
        assert!(DifyProvider::from_config(&config).unwrap().is_none());

        let config = DifyConfig {
            api_key: Some(String::new()),
            ..DifyConfig::default()
        };
        assert!(DifyProvider::from_config(&config).unwrap().is_none());
    }

    #[test]
    fn configured_api_key_builds_provider() {
        let config = DifyConfig {
            api_key: Some("app-key".into()),
            base_url: "https://dify.example.com/v1/".into(),
            timeout_secs: 30,
        };
        let provider = DifyProvider::from_config(&config).unwrap().unwrap();
        assert_eq!(provider.client.base_url(), "https://dify.example.com/v1");
    }

    #[tokio::test]
    async fn complete_passes_existing_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat-messages"))
            .and(body_partial_json(serde_json::json!({"conversation_id": "sess-9"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "answer": "Claro!",
                "conversation_id": "sess-9",
                "message_id": "m-2"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let req = ProviderRequest::new("Tem catálogo?", "5511988887777")
            .with_conversation(Some("sess-9".into()));
        let resp = provider(&server.uri()).complete(req).await.unwrap();
        assert_eq!(resp.answer, "Claro!");
        assert_eq!(resp.conversation_id, "sess-9");
        assert_eq!(resp.message_id.as_deref(), Some("m-2"));
    }

    #[tokio::test]
    async fn complete_rejects_missing_answer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat-messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "conversation_id": "sess-1"
            })))
            .mount(&server)
            .await;

        let err = provider(&server.uri())
            .complete(ProviderRequest::new("Oi", "u"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no answer"), "got: {err}");
    }

    #[tokio::test]
    async fn complete_requires_a_session_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat-messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "answer": "Oi!"
            })))
            .mount(&server)
            .await;

        let err = provider(&server.uri())
            .complete(ProviderRequest::new("Oi", "u"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("conversation_id"), "got: {err}");
    }

    #[test]
    fn plugin_adapter_metadata() {
        let p = provider("http://localhost:1");
        assert_eq!(p.name(), "dify");
        assert_eq!(p.adapter_type(), AdapterType::Provider);
    }
}
