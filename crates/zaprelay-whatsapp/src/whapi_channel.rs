// SPDX-FileCopyrightText: 2026 Zaprelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound sender for Whapi gateway accounts.
//!
//! Each seller owns one Whapi account; the relay also keeps a central
//! "router" account used for seller and management notifications.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};
use zaprelay_core::types::{ChannelCapabilities, MessageId, OutboundBody, OutboundMessage};
use zaprelay_core::{AdapterType, ChannelAdapter, HealthStatus, PluginAdapter, RelayError};

use crate::{truncate_message, MAX_MESSAGE_LENGTH};

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    sent: bool,
    #[serde(default)]
    message: Option<SentMessage>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    id: String,
}

/// Whapi channel authenticated with one account token.
#[derive(Clone)]
pub struct WhapiChannel {
    client: reqwest::Client,
    base_url: String,
}

impl fmt::Debug for WhapiChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WhapiChannel")
            .field("base_url", &self.base_url)
            .field("token", &"[redacted]")
            .finish()
    }
}

impl WhapiChannel {
    pub fn new(token: &str, api_base_url: &str) -> Result<Self, RelayError> {
        if token.is_empty() {
            return Err(RelayError::Config("Whapi token is empty".into()));
        }
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| {
                RelayError::Config(format!("invalid Whapi token header value: {e}"))
            })?,
        );
        headers.insert("accept", HeaderValue::from_static("application/json"));
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RelayError::Channel {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Self {
            client,
            base_url: api_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn route(msg: &OutboundMessage) -> (String, serde_json::Value) {
        match &msg.body {
            OutboundBody::Text { body } => (
                "messages/text".to_string(),
                json!({"to": msg.to, "body": truncate_message(body)}),
            ),
            OutboundBody::Media {
                kind,
                link,
                caption,
                filename,
            } => {
                let mut payload = json!({"to": msg.to, "media": link});
                if let Some(caption) = caption {
                    payload["caption"] = json!(caption);
                }
                if let Some(filename) = filename {
                    payload["filename"] = json!(filename);
                }
                (format!("messages/{kind}"), payload)
            }
        }
    }
}

#[async_trait]
impl PluginAdapter for WhapiChannel {
    fn name(&self) -> &str {
        "whapi"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Channel
    }

    async fn health_check(&self) -> Result<HealthStatus, RelayError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), RelayError> {
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for WhapiChannel {
    fn capabilities(&self) -> ChannelCapabilities {
        ChannelCapabilities {
            supports_media: true,
            max_message_length: Some(MAX_MESSAGE_LENGTH),
        }
    }

    async fn send(&self, msg: OutboundMessage) -> Result<MessageId, RelayError> {
        if msg.to.trim().is_empty() {
            return Err(RelayError::InvalidInput("recipient cannot be empty".into()));
        }
        let (route, payload) = Self::route(&msg);
        let url = format!("{}/{route}", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| RelayError::Channel {
                message: format!("Whapi request failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            warn!(status = %status, body = %body, "Whapi send failed");
            return Err(RelayError::Channel {
                message: format!("Whapi error {status}: {body}"),
                source: None,
            });
        }

        let parsed: SendResponse = serde_json::from_str(&body).map_err(|e| RelayError::Channel {
            message: format!("failed to parse Whapi response: {e}"),
            source: Some(Box::new(e)),
        })?;
        match parsed.message {
            Some(m) if parsed.sent => {
                debug!(to = %msg.to, message_id = %m.id, "Whapi message sent");
                Ok(MessageId(m.id))
            }
            _ => Err(RelayError::Channel {
                message: "Whapi did not confirm the send".into(),
                source: None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};
    use zaprelay_core::types::MediaKind;

    #[tokio::test]
    async fn sends_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages/text"))
            .and(header("authorization", "Bearer seller-tok"))
            .and(body_json(json!({"to": "5511988887777", "body": "Bom dia!"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sent": true,
                "message": {"id": "wh-1", "from_me": true, "type": "text"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let channel = WhapiChannel::new("seller-tok", &server.uri()).unwrap();
        let id = channel
            .send(OutboundMessage::text("5511988887777", "Bom dia!"))
            .await
            .unwrap();
        assert_eq!(id.0, "wh-1");
    }

    #[tokio::test]
    async fn sends_image_to_kind_route() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages/image"))
            .and(body_json(json!({
                "to": "5511",
                "media": "https://cdn.example.com/a.jpg",
                "caption": "catálogo"
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"sent": true, "message": {"id": "wh-img"}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let channel = WhapiChannel::new("t", &server.uri()).unwrap();
        let msg = OutboundMessage {
            to: "5511".into(),
            body: OutboundBody::Media {
                kind: MediaKind::Image,
                link: "https://cdn.example.com/a.jpg".into(),
                caption: Some("catálogo".into()),
                filename: None,
            },
        };
        assert_eq!(channel.send(msg).await.unwrap().0, "wh-img");
    }

    #[tokio::test]
    async fn unconfirmed_send_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"sent": false})))
            .mount(&server)
            .await;

        let channel = WhapiChannel::new("t", &server.uri()).unwrap();
        assert!(channel.send(OutboundMessage::text("5511", "x")).await.is_err());
    }

    #[tokio::test]
    async fn http_error_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
            .mount(&server)
            .await;

        let channel = WhapiChannel::new("t", &server.uri()).unwrap();
        let err = channel
            .send(OutboundMessage::text("5511", "x"))
            .await
            .unwrap_err()
            .to_string();
        assert!(err.contains("401"), "got: {err}");
    }

    #[test]
    fn empty_token_is_rejected() {
        assert!(WhapiChannel::new("", "https://gate.whapi.cloud").is_err());
    }
}
