// SPDX-FileCopyrightText: 2026 Zaprelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound sender for the official WhatsApp Cloud API.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};
use zaprelay_config::model::WhatsAppConfig;
use zaprelay_core::types::{ChannelCapabilities, MessageId, OutboundBody, OutboundMessage};
use zaprelay_core::{AdapterType, ChannelAdapter, HealthStatus, PluginAdapter, RelayError};

use crate::{truncate_message, MAX_MESSAGE_LENGTH};

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    messages: Vec<SentMessage>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    id: String,
}

#[derive(Debug, Deserialize)]
struct GraphErrorBody {
    error: GraphError,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<i64>,
}

/// Cloud API channel bound to one business phone number.
#[derive(Clone)]
pub struct CloudChannel {
    client: reqwest::Client,
    endpoint: String,
}

impl fmt::Debug for CloudChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudChannel")
            .field("endpoint", &self.endpoint)
            .field("access_token", &"[redacted]")
            .finish()
    }
}

impl CloudChannel {
    pub fn new(access_token: &str, phone_number_id: &str, api_base_url: &str) -> Result<Self, RelayError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {access_token}")).map_err(|e| {
                RelayError::Config(format!("invalid WhatsApp access token header value: {e}"))
            })?,
        );
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
            endpoint: format!(
                "{}/{}/messages",
                api_base_url.trim_end_matches('/'),
                phone_number_id
            ),
        })
    }

    /// Builds the channel when both the token and phone number id are set.
    pub fn from_config(config: &WhatsAppConfig) -> Result<Option<Self>, RelayError> {
        match (config.access_token.as_deref(), config.phone_number_id.as_deref()) {
            (Some(token), Some(pnid)) if !token.is_empty() && !pnid.is_empty() => {
                Self::new(token, pnid, &config.api_base_url).map(Some)
            }
            _ => Ok(None),
        }
    }

    fn payload(msg: &OutboundMessage) -> serde_json::Value {
        match &msg.body {
            OutboundBody::Text { body } => json!({
                "messaging_product": "whatsapp",
                "recipient_type": "individual",
                "to": msg.to,
                "type": "text",
                "text": {"preview_url": false, "body": truncate_message(body)}
            }),
            OutboundBody::Media {
                kind,
                link,
                caption,
                filename,
            } => {
                let kind = kind.to_string();
                let mut media = json!({"link": link});
                if let Some(caption) = caption {
                    media["caption"] = json!(caption);
                }
                if let Some(filename) = filename.as_ref().filter(|_| kind == "document") {
                    media["filename"] = json!(filename);
                }
                let mut payload = json!({
                    "messaging_product": "whatsapp",
                    "recipient_type": "individual",
                    "to": msg.to,
                    "type": kind,
                });
                payload[kind.as_str()] = media;
                payload
            }
        }
    }
}

#[async_trait]
impl PluginAdapter for CloudChannel {
    fn name(&self) -> &str {
        "whatsapp-cloud"
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
impl ChannelAdapter for CloudChannel {
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
        let response = self
            .client
            .post(&self.endpoint)
            .json(&Self::payload(&msg))
            .send()
            .await
            .map_err(|e| RelayError::Channel {
                message: format!("Cloud API request failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            let detail = serde_json::from_str::<GraphErrorBody>(&body)
                .map(|b| match b.error.code {
                    Some(code) => format!("{} (code {code})", b.error.message),
                    None => b.error.message,
                })
                .unwrap_or(body);
            warn!(status = %status, error = %detail, "Cloud API send failed");
            return Err(RelayError::Channel {
                message: format!("Cloud API error {status}: {detail}"),
                source: None,
            });
        }

        let parsed: SendResponse = serde_json::from_str(&body).map_err(|e| RelayError::Channel {
            message: format!("failed to parse Cloud API response: {e}"),
            source: Some(Box::new(e)),
        })?;
        let id = parsed
            .messages
            .into_iter()
            .next()
            .map(|m| m.id)
            .ok_or_else(|| RelayError::Channel {
                message: "Cloud API response has no message id".into(),
                source: None,
            })?;
        debug!(to = %msg.to, message_id = %id, "Cloud API message sent");
        Ok(MessageId(id))
    }
}
