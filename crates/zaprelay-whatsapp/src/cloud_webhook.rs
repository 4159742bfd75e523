// SPDX-FileCopyrightText: 2026 Zaprelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Meta `whatsapp_business_account` webhook payloads.

use serde::Deserialize;
use tracing::debug;
use zaprelay_core::types::{DeliveryStatus, DeliveryUpdate, InboundEvent, InboundMessage};
use zaprelay_core::RelayError;

use crate::{media_label, normalize_sender, unix_timestamp};

#[derive(Debug, Deserialize)]
pub struct CloudNotification {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub entry: Vec<CloudEntry>,
}

#[derive(Debug, Deserialize)]
pub struct CloudEntry {
    #[serde(default)]
    pub changes: Vec<CloudChange>,
}

#[derive(Debug, Deserialize)]
pub struct CloudChange {
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub value: Option<CloudValue>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CloudValue {
    #[serde(default)]
    pub contacts: Vec<CloudContact>,
    #[serde(default)]
    pub messages: Vec<CloudMessage>,
    #[serde(default)]
    pub statuses: Vec<CloudStatus>,
}

#[derive(Debug, Deserialize)]
pub struct CloudContact {
    #[serde(default)]
    pub wa_id: String,
    #[serde(default)]
    pub profile: Option<CloudProfile>,
}

#[derive(Debug, Deserialize)]
pub struct CloudProfile {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CloudMessage {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub id: String,
    /// Unix seconds, as a string.
    #[serde(default)]
    pub timestamp: String,
    #[serde(default, rename = "type")]
    pub msg_type: String,
    #[serde(default)]
    pub text: Option<CloudText>,
    #[serde(default)]
    pub image: Option<CloudMedia>,
    #[serde(default)]
    pub video: Option<CloudMedia>,
    #[serde(default)]
    pub document: Option<CloudMedia>,
    #[serde(default)]
    pub audio: Option<CloudMedia>,
    #[serde(default)]
    pub button: Option<CloudButton>,
    #[serde(default)]
    pub interactive: Option<CloudInteractive>,
}

#[derive(Debug, Deserialize)]
pub struct CloudText {
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct CloudMedia {
    #[serde(default)]
    pub caption: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CloudButton {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct CloudInteractive {
    #[serde(default)]
    pub button_reply: Option<CloudReply>,
    #[serde(default)]
    pub list_reply: Option<CloudReply>,
}

#[derive(Debug, Deserialize)]
pub struct CloudReply {
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct CloudStatus {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub recipient_id: Option<String>,
}

impl CloudMessage {
    fn content(&self) -> Option<String> {
        let text = match self.msg_type.as_str() {
            "text" => self.text.as_ref().map(|t| t.body.trim().to_string()),
            "image" => Some(media_label("image", self.image.as_ref().and_then(|m| m.caption.as_deref()))),
            "video" => Some(media_label("video", self.video.as_ref().and_then(|m| m.caption.as_deref()))),
            "document" => Some(media_label(
                "document",
                self.document.as_ref().and_then(|m| m.caption.as_deref()),
            )),
            "audio" => Some(media_label("audio", None)),
            "button" => self.button.as_ref().map(|b| b.text.trim().to_string()),
            "interactive" => self.interactive.as_ref().and_then(|i| {
                i.button_reply
                    .as_ref()
                    .or(i.list_reply.as_ref())
                    .map(|r| r.title.trim().to_string())
            }),
            other => Some(media_label(other, None)),
        };
        text.filter(|t| !t.is_empty())
    }
}

/// Parses a raw Cloud API webhook body into relay events.
///
/// Messages without a sender, id or usable content are skipped, as are
/// statuses the relay does not track.
pub fn parse_cloud_payload(body: &[u8]) -> Result<Vec<InboundEvent>, RelayError> {
    let notification: CloudNotification = serde_json::from_slice(body)
        .map_err(|e| RelayError::InvalidInput(format!("malformed Cloud API payload: {e}")))?;
    if !notification.object.is_empty() && notification.object != "whatsapp_business_account" {
        debug!(object = %notification.object, "ignoring non-WhatsApp webhook object");
        return Ok(Vec::new());
    }
    Ok(extract_events(&notification))
}

pub fn extract_events(notification: &CloudNotification) -> Vec<InboundEvent> {
    let mut events = Vec::new();

    for change in notification.entry.iter().flat_map(|e| e.changes.iter()) {
        if change.field.as_deref().is_some_and(|f| f != "messages") {
            continue;
        }
        let Some(value) = change.value.as_ref() else {
            continue;
        };

        for msg in &value.messages {
            let Some(from) = normalize_sender(&msg.from) else {
                continue;
            };
            if msg.id.is_empty() {
                continue;
            }
            let Some(content) = msg.content() else {
                debug!(message_type = %msg.msg_type, "skipping message without content");
                continue;
            };
            let sender_name = value
                .contacts
                .iter()
                .find(|c| c.wa_id == msg.from)
                .and_then(|c| c.profile.as_ref())
                .map(|p| p.name.trim().to_string())
                .filter(|n| !n.is_empty());

            events.push(InboundEvent::Message(InboundMessage {
                external_id: msg.id.clone(),
                from_phone: from,
                sender_name,
                content,
                message_type: msg.msg_type.clone(),
                timestamp: msg.timestamp.parse::<i64>().ok().and_then(unix_timestamp),
            }));
        }

        for st in &value.statuses {
            let Some(status) = DeliveryStatus::from_provider(&st.status) else {
                debug!(status = %st.status, "ignoring unknown delivery status");
                continue;
            };
            if st.id.is_empty() {
                continue;
            }
            events.push(InboundEvent::Status(DeliveryUpdate {
                external_id: st.id.clone(),
                status,
                recipient: st.recipient_id.clone(),
            }));
        }
    }

    events
}
