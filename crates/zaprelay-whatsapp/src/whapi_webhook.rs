// SPDX-FileCopyrightText: 2026 Zaprelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Whapi gateway webhook payloads (`{messages:[...], statuses:[...]}`).

use serde::Deserialize;
use tracing::debug;
use zaprelay_core::types::{DeliveryStatus, DeliveryUpdate, InboundEvent, InboundMessage};
use zaprelay_core::RelayError;

use crate::{media_label, normalize_sender, unix_timestamp};

#[derive(Debug, Default, Deserialize)]
pub struct WhapiPayload {
    #[serde(default)]
    pub messages: Vec<WhapiMessage>,
    #[serde(default)]
    pub statuses: Vec<WhapiStatus>,
}

#[derive(Debug, Deserialize)]
pub struct WhapiMessage {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub from_me: bool,
    #[serde(default, rename = "type")]
    pub msg_type: String,
    #[serde(default)]
    pub chat_id: String,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub from_name: Option<String>,
    /// Unix seconds; some gateway versions send it as a string.
    #[serde(default)]
    pub timestamp: Option<serde_json::Value>,
    #[serde(default)]
    pub text: Option<WhapiText>,
    #[serde(default)]
    pub image: Option<WhapiMedia>,
    #[serde(default)]
    pub video: Option<WhapiMedia>,
    #[serde(default)]
    pub document: Option<WhapiMedia>,
}

#[derive(Debug, Deserialize)]
pub struct WhapiText {
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct WhapiMedia {
    #[serde(default)]
    pub caption: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WhapiStatus {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub recipient_id: Option<String>,
}

impl WhapiMessage {
    fn content(&self) -> Option<String> {
        let caption = |m: &Option<WhapiMedia>| m.as_ref().and_then(|m| m.caption.clone());
        let text = match self.msg_type.as_str() {
            "text" => self.text.as_ref().map(|t| t.body.trim().to_string()),
            "image" => Some(media_label("image", caption(&self.image).as_deref())),
            "video" => Some(media_label("video", caption(&self.video).as_deref())),
            "document" => Some(media_label("document", caption(&self.document).as_deref())),
            "" => None,
            other => Some(media_label(other, None)),
        };
        text.filter(|t| !t.is_empty())
    }

    fn unix_seconds(&self) -> Option<i64> {
        match self.timestamp.as_ref()? {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

/// Parses a raw Whapi webhook body into relay events.
///
/// Echoes of our own sends (`from_me`) and group chats are skipped.
pub fn parse_whapi_payload(body: &[u8]) -> Result<Vec<InboundEvent>, RelayError> {
    let payload: WhapiPayload = serde_json::from_slice(body)
        .map_err(|e| RelayError::InvalidInput(format!("malformed Whapi payload: {e}")))?;
    Ok(extract_events(&payload))
}

pub fn extract_events(payload: &WhapiPayload) -> Vec<InboundEvent> {
    let mut events = Vec::new();

    for msg in &payload.messages {
        if msg.from_me {
            continue;
        }
        if msg.chat_id.ends_with("@g.us") {
            debug!(chat_id = %msg.chat_id, "ignoring group message");
            continue;
        }
        let sender = msg.from.as_deref().unwrap_or(&msg.chat_id);
        let Some(from) = normalize_sender(sender) else {
            continue;
        };
        if msg.id.is_empty() {
            continue;
        }
        let Some(content) = msg.content() else {
            debug!(message_type = %msg.msg_type, "skipping message without content");
            continue;
        };
        events.push(InboundEvent::Message(InboundMessage {
            external_id: msg.id.clone(),
            from_phone: from,
            sender_name: msg
                .from_name
                .as_ref()
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            content,
            message_type: msg.msg_type.clone(),
            timestamp: msg.unix_seconds().and_then(unix_timestamp),
        }));
    }

    for st in &payload.statuses {
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
            recipient: st.recipient_id.as_deref().and_then(normalize_sender),
        }));
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_inbound_text() {
        let payload = serde_json::json!({
            "messages": [{
                "id": "PsqXn5SAD5v7HRA-wHqB9tMeGQ",
                "from_me": false,
                "type": "text",
                "chat_id": "5511988887777@s.whatsapp.net",
                "timestamp": 1767225600,
                "text": {"body": "Tem desconto no pix?"},
                "from": "5511988887777",
                "from_name": "João"
            }],
            "event": {"type": "messages", "event": "post"},
            "channel_id": "MANTIS-XXXX"
        });
        let events = parse_whapi_payload(payload.to_string().as_bytes()).unwrap();
        assert_eq!(events.len(), 1);
        let InboundEvent::Message(msg) = &events[0] else {
            panic!("expected a message");
        };
        assert_eq!(msg.from_phone, "5511988887777");
        assert_eq!(msg.sender_name.as_deref(), Some("João"));
        assert_eq!(msg.content, "Tem desconto no pix?");
        assert_eq!(msg.timestamp.as_deref(), Some("2026-01-01T00:00:00.000Z"));
    }

    #[test]
    fn skips_own_and_group_messages() {
        let payload = serde_json::json!({
            "messages": [
                {"id": "1", "from_me": true, "type": "text", "chat_id": "5511@s.whatsapp.net",
                 "text": {"body": "eco"}},
                {"id": "2", "from_me": false, "type": "text", "chat_id": "1203630@g.us",
                 "from": "5511", "text": {"body": "grupo"}}
            ]
        });
        assert!(parse_whapi_payload(payload.to_string().as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn falls_back_to_chat_id_and_string_timestamp() {
        let payload = serde_json::json!({
            "messages": [{"id": "3", "type": "image", "chat_id": "5511977776666@s.whatsapp.net",
                          "timestamp": "1767225600", "image": {"caption": "foto do produto"}}]
        });
        let events = parse_whapi_payload(payload.to_string().as_bytes()).unwrap();
        let InboundEvent::Message(msg) = &events[0] else {
            panic!("expected a message");
        };
        assert_eq!(msg.from_phone, "5511977776666");
        assert_eq!(msg.content, "foto do produto");
        assert!(msg.timestamp.is_some());
    }

    #[test]
    fn parses_statuses() {
        let payload = serde_json::json!({
            "statuses": [
                {"id": "out-1", "code": 3, "status": "delivered",
                 "recipient_id": "5511988887777@s.whatsapp.net"},
                {"id": "out-2", "status": "mystery"}
            ]
        });
        let events = parse_whapi_payload(payload.to_string().as_bytes()).unwrap();
        assert_eq!(
            events,
            vec![InboundEvent::Status(DeliveryUpdate {
                external_id: "out-1".into(),
                status: DeliveryStatus::Delivered,
                recipient: Some("5511988887777".into()),
            })]
        );
    }

    #[test]
    fn empty_object_is_valid() {
        assert!(parse_whapi_payload(b"{}").unwrap().is_empty());
    }
}
