// SPDX-FileCopyrightText: 2026 Zaprelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound sends: bot replies and operator manual replies.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use zaprelay_core::types::{
    new_id, now_timestamp, ConversationStatus, DeliveryStatus, Message, OutboundBody,
    OutboundMessage, SenderKind,
};
use zaprelay_core::RelayError;

use crate::{Relay, SharedChannel};

/// Result of a send as reported to operators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SendOutcome {
    pub fn sent(message_id: impl Into<String>) -> Self {
        Self {
            success: true,
            message_id: Some(message_id.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message_id: None,
            error: Some(error.into()),
        }
    }
}

/// A reply typed by a human operator.
#[derive(Debug, Clone, Deserialize)]
pub struct ManualReply {
    /// `seller` or `admin`.
    pub sender: SenderKind,
    /// Seller id or admin user id.
    #[serde(default)]
    pub sender_id: Option<String>,
    #[serde(flatten)]
    pub body: OutboundBody,
}

impl Relay {
    /// Sends `text` to the client and records it as a bot message.
    ///
    /// The row is written whatever the send outcome, with delivery status
    /// `sent` or `failed`. Returns whether the send succeeded.
    pub(crate) async fn send_bot_message(
        &self,
        conversation_id: &str,
        channel: &SharedChannel,
        to: &str,
        text: &str,
        message_type: &str,
    ) -> Result<bool, RelayError> {
        let (external_id, delivery_status) = match channel.send(OutboundMessage::text(to, text)).await
        {
            Ok(id) => (Some(id.0), DeliveryStatus::Sent),
            Err(e) => {
                warn!(conversation_id, channel = channel.name(), error = %e, "bot send failed");
                (None, DeliveryStatus::Failed)
            }
        };
        let sent = delivery_status == DeliveryStatus::Sent;
        let message = Message {
            id: new_id(),
            conversation_id: conversation_id.to_string(),
            sender: SenderKind::Bot,
            sender_id: None,
            content: text.to_string(),
            message_type: message_type.to_string(),
            external_id,
            delivery_status,
            created_at: now_timestamp(),
        };
        self.storage.insert_message(&message).await?;
        debug!(conversation_id, message_type, sent, "bot message recorded");
        Ok(sent)
    }

    /// Sends an operator reply to the client of `conversation_id`.
    ///
    /// The message is stored as `seller` or `admin` with delivery status
    /// `sent` or `failed`, the conversation moves to `manual`, and a
    /// seller's activity timestamp is refreshed. Provider failures are
    /// reported in the outcome; missing rows and bad input are errors.
    pub async fn send_manual_reply(
        &self,
        conversation_id: &str,
        reply: ManualReply,
    ) -> Result<SendOutcome, RelayError> {
        if !matches!(reply.sender, SenderKind::Seller | SenderKind::Admin) {
            return Err(RelayError::InvalidInput(format!(
                "manual replies must come from a seller or admin, not {}",
                reply.sender
            )));
        }
        if let OutboundBody::Text { body } = &reply.body
            && body.trim().is_empty()
        {
            return Err(RelayError::InvalidInput("message body is empty".into()));
        }
        let conversation = self
            .storage
            .get_conversation(conversation_id)
            .await?
            .ok_or_else(|| RelayError::not_found("conversation", conversation_id))?;
        if !conversation.status.is_open() {
            return Err(RelayError::InvalidInput(format!(
                "conversation {conversation_id} is closed"
            )));
        }

        let outcome = match self.client_channel(&conversation).await {
            Ok(channel) => {
                let msg = OutboundMessage {
                    to: conversation.client_phone.clone(),
                    body: reply.body.clone(),
                };
                match channel.send(msg).await {
                    Ok(id) => SendOutcome::sent(id.0),
                    Err(e) => {
                        warn!(conversation_id, error = %e, "manual reply send failed");
                        SendOutcome::failed(e.to_string())
                    }
                }
            }
            Err(e) => {
                warn!(conversation_id, error = %e, "no channel reaches this client");
                SendOutcome::failed(e.to_string())
            }
        };

        let message = Message {
            id: new_id(),
            conversation_id: conversation_id.to_string(),
            sender: reply.sender,
            sender_id: reply.sender_id.clone(),
            content: reply.body.display_text(),
            message_type: reply.body.message_type(),
            external_id: outcome.message_id.clone(),
            delivery_status: if outcome.success {
                DeliveryStatus::Sent
            } else {
                DeliveryStatus::Failed
            },
            created_at: now_timestamp(),
        };
        self.storage.insert_message(&message).await?;
        self.storage
            .set_conversation_status(conversation_id, ConversationStatus::Manual)
            .await?;

        if reply.sender == SenderKind::Seller
            && let Some(seller_id) = reply.sender_id.as_deref()
        {
            match self.storage.touch_seller_activity(seller_id).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => debug!(seller_id, "reply from unknown seller id"),
                Err(e) => return Err(e),
            }
        }

        info!(
            conversation_id,
            sender = %reply.sender,
            success = outcome.success,
            "manual reply processed"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{testing, RelaySettings};
    use zaprelay_core::types::{ConversationScope, NewInbound};
    use zaprelay_test_utils::MockChannel;

    async fn open_conversation(storage: &crate::SharedStorage, phone: &str) -> String {
        storage
            .record_inbound(NewInbound {
                scope: ConversationScope::AnyOwner,
                client_phone: phone.into(),
                client_name: Some("Cliente".into()),
                content: "oi".into(),
                message_type: "text".into(),
                external_id: None,
                initial_status: ConversationStatus::Bot,
                temperature_hint: None,
            })
            .await
            .unwrap()
            .unwrap()
            .conversation
            .id
    }

    fn text(sender: SenderKind, sender_id: Option<&str>, body: &str) -> ManualReply {
        ManualReply {
            sender,
            sender_id: sender_id.map(String::from),
            body: OutboundBody::Text { body: body.into() },
        }
    }

    #[tokio::test]
    async fn seller_reply_is_sent_recorded_and_flips_status() {
        let (storage, _dir) = testing::storage().await;
        storage
            .upsert_seller(&testing::seller("s1", "5511911111111", None))
            .await
            .unwrap();
        let cloud = Arc::new(MockChannel::new());
        let relay = Relay::new(storage.clone(), RelaySettings::default())
            .with_cloud_channel(cloud.clone());
        let conv_id = open_conversation(&storage, "5511900000001").await;

        let outcome = relay
            .send_manual_reply(&conv_id, text(SenderKind::Seller, Some("s1"), "Posso ajudar?"))
            .await
            .unwrap();
        assert_eq!(outcome, SendOutcome::sent("mock-msg-1"));
        assert_eq!(cloud.sent_to("5511900000001").await.len(), 1);

        let conv = storage.get_conversation(&conv_id).await.unwrap().unwrap();
        assert_eq!(conv.status, ConversationStatus::Manual);
        let messages = storage.get_messages(&conv_id, None).await.unwrap();
        let last = messages.last().unwrap();
        assert_eq!(last.sender, SenderKind::Seller);
        assert_eq!(last.external_id.as_deref(), Some("mock-msg-1"));
        assert_eq!(last.delivery_status, DeliveryStatus::Sent);
        let seller = storage.get_seller("s1").await.unwrap().unwrap();
        assert!(seller.last_activity.is_some());
    }

    #[tokio::test]
    async fn failed_send_is_reported_and_recorded() {
        let (storage, _dir) = testing::storage().await;
        let relay = Relay::new(storage.clone(), RelaySettings::default())
            .with_cloud_channel(Arc::new(MockChannel::failing()));
        let conv_id = open_conversation(&storage, "5511900000002").await;

        let outcome = relay
            .send_manual_reply(&conv_id, text(SenderKind::Admin, Some("admin-1"), "Olá"))
            .await
            .unwrap();
        assert!(!outcome.success);
        assert!(outcome.error.is_some());

        let messages = storage.get_messages(&conv_id, None).await.unwrap();
        assert_eq!(messages.last().unwrap().delivery_status, DeliveryStatus::Failed);
    }

    #[tokio::test]
    async fn invalid_replies_are_rejected() {
        let (storage, _dir) = testing::storage().await;
        let relay = Relay::new(storage.clone(), RelaySettings::default())
            .with_cloud_channel(Arc::new(MockChannel::new()));
        let conv_id = open_conversation(&storage, "5511900000003").await;

        let bot = relay
            .send_manual_reply(&conv_id, text(SenderKind::Bot, None, "x"))
            .await;
        assert!(matches!(bot, Err(RelayError::InvalidInput(_))));

        let empty = relay
            .send_manual_reply(&conv_id, text(SenderKind::Admin, None, "  "))
            .await;
        assert!(matches!(empty, Err(RelayError::InvalidInput(_))));

        let missing = relay
            .send_manual_reply("nope", text(SenderKind::Admin, None, "oi"))
            .await
            .unwrap_err();
        assert!(missing.is_not_found());

        storage
            .set_conversation_status(&conv_id, ConversationStatus::Closed)
            .await
            .unwrap();
        let closed = relay
            .send_manual_reply(&conv_id, text(SenderKind::Admin, None, "oi"))
            .await;
        assert!(matches!(closed, Err(RelayError::InvalidInput(_))));
    }

    #[test]
    fn manual_reply_deserializes_flattened_body() {
        let reply: ManualReply = serde_json::from_value(serde_json::json!({
            "sender": "seller",
            "sender_id": "s1",
            "type": "media",
            "kind": "image",
            "link": "https://cdn.example.com/p.jpg",
            "caption": "Modelo novo"
        }))
        .unwrap();
        assert_eq!(reply.sender, SenderKind::Seller);
        assert_eq!(reply.body.display_text(), "Modelo novo");
    }
}
