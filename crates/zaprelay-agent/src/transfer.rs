// SPDX-FileCopyrightText: 2026 Zaprelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hand-off of a conversation to a human seller.

use serde::Serialize;
use tracing::{error, info, warn};
use zaprelay_core::types::{
    Conversation, ConversationStatus, Message, Notification, OutboundMessage, Seller,
};
use zaprelay_core::RelayError;

use crate::alerts::ManagementAlert;
use crate::Relay;

/// Number of recent messages quoted in the seller summary.
const SUMMARY_MESSAGES: i64 = 3;

/// Result of a transfer.
#[derive(Debug, Clone, Serialize)]
pub struct TransferOutcome {
    /// The conversation after the transfer.
    pub conversation: Conversation,
    pub previous_seller_id: Option<String>,
    pub previous_status: ConversationStatus,
    /// Whether the summary reached the seller's WhatsApp.
    pub seller_notified: bool,
}

impl Relay {
    /// Assigns `conversation_id` to `seller_id` and tells the seller.
    ///
    /// The assignment and its audit row are one transaction. The summary
    /// goes out through the router account; if that fails a management
    /// alert is raised, and if the alert fails too it is logged.
    pub async fn transfer_to_seller(
        &self,
        conversation_id: &str,
        seller_id: &str,
        actor: Option<&str>,
    ) -> Result<TransferOutcome, RelayError> {
        let seller = self
            .storage
            .get_seller(seller_id)
            .await?
            .ok_or_else(|| RelayError::not_found("seller", seller_id))?;
        if !seller.active {
            return Err(RelayError::InvalidInput(format!(
                "seller {seller_id} is not active"
            )));
        }

        let previous = self
            .storage
            .transfer_conversation(conversation_id, seller_id, actor)
            .await?;
        let conversation = self
            .storage
            .get_conversation(conversation_id)
            .await?
            .ok_or_else(|| RelayError::not_found("conversation", conversation_id))?;
        info!(
            conversation_id,
            seller_id,
            from = ?previous.assigned_seller_id,
            "conversation transferred"
        );

        let recent = self
            .storage
            .get_messages(conversation_id, Some(SUMMARY_MESSAGES))
            .await?;
        let summary = transfer_summary(&conversation, &recent);

        let notification = Notification::new(
            "conversation_transferred",
            format!("Nova conversa: {}", client_label(&conversation)),
            summary.clone(),
        )
        .for_conversation(conversation_id)
        .for_seller(Some(seller_id));
        if let Err(e) = self.storage.create_notification(&notification).await {
            error!(conversation_id, seller_id, error = %e, "failed to write transfer notification");
        }

        let seller_notified = match self.notify_seller(&seller, &summary).await {
            Ok(()) => true,
            Err(e) => {
                warn!(conversation_id, seller_id, error = %e, "seller notification failed, alerting management");
                let alert = ManagementAlert {
                    kind: "transfer_notification_failed".into(),
                    title: "Falha ao notificar vendedor".into(),
                    message: format!(
                        "A conversa com {} foi transferida para {}, mas o aviso no WhatsApp falhou: {e}",
                        client_label(&conversation),
                        seller.name
                    ),
                    conversation_id: Some(conversation_id.to_string()),
                    seller_id: Some(seller_id.to_string()),
                };
                if let Err(alert_err) = self.send_management_alert(alert).await {
                    error!(
                        conversation_id,
                        seller_id,
                        error = %alert_err,
                        "management alert for failed transfer notice also failed"
                    );
                }
                false
            }
        };

        Ok(TransferOutcome {
            conversation,
            previous_seller_id: previous.assigned_seller_id,
            previous_status: previous.status,
            seller_notified,
        })
    }

    async fn notify_seller(&self, seller: &Seller, summary: &str) -> Result<(), RelayError> {
        let router = self.router.as_ref().ok_or_else(|| RelayError::AdapterNotFound {
            adapter_type: "channel".into(),
            name: "router".into(),
        })?;
        router
            .send(OutboundMessage::text(&seller.whatsapp_number, summary))
            .await?;
        Ok(())
    }
}

fn client_label(conversation: &Conversation) -> String {
    match conversation.client_name.as_deref() {
        Some(name) if !name.trim().is_empty() => {
            format!("{name} ({})", conversation.client_phone)
        }
        _ => conversation.client_phone.clone(),
    }
}

/// Text relayed to the seller.
fn transfer_summary(conversation: &Conversation, recent: &[Message]) -> String {
    let mut text = format!(
        "🔔 Nova conversa transferida\n\nCliente: {}\nTemperatura: {}\n",
        client_label(conversation),
        conversation.temperature
    );
    if !recent.is_empty() {
        text.push_str("\nÚltimas mensagens:\n");
        for m in recent {
            text.push_str(&format!("- [{}] {}\n", m.sender, m.content));
        }
    }
    text.push_str(&format!("\nConversa: {}", conversation.id));
    text
}
