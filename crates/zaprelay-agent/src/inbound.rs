// SPDX-FileCopyrightText: 2026 Zaprelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound processing shared by the Cloud API and Whapi webhooks.
//!
//! Both providers feed the same pipeline through an [`InboundSource`],
//! which decides how conversations are scoped, which status a new
//! conversation starts in, which channel answers the client, and whether
//! a fallback text is sent when the bot cannot answer.

use serde::Serialize;
use tracing::{debug, error, info, warn};
use zaprelay_core::types::{
    ConversationScope, ConversationStatus, DeliveryUpdate, InboundEvent, InboundMessage,
    NewInbound, Seller,
};
use zaprelay_core::RelayError;

use crate::bridge::ask_llm;
use crate::lead::classify_temperature;
use crate::{Relay, SharedChannel};

/// Message type of the static text sent when the bot cannot answer.
pub const FALLBACK_MESSAGE_TYPE: &str = "fallback";

/// Provider-specific behaviour of an inbound webhook.
pub trait InboundSource: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Which active conversation a client message attaches to.
    fn scope(&self) -> ConversationScope;

    /// Status of a conversation opened by this source.
    fn initial_status(&self) -> ConversationStatus;

    /// Channel that answers the client, if any.
    fn reply_channel(&self) -> Option<SharedChannel>;

    /// Text sent when the bot cannot answer. `None` means log only.
    fn fallback_text(&self) -> Option<&str>;
}

/// The official WhatsApp Cloud API number.
///
/// Conversations are matched by phone regardless of owner and start
/// with the bot. A failed LLM call or send degrades to the fallback text.
pub struct CloudSource {
    channel: Option<SharedChannel>,
    fallback: String,
}

impl CloudSource {
    pub fn new(channel: Option<SharedChannel>, fallback: impl Into<String>) -> Self {
        Self {
            channel,
            fallback: fallback.into(),
        }
    }
}

impl std::fmt::Debug for CloudSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudSource")
            .field("channel", &self.channel.as_ref().map(|c| c.name().to_string()))
            .field("fallback", &self.fallback)
            .finish()
    }
}

impl InboundSource for CloudSource {
    fn name(&self) -> &str {
        "whatsapp-cloud"
    }

    fn scope(&self) -> ConversationScope {
        ConversationScope::AnyOwner
    }

    fn initial_status(&self) -> ConversationStatus {
        ConversationStatus::Bot
    }

    fn reply_channel(&self) -> Option<SharedChannel> {
        self.channel.clone()
    }

    fn fallback_text(&self) -> Option<&str> {
        Some(self.fallback.as_str()).filter(|f| !f.trim().is_empty())
    }
}

/// A seller's Whapi account.
///
/// Conversations are scoped to the seller and start in `seller` status.
/// Failures are only logged.
pub struct WhapiSource {
    seller: Seller,
    channel: Option<SharedChannel>,
}

impl WhapiSource {
    pub fn new(seller: Seller, channel: Option<SharedChannel>) -> Self {
        Self { seller, channel }
    }

    pub fn seller(&self) -> &Seller {
        &self.seller
    }
}

impl std::fmt::Debug for WhapiSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhapiSource")
            .field("seller", &self.seller)
            .field("channel", &self.channel.as_ref().map(|c| c.name().to_string()))
            .finish()
    }
}

impl InboundSource for WhapiSource {
    fn name(&self) -> &str {
        "whapi"
    }

    fn scope(&self) -> ConversationScope {
        ConversationScope::Seller(self.seller.id.clone())
    }

    fn initial_status(&self) -> ConversationStatus {
        ConversationStatus::Seller
    }

    fn reply_channel(&self) -> Option<SharedChannel> {
        self.channel.clone()
    }

    fn fallback_text(&self) -> Option<&str> {
        None
    }
}

/// Counters for one webhook delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InboundReport {
    pub messages_recorded: usize,
    pub conversations_created: usize,
    pub duplicates: usize,
    pub bot_replies: usize,
    pub fallbacks: usize,
    pub status_updates: usize,
    pub failures: usize,
}

/// What happened to one client message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    Duplicate,
    Recorded { created: bool, reply: ReplyOutcome },
}

/// What the bot did for a recorded message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// Conversation not owned by the bot, or no LLM configured.
    NotApplicable,
    Answered,
    Fallback,
    /// The bot could not answer and the source has no fallback.
    Dropped,
}

impl Relay {
    /// Builds the source for a seller's Whapi webhook.
    ///
    /// Unknown sellers are `NotFound`. A seller without a token (or a relay
    /// without a Whapi factory) yields a source that cannot reply.
    pub async fn whapi_source(&self, seller_id: &str) -> Result<WhapiSource, RelayError> {
        let seller = self
            .storage
            .get_seller(seller_id)
            .await?
            .ok_or_else(|| RelayError::not_found("seller", seller_id))?;
        let channel = match seller.whapi_token.as_deref().filter(|t| !t.is_empty()) {
            Some(token) => match self.whapi_channel(token) {
                Ok(channel) => Some(channel),
                Err(e) => {
                    warn!(seller_id, error = %e, "cannot build seller Whapi channel");
                    None
                }
            },
            None => None,
        };
        Ok(WhapiSource::new(seller, channel))
    }

    /// Source for the official Cloud API webhook.
    pub fn cloud_source(&self) -> CloudSource {
        CloudSource::new(self.cloud.clone(), self.settings.fallback_message.clone())
    }

    /// Processes every event of one webhook delivery.
    ///
    /// Per-event failures are logged and counted; processing continues
    /// with the next event.
    pub async fn handle_events(
        &self,
        source: &dyn InboundSource,
        events: Vec<InboundEvent>,
    ) -> InboundReport {
        let mut report = InboundReport::default();
        for event in events {
            match event {
                InboundEvent::Message(msg) => {
                    let external_id = msg.external_id.clone();
                    match self.process_message(source, msg).await {
                        Ok(MessageOutcome::Duplicate) => report.duplicates += 1,
                        Ok(MessageOutcome::Recorded { created, reply }) => {
                            report.messages_recorded += 1;
                            if created {
                                report.conversations_created += 1;
                            }
                            match reply {
                                ReplyOutcome::Answered => report.bot_replies += 1,
                                ReplyOutcome::Fallback => report.fallbacks += 1,
                                ReplyOutcome::NotApplicable | ReplyOutcome::Dropped => {}
                            }
                        }
                        Err(e) => {
                            error!(source = source.name(), external_id, error = %e, "failed to process inbound message");
                            report.failures += 1;
                        }
                    }
                }
                InboundEvent::Status(update) => match self.apply_delivery_update(&update).await {
                    Ok(true) => report.status_updates += 1,
                    Ok(false) => {}
                    Err(e) => {
                        error!(external_id = %update.external_id, error = %e, "failed to apply delivery status");
                        report.failures += 1;
                    }
                },
            }
        }
        info!(source = source.name(), ?report, "webhook processed");
        report
    }

    /// Records one client message and, while the bot owns the
    /// conversation, answers it.
    pub async fn process_message(
        &self,
        source: &dyn InboundSource,
        msg: InboundMessage,
    ) -> Result<MessageOutcome, RelayError> {
        let recorded = self
            .storage
            .record_inbound(NewInbound {
                scope: source.scope(),
                client_phone: msg.from_phone.clone(),
                client_name: msg.sender_name.clone(),
                content: msg.content.clone(),
                message_type: msg.message_type.clone(),
                external_id: Some(msg.external_id.clone()),
                initial_status: source.initial_status(),
                temperature_hint: classify_temperature(&msg.content),
            })
            .await?;
        let Some(record) = recorded else {
            debug!(external_id = %msg.external_id, "duplicate delivery ignored");
            return Ok(MessageOutcome::Duplicate);
        };
        let conversation = record.conversation;
        debug!(
            conversation_id = %conversation.id,
            created = record.created,
            status = %conversation.status,
            "inbound message recorded"
        );

        if conversation.status != ConversationStatus::Bot {
            return Ok(MessageOutcome::Recorded {
                created: record.created,
                reply: ReplyOutcome::NotApplicable,
            });
        }
        let Some(provider) = self.provider.as_ref() else {
            debug!(conversation_id = %conversation.id, "no LLM configured, skipping bot reply");
            return Ok(MessageOutcome::Recorded {
                created: record.created,
                reply: ReplyOutcome::NotApplicable,
            });
        };

        let channel = source.reply_channel();
        let answer = ask_llm(
            provider.as_ref(),
            &msg.content,
            &conversation.client_phone,
            conversation.llm_session_id.as_deref(),
        )
        .await;

        let mut reply = ReplyOutcome::Dropped;
        if let Some(resp) = answer {
            if conversation.llm_session_id.as_deref() != Some(resp.conversation_id.as_str()) {
                self.storage
                    .set_llm_session(&conversation.id, &resp.conversation_id)
                    .await?;
            }
            match channel.as_ref() {
                Some(channel) => {
                    let sent = self
                        .send_bot_message(
                            &conversation.id,
                            channel,
                            &conversation.client_phone,
                            &resp.answer,
                            "text",
                        )
                        .await?;
                    if sent {
                        reply = ReplyOutcome::Answered;
                    }
                }
                None => warn!(source = source.name(), "no channel to deliver the bot reply"),
            }
        }

        if reply == ReplyOutcome::Dropped {
            match (source.fallback_text(), channel.as_ref()) {
                (Some(fallback), Some(channel)) => {
                    warn!(conversation_id = %conversation.id, "bot could not answer, sending fallback");
                    self.send_bot_message(
                        &conversation.id,
                        channel,
                        &conversation.client_phone,
                        fallback,
                        FALLBACK_MESSAGE_TYPE,
                    )
                    .await?;
                    reply = ReplyOutcome::Fallback;
                }
                _ => warn!(
                    source = source.name(),
                    conversation_id = %conversation.id,
                    "bot could not answer, message left for recovery"
                ),
            }
        }

        Ok(MessageOutcome::Recorded {
            created: record.created,
            reply,
        })
    }

    /// Applies a provider delivery callback. Returns whether a row changed.
    pub async fn apply_delivery_update(&self, update: &DeliveryUpdate) -> Result<bool, RelayError> {
        let applied = self
            .storage
            .update_delivery_status(&update.external_id, update.status)
            .await?;
        debug!(external_id = %update.external_id, status = %update.status, applied, "delivery status");
        Ok(applied)
    }
}
