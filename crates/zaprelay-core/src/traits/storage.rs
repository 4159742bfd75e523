// SPDX-FileCopyrightText: 2026 Zaprelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter trait for the relational store behind the relay.

use async_trait::async_trait;

use crate::error::RelayError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    AlertRule, AuditEntry, Conversation, ConversationStatus, DeliveryStatus, InboundRecord,
    Message, NewInbound, Notification, Seller,
};

/// Adapter for the conversation/message/seller store.
///
/// Multi-row writes that belong together (`record_inbound`,
/// `transfer_conversation`) are single transactions.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the storage backend (migrations, connection, etc.).
    async fn initialize(&self) -> Result<(), RelayError>;

    /// Closes the storage backend, flushing pending writes.
    async fn close(&self) -> Result<(), RelayError>;

    // --- Conversations ---

    /// Attaches a client message to its active conversation, creating the
    /// conversation when none exists, and writes the matching notification.
    ///
    /// Returns `None` without writing anything when a message with the same
    /// `external_id` is already stored.
    async fn record_inbound(
        &self,
        inbound: NewInbound,
    ) -> Result<Option<InboundRecord>, RelayError>;

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, RelayError>;

    /// Lists conversations, newest activity first, optionally filtered by status.
    async fn list_conversations(
        &self,
        status: Option<ConversationStatus>,
        limit: i64,
    ) -> Result<Vec<Conversation>, RelayError>;

    async fn set_llm_session(&self, conversation_id: &str, session_id: &str)
    -> Result<(), RelayError>;

    async fn set_conversation_status(
        &self,
        conversation_id: &str,
        status: ConversationStatus,
    ) -> Result<(), RelayError>;

    /// Assigns the seller, sets status `manual`, and writes an audit row.
    /// Returns the conversation as it was before the change. Fails with
    /// `InvalidInput` when the client already has another open
    /// conversation with that seller.
    async fn transfer_conversation(
        &self,
        conversation_id: &str,
        seller_id: &str,
        actor: Option<&str>,
    ) -> Result<Conversation, RelayError>;

    // --- Messages ---

    /// Appends a message and bumps the conversation's activity timestamps.
    async fn insert_message(&self, message: &Message) -> Result<(), RelayError>;

    async fn get_messages(
        &self,
        conversation_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<Message>, RelayError>;

    async fn message_exists_by_external_id(&self, external_id: &str) -> Result<bool, RelayError>;

    /// Applies a delivery callback. Returns false when no row changed.
    async fn update_delivery_status(
        &self,
        external_id: &str,
        status: DeliveryStatus,
    ) -> Result<bool, RelayError>;

    async fn latest_client_message(
        &self,
        conversation_id: &str,
    ) -> Result<Option<Message>, RelayError>;

    /// Whether a real bot reply (fallback texts excluded) exists at or after `since`.
    async fn has_bot_reply_since(
        &self,
        conversation_id: &str,
        since: &str,
    ) -> Result<bool, RelayError>;

    // --- Recovery scans ---

    /// Bot-owned conversations whose latest client message has no later bot reply.
    async fn conversations_missing_bot_reply(
        &self,
        limit: i64,
    ) -> Result<Vec<Conversation>, RelayError>;

    /// Bot-owned conversations with client messages but no LLM session id.
    async fn conversations_missing_llm_session(
        &self,
        limit: i64,
    ) -> Result<Vec<Conversation>, RelayError>;

    /// Realigns `last_message_at` with the newest message. Returns rows changed.
    async fn sync_conversation_timestamps(&self) -> Result<usize, RelayError>;

    // --- Sellers ---

    async fn upsert_seller(&self, seller: &Seller) -> Result<(), RelayError>;

    async fn get_seller(&self, id: &str) -> Result<Option<Seller>, RelayError>;

    async fn touch_seller_activity(&self, seller_id: &str) -> Result<(), RelayError>;

    /// Active sellers whose recorded last activity is older than `cutoff`.
    async fn sellers_inactive_since(&self, cutoff: &str) -> Result<Vec<Seller>, RelayError>;

    async fn sellers_below_score(&self, threshold: f64) -> Result<Vec<Seller>, RelayError>;

    // --- Alert predicates ---

    /// Open conversations with no message since `cutoff`.
    async fn conversations_stalled_since(
        &self,
        cutoff: &str,
    ) -> Result<Vec<Conversation>, RelayError>;

    /// Human-owned conversations whose newest message is a client message older than `cutoff`.
    async fn conversations_awaiting_response(
        &self,
        cutoff: &str,
    ) -> Result<Vec<Conversation>, RelayError>;

    // --- Notifications ---

    async fn create_notification(&self, notification: &Notification) -> Result<(), RelayError>;

    /// Newest first, excluding those the user dismissed.
    async fn list_notifications(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<Notification>, RelayError>;

    async fn dismiss_notification(
        &self,
        notification_id: &str,
        user_id: &str,
    ) -> Result<(), RelayError>;

    // --- Alert rules ---

    async fn create_alert_rule(&self, rule: &AlertRule) -> Result<(), RelayError>;

    async fn list_active_alert_rules(&self) -> Result<Vec<AlertRule>, RelayError>;

    async fn mark_rule_triggered(&self, rule_id: &str, at: &str) -> Result<(), RelayError>;

    // --- Audit ---

    async fn list_audit_log(&self, entity_id: &str) -> Result<Vec<AuditEntry>, RelayError>;
}
