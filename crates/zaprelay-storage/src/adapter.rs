// SPDX-FileCopyrightText: 2026 Zaprelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the StorageAdapter trait.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use zaprelay_config::model::StorageConfig;
use zaprelay_core::types::{
    AlertRule, AuditEntry, Conversation, ConversationStatus, DeliveryStatus, InboundRecord,
    Message, NewInbound, Notification, Seller,
};
use zaprelay_core::{AdapterType, HealthStatus, PluginAdapter, RelayError, StorageAdapter};

use crate::database::{map_tr_err, Database};
use crate::queries;

/// SQLite-backed storage adapter.
///
/// Wraps a [`Database`] handle and delegates all query operations to the
/// typed query modules. The database is lazily initialized on the first
/// call to [`StorageAdapter::initialize`].
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// Create a new SqliteStorage with the given configuration.
    ///
    /// The database connection is not opened until [`StorageAdapter::initialize`] is called.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Returns a reference to the underlying Database, or an error if not initialized.
    fn db(&self) -> Result<&Database, RelayError> {
        self.db.get().ok_or_else(|| RelayError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }

    async fn checkpoint(&self) -> Result<(), RelayError> {
        self.db()?
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, RelayError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), RelayError> {
        if self.db.get().is_some() {
            self.checkpoint().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), RelayError> {
        let db = Database::open_with(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| RelayError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), RelayError> {
        self.checkpoint().await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    // --- Conversations ---

    async fn record_inbound(
        &self,
        inbound: NewInbound,
    ) -> Result<Option<InboundRecord>, RelayError> {
        queries::conversations::record_inbound(self.db()?, inbound).await
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, RelayError> {
        queries::conversations::get_conversation(self.db()?, id).await
    }

    async fn list_conversations(
        &self,
        status: Option<ConversationStatus>,
        limit: i64,
    ) -> Result<Vec<Conversation>, RelayError> {
        queries::conversations::list_conversations(self.db()?, status, limit).await
    }

    async fn set_llm_session(
        &self,
        conversation_id: &str,
        session_id: &str,
    ) -> Result<(), RelayError> {
        queries::conversations::set_llm_session(self.db()?, conversation_id, session_id).await
    }

    async fn set_conversation_status(
        &self,
        conversation_id: &str,
        status: ConversationStatus,
    ) -> Result<(), RelayError> {
        queries::conversations::set_status(self.db()?, conversation_id, status).await
    }

    async fn transfer_conversation(
        &self,
        conversation_id: &str,
        seller_id: &str,
        actor: Option<&str>,
    ) -> Result<Conversation, RelayError> {
        queries::conversations::transfer(self.db()?, conversation_id, seller_id, actor).await
    }

    // --- Messages ---

    async fn insert_message(&self, message: &Message) -> Result<(), RelayError> {
        queries::messages::insert(self.db()?, message).await
    }

    async fn get_messages(
        &self,
        conversation_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<Message>, RelayError> {
        queries::messages::get_for_conversation(self.db()?, conversation_id, limit).await
    }

    async fn message_exists_by_external_id(&self, external_id: &str) -> Result<bool, RelayError> {
        queries::messages::exists_by_external_id(self.db()?, external_id).await
    }

    async fn update_delivery_status(
        &self,
        external_id: &str,
        status: DeliveryStatus,
    ) -> Result<bool, RelayError> {
        queries::messages::update_delivery_status(self.db()?, external_id, status).await
    }

    async fn latest_client_message(
        &self,
        conversation_id: &str,
    ) -> Result<Option<Message>, RelayError> {
        queries::messages::latest_client_message(self.db()?, conversation_id).await
    }

    async fn has_bot_reply_since(
        &self,
        conversation_id: &str,
        since: &str,
    ) -> Result<bool, RelayError> {
        queries::messages::has_bot_reply_since(self.db()?, conversation_id, since).await
    }

    // --- Recovery scans ---

    async fn conversations_missing_bot_reply(
        &self,
        limit: i64,
    ) -> Result<Vec<Conversation>, RelayError> {
        queries::conversations::missing_bot_reply(self.db()?, limit).await
    }

    async fn conversations_missing_llm_session(
        &self,
        limit: i64,
    ) -> Result<Vec<Conversation>, RelayError> {
        queries::conversations::missing_llm_session(self.db()?, limit).await
    }

    async fn sync_conversation_timestamps(&self) -> Result<usize, RelayError> {
        queries::conversations::sync_timestamps(self.db()?).await
    }

    // --- Sellers ---

    async fn upsert_seller(&self, seller: &Seller) -> Result<(), RelayError> {
        queries::sellers::upsert(self.db()?, seller).await
    }

    async fn get_seller(&self, id: &str) -> Result<Option<Seller>, RelayError> {
        queries::sellers::get(self.db()?, id).await
    }

    async fn touch_seller_activity(&self, seller_id: &str) -> Result<(), RelayError> {
        queries::sellers::touch_activity(self.db()?, seller_id).await
    }

    async fn sellers_inactive_since(&self, cutoff: &str) -> Result<Vec<Seller>, RelayError> {
        queries::sellers::inactive_since(self.db()?, cutoff).await
    }

    async fn sellers_below_score(&self, threshold: f64) -> Result<Vec<Seller>, RelayError> {
        queries::sellers::below_score(self.db()?, threshold).await
    }

    // --- Alert predicates ---

    async fn conversations_stalled_since(
        &self,
        cutoff: &str,
    ) -> Result<Vec<Conversation>, RelayError> {
        queries::conversations::stalled_since(self.db()?, cutoff).await
    }

    async fn conversations_awaiting_response(
        &self,
        cutoff: &str,
    ) -> Result<Vec<Conversation>, RelayError> {
        queries::conversations::awaiting_response(self.db()?, cutoff).await
    }

    // --- Notifications ---

    async fn create_notification(&self, notification: &Notification) -> Result<(), RelayError> {
        queries::notifications::create(self.db()?, notification).await
    }

    async fn list_notifications(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<Notification>, RelayError> {
        queries::notifications::list_for_user(self.db()?, user_id, limit).await
    }

    async fn dismiss_notification(
        &self,
        notification_id: &str,
        user_id: &str,
    ) -> Result<(), RelayError> {
        queries::notifications::dismiss(self.db()?, notification_id, user_id).await
    }

    // --- Alert rules ---

    async fn create_alert_rule(&self, rule: &AlertRule) -> Result<(), RelayError> {
        queries::alerts::create_rule(self.db()?, rule).await
    }

    async fn list_active_alert_rules(&self) -> Result<Vec<AlertRule>, RelayError> {
        queries::alerts::list_active(self.db()?).await
    }

    async fn mark_rule_triggered(&self, rule_id: &str, at: &str) -> Result<(), RelayError> {
        queries::alerts::mark_triggered(self.db()?, rule_id, at).await
    }

    // --- Audit ---

    async fn list_audit_log(&self, entity_id: &str) -> Result<Vec<AuditEntry>, RelayError> {
        queries::audit::list_for_entity(self.db()?, entity_id).await
    }
}
