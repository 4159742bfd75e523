// SPDX-FileCopyrightText: 2026 Zaprelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles a complete relay with mock adapters and a temp
//! SQLite database: a mock LLM, a mock Cloud API channel, a mock router
//! account and one mock channel standing in for every seller's Whapi
//! account. Helpers drive the inbound pipeline and read back rows.

use std::sync::Arc;

use zaprelay_agent::{InboundReport, Relay, RelaySettings, SharedChannel};
use zaprelay_config::model::StorageConfig;
use zaprelay_core::types::{
    now_timestamp, Conversation, ConversationStatus, InboundEvent, InboundMessage, Message,
    Seller,
};
use zaprelay_core::{RelayError, StorageAdapter};
use zaprelay_storage::SqliteStorage;

use crate::mock_channel::MockChannel;
use crate::mock_provider::MockProvider;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    answers: Vec<String>,
    failing_llm: bool,
    without_llm: bool,
    fallback_message: Option<String>,
    management_phones: Vec<String>,
    sellers: Vec<Seller>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            answers: Vec::new(),
            failing_llm: false,
            without_llm: false,
            fallback_message: None,
            management_phones: Vec::new(),
            sellers: Vec::new(),
        }
    }

    /// Queue LLM answers, returned in order.
    pub fn with_answers(mut self, answers: Vec<String>) -> Self {
        self.answers = answers;
        self
    }

    /// Make every LLM call fail.
    pub fn with_failing_llm(mut self) -> Self {
        self.failing_llm = true;
        self
    }

    /// Build the relay without an LLM provider.
    pub fn without_llm(mut self) -> Self {
        self.without_llm = true;
        self
    }

    pub fn with_fallback(mut self, text: &str) -> Self {
        self.fallback_message = Some(text.to_string());
        self
    }

    pub fn with_management_phones(mut self, phones: &[&str]) -> Self {
        self.management_phones = phones.iter().map(|p| p.to_string()).collect();
        self
    }

    /// Seed an active seller. A `whapi_token` routes their replies through
    /// [`TestHarness::whapi`].
    pub fn with_seller(mut self, id: &str, number: &str, whapi_token: Option<&str>) -> Self {
        self.sellers.push(test_seller(id, number, whapi_token));
        self
    }

    /// Build the test harness, creating all required subsystems.
    pub async fn build(self) -> Result<TestHarness, RelayError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| RelayError::Storage { source: e.into() })?;
        let db_path = temp_dir.path().join("test.db");

        let storage = SqliteStorage::new(StorageConfig {
            database_path: db_path.to_string_lossy().to_string(),
            wal_mode: true,
        });
        storage.initialize().await?;
        let storage: Arc<dyn StorageAdapter + Send + Sync> = Arc::new(storage);
        for seller in &self.sellers {
            storage.upsert_seller(seller).await?;
        }

        let provider = Arc::new(if self.failing_llm {
            MockProvider::failing()
        } else if self.answers.is_empty() {
            MockProvider::new()
        } else {
            MockProvider::with_answers(self.answers)
        });
        let cloud = Arc::new(MockChannel::named("cloud"));
        let router = Arc::new(MockChannel::named("router"));
        let whapi = Arc::new(MockChannel::named("whapi"));

        let mut settings = RelaySettings {
            management_phones: self.management_phones,
            recovery_delay: std::time::Duration::from_millis(1),
            ..RelaySettings::default()
        };
        if let Some(fallback) = self.fallback_message {
            settings.fallback_message = fallback;
        }

        let factory_channel = whapi.clone();
        let mut relay = Relay::new(storage.clone(), settings)
            .with_cloud_channel(cloud.clone())
            .with_router(router.clone())
            .with_whapi_factory(Arc::new(move |_token: &str| {
                Ok(factory_channel.clone() as SharedChannel)
            }));
        if !self.without_llm {
            relay = relay.with_provider(provider.clone());
        }

        Ok(TestHarness {
            relay: Arc::new(relay),
            provider,
            cloud,
            router,
            whapi,
            storage,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete test environment with mock adapters and temp storage.
pub struct TestHarness {
    /// The relay under test.
    pub relay: Arc<Relay>,
    /// The mock LLM provider.
    pub provider: Arc<MockProvider>,
    /// Mock official Cloud API number.
    pub cloud: Arc<MockChannel>,
    /// Mock central router account.
    pub router: Arc<MockChannel>,
    /// Mock Whapi account shared by every seller with a token.
    pub whapi: Arc<MockChannel>,
    /// SQLite storage adapter (temp DB, cleaned up on drop).
    pub storage: Arc<dyn StorageAdapter + Send + Sync>,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    /// Create a new builder for configuring the test harness.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Delivers client texts through the Cloud API path.
    pub async fn deliver_cloud(&self, messages: &[(&str, &str, &str)]) -> InboundReport {
        let events = messages
            .iter()
            .map(|(id, phone, text)| client_text(id, phone, text))
            .collect();
        let source = self.relay.cloud_source();
        self.relay.handle_events(&source, events).await
    }

    /// Delivers client texts through a seller's Whapi webhook.
    pub async fn deliver_whapi(
        &self,
        seller_id: &str,
        messages: &[(&str, &str, &str)],
    ) -> Result<InboundReport, RelayError> {
        let events = messages
            .iter()
            .map(|(id, phone, text)| client_text(id, phone, text))
            .collect();
        let source = self.relay.whapi_source(seller_id).await?;
        Ok(self.relay.handle_events(&source, events).await)
    }

    /// The open conversation for `phone`, if any.
    pub async fn open_conversation(&self, phone: &str) -> Result<Option<Conversation>, RelayError> {
        let all = self.storage.list_conversations(None, 1000).await?;
        Ok(all
            .into_iter()
            .find(|c| c.client_phone == phone && c.status != ConversationStatus::Closed))
    }

    /// Every conversation row for `phone`, closed ones included.
    pub async fn conversations_for(&self, phone: &str) -> Result<Vec<Conversation>, RelayError> {
        let all = self.storage.list_conversations(None, 1000).await?;
        Ok(all.into_iter().filter(|c| c.client_phone == phone).collect())
    }

    /// Messages of a conversation in chronological order.
    pub async fn messages(&self, conversation_id: &str) -> Result<Vec<Message>, RelayError> {
        self.storage.get_messages(conversation_id, None).await
    }
}

/// An inbound client text.
pub fn client_text(external_id: &str, phone: &str, text: &str) -> InboundEvent {
    InboundEvent::Message(InboundMessage {
        external_id: external_id.to_string(),
        from_phone: phone.to_string(),
        sender_name: None,
        content: text.to_string(),
        message_type: "text".to_string(),
        timestamp: None,
    })
}

/// An active seller with a mid-range score and no recorded activity.
pub fn test_seller(id: &str, number: &str, whapi_token: Option<&str>) -> Seller {
    Seller {
        id: id.to_string(),
        name: format!("Seller {id}"),
        whatsapp_number: number.to_string(),
        whapi_token: whapi_token.map(String::from),
        whapi_status: whapi_token.map(|_| "connected".to_string()),
        performance_score: 75.0,
        last_activity: None,
        active: true,
        created_at: now_timestamp(),
    }
}
