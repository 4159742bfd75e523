// SPDX-FileCopyrightText: 2026 Zaprelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Relay pipeline for the zaprelay WhatsApp sales relay.
//!
//! The [`Relay`] is the central coordinator that:
//! - Records inbound client messages delivered by provider webhooks
//! - Answers conversations still owned by the bot through the LLM bridge
//! - Sends operator replies and transfers conversations to sellers
//! - Raises management alerts and evaluates alert rules
//! - Repairs conversations left behind by failed deliveries

pub mod alerts;
pub mod bridge;
pub mod inbound;
pub mod lead;
pub mod outbound;
pub mod recovery;
pub mod shutdown;
pub mod transfer;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};
use zaprelay_config::model::RelayConfig;
use zaprelay_core::types::Conversation;
use zaprelay_core::{ChannelAdapter, ProviderAdapter, RelayError, StorageAdapter};

pub use alerts::{AlertDelivery, ManagementAlert, MonitorReport};
pub use inbound::{CloudSource, InboundReport, InboundSource, WhapiSource};
pub use outbound::{ManualReply, SendOutcome};
pub use recovery::RecoveryReport;
pub use transfer::TransferOutcome;

/// Shared handle to a channel adapter.
pub type SharedChannel = Arc<dyn ChannelAdapter + Send + Sync>;
/// Shared handle to the LLM provider.
pub type SharedProvider = Arc<dyn ProviderAdapter + Send + Sync>;
/// Shared handle to the storage adapter.
pub type SharedStorage = Arc<dyn StorageAdapter + Send + Sync>;
/// Builds a Whapi channel from a seller's account token.
pub type WhapiFactory = Arc<dyn Fn(&str) -> Result<SharedChannel, RelayError> + Send + Sync>;

/// Tunables the pipeline reads from configuration.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// Text sent to Cloud API clients when the bot cannot answer.
    pub fallback_message: String,
    /// Digits-only numbers that receive management alerts.
    pub management_phones: Vec<String>,
    /// Pause between items in recovery batches.
    pub recovery_delay: Duration,
    /// Maximum conversations per recovery batch.
    pub recovery_batch_limit: i64,
}

impl RelaySettings {
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            fallback_message: config.agent.fallback_message.clone(),
            management_phones: config.alerts.management_phones.clone(),
            recovery_delay: Duration::from_millis(config.recovery.delay_ms),
            recovery_batch_limit: i64::from(config.recovery.batch_limit),
        }
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self::from_config(&RelayConfig::default())
    }
}

/// The relay: storage plus whichever provider and channels are configured.
pub struct Relay {
    storage: SharedStorage,
    provider: Option<SharedProvider>,
    cloud: Option<SharedChannel>,
    router: Option<SharedChannel>,
    whapi: Option<WhapiFactory>,
    settings: RelaySettings,
}

impl Relay {
    /// Creates a relay with storage only. Attach adapters with the `with_*` methods.
    pub fn new(storage: SharedStorage, settings: RelaySettings) -> Self {
        Self {
            storage,
            provider: None,
            cloud: None,
            router: None,
            whapi: None,
            settings,
        }
    }

    /// Attaches the LLM provider. Without one, bot replies are disabled.
    pub fn with_provider(mut self, provider: SharedProvider) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Attaches the official Cloud API sender.
    pub fn with_cloud_channel(mut self, channel: SharedChannel) -> Self {
        self.cloud = Some(channel);
        self
    }

    /// Attaches the central router account used for seller and management notices.
    pub fn with_router(mut self, channel: SharedChannel) -> Self {
        self.router = Some(channel);
        self
    }

    /// Attaches the factory that builds per-seller Whapi channels.
    pub fn with_whapi_factory(mut self, factory: WhapiFactory) -> Self {
        self.whapi = Some(factory);
        self
    }

    pub fn storage(&self) -> &SharedStorage {
        &self.storage
    }

    pub fn provider(&self) -> Option<&SharedProvider> {
        self.provider.as_ref()
    }

    pub fn cloud_channel(&self) -> Option<&SharedChannel> {
        self.cloud.as_ref()
    }

    pub fn router(&self) -> Option<&SharedChannel> {
        self.router.as_ref()
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    /// Logs which adapters are wired in.
    pub fn log_wiring(&self) {
        info!(
            llm = self.provider.is_some(),
            cloud = self.cloud.is_some(),
            router = self.router.is_some(),
            whapi = self.whapi.is_some(),
            management_phones = self.settings.management_phones.len(),
            "relay initialized"
        );
    }

    /// Builds the Whapi channel for a seller token.
    pub(crate) fn whapi_channel(&self, token: &str) -> Result<SharedChannel, RelayError> {
        let factory = self.whapi.as_ref().ok_or_else(|| RelayError::AdapterNotFound {
            adapter_type: "channel".into(),
            name: "whapi".into(),
        })?;
        factory(token)
    }

    /// Channel that reaches the client of `conversation`.
    ///
    /// The assigned seller's Whapi account when the seller has one,
    /// otherwise the Cloud API number.
    pub(crate) async fn client_channel(
        &self,
        conversation: &Conversation,
    ) -> Result<SharedChannel, RelayError> {
        if let Some(seller_id) = conversation.assigned_seller_id.as_deref()
            && let Some(seller) = self.storage.get_seller(seller_id).await?
            && let Some(token) = seller.whapi_token.as_deref().filter(|t| !t.is_empty())
            && self.whapi.is_some()
        {
            debug!(seller_id, conversation_id = %conversation.id, "replying through seller Whapi account");
            return self.whapi_channel(token);
        }
        self.cloud.clone().ok_or_else(|| RelayError::AdapterNotFound {
            adapter_type: "channel".into(),
            name: "whatsapp-cloud".into(),
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use tempfile::TempDir;
    use zaprelay_config::model::StorageConfig;
    use zaprelay_core::types::{now_timestamp, Seller};
    use zaprelay_core::StorageAdapter;
    use zaprelay_storage::SqliteStorage;

    use super::SharedStorage;

    pub(crate) async fn storage() -> (SharedStorage, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.db");
        let storage = SqliteStorage::new(StorageConfig {
            database_path: path.to_string_lossy().to_string(),
            wal_mode: true,
        });
        storage.initialize().await.unwrap();
        (Arc::new(storage), dir)
    }

    pub(crate) fn seller(id: &str, number: &str, token: Option<&str>) -> Seller {
        Seller {
            id: id.to_string(),
            name: format!("Vendedor {id}"),
            whatsapp_number: number.to_string(),
            whapi_token: token.map(String::from),
            whapi_status: Some("connected".into()),
            performance_score: 80.0,
            last_activity: None,
            active: true,
            created_at: now_timestamp(),
        }
    }
}
