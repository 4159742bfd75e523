// SPDX-FileCopyrightText: 2026 Zaprelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock channel adapter for deterministic testing.
//!
//! `MockChannel` implements `ChannelAdapter` and captures every outbound
//! message for assertion in tests. It can be switched into a failing mode
//! to exercise fallback and escalation paths.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use zaprelay_core::types::{ChannelCapabilities, MessageId, OutboundMessage};
use zaprelay_core::{AdapterType, ChannelAdapter, HealthStatus, PluginAdapter, RelayError};

/// A mock messaging channel for testing.
///
/// Successful sends are captured and retrievable via `sent_messages()`
/// and return ids `mock-msg-1`, `mock-msg-2`, ... Failed sends are counted
/// separately.
pub struct MockChannel {
    name: String,
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
    failing: AtomicBool,
    attempts: AtomicUsize,
    next_id: AtomicUsize,
}

impl MockChannel {
    /// Create a new mock channel that accepts every send.
    pub fn new() -> Self {
        Self::named("mock-channel")
    }

    /// Create a mock channel with a custom adapter name.
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            sent: Arc::new(Mutex::new(Vec::new())),
            failing: AtomicBool::new(false),
            attempts: AtomicUsize::new(0),
            next_id: AtomicUsize::new(0),
        }
    }

    /// Create a mock channel that rejects every send.
    pub fn failing() -> Self {
        let channel = Self::new();
        channel.set_failing(true);
        channel
    }

    /// Toggle failure mode.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Get all messages that were sent successfully.
    pub async fn sent_messages(&self) -> Vec<OutboundMessage> {
        self.sent.lock().await.clone()
    }

    /// Get the count of successfully sent messages.
    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    /// Successful sends addressed to `phone`.
    pub async fn sent_to(&self, phone: &str) -> Vec<OutboundMessage> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|m| m.to == phone)
            .cloned()
            .collect()
    }

    /// Number of `send` calls, failed ones included.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Clear all captured messages.
    pub async fn clear_sent(&self) {
        self.sent.lock().await.clear();
    }
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockChannel {
    fn name(&self) -> &str {
        &self.name
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
impl ChannelAdapter for MockChannel {
    fn capabilities(&self) -> ChannelCapabilities {
        ChannelCapabilities {
            supports_media: true,
            max_message_length: None,
        }
    }

    async fn send(&self, msg: OutboundMessage) -> Result<MessageId, RelayError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(RelayError::Channel {
                message: format!("{} rejected the send", self.name),
                source: None,
            });
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.sent.lock().await.push(msg);
        Ok(MessageId(format!("mock-msg-{id}")))
    }
}
