// SPDX-FileCopyrightText: 2026 Zaprelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel adapter trait for outbound WhatsApp delivery (Cloud API, Whapi).

use async_trait::async_trait;

use crate::error::RelayError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ChannelCapabilities, MessageId, OutboundMessage};

/// Adapter for a messaging provider's send API.
///
/// Inbound traffic reaches the relay through webhooks, so channels only
/// deliver. Used for bot replies, operator replies, and seller/management
/// notifications.
#[async_trait]
pub trait ChannelAdapter: PluginAdapter {
    /// Returns the capabilities supported by this channel.
    fn capabilities(&self) -> ChannelCapabilities;

    /// Sends a message and returns the provider-assigned message id.
    async fn send(&self, msg: OutboundMessage) -> Result<MessageId, RelayError>;
}
