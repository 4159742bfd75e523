// SPDX-FileCopyrightText: 2026 Zaprelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider adapter trait for the LLM chat service.

use async_trait::async_trait;

use crate::error::RelayError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ProviderRequest, ProviderResponse};

/// Adapter for a blocking chat-completion service.
#[async_trait]
pub trait ProviderAdapter: PluginAdapter {
    /// Sends a query and waits for the whole answer.
    ///
    /// Fails on transport errors, non-2xx responses, and bodies without
    /// an answer. Callers decide whether a failure is fatal.
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, RelayError>;
}
