// SPDX-FileCopyrightText: 2026 Zaprelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! LLM bridge: one blocking question, one answer or nothing.

use tracing::{debug, warn};
use zaprelay_core::types::{ProviderRequest, ProviderResponse};
use zaprelay_core::ProviderAdapter;

/// Asks the LLM and swallows every failure.
///
/// `session` continues an existing LLM conversation; `None` starts one.
/// Returns `None` on transport errors, non-2xx responses, malformed
/// bodies and empty answers. Never retries.
pub async fn ask_llm(
    provider: &(dyn ProviderAdapter + Send + Sync),
    query: &str,
    user: &str,
    session: Option<&str>,
) -> Option<ProviderResponse> {
    let request = ProviderRequest::new(query, user).with_conversation(session.map(String::from));
    match provider.complete(request).await {
        Ok(resp) if !resp.answer.trim().is_empty() => {
            debug!(session = %resp.conversation_id, "LLM answered");
            Some(resp)
        }
        Ok(_) => {
            warn!(provider = provider.name(), "LLM returned an empty answer");
            None
        }
        Err(e) => {
            warn!(provider = provider.name(), error = %e, "LLM call failed");
            None
        }
    }
}
