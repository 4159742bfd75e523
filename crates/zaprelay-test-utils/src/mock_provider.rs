// SPDX-FileCopyrightText: 2026 Zaprelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock LLM provider adapter for deterministic testing.
//!
//! `MockProvider` implements `ProviderAdapter` with pre-configured answers,
//! enabling fast, CI-runnable tests without calling Dify.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use zaprelay_core::types::{ProviderRequest, ProviderResponse};
use zaprelay_core::{AdapterType, HealthStatus, PluginAdapter, ProviderAdapter, RelayError};

/// A mock LLM provider that returns pre-configured answers.
///
/// Answers are popped from a FIFO queue. When the queue is empty,
/// a default "mock answer" text is returned. A request without a session
/// id gets a fresh `mock-session-N`; otherwise the session is echoed.
pub struct MockProvider {
    answers: Arc<Mutex<VecDeque<String>>>,
    requests: Arc<Mutex<Vec<ProviderRequest>>>,
    failing: AtomicBool,
    sessions: AtomicUsize,
}

impl MockProvider {
    /// Create a new mock provider with an empty answer queue.
    pub fn new() -> Self {
        Self {
            answers: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            failing: AtomicBool::new(false),
            sessions: AtomicUsize::new(0),
        }
    }

    /// Create a mock provider pre-loaded with the given answers.
    pub fn with_answers(answers: Vec<String>) -> Self {
        Self {
            answers: Arc::new(Mutex::new(VecDeque::from(answers))),
            ..Self::new()
        }
    }

    /// Create a provider whose every call fails like an unreachable service.
    pub fn failing() -> Self {
        let provider = Self::new();
        provider.set_failing(true);
        provider
    }

    /// Toggle failure mode.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Add an answer to the end of the queue.
    pub async fn add_answer(&self, text: impl Into<String>) {
        self.answers.lock().await.push_back(text.into());
    }

    /// All requests received so far.
    pub async fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().await.clone()
    }

    /// Number of `complete` calls, failed ones included.
    pub async fn call_count(&self) -> usize {
        self.requests.lock().await.len()
    }

    async fn next_answer(&self) -> String {
        self.answers
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| "mock answer".to_string())
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockProvider {
    fn name(&self) -> &str {
        "mock-provider"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, RelayError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), RelayError> {
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for MockProvider {
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, RelayError> {
        self.requests.lock().await.push(request.clone());
        if self.failing.load(Ordering::SeqCst) {
            return Err(RelayError::Provider {
                message: "mock provider unavailable".into(),
                source: None,
            });
        }
        let answer = self.next_answer().await;
        let conversation_id = match request.conversation_id {
            Some(id) => id,
            None => format!("mock-session-{}", self.sessions.fetch_add(1, Ordering::SeqCst) + 1),
        };
        Ok(ProviderResponse {
            answer,
            conversation_id,
            message_id: Some(format!("mock-llm-{}", uuid::Uuid::new_v4())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_queued_answers_then_default() {
        let provider = MockProvider::with_answers(vec!["first".into(), "second".into()]);
        let r1 = provider.complete(ProviderRequest::new("a", "u")).await.unwrap();
        let r2 = provider.complete(ProviderRequest::new("b", "u")).await.unwrap();
        let r3 = provider.complete(ProviderRequest::new("c", "u")).await.unwrap();
        assert_eq!(r1.answer, "first");
        assert_eq!(r2.answer, "second");
        assert_eq!(r3.answer, "mock answer");
        assert_eq!(provider.call_count().await, 3);
    }

    #[tokio::test]
    async fn issues_and_echoes_sessions() {
        let provider = MockProvider::new();
        let fresh = provider.complete(ProviderRequest::new("a", "u")).await.unwrap();
        assert_eq!(fresh.conversation_id, "mock-session-1");
        let reused = provider
            .complete(ProviderRequest::new("b", "u").with_conversation(Some("s-9".into())))
            .await
            .unwrap();
        assert_eq!(reused.conversation_id, "s-9");
    }

    #[tokio::test]
    async fn failing_provider_records_the_call() {
        let provider = MockProvider::failing();
        assert!(provider.complete(ProviderRequest::new("a", "u")).await.is_err());
        assert_eq!(provider.call_count().await, 1);
    }
}
