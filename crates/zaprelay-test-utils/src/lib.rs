// SPDX-FileCopyrightText: 2026 Zaprelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for zaprelay integration tests.
//!
//! Provides mock adapters and test harness infrastructure for fast,
//! deterministic, CI-runnable tests without WhatsApp or Dify.
//!
//! # Components
//!
//! - [`MockProvider`] - Mock LLM provider with queued answers
//! - [`MockChannel`] - Mock messaging channel with send capture
//! - [`TestHarness`] - Relay wired to mocks over a temp database

pub mod harness;
pub mod mock_channel;
pub mod mock_provider;

pub use harness::{client_text, test_seller, TestHarness};
pub use mock_channel::MockChannel;
pub use mock_provider::MockProvider;
