// SPDX-FileCopyrightText: 2026 Zaprelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the zaprelay WhatsApp sales relay.
//!
//! This crate provides the trait definitions, error type, and domain types
//! used throughout the workspace. Storage, LLM, and messaging adapters all
//! implement traits defined here.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::RelayError;
pub use types::{AdapterType, HealthStatus, MessageId};

pub use traits::{ChannelAdapter, PluginAdapter, ProviderAdapter, StorageAdapter};
