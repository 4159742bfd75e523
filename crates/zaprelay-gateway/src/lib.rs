// SPDX-FileCopyrightText: 2026 Zaprelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP gateway for the zaprelay relay.
//!
//! Serves the provider webhooks (WhatsApp Cloud API and Whapi) that feed
//! the relay pipeline, and a bearer-authenticated operator API for manual
//! replies, transfers, notifications, alerts and recovery jobs.

pub mod auth;
pub mod handlers;
pub mod server;
pub mod webhooks;

pub use auth::AuthConfig;
pub use server::{build_router, start_server, GatewayState, ServerConfig, WebhookConfig};
