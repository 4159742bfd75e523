// SPDX-FileCopyrightText: 2026 Zaprelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One-shot maintenance commands.
//!
//! Each command builds the same relay `serve` would, runs a single batch
//! and prints its report as JSON on stdout.

use serde::Serialize;
use tracing::info;
use zaprelay_config::model::RelayConfig;
use zaprelay_core::types::ProviderRequest;
use zaprelay_core::RelayError;

use crate::serve::build_relay;

fn print_report<T: Serialize>(report: &T) -> Result<(), RelayError> {
    let json = serde_json::to_string_pretty(report)
        .map_err(|e| RelayError::Internal(format!("failed to render report: {e}")))?;
    println!("{json}");
    Ok(())
}

/// `zaprelay reprocess`
pub async fn reprocess(config: &RelayConfig) -> Result<(), RelayError> {
    let (relay, storage) = build_relay(config).await?;
    let report = relay.reprocess_lost_messages().await;
    storage.close().await?;
    print_report(&report?)
}

/// `zaprelay recover-sessions`
pub async fn recover_sessions(config: &RelayConfig) -> Result<(), RelayError> {
    let (relay, storage) = build_relay(config).await?;
    let report = relay.recover_llm_sessions().await;
    storage.close().await?;
    print_report(&report?)
}

/// `zaprelay sync-messages`
pub async fn sync_messages(config: &RelayConfig) -> Result<(), RelayError> {
    let (relay, storage) = build_relay(config).await?;
    let report = relay.sync_messages().await;
    storage.close().await?;
    print_report(&report?)
}

/// `zaprelay run-alerts`
pub async fn run_alerts(config: &RelayConfig) -> Result<(), RelayError> {
    let (relay, storage) = build_relay(config).await?;
    let report = relay.run_alert_monitor().await;
    storage.close().await?;
    print_report(&report?)
}

#[derive(Debug, Serialize)]
struct ProbeOutput {
    answer: String,
    conversation_id: String,
    latency_ms: u64,
}

/// `zaprelay probe-llm <query>`
pub async fn probe_llm(config: &RelayConfig, query: String) -> Result<(), RelayError> {
    let (relay, storage) = build_relay(config).await?;
    let provider = relay
        .provider()
        .cloned()
        .ok_or_else(|| RelayError::AdapterNotFound {
            adapter_type: "provider".into(),
            name: "dify".into(),
        })?;
    storage.close().await?;

    let started = std::time::Instant::now();
    let resp = provider.complete(ProviderRequest::new(query, "probe")).await?;
    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    info!(latency_ms, "LLM probe answered");
    print_report(&ProbeOutput {
        answer: resp.answer,
        conversation_id: resp.conversation_id,
        latency_ms,
    })
}

/// `zaprelay check-config`
pub fn check_config(config: &RelayConfig) -> Result<(), RelayError> {
    let rendered = config
        .to_redacted_toml()
        .map_err(|e| RelayError::Config(format!("failed to render configuration: {e}")))?;
    println!("{rendered}");
    eprintln!(
        "configuration ok: llm={} cloud={} router={}",
        config.dify.api_key.is_some(),
        config.whatsapp.access_token.is_some(),
        config.whapi.router_token.is_some()
    );
    Ok(())
}
