// SPDX-FileCopyrightText: 2026 Zaprelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `zaprelay serve` command implementation.
//!
//! Wires SQLite storage, the Dify provider and the WhatsApp channels into a
//! [`Relay`], then serves the webhook endpoints and operator API until a
//! shutdown signal arrives. The alert monitor runs alongside on its own
//! interval.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use zaprelay_agent::{shutdown, Relay, RelaySettings, SharedChannel, SharedStorage};
use zaprelay_config::model::RelayConfig;
use zaprelay_core::{RelayError, StorageAdapter};
use zaprelay_dify::DifyProvider;
use zaprelay_gateway::{GatewayState, ServerConfig};
use zaprelay_storage::SqliteStorage;
use zaprelay_whatsapp::{CloudChannel, WhapiChannel};

/// Opens the database and builds the relay from configuration.
///
/// Missing credentials disable the matching adapter instead of failing:
/// no Dify key means no bot replies, no Cloud API token means Cloud
/// conversations are recorded but never answered.
pub async fn build_relay(config: &RelayConfig) -> Result<(Relay, SharedStorage), RelayError> {
    let storage = SqliteStorage::new(config.storage.clone());
    storage.initialize().await?;
    let storage: SharedStorage = Arc::new(storage);

    let mut relay = Relay::new(storage.clone(), RelaySettings::from_config(config));

    if let Some(provider) = DifyProvider::from_config(&config.dify)? {
        relay = relay.with_provider(Arc::new(provider));
    }

    if let Some(cloud) = CloudChannel::from_config(&config.whatsapp)? {
        relay = relay.with_cloud_channel(Arc::new(cloud));
    } else {
        warn!("whatsapp.access_token or phone_number_id missing, Cloud API sends disabled");
    }

    match config.whapi.router_token.as_deref().filter(|t| !t.is_empty()) {
        Some(token) => {
            let router = WhapiChannel::new(token, &config.whapi.api_base_url)?;
            relay = relay.with_router(Arc::new(router));
        }
        None => warn!("whapi.router_token not set, seller notices and management alerts disabled"),
    }

    let api_base_url = config.whapi.api_base_url.clone();
    relay = relay.with_whapi_factory(Arc::new(move |token: &str| {
        let channel: SharedChannel = Arc::new(WhapiChannel::new(token, &api_base_url)?);
        Ok(channel)
    }));

    Ok((relay, storage))
}

/// Runs the `zaprelay serve` command.
pub async fn run_serve(config: RelayConfig) -> Result<(), RelayError> {
    info!(name = %config.agent.name, "starting zaprelay serve");

    let (relay, storage) = build_relay(&config).await?;
    relay.log_wiring();
    let relay = Arc::new(relay);

    let cancel = shutdown::install_signal_handler();

    let ticker = if config.alerts.interval_secs > 0 {
        Some(zaprelay_agent::alerts::spawn_alert_ticker(
            relay.clone(),
            Duration::from_secs(config.alerts.interval_secs),
            cancel.clone(),
        ))
    } else {
        info!("alerts.interval_secs is 0, alert monitor disabled");
        None
    };

    let server_config = ServerConfig {
        host: config.gateway.host.clone(),
        port: config.gateway.port,
    };
    let state = GatewayState::new(relay, &config);
    let served = zaprelay_gateway::start_server(&server_config, state, cancel.clone()).await;

    // A bind failure returns before any signal; stop the ticker either way.
    cancel.cancel();
    if let Some(handle) = ticker
        && let Err(e) = handle.await
    {
        warn!(error = %e, "alert monitor task ended abnormally");
    }

    storage.close().await?;
    info!("zaprelay stopped");
    served
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &tempfile::TempDir) -> RelayConfig {
        let mut config = RelayConfig::default();
        config.storage.database_path = dir.path().join("relay.db").to_string_lossy().to_string();
        config
    }

    #[tokio::test]
    async fn relay_without_credentials_has_no_optional_adapters() {
        let dir = tempfile::tempdir().unwrap();
        let (relay, _storage) = build_relay(&config_in(&dir)).await.unwrap();
        assert!(relay.provider().is_none());
        assert!(relay.cloud_channel().is_none());
        assert!(relay.router().is_none());
    }

    #[tokio::test]
    async fn configured_credentials_wire_adapters() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(&dir);
        config.dify.api_key = Some("app-key".into());
        config.whatsapp.access_token = Some("EAAG".into());
        config.whatsapp.phone_number_id = Some("1234567890".into());
        config.whapi.router_token = Some("router-token".into());

        let (relay, _storage) = build_relay(&config).await.unwrap();
        assert!(relay.provider().is_some());
        assert!(relay.cloud_channel().is_some());
        assert!(relay.router().is_some());
    }
}
