// SPDX-FileCopyrightText: 2026 Zaprelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the zaprelay sales relay.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level zaprelay configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    /// Relay identity and behavior settings.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Official WhatsApp Business Cloud API settings.
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,

    /// Whapi vendor gateway settings.
    #[serde(default)]
    pub whapi: WhapiConfig,

    /// Dify LLM service settings.
    #[serde(default)]
    pub dify: DifyConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// HTTP gateway settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Alert monitor settings.
    #[serde(default)]
    pub alerts: AlertsConfig,

    /// Batch recovery settings.
    #[serde(default)]
    pub recovery: RecoveryConfig,
}

impl RelayConfig {
    /// Copy with every credential replaced by a `[redacted]` marker.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for secret in [
            &mut copy.whatsapp.access_token,
            &mut copy.whatsapp.app_secret,
            &mut copy.whatsapp.verify_token,
            &mut copy.whapi.router_token,
            &mut copy.whapi.verify_token,
            &mut copy.dify.api_key,
            &mut copy.gateway.bearer_token,
        ] {
            if secret.is_some() {
                *secret = Some("[redacted]".to_string());
            }
        }
        copy
    }

    /// Effective configuration as TOML, credentials redacted.
    pub fn to_redacted_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(&self.redacted())
    }
}

/// Relay identity and behavior configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name used in logs and management alerts.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Text sent to the client on the official API path when no bot reply
    /// could be produced or delivered.
    #[serde(default = "default_fallback_message")]
    pub fallback_message: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
            fallback_message: default_fallback_message(),
        }
    }
}

fn default_agent_name() -> String {
    "zaprelay".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_fallback_message() -> String {
    "Olá! Recebemos sua mensagem e em breve um de nossos consultores vai te responder.".to_string()
}

/// WhatsApp Business Cloud API configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WhatsAppConfig {
    /// Graph API bearer token. `None` disables the official sender.
    #[serde(default)]
    pub access_token: Option<String>,

    /// Business phone number id messages are sent from.
    #[serde(default)]
    pub phone_number_id: Option<String>,

    /// App secret for `X-Hub-Signature-256` verification.
    #[serde(default)]
    pub app_secret: Option<String>,

    /// Shared token echoed during the webhook registration handshake.
    #[serde(default)]
    pub verify_token: Option<String>,

    /// Graph API base URL including version.
    #[serde(default = "default_graph_base_url")]
    pub api_base_url: String,

    /// Reject webhook deliveries whose signature does not verify.
    #[serde(default)]
    pub enforce_signature: bool,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            phone_number_id: None,
            app_secret: None,
            verify_token: None,
            api_base_url: default_graph_base_url(),
            enforce_signature: false,
        }
    }
}

impl std::fmt::Debug for WhatsAppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhatsAppConfig")
            .field("access_token", &redact(&self.access_token))
            .field("phone_number_id", &self.phone_number_id)
            .field("app_secret", &redact(&self.app_secret))
            .field("verify_token", &redact(&self.verify_token))
            .field("api_base_url", &self.api_base_url)
            .field("enforce_signature", &self.enforce_signature)
            .finish()
    }
}

fn default_graph_base_url() -> String {
    "https://graph.facebook.com/v18.0".to_string()
}

/// Whapi gateway configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WhapiConfig {
    /// Token of the central "router" account used for seller and
    /// management notifications.
    #[serde(default)]
    pub router_token: Option<String>,

    /// Whapi REST base URL.
    #[serde(default = "default_whapi_base_url")]
    pub api_base_url: String,

    /// Token expected on the Whapi webhook handshake. Falls back to
    /// `whatsapp.verify_token` when unset.
    #[serde(default)]
    pub verify_token: Option<String>,
}

impl Default for WhapiConfig {
    fn default() -> Self {
        Self {
            router_token: None,
            api_base_url: default_whapi_base_url(),
            verify_token: None,
        }
    }
}

impl std::fmt::Debug for WhapiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhapiConfig")
            .field("router_token", &redact(&self.router_token))
            .field("api_base_url", &self.api_base_url)
            .field("verify_token", &redact(&self.verify_token))
            .finish()
    }
}

fn default_whapi_base_url() -> String {
    "https://gate.whapi.cloud".to_string()
}

/// Dify LLM service configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DifyConfig {
    /// App API key. `None` disables bot replies.
    #[serde(default)]
    pub api_key: Option<String>,

    /// API base URL, without the `/chat-messages` suffix.
    #[serde(default = "default_dify_base_url")]
    pub base_url: String,

    /// Overall request timeout in seconds.
    #[serde(default = "default_dify_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DifyConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_dify_base_url(),
            timeout_secs: default_dify_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for DifyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DifyConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn default_dify_base_url() -> String {
    "https://api.dify.ai/v1".to_string()
}

fn default_dify_timeout_secs() -> u64 {
    120
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("zaprelay").join("zaprelay.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("zaprelay.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// HTTP gateway configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Address to bind the server to.
    #[serde(default = "default_gateway_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bearer token for the operator API. `None` rejects every `/v1` call.
    #[serde(default)]
    pub bearer_token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
            bearer_token: None,
        }
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("bearer_token", &redact(&self.bearer_token))
            .finish()
    }
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    3000
}

/// Alert monitor configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AlertsConfig {
    /// Seconds between in-process monitor runs. `0` leaves scheduling to an
    /// external cron hitting `POST /v1/alerts/run`.
    #[serde(default)]
    pub interval_secs: u64,

    /// Phones (digits only) that receive management alerts.
    #[serde(default)]
    pub management_phones: Vec<String>,
}

/// Batch recovery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RecoveryConfig {
    /// Pause between items, to stay under provider rate limits.
    #[serde(default = "default_recovery_delay_ms")]
    pub delay_ms: u64,

    /// Maximum conversations handled per batch run.
    #[serde(default = "default_recovery_batch_limit")]
    pub batch_limit: u32,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_recovery_delay_ms(),
            batch_limit: default_recovery_batch_limit(),
        }
    }
}

fn default_recovery_delay_ms() -> u64 {
    1000
}

fn default_recovery_batch_limit() -> u32 {
    50
}

fn redact(secret: &Option<String>) -> Option<&'static str> {
    secret.as_ref().map(|_| "[redacted]")
}
