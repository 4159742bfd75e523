// SPDX-FileCopyrightText: 2026 Zaprelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./zaprelay.toml` > `~/.config/zaprelay/zaprelay.toml` >
//! `/etc/zaprelay/zaprelay.toml`, then the deployment's bare environment
//! variables (`DIFY_API_KEY`, `WHATSAPP_ACCESS_TOKEN`, ...) and finally
//! `ZAPRELAY_`-prefixed overrides.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::RelayConfig;

/// Bare environment variables the deployment already exports, and the
/// config key each one feeds.
pub const LEGACY_ENV_KEYS: &[(&str, &str)] = &[
    ("WEBHOOK_VERIFY_TOKEN", "whatsapp.verify_token"),
    ("WHATSAPP_APP_SECRET", "whatsapp.app_secret"),
    ("WHATSAPP_ACCESS_TOKEN", "whatsapp.access_token"),
    ("WHATSAPP_PHONE_NUMBER_ID", "whatsapp.phone_number_id"),
    ("DIFY_API_KEY", "dify.api_key"),
    ("DIFY_BASE_URL", "dify.base_url"),
    ("RODRIGO_WHAPI_TOKEN", "whapi.router_token"),
];

const SECTIONS: &[&str] = &[
    "agent", "whatsapp", "whapi", "dify", "storage", "gateway", "alerts", "recovery",
];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/zaprelay/zaprelay.toml` (system-wide)
/// 3. `~/.config/zaprelay/zaprelay.toml` (user XDG config)
/// 4. `./zaprelay.toml` (local directory)
/// 5. Bare deployment variables ([`LEGACY_ENV_KEYS`])
/// 6. `ZAPRELAY_*` environment variables
pub fn load_config() -> Result<RelayConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<RelayConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RelayConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<RelayConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RelayConfig::default()))
        .merge(Toml::file(path))
        .merge(legacy_env_provider())
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading (exposed for diagnostic use).
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(RelayConfig::default()))
        .merge(Toml::file("/etc/zaprelay/zaprelay.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("zaprelay/zaprelay.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("zaprelay.toml"))
        .merge(legacy_env_provider())
        .merge(env_provider())
}

/// Maps the bare deployment variables onto their config keys.
pub fn legacy_env_provider() -> Env {
    let names: Vec<&str> = LEGACY_ENV_KEYS.iter().map(|(env, _)| *env).collect();
    Env::raw().only(&names).map(|key| {
        let key_str = key.as_str();
        LEGACY_ENV_KEYS
            .iter()
            .find(|(env, _)| env.eq_ignore_ascii_case(key_str))
            .map(|(_, target)| (*target).to_string())
            .unwrap_or_else(|| key_str.to_ascii_lowercase())
            .into()
    })
}

/// Create the environment variable provider using explicit `map()` for section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")`: `ZAPRELAY_DIFY_API_KEY`
/// must map to `dify.api_key`, not `dify.api.key`.
fn env_provider() -> Env {
    Env::prefixed("ZAPRELAY_").map(|key| map_prefixed_key(key.as_str()).into())
}

/// `agent_log_level` -> `agent.log_level`. Keys without a known section
/// pass through unchanged so `deny_unknown_fields` can report them.
pub fn map_prefixed_key(key: &str) -> String {
    let key = key.to_ascii_lowercase();
    for section in SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|r| r.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixed_keys_split_only_on_section() {
        assert_eq!(map_prefixed_key("dify_api_key"), "dify.api_key");
        assert_eq!(
            map_prefixed_key("whatsapp_enforce_signature"),
            "whatsapp.enforce_signature"
        );
        assert_eq!(
            map_prefixed_key("alerts_management_phones"),
            "alerts.management_phones"
        );
        assert_eq!(map_prefixed_key("whapi_router_token"), "whapi.router_token");
        assert_eq!(map_prefixed_key("unknown_key"), "unknown_key");
    }

    #[test]
    fn legacy_keys_target_known_sections() {
        for (_, target) in LEGACY_ENV_KEYS {
            let section = target.split('.').next().unwrap_or_default();
            assert!(SECTIONS.contains(&section), "{target}");
        }
    }
}
