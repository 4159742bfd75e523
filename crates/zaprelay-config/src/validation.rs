// SPDX-FileCopyrightText: 2026 Zaprelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as valid bind hosts, URL schemes, and cross-field requirements.

use crate::diagnostic::ConfigError;
use crate::model::RelayConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let host = config.gateway.host.trim();
    if host.is_empty() {
        errors.push(validation("gateway.host must not be empty".to_string()));
    } else {
        let is_valid_ip = host.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_valid_ip && !is_valid_hostname {
            errors.push(validation(format!(
                "gateway.host `{host}` is not a valid IP address or hostname"
            )));
        }
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(validation(
            "storage.database_path must not be empty".to_string(),
        ));
    }

    if !LOG_LEVELS.contains(&config.agent.log_level.as_str()) {
        errors.push(validation(format!(
            "agent.log_level `{}` must be one of {}",
            config.agent.log_level,
            LOG_LEVELS.join(", ")
        )));
    }

    for (key, url) in [
        ("whatsapp.api_base_url", &config.whatsapp.api_base_url),
        ("whapi.api_base_url", &config.whapi.api_base_url),
        ("dify.base_url", &config.dify.base_url),
    ] {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            errors.push(validation(format!(
                "{key} `{url}` must start with http:// or https://"
            )));
        }
    }

    if config.whatsapp.enforce_signature && config.whatsapp.app_secret.is_none() {
        errors.push(validation(
            "whatsapp.enforce_signature requires whatsapp.app_secret".to_string(),
        ));
    }

    if config.whatsapp.access_token.is_some() != config.whatsapp.phone_number_id.is_some() {
        errors.push(validation(
            "whatsapp.access_token and whatsapp.phone_number_id must be set together".to_string(),
        ));
    }

    if config.dify.timeout_secs == 0 {
        errors.push(validation("dify.timeout_secs must be at least 1".to_string()));
    }

    if config.recovery.batch_limit == 0 {
        errors.push(validation(
            "recovery.batch_limit must be at least 1".to_string(),
        ));
    }

    for (i, phone) in config.alerts.management_phones.iter().enumerate() {
        if phone.is_empty() || !phone.chars().all(|c| c.is_ascii_digit()) {
            errors.push(validation(format!(
                "alerts.management_phones[{i}] `{phone}` must contain digits only"
            )));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validation(message: String) -> ConfigError {
    ConfigError::Validation { message }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(config: &RelayConfig) -> Vec<String> {
        validate_config(config)
            .unwrap_err()
            .into_iter()
            .map(|e| e.to_string())
            .collect()
    }

    #[test]
    fn default_config_validates() {
        let config = RelayConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn empty_database_path_fails_validation() {
        let mut config = RelayConfig::default();
        config.storage.database_path = "  ".to_string();
        let errors = messages(&config);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("storage.database_path"));
    }

    #[test]
    fn enforce_signature_without_secret_fails() {
        let mut config = RelayConfig::default();
        config.whatsapp.enforce_signature = true;
        let errors = messages(&config);
        assert!(errors.iter().any(|m| m.contains("app_secret")));

        config.whatsapp.app_secret = Some("s3cret".into());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn non_http_base_url_fails() {
        let mut config = RelayConfig::default();
        config.dify.base_url = "api.dify.ai/v1".into();
        let errors = messages(&config);
        assert!(errors[0].contains("dify.base_url"));
    }

    #[test]
    fn half_configured_cloud_sender_fails() {
        let mut config = RelayConfig::default();
        config.whatsapp.access_token = Some("EAAG".into());
        let errors = messages(&config);
        assert!(errors[0].contains("phone_number_id"));
    }

    #[test]
    fn collects_every_error() {
        let mut config = RelayConfig::default();
        config.gateway.host = String::new();
        config.recovery.batch_limit = 0;
        config.agent.log_level = "verbose".into();
        config.alerts.management_phones = vec!["5511999990000".into(), "+55 11".into()];
        let errors = messages(&config);
        assert_eq!(errors.len(), 4, "{errors:?}");
        assert!(errors.iter().any(|m| m.contains("management_phones[1]")));
    }

    #[test]
    fn invalid_host_characters_fail() {
        let mut config = RelayConfig::default();
        config.gateway.host = "bad host!".into();
        let errors = messages(&config);
        assert!(errors[0].contains("not a valid IP address"));
    }
}
