// SPDX-FileCopyrightText: 2026 Zaprelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the zaprelay configuration system.

use figment::{
    providers::{Format, Serialized, Toml},
    Figment, Jail,
};
use zaprelay_config::diagnostic::ConfigError;
use zaprelay_config::loader::legacy_env_provider;
use zaprelay_config::model::RelayConfig;
use zaprelay_config::{load_and_validate_str, load_config_from_str};

/// Valid TOML with all known sections deserializes successfully.
#[test]
fn valid_toml_deserializes_into_relay_config() {
    let toml = r#"
[agent]
name = "loja-centro"
log_level = "debug"
fallback_message = "Já te respondemos!"

[whatsapp]
access_token = "EAAG-token"
phone_number_id = "1234567890"
app_secret = "app-secret"
verify_token = "verify-me"
enforce_signature = true

[whapi]
router_token = "router-token"

[dify]
api_key = "app-key"
base_url = "https://dify.internal/v1"
timeout_secs = 30

[storage]
database_path = "/tmp/zaprelay-test.db"
wal_mode = false

[gateway]
host = "0.0.0.0"
port = 8080
bearer_token = "ops-token"

[alerts]
interval_secs = 300
management_phones = ["5511999990000"]

[recovery]
delay_ms = 250
batch_limit = 10
"#;

    let config = load_and_validate_str(toml).expect("valid TOML should validate");
    assert_eq!(config.agent.name, "loja-centro");
    assert_eq!(config.agent.fallback_message, "Já te respondemos!");
    assert_eq!(config.whatsapp.phone_number_id.as_deref(), Some("1234567890"));
    assert!(config.whatsapp.enforce_signature);
    assert_eq!(config.whapi.router_token.as_deref(), Some("router-token"));
    assert_eq!(config.dify.base_url, "https://dify.internal/v1");
    assert_eq!(config.dify.timeout_secs, 30);
    assert!(!config.storage.wal_mode);
    assert_eq!(config.gateway.port, 8080);
    assert_eq!(config.alerts.interval_secs, 300);
    assert_eq!(config.alerts.management_phones, vec!["5511999990000"]);
    assert_eq!(config.recovery.batch_limit, 10);
}

/// Missing optional sections use defaults without error.
#[test]
fn missing_optional_sections_use_defaults() {
    let config = load_config_from_str("").expect("empty TOML should use defaults");

    assert_eq!(config.agent.name, "zaprelay");
    assert_eq!(config.agent.log_level, "info");
    assert!(config.whatsapp.access_token.is_none());
    assert!(config.dify.api_key.is_none());
    assert_eq!(config.gateway.host, "127.0.0.1");
    assert_eq!(config.gateway.port, 3000);
    assert!(config.gateway.bearer_token.is_none());
    assert_eq!(config.recovery.delay_ms, 1000);
    assert_eq!(config.recovery.batch_limit, 50);
    assert!(config.alerts.management_phones.is_empty());
}

/// Unknown field in a section is rejected with a suggestion.
#[test]
fn unknown_field_in_dify_suggests_correction() {
    let toml = r#"
[dify]
api_kye = "abc"
"#;

    let errors = load_and_validate_str(toml).expect_err("should reject unknown field");
    let found = errors.iter().any(|e| {
        matches!(e, ConfigError::UnknownKey { key, suggestion, valid_keys, .. } if {
            key == "api_kye"
                && suggestion.as_deref() == Some("api_key")
                && valid_keys.contains("timeout_secs")
        })
    });
    assert!(found, "expected UnknownKey for api_kye, got: {errors:?}");
}

/// A key written under the wrong section points at its real home.
#[test]
fn key_in_wrong_section_names_its_section() {
    let toml = r#"
[whatsapp]
router_token = "abc"
"#;

    let errors = load_and_validate_str(toml).expect_err("should reject misplaced key");
    let Some(ConfigError::UnknownKey { section, moved_to, span, .. }) = errors.first() else {
        panic!("expected UnknownKey, got: {errors:?}");
    };
    assert_eq!(section, "whatsapp");
    assert_eq!(moved_to.as_deref(), Some("whapi.router_token"));
    assert!(span.is_some());
    assert!(errors[0].to_string().contains("whatsapp.router_token"));
}

/// Unexpected top-level section is rejected by deny_unknown_fields.
#[test]
fn deny_unknown_fields_at_top_level() {
    let toml = r#"
[supabase]
url = "https://example.supabase.co"
"#;

    let err = load_config_from_str(toml).expect_err("unknown section should be rejected");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("unknown field") || err_str.contains("supabase"),
        "error should mention unknown field, got: {err_str}"
    );
}

/// A string where a port number belongs is a type error.
#[test]
fn invalid_type_for_port() {
    let toml = r#"
[gateway]
port = "eighty"
"#;

    let errors = load_and_validate_str(toml).expect_err("should reject invalid type");
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidType { key, .. } if key.contains("port"))),
        "got: {errors:?}"
    );
}

/// Validation runs after a successful parse.
#[test]
fn validation_rejects_signature_enforcement_without_secret() {
    let toml = r#"
[whatsapp]
enforce_signature = true
"#;

    let errors = load_and_validate_str(toml).expect_err("should fail validation");
    assert!(errors.iter().any(|e| {
        matches!(e, ConfigError::Validation { message } if message.contains("app_secret"))
    }));
}

/// Dotted keys map onto nested sections, as the env providers emit them.
#[test]
fn dotted_override_wins_over_toml() {
    let config: RelayConfig = Figment::new()
        .merge(Serialized::defaults(RelayConfig::default()))
        .merge(Toml::string("[dify]\nbase_url = \"https://from-toml/v1\"\n"))
        .merge(("dify.base_url", "https://from-env/v1"))
        .extract()
        .expect("should merge override");

    assert_eq!(config.dify.base_url, "https://from-env/v1");
}

/// The deployment's bare variables land on their config keys.
#[test]
fn legacy_env_vars_map_onto_sections() {
    Jail::expect_with(|jail| {
        jail.set_env("DIFY_API_KEY", "app-from-env");
        jail.set_env("RODRIGO_WHAPI_TOKEN", "router-from-env");
        jail.set_env("WEBHOOK_VERIFY_TOKEN", "hub-token");
        jail.set_env("SUPABASE_URL", "https://ignored.supabase.co");

        let config: RelayConfig = Figment::new()
            .merge(Serialized::defaults(RelayConfig::default()))
            .merge(legacy_env_provider())
            .extract()?;

        assert_eq!(config.dify.api_key.as_deref(), Some("app-from-env"));
        assert_eq!(config.whapi.router_token.as_deref(), Some("router-from-env"));
        assert_eq!(config.whatsapp.verify_token.as_deref(), Some("hub-token"));
        Ok(())
    });
}

/// `ZAPRELAY_*` variables override files and the bare variables.
#[test]
fn prefixed_env_overrides_everything() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "zaprelay.toml",
            "[gateway]\nport = 4000\n\n[dify]\napi_key = \"from-file\"\n",
        )?;
        jail.set_env("DIFY_API_KEY", "from-legacy");
        jail.set_env("ZAPRELAY_DIFY_API_KEY", "from-prefixed");
        jail.set_env("ZAPRELAY_GATEWAY_PORT", "4100");

        let config: RelayConfig = zaprelay_config::loader::build_figment().extract()?;
        assert_eq!(config.dify.api_key.as_deref(), Some("from-prefixed"));
        assert_eq!(config.gateway.port, 4100);
        Ok(())
    });
}

/// ConfigError can be rendered using miette's graphical handler.
#[test]
fn config_error_renders_with_miette() {
    use miette::{Diagnostic, GraphicalReportHandler};

    let error = ConfigError::UnknownKey {
        key: "acess_token".to_string(),
        section: "whatsapp".to_string(),
        suggestion: Some("access_token".to_string()),
        moved_to: None,
        valid_keys: "access_token, phone_number_id".to_string(),
        origin: None,
        span: None,
        src: None,
    };
    assert!(error.code().is_some());
    let help = error.help().map(|h| h.to_string()).unwrap_or_default();
    assert!(help.contains("did you mean `access_token`"), "got: {help}");

    let handler = GraphicalReportHandler::new();
    let mut buf = String::new();
    handler
        .render_report(&mut buf, &error)
        .expect("should render without error");
    assert!(buf.contains("acess_token"));
}
