// SPDX-FileCopyrightText: 2026 Zaprelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Miette diagnostics for `zaprelay.toml` and the environment overrides.
//!
//! An unknown key is checked three ways: a close spelling in the same
//! section, the same key under another section (`port` at the top level
//! belongs in `[gateway]`), and a bare deployment variable pasted into the
//! file (`DIFY_API_KEY = ...` is `dify.api_key`).

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use figment::error::Kind;
use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

use crate::loader::LEGACY_ENV_KEYS;

/// Jaro-Winkler score a key must reach to be offered as a correction.
const SUGGESTION_THRESHOLD: f64 = 0.8;

/// Keys accepted in each section of [`RelayConfig`](crate::RelayConfig).
pub const KNOWN_KEYS: &[(&str, &[&str])] = &[
    ("agent", &["name", "log_level", "fallback_message"]),
    (
        "whatsapp",
        &[
            "access_token",
            "phone_number_id",
            "app_secret",
            "verify_token",
            "api_base_url",
            "enforce_signature",
        ],
    ),
    ("whapi", &["router_token", "api_base_url", "verify_token"]),
    ("dify", &["api_key", "base_url", "timeout_secs"]),
    ("storage", &["database_path", "wal_mode"]),
    ("gateway", &["host", "port", "bearer_token"]),
    ("alerts", &["interval_secs", "management_phones"]),
    ("recovery", &["delay_ms", "batch_limit"]),
];

/// A configuration problem, rendered by miette.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    /// A key (or section) the relay does not know.
    #[error("unknown configuration key `{}`{}", dotted(section, key), origin_suffix(origin.as_deref()))]
    #[diagnostic(
        code(zaprelay::config::unknown_key),
        help("{}", unknown_key_help(suggestion.as_deref(), moved_to.as_deref(), valid_keys))
    )]
    UnknownKey {
        key: String,
        /// Enclosing section; empty at the top level.
        section: String,
        /// Close spelling among the section's own keys.
        suggestion: Option<String>,
        /// Full dotted key when the name belongs somewhere else.
        moved_to: Option<String>,
        valid_keys: String,
        /// Where the value came from when it was not a file.
        origin: Option<String>,
        #[label("not a key of this section")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    /// A value of the wrong type.
    #[error("invalid type for `{key}`: {detail}")]
    #[diagnostic(code(zaprelay::config::invalid_type), help("expected {expected}"))]
    InvalidType {
        /// Dotted path of the offending key.
        key: String,
        detail: String,
        expected: String,
        #[label("wrong type here")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    /// A required key without a default.
    #[error("missing required key `{key}`")]
    #[diagnostic(code(zaprelay::config::missing_key), help("{}", missing_key_help(key)))]
    MissingKey {
        /// Dotted path of the missing key.
        key: String,
    },

    /// A value that parsed but cannot run.
    #[error("validation error: {message}")]
    #[diagnostic(code(zaprelay::config::validation))]
    Validation { message: String },

    #[error("configuration error: {0}")]
    #[diagnostic(code(zaprelay::config::other))]
    Other(String),
}

fn dotted(section: &str, key: &str) -> String {
    if section.is_empty() {
        key.to_string()
    } else {
        format!("{section}.{key}")
    }
}

fn origin_suffix(origin: Option<&str>) -> String {
    origin.map(|o| format!(" (from {o})")).unwrap_or_default()
}

fn unknown_key_help(suggestion: Option<&str>, moved_to: Option<&str>, valid_keys: &str) -> String {
    match (moved_to, suggestion) {
        (Some(target), _) => {
            let (section, key) = target.split_once('.').unwrap_or(("", target));
            format!("`{key}` belongs in the [{section}] section, as `{target}`")
        }
        (None, Some(s)) => format!("did you mean `{s}`? Valid keys: {valid_keys}"),
        (None, None) => format!("valid keys: {valid_keys}"),
    }
}

fn missing_key_help(key: &str) -> String {
    match key.rsplit_once('.') {
        Some((section, field)) => format!("add `{field} = <value>` under [{section}] in zaprelay.toml"),
        None => format!("add `{key} = <value>` to zaprelay.toml"),
    }
}

/// Sections whose key list contains `key`, other than `section` itself.
fn owning_section(key: &str, section: &str) -> Option<&'static str> {
    KNOWN_KEYS
        .iter()
        .filter(|(name, _)| *name != section)
        .find(|(_, keys)| keys.contains(&key))
        .map(|(name, _)| *name)
}

/// Where an unknown key actually lives, as a dotted path.
///
/// A key shared by several sections (`verify_token`) resolves to the
/// first one listed in [`KNOWN_KEYS`].
pub fn relocate_key(key: &str, section: &str) -> Option<String> {
    if let Some((_, target)) = LEGACY_ENV_KEYS
        .iter()
        .find(|(env, _)| env.eq_ignore_ascii_case(key))
    {
        return Some((*target).to_string());
    }
    // `[dify] dify_api_key` and top-level `dify_api_key`
    for (name, keys) in KNOWN_KEYS {
        if let Some(rest) = key.strip_prefix(name).and_then(|r| r.strip_prefix('_'))
            && keys.contains(&rest)
        {
            return Some(format!("{name}.{rest}"));
        }
    }
    owning_section(key, section).map(|owner| format!("{owner}.{key}"))
}

/// Convert a figment extraction error into diagnostics, one per failure.
///
/// `toml_sources` are `(path, content)` pairs used to point at the
/// offending line; values from the environment get an origin note instead.
pub fn figment_to_config_errors(
    err: figment::Error,
    toml_sources: &[(String, String)],
) -> Vec<ConfigError> {
    err.into_iter()
        .map(|error| {
            let path: Vec<String> = error.path.iter().map(|s| s.to_string()).collect();
            match &error.kind {
                Kind::UnknownField(field, expected) => {
                    let section = path.join(".");
                    let suggestion = suggest_key(field, expected);
                    let moved_to = relocate_key(field, &section);
                    let (span, src) = locate(&error, &path, field, toml_sources);
                    ConfigError::UnknownKey {
                        key: field.clone(),
                        section,
                        suggestion,
                        moved_to,
                        valid_keys: expected.join(", "),
                        origin: origin_of(&error),
                        span,
                        src,
                    }
                }
                Kind::MissingField(field) => {
                    let mut key = path.clone();
                    key.push(field.to_string());
                    ConfigError::MissingKey { key: key.join(".") }
                }
                Kind::InvalidType(actual, expected) => {
                    let (section, field) = match path.split_last() {
                        Some((last, parents)) => (parents.to_vec(), last.as_str()),
                        None => (Vec::new(), ""),
                    };
                    let (span, src) = locate(&error, &section, field, toml_sources);
                    ConfigError::InvalidType {
                        key: path.join("."),
                        detail: format!("found {actual}"),
                        expected: expected.to_string(),
                        span,
                        src,
                    }
                }
                _ => ConfigError::Other(error.to_string()),
            }
        })
        .collect()
}

/// Description of a non-file source, e.g. the `ZAPRELAY_` variables.
fn origin_of(error: &figment::Error) -> Option<String> {
    let metadata = error.metadata.as_ref()?;
    match metadata.source {
        Some(figment::Source::File(_)) | Some(figment::Source::Code(_)) => None,
        _ => Some(metadata.name.to_string()),
    }
}

fn locate(
    error: &figment::Error,
    section: &[String],
    field: &str,
    toml_sources: &[(String, String)],
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    let from_file = error
        .metadata
        .as_ref()
        .and_then(|m| m.source.as_ref())
        .and_then(|s| match s {
            figment::Source::File(path) => Some(path.display().to_string()),
            _ => None,
        });
    // Inline strings carry no file path; there is only one candidate then.
    let source = match from_file {
        Some(path) => toml_sources.iter().find(|(p, _)| *p == path),
        None if toml_sources.len() == 1 => toml_sources.first(),
        None => None,
    };
    let Some((path, content)) = source else {
        return (None, None);
    };
    match find_key_offset(content, section, field) {
        Some(offset) => (
            Some(SourceSpan::new(offset.into(), field.len())),
            Some(NamedSource::new(path, content.clone())),
        ),
        None => (None, None),
    }
}

/// Byte offset of `field` inside the table `[a.b]` named by `path`.
///
/// Only lines between that header and the next one are searched; an empty
/// path means the keys before the first header.
pub fn find_key_offset(content: &str, path: &[String], field: &str) -> Option<usize> {
    let wanted = path.join(".");
    let mut current = String::new();
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        let start = offset;
        offset += line.len();
        let trimmed = line.trim_start();
        if trimmed.starts_with('#') {
            continue;
        }
        if let Some(header) = trimmed.strip_prefix('[') {
            current = header
                .trim_start_matches('[')
                .split(']')
                .next()
                .unwrap_or_default()
                .trim()
                .to_string();
            continue;
        }
        if current != wanted {
            continue;
        }
        let Some(after) = trimmed.strip_prefix(field) else {
            continue;
        };
        if after.trim_start().starts_with('=') {
            return Some(start + (line.len() - trimmed.len()));
        }
    }
    None
}

/// Closest key in `valid_keys` by Jaro-Winkler similarity, if any is close.
pub fn suggest_key(unknown: &str, valid_keys: &[&str]) -> Option<String> {
    valid_keys
        .iter()
        .map(|key| (strsim::jaro_winkler(unknown, key), *key))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, key)| key.to_string())
}

/// Print each error to stderr with miette's graphical handler.
pub fn render_errors(errors: &[ConfigError]) {
    let handler = miette::GraphicalReportHandler::new();
    for error in errors {
        let mut buf = String::new();
        match handler.render_report(&mut buf, error) {
            Ok(()) => eprint!("{buf}"),
            Err(_) => eprintln!("Error: {error}"),
        }
    }
}
