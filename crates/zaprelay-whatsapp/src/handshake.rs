// SPDX-FileCopyrightText: 2026 Zaprelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook registration handshake shared by both providers.

use serde::Deserialize;

/// Query string of a `GET` verification request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HandshakeQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Returns the challenge to echo when the handshake is valid.
///
/// Requires `hub.mode=subscribe`, a configured token equal to the
/// presented one, and a challenge. Without a configured token every
/// handshake is refused.
pub fn verify_handshake(query: &HandshakeQuery, expected_token: Option<&str>) -> Option<String> {
    let expected = expected_token.filter(|t| !t.is_empty())?;
    if query.mode.as_deref() != Some("subscribe") {
        return None;
    }
    if query.verify_token.as_deref() != Some(expected) {
        return None;
    }
    query.challenge.clone()
}
