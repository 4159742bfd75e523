// SPDX-FileCopyrightText: 2026 Zaprelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WhatsApp adapters for the zaprelay sales relay.
//!
//! Two providers deliver the same conversations:
//! - the official Cloud API (Meta Graph `messages` endpoint and
//!   `whatsapp_business_account` webhooks, HMAC-signed);
//! - the Whapi gateway, one account per seller plus a router account.
//!
//! Webhook parsers normalise both wire shapes into
//! [`InboundEvent`](zaprelay_core::types::InboundEvent)s; the channels
//! implement [`ChannelAdapter`](zaprelay_core::ChannelAdapter) for sends.

pub mod cloud_channel;
pub mod cloud_webhook;
pub mod handshake;
pub mod signature;
pub mod whapi_channel;
pub mod whapi_webhook;

pub use cloud_channel::CloudChannel;
pub use cloud_webhook::parse_cloud_payload;
pub use handshake::{verify_handshake, HandshakeQuery};
pub use signature::{verify_signature, SignatureCheck, SIGNATURE_HEADER};
pub use whapi_channel::WhapiChannel;
pub use whapi_webhook::parse_whapi_payload;

use zaprelay_core::types::{format_timestamp, normalize_phone};

/// WhatsApp rejects text bodies longer than this.
pub const MAX_MESSAGE_LENGTH: usize = 4096;

/// Truncates on a char boundary to [`MAX_MESSAGE_LENGTH`] characters.
pub(crate) fn truncate_message(content: &str) -> String {
    if content.chars().count() <= MAX_MESSAGE_LENGTH {
        return content.to_string();
    }
    let mut out: String = content.chars().take(MAX_MESSAGE_LENGTH - 3).collect();
    out.push_str("...");
    out
}

/// Stored content for non-text messages: the caption, or `[kind]`.
pub(crate) fn media_label(kind: &str, caption: Option<&str>) -> String {
    caption
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("[{kind}]"))
}

pub(crate) fn normalize_sender(raw: &str) -> Option<String> {
    normalize_phone(raw)
}

pub(crate) fn unix_timestamp(secs: i64) -> Option<String> {
    chrono::DateTime::from_timestamp(secs, 0).map(format_timestamp)
}
