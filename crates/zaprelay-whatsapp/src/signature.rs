// SPDX-FileCopyrightText: 2026 Zaprelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `X-Hub-Signature-256` verification for Cloud API webhooks.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header Meta signs webhook bodies with.
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Outcome of a signature check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureCheck {
    /// No app secret configured; nothing to verify against.
    Skipped,
    Valid,
    /// Header absent or empty.
    Missing,
    /// Header present but not a valid HMAC of the body.
    Invalid,
}

impl SignatureCheck {
    /// True when the payload may be processed under strict enforcement.
    pub fn is_acceptable(self) -> bool {
        matches!(self, Self::Skipped | Self::Valid)
    }
}

/// Verifies an HMAC-SHA256 hex signature (optionally `sha256=`-prefixed)
/// over the raw request body. Comparison is constant-time.
pub fn verify_signature(
    app_secret: Option<&str>,
    signature_header: Option<&str>,
    body: &[u8],
) -> SignatureCheck {
    let Some(secret) = app_secret.filter(|s| !s.is_empty()) else {
        return SignatureCheck::Skipped;
    };
    let signature = signature_header.unwrap_or("").trim();
    let signature = signature.strip_prefix("sha256=").unwrap_or(signature).trim();
    if signature.is_empty() {
        return SignatureCheck::Missing;
    }
    let Ok(expected) = hex::decode(signature) else {
        return SignatureCheck::Invalid;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return SignatureCheck::Invalid;
    };
    mac.update(body);
    if mac.verify_slice(&expected).is_ok() {
        SignatureCheck::Valid
    } else {
        SignatureCheck::Invalid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn valid_signature_passes() {
        let body = br#"{"object":"whatsapp_business_account"}"#;
        let header = sign("s3cret", body);
        assert_eq!(
            verify_signature(Some("s3cret"), Some(&header), body),
            SignatureCheck::Valid
        );
    }

    #[test]
    fn unprefixed_signature_passes() {
        let body = b"{}";
        let header = sign("s3cret", body);
        let bare = header.trim_start_matches("sha256=");
        assert_eq!(
            verify_signature(Some("s3cret"), Some(bare), body),
            SignatureCheck::Valid
        );
    }

    #[test]
    fn tampered_body_is_invalid() {
        let header = sign("s3cret", b"original");
        assert_eq!(
            verify_signature(Some("s3cret"), Some(&header), b"tampered"),
            SignatureCheck::Invalid
        );
    }

    #[test]
    fn non_hex_is_invalid_and_absent_is_missing() {
        assert_eq!(
            verify_signature(Some("k"), Some("sha256=zzzz"), b"x"),
            SignatureCheck::Invalid
        );
        assert_eq!(verify_signature(Some("k"), None, b"x"), SignatureCheck::Missing);
        assert!(!SignatureCheck::Missing.is_acceptable());
    }

    #[test]
    fn no_secret_skips_check() {
        let check = verify_signature(None, Some("sha256=00"), b"x");
        assert_eq!(check, SignatureCheck::Skipped);
        assert!(check.is_acceptable());
        assert_eq!(verify_signature(Some(""), None, b"x"), SignatureCheck::Skipped);
    }
}
