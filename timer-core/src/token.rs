//! Signed handoff tokens: `base64url(payload) "." base64url(hmac_sha256(payload))`.
//!
//! The payload is canonical JSON with a fixed key order, so the same anchor
//! always yields the same token under the same key. Decoding verifies the
//! signature over the raw payload bytes before anything in them is read.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::latch::CountdownAnchor;

type HmacSha256 = Hmac<Sha256>;

/// Used when no handoff secret is configured. Anyone can forge tokens with it.
pub const FALLBACK_SECRET: &str = "dev-insecure-handoff-key";

/// Default token lifetime in seconds.
pub const DEFAULT_TOKEN_TTL: i64 = 86_400;

const B64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    #[error("handoff token is malformed")]
    Malformed,
    #[error("handoff token signature does not match")]
    BadSignature,
    #[error("handoff token has expired")]
    Expired,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffPayload {
    pub row: u32,
    pub origin: u64,
    pub anchored_at: i64,
    pub expires_at: i64,
}

impl HandoffPayload {
    /// Payload for `anchor` that expires [`DEFAULT_TOKEN_TTL`] after anchoring.
    pub fn for_anchor(row: u32, anchor: CountdownAnchor) -> Self {
        Self {
            row,
            origin: anchor.origin,
            anchored_at: anchor.anchored_at,
            expires_at: anchor.anchored_at.saturating_add(DEFAULT_TOKEN_TTL),
        }
    }

    pub fn anchor(&self) -> CountdownAnchor {
        CountdownAnchor::new(self.origin, self.anchored_at)
    }

    /// Compact JSON, keys in wire order.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        format!(
            r#"{{"row":{},"origin":{},"anchoredAt":{},"expiresAt":{}}}"#,
            self.row, self.origin, self.anchored_at, self.expires_at
        )
        .into_bytes()
    }
}

/// HMAC key holder for encoding and verifying tokens.
#[derive(Clone)]
pub struct Signer {
    key: Vec<u8>,
    fallback: bool,
}

impl Signer {
    /// An empty or missing secret selects [`FALLBACK_SECRET`].
    pub fn new(secret: Option<&str>) -> Self {
        match secret.filter(|s| !s.is_empty()) {
            Some(s) => Self {
                key: s.as_bytes().to_vec(),
                fallback: false,
            },
            None => Self {
                key: FALLBACK_SECRET.as_bytes().to_vec(),
                fallback: true,
            },
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback
    }

    fn digest(&self, bytes: &[u8]) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(&self.key).expect("HMAC accepts any key length");
        mac.update(bytes);
        mac.finalize().into_bytes().to_vec()
    }

    pub fn encode(&self, payload: &HandoffPayload) -> String {
        let bytes = payload.canonical_bytes();
        let sig = self.digest(&bytes);
        format!("{}.{}", B64.encode(&bytes), B64.encode(sig))
    }

    pub fn decode(&self, token: &str, now: i64) -> Result<HandoffPayload, TokenError> {
        let parts: Vec<&str> = token.trim().split('.').collect();
        let [payload_b64, sig_b64] = parts.as_slice() else {
            return Err(TokenError::Malformed);
        };
        let bytes = B64.decode(payload_b64).map_err(|_| TokenError::Malformed)?;
        let sig = B64.decode(sig_b64).map_err(|_| TokenError::Malformed)?;

        let expected = self.digest(&bytes);
        if expected.as_slice().ct_eq(sig.as_slice()).unwrap_u8() != 1 {
            return Err(TokenError::BadSignature);
        }

        let payload: HandoffPayload =
            serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)?;
        if payload.row < 1 {
            return Err(TokenError::Malformed);
        }
        if payload.expires_at < now {
            return Err(TokenError::Expired);
        }
        Ok(payload)
    }
}

pub fn encode(payload: &HandoffPayload, secret: &str) -> String {
    Signer::new(Some(secret)).encode(payload)
}

pub fn decode(token: &str, secret: &str, now: i64) -> Result<HandoffPayload, TokenError> {
    Signer::new(Some(secret)).decode(token, now)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> HandoffPayload {
        HandoffPayload {
            row: 7,
            origin: 120,
            anchored_at: 1000,
            expires_at: 1000 + DEFAULT_TOKEN_TTL,
        }
    }

    fn resign(bytes: &[u8], secret: &str) -> String {
        let sig = Signer::new(Some(secret)).digest(bytes);
        format!("{}.{}", B64.encode(bytes), B64.encode(sig))
    }

    #[test]
    fn test_round_trip() {
        let token = encode(&sample(), "k");
        assert_eq!(decode(&token, "k", 1050), Ok(sample()));
    }

    #[test]
    fn test_encoding_is_deterministic_and_unpadded() {
        let a = encode(&sample(), "k");
        let b = encode(&sample(), "k");
        assert_eq!(a, b);
        assert!(!a.contains('='));
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || "-_.".contains(c)));
        assert_eq!(a.matches('.').count(), 1);
    }

    #[test]
    fn test_canonical_bytes() {
        assert_eq!(
            sample().canonical_bytes(),
            br#"{"row":7,"origin":120,"anchoredAt":1000,"expiresAt":87400}"#.to_vec()
        );
    }

    #[test]
    fn test_padded_input_accepted() {
        let token = encode(&sample(), "k");
        let (p, s) = token.split_once('.').unwrap();
        let pad = |part: &str| format!("{}{}", part, "=".repeat((4 - part.len() % 4) % 4));
        let padded = format!("{}.{}", pad(p), pad(s));
        assert_eq!(decode(&padded, "k", 1050), Ok(sample()));
    }

    #[test]
    fn test_malformed_shapes() {
        assert_eq!(decode("", "k", 0), Err(TokenError::Malformed));
        assert_eq!(decode("abc", "k", 0), Err(TokenError::Malformed));
        assert_eq!(decode("a.b.c", "k", 0), Err(TokenError::Malformed));
        assert_eq!(decode("!!!.???", "k", 0), Err(TokenError::Malformed));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let token = encode(&sample(), "k");
        let (p, s) = token.split_once('.').unwrap();
        let mut bytes = B64.decode(p).unwrap();
        // "row":7 -> "row":8
        let idx = bytes.iter().position(|&b| b == b'7').unwrap();
        bytes[idx] = b'8';
        let forged = format!("{}.{}", B64.encode(&bytes), s);
        assert_eq!(decode(&forged, "k", 1050), Err(TokenError::BadSignature));
    }

    #[test]
    fn test_cross_secret_rejected() {
        let token = encode(&sample(), "A");
        assert_eq!(decode(&token, "B", 1050), Err(TokenError::BadSignature));
    }

    #[test]
    fn test_expired_after_valid_signature() {
        let token = encode(&sample(), "k");
        assert_eq!(decode(&token, "k", 87_400), Ok(sample()));
        assert_eq!(decode(&token, "k", 87_401), Err(TokenError::Expired));
    }

    #[test]
    fn test_signed_garbage_is_malformed() {
        let token = resign(br#"{"row":1,"origin":5}"#, "k");
        assert_eq!(decode(&token, "k", 0), Err(TokenError::Malformed));
        let token = resign(br#"{"row":0,"origin":5,"anchoredAt":1,"expiresAt":9}"#, "k");
        assert_eq!(decode(&token, "k", 0), Err(TokenError::Malformed));
        let token = resign(b"not json", "k");
        assert_eq!(decode(&token, "k", 0), Err(TokenError::Malformed));
    }

    #[test]
    fn test_fallback_signer() {
        assert!(Signer::new(None).is_fallback());
        assert!(Signer::new(Some("")).is_fallback());
        assert!(!Signer::new(Some("s3cret")).is_fallback());

        let token = Signer::new(None).encode(&sample());
        assert_eq!(decode(&token, FALLBACK_SECRET, 1050), Ok(sample()));
    }

    #[test]
    fn test_payload_anchor_round_trip() {
        let anchor = CountdownAnchor::new(120, 1000);
        let payload = HandoffPayload::for_anchor(3, anchor);
        assert_eq!(payload.expires_at, 1000 + DEFAULT_TOKEN_TTL);
        assert_eq!(payload.anchor(), anchor);
    }
}
