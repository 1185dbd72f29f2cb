//! JWT encoding for claims
//!
//! Wire format: `base64url(header).base64url(payload).base64url(signature)`
//! with no padding. The signature is Ed25519 over the first two segments
//! exactly as they appear on the wire.

use super::validation::{validate, ValidationResults};
use crate::crypto::nkey::{self, KeyPair, NkeyError};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Algorithm written into every header we produce.
const ALGORITHM: &str = "ed25519-nkey";

/// Older tokens (including many credential files) use this name.
const LEGACY_ALGORITHM: &str = "ed25519";

#[derive(Debug, Error)]
pub enum ClaimError {
    #[error("Malformed claim: {0}")]
    Malformed(String),

    #[error("Unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Invalid issuer key: {0}")]
    InvalidIssuer(NkeyError),

    #[error("Signature does not match issuer")]
    BadSignature,

    #[error("Blocking validation issues: {0}")]
    Rejected(ValidationResults),

    #[error("Expected claim type {expected}, got {got:?}")]
    WrongType { expected: &'static str, got: String },

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Subject {sub} does not match issuer {iss}")]
    SubjectMismatch { iss: String, sub: String },

    #[error("Serialization failed: {0}")]
    Serialization(String),
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    typ: String,
    alg: String,
}

/// Generic claim payload.
///
/// Unknown JSON fields are ignored so that user claims from credential
/// files (which carry permissions and limits) decode as well.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    #[serde(default)]
    pub jti: String,

    #[serde(default)]
    pub iat: i64,

    #[serde(default)]
    pub iss: String,

    #[serde(default)]
    pub sub: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub claim_type: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    /// Nested section used by newer user claims (`nats.type == "user"`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nats: Option<NestedClaimData>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NestedClaimData {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub claim_type: Option<String>,
}

impl Claim {
    /// Claim type from the top level, falling back to the nested section.
    pub fn kind(&self) -> &str {
        if !self.claim_type.is_empty() {
            return &self.claim_type;
        }
        self.nats
            .as_ref()
            .and_then(|n| n.claim_type.as_deref())
            .unwrap_or("")
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

/// Current time as unix seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Sign a claim with `key`.
///
/// The issuer is always set to the signing key's public key, and a missing
/// issued-at time is filled with the current time.
pub fn encode(claim: &Claim, key: &KeyPair) -> Result<String, ClaimError> {
    let mut claim = claim.clone();
    claim.iss = key.public_key().to_string();
    if claim.iat == 0 {
        claim.iat = unix_now();
    }

    let header = Header {
        typ: "JWT".to_string(),
        alg: ALGORITHM.to_string(),
    };
    let header = serde_json::to_vec(&header).map_err(|e| ClaimError::Serialization(e.to_string()))?;
    let payload = serde_json::to_vec(&claim).map_err(|e| ClaimError::Serialization(e.to_string()))?;

    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(header),
        URL_SAFE_NO_PAD.encode(payload)
    );
    let signature = key.sign(signing_input.as_bytes());

    Ok(format!(
        "{}.{}",
        signing_input,
        URL_SAFE_NO_PAD.encode(signature)
    ))
}

/// Decode a token and verify its signature against the embedded issuer.
///
/// Never panics on arbitrary input.
pub fn decode(token: &str) -> Result<Claim, ClaimError> {
    let token = token.trim();
    let mut segments = token.split('.');
    let (Some(header), Some(payload), Some(signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(ClaimError::Malformed("expected three segments".to_string()));
    };

    let header: Header = decode_segment(header, "header")?;
    if !header.typ.eq_ignore_ascii_case("jwt") {
        return Err(ClaimError::Malformed(format!("unexpected type {}", header.typ)));
    }
    if header.alg != ALGORITHM && header.alg != LEGACY_ALGORITHM {
        return Err(ClaimError::UnsupportedAlgorithm(header.alg));
    }

    let claim: Claim = decode_segment(payload, "payload")?;
    if claim.iss.is_empty() {
        return Err(ClaimError::MissingField("iss"));
    }

    let signature = URL_SAFE_NO_PAD
        .decode(signature)
        .map_err(|e| ClaimError::Malformed(format!("signature: {e}")))?;

    // Signed bytes are the first two segments as received.
    let signed_len = token.len() - signature_segment_len(token);
    let signed = &token.as_bytes()[..signed_len];

    nkey::verify(&claim.iss, signed, &signature).map_err(|e| match e {
        NkeyError::InvalidSignature => ClaimError::BadSignature,
        other => ClaimError::InvalidIssuer(other),
    })?;

    Ok(claim)
}

/// Decode, verify and reject on any blocking (or time-check) issue.
pub fn decode_validated(
    token: &str,
    now: i64,
    audience: Option<&str>,
) -> Result<Claim, ClaimError> {
    let claim = decode(token)?;
    let vr = validate(&claim, now, audience);
    if vr.is_blocking(true) {
        return Err(ClaimError::Rejected(vr));
    }
    if !vr.is_empty() {
        tracing::debug!(jti = %claim.jti, issues = %vr, "accepting claim with informational issues");
    }
    Ok(claim)
}

fn decode_segment<T: serde::de::DeserializeOwned>(
    segment: &str,
    what: &str,
) -> Result<T, ClaimError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| ClaimError::Malformed(format!("{what}: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| ClaimError::Malformed(format!("{what}: {e}")))
}

/// Length of `.signature` at the end of the token.
fn signature_segment_len(token: &str) -> usize {
    token.rfind('.').map_or(0, |dot| token.len() - dot)
}
