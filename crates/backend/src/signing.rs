// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SigningService: SAS-style signed query strings for buffer access
//! (spec §4.6). Holds up to two asymmetric key pairs — `primary` and an
//! optional `secondary` — so keys can be rotated without downtime: new
//! tokens always sign under `primary`, but verification accepts a
//! signature produced by either key (spec invariant I4).
//!
//! Keys are process-wide and read-only after startup; a rotation is
//! modeled as a process restart with new keys, not a live reload (spec
//! §5).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use rsa::pkcs1v15::{SigningKey, VerifyingKey};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use std::fmt;
use thiserror::Error;
use tyger_core::BufferId;

/// Bitflag-style set of actions a SAS query string authorizes, matching
/// the wire contract's `actions ∈ {Create, Read}` field (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SasAction {
    bits: u8,
}

impl SasAction {
    pub const CREATE: SasAction = SasAction { bits: 0b01 };
    pub const READ: SasAction = SasAction { bits: 0b10 };

    pub fn union(self, other: SasAction) -> SasAction {
        SasAction { bits: self.bits | other.bits }
    }

    pub fn contains(self, other: SasAction) -> bool {
        self.bits & other.bits == other.bits
    }

    fn canonical(self) -> String {
        let mut parts = Vec::new();
        if self.contains(SasAction::CREATE) {
            parts.push("Create");
        }
        if self.contains(SasAction::READ) {
            parts.push("Read");
        }
        parts.join(",")
    }
}

impl fmt::Display for SasAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    Blob,
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Blob")
    }
}

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("failed to sign SAS query string: {0}")]
    Sign(String),
    #[error("SAS query string failed verification")]
    Invalid,
    #[error("malformed SAS query string: {0}")]
    Malformed(String),
}

/// The canonical (unsigned) fields of a SAS query string, in the exact
/// order the wire contract signs over (spec §6): `bufferId`,
/// `resourceType`, `actions`, `expiry`, `version`.
#[derive(Debug, Clone, PartialEq)]
pub struct SasFields {
    pub buffer_id: String,
    pub resource_type: ResourceType,
    pub actions: SasAction,
    pub expiry: DateTime<Utc>,
}

const VERSION: &str = "1.0";

impl SasFields {
    fn canonical_string(&self) -> String {
        format!(
            "bufferId={}&resourceType={}&actions={}&expiry={}&version={}",
            self.buffer_id,
            self.resource_type,
            self.actions,
            self.expiry.to_rfc3339(),
            VERSION,
        )
    }

    fn to_query_string(&self, signature: &str) -> String {
        format!("{}&signature={}", self.canonical_string(), signature)
    }
}

pub struct SigningService {
    primary: SigningKey<Sha256>,
    primary_verify: VerifyingKey<Sha256>,
    secondary_verify: Option<VerifyingKey<Sha256>>,
}

impl SigningService {
    pub fn new(primary: RsaPrivateKey, secondary_public: Option<RsaPublicKey>) -> Self {
        let primary_public = RsaPublicKey::from(&primary);
        Self {
            primary: SigningKey::<Sha256>::new(primary),
            primary_verify: VerifyingKey::<Sha256>::new(primary_public),
            secondary_verify: secondary_public.map(VerifyingKey::<Sha256>::new),
        }
    }

    /// Produces a compact, URL-safe query string authorizing `actions`
    /// on `buffer_id` until `ttl` from now, signed with the primary key.
    pub fn sign_sas_query_string(
        &self,
        buffer_id: &BufferId,
        resource_type: ResourceType,
        actions: SasAction,
        ttl: chrono::Duration,
        now: DateTime<Utc>,
    ) -> Result<String, SigningError> {
        let fields = SasFields {
            buffer_id: buffer_id.as_str().to_string(),
            resource_type,
            actions,
            expiry: now + ttl,
        };
        let mut rng = rsa::rand_core::OsRng;
        let signature = self
            .primary
            .try_sign_with_rng(&mut rng, fields.canonical_string().as_bytes())
            .map_err(|e| SigningError::Sign(e.to_string()))?;
        let encoded = URL_SAFE_NO_PAD.encode(signature.to_bytes());
        Ok(fields.to_query_string(&encoded))
    }

    /// Verifies a query string produced by [`sign_sas_query_string`],
    /// accepting a signature from either the primary or (if configured)
    /// the secondary key.
    pub fn verify(&self, query_string: &str, now: DateTime<Utc>) -> Result<SasFields, SigningError> {
        let fields = parse_query_string(query_string)?;
        if fields.expiry < now {
            return Err(SigningError::Invalid);
        }
        let signature_b64 = query_string
            .split('&')
            .find_map(|pair| pair.strip_prefix("signature="))
            .ok_or_else(|| SigningError::Malformed("missing signature field".to_string()))?;
        let raw = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|e| SigningError::Malformed(e.to_string()))?;
        let signature = rsa::pkcs1v15::Signature::try_from(raw.as_slice())
            .map_err(|e| SigningError::Malformed(e.to_string()))?;
        let message = fields.canonical_string();

        let verifies_primary = self.primary_verify.verify(message.as_bytes(), &signature).is_ok();
        let verifies_secondary = self
            .secondary_verify
            .as_ref()
            .map(|key| key.verify(message.as_bytes(), &signature).is_ok())
            .unwrap_or(false);

        if verifies_primary || verifies_secondary {
            Ok(fields)
        } else {
            Err(SigningError::Invalid)
        }
    }
}

fn parse_query_string(query_string: &str) -> Result<SasFields, SigningError> {
    let mut buffer_id = None;
    let mut resource_type = None;
    let mut actions = SasAction { bits: 0 };
    let mut expiry = None;

    for pair in query_string.split('&') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        match key {
            "bufferId" => buffer_id = Some(value.to_string()),
            "resourceType" => {
                resource_type = match value {
                    "Blob" => Some(ResourceType::Blob),
                    other => return Err(SigningError::Malformed(format!("unknown resourceType {other}"))),
                }
            }
            "actions" => {
                for action in value.split(',') {
                    actions = actions.union(match action {
                        "Create" => SasAction::CREATE,
                        "Read" => SasAction::READ,
                        "" => SasAction { bits: 0 },
                        other => return Err(SigningError::Malformed(format!("unknown action {other}"))),
                    });
                }
            }
            "expiry" => {
                expiry = Some(
                    DateTime::parse_from_rfc3339(value)
                        .map_err(|e| SigningError::Malformed(e.to_string()))?
                        .with_timezone(&Utc),
                )
            }
            _ => {}
        }
    }

    Ok(SasFields {
        buffer_id: buffer_id.ok_or_else(|| SigningError::Malformed("missing bufferId".to_string()))?,
        resource_type: resource_type.ok_or_else(|| SigningError::Malformed("missing resourceType".to_string()))?,
        actions,
        expiry: expiry.ok_or_else(|| SigningError::Malformed("missing expiry".to_string()))?,
    })
}

#[cfg(test)]
#[path = "signing_tests.rs"]
mod tests;
