// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session credentials.
//!
//! A session credential lets an address request keys for one package for a
//! limited time without signing every request with its long-term key. The
//! address signs a personal message certifying a fresh session key once; the
//! session key then signs each key request.

use std::sync::Arc;

use base64ct::{Base64, Encoding};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use ring::signature::{Ed25519KeyPair, KeyPair, UnparsedPublicKey, ED25519};
use serde::{Deserialize, Serialize};

use super::error::GatewayError;
use super::object::{random_array, KeyShare, PolicyTuple};
use crate::chain::ObjectId;
use crate::encoding::hex_bytes;
use crate::identity::{Address, IntentScope, Signature};

/// Shortest accepted session lifetime in minutes.
pub const MIN_TTL_MIN: u16 = 1;
/// Longest accepted session lifetime in minutes.
pub const MAX_TTL_MIN: u16 = 30;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("TTL of {0} minute(s) is outside 1..=30")]
    InvalidTtl(u16),

    #[error("Personal message signed by {actual}, expected {expected}")]
    WrongSigner { expected: Address, actual: Address },

    #[error("Personal message signature is invalid")]
    BadSignature,

    #[error("Session key generation failed: {0}")]
    KeyGeneration(String),
}

/// The message an address signs to certify a session key.
pub fn certificate_message(
    package_id: &ObjectId,
    ttl_min: u16,
    creation_time: &DateTime<Utc>,
    session_public_key: &[u8],
) -> String {
    format!(
        "Accessing keys of package {package_id} for {ttl_min} mins from {}, session key {}",
        creation_time.format("%Y-%m-%d %H:%M:%S UTC"),
        Base64::encode_string(session_public_key),
    )
}

/// Short-lived, address-bound authorization to request decryption keys.
#[derive(Clone)]
pub struct SessionCredential {
    address: Address,
    package_id: ObjectId,
    creation_time: DateTime<Utc>,
    ttl_min: u16,
    session_key: Arc<Ed25519KeyPair>,
    personal_message_signature: Option<Signature>,
}

impl SessionCredential {
    /// Start a session for `address` now.
    pub fn new(address: Address, package_id: ObjectId, ttl_min: u16) -> Result<Self, SessionError> {
        Self::new_at(address, package_id, ttl_min, Utc::now())
    }

    /// Start a session with an explicit creation time.
    pub fn new_at(
        address: Address,
        package_id: ObjectId,
        ttl_min: u16,
        creation_time: DateTime<Utc>,
    ) -> Result<Self, SessionError> {
        if !(MIN_TTL_MIN..=MAX_TTL_MIN).contains(&ttl_min) {
            return Err(SessionError::InvalidTtl(ttl_min));
        }

        let seed = random_array::<32>().map_err(|e| SessionError::KeyGeneration(e.to_string()))?;
        let session_key = Ed25519KeyPair::from_seed_unchecked(&seed)
            .map_err(|e| SessionError::KeyGeneration(e.to_string()))?;

        Ok(Self {
            address,
            package_id,
            creation_time,
            ttl_min,
            session_key: Arc::new(session_key),
            personal_message_signature: None,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn package_id(&self) -> ObjectId {
        self.package_id
    }

    pub fn ttl_min(&self) -> u16 {
        self.ttl_min
    }

    pub fn session_public_key(&self) -> &[u8] {
        self.session_key.public_key().as_ref()
    }

    /// Message the owning address must sign before the session is usable.
    pub fn personal_message(&self) -> Vec<u8> {
        certificate_message(
            &self.package_id,
            self.ttl_min,
            &self.creation_time,
            self.session_public_key(),
        )
        .into_bytes()
    }

    /// Attach the owner's signature over [`Self::personal_message`].
    pub fn set_personal_message_signature(
        &mut self,
        signature: Signature,
    ) -> Result<(), SessionError> {
        let signer = signature
            .verify(IntentScope::PersonalMessage, &self.personal_message())
            .map_err(|_| SessionError::BadSignature)?;
        if signer != self.address {
            return Err(SessionError::WrongSigner {
                expected: self.address,
                actual: signer,
            });
        }
        self.personal_message_signature = Some(signature);
        Ok(())
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.creation_time + ChronoDuration::minutes(i64::from(self.ttl_min))
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }

    /// Portable certificate presented to key servers.
    pub fn certificate(&self) -> Result<Certificate, GatewayError> {
        let signature = self
            .personal_message_signature
            .clone()
            .ok_or(GatewayError::UnsignedSession {
                address: self.address,
            })?;

        Ok(Certificate {
            address: self.address,
            package_id: self.package_id,
            creation_time: self.creation_time,
            ttl_min: self.ttl_min,
            session_public_key: self.session_public_key().to_vec(),
            signature,
        })
    }

    /// Sign a key request body with the session key.
    pub fn sign_request(&self, body: &[u8]) -> Vec<u8> {
        self.session_key.sign(body).as_ref().to_vec()
    }
}

impl std::fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCredential")
            .field("address", &self.address)
            .field("package_id", &self.package_id)
            .field("creation_time", &self.creation_time)
            .field("ttl_min", &self.ttl_min)
            .field("signed", &self.personal_message_signature.is_some())
            .finish_non_exhaustive()
    }
}

/// Signed statement that `address` delegated to `session_public_key`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Certificate {
    pub address: Address,
    pub package_id: ObjectId,
    pub creation_time: DateTime<Utc>,
    pub ttl_min: u16,
    #[serde(with = "hex_bytes")]
    pub session_public_key: Vec<u8>,
    pub signature: Signature,
}

impl Certificate {
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.creation_time + ChronoDuration::minutes(i64::from(self.ttl_min))
    }

    /// Check signature, signer and lifetime.
    pub fn verify(&self, now: DateTime<Utc>) -> Result<(), GatewayError> {
        if !(MIN_TTL_MIN..=MAX_TTL_MIN).contains(&self.ttl_min) {
            return Err(GatewayError::Unauthorized(format!(
                "certificate ttl {} out of range",
                self.ttl_min
            )));
        }

        let message = certificate_message(
            &self.package_id,
            self.ttl_min,
            &self.creation_time,
            &self.session_public_key,
        );
        let signer = self
            .signature
            .verify(IntentScope::PersonalMessage, message.as_bytes())
            .map_err(|_| GatewayError::Unauthorized("bad certificate signature".to_string()))?;
        if signer != self.address {
            return Err(GatewayError::Unauthorized(format!(
                "certificate signed by {signer}, not {}",
                self.address
            )));
        }

        if now >= self.expires_at() {
            return Err(GatewayError::Expired {
                expired_at: self.expires_at(),
            });
        }
        Ok(())
    }

    /// Verify a request signature made with the certified session key.
    pub fn verify_request(&self, body: &[u8], signature: &[u8]) -> Result<(), GatewayError> {
        UnparsedPublicKey::new(&ED25519, &self.session_public_key)
            .verify(body, signature)
            .map_err(|_| GatewayError::Unauthorized("bad request signature".to_string()))
    }
}

/// Request to one key server for its share of a data key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyRequest {
    #[serde(with = "hex_bytes")]
    pub tx_bytes: Vec<u8>,
    pub policy: PolicyTuple,
    pub share: KeyShare,
    pub certificate: Certificate,
    #[serde(with = "hex_bytes")]
    pub request_signature: Vec<u8>,
}

/// Bytes the session key signs for a request: policy-check transaction
/// followed by the policy tuple.
pub fn request_body(tx_bytes: &[u8], policy: &PolicyTuple) -> Vec<u8> {
    let mut body = Vec::with_capacity(tx_bytes.len() + 64);
    body.extend_from_slice(tx_bytes);
    body.extend_from_slice(&policy.aad());
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;

    fn package() -> ObjectId {
        "0x2".parse().unwrap()
    }

    fn signed_session(identity: &Identity, created: DateTime<Utc>) -> SessionCredential {
        let mut session =
            SessionCredential::new_at(identity.address(), package(), 10, created).unwrap();
        let sig = identity.sign_personal_message(&session.personal_message());
        session.set_personal_message_signature(sig).unwrap();
        session
    }

    #[test]
    fn ttl_bounds_are_enforced() {
        let addr = Address::new([1; 32]);
        assert!(matches!(
            SessionCredential::new(addr, package(), 0),
            Err(SessionError::InvalidTtl(0))
        ));
        assert!(SessionCredential::new(addr, package(), 31).is_err());
        assert!(SessionCredential::new(addr, package(), 30).is_ok());
    }

    #[test]
    fn rejects_signature_from_other_identity() {
        let owner = Identity::generate("owner").unwrap();
        let other = Identity::generate("other").unwrap();
        let mut session = SessionCredential::new(owner.address(), package(), 10).unwrap();

        let sig = other.sign_personal_message(&session.personal_message());
        assert!(matches!(
            session.set_personal_message_signature(sig),
            Err(SessionError::WrongSigner { .. })
        ));
        assert!(matches!(
            session.certificate(),
            Err(GatewayError::UnsignedSession { .. })
        ));
    }

    #[test]
    fn certificate_verifies_until_expiry() {
        let identity = Identity::generate("agent").unwrap();
        let created = Utc::now();
        let cert = signed_session(&identity, created).certificate().unwrap();

        assert!(cert.verify(created + ChronoDuration::minutes(9)).is_ok());
        assert!(matches!(
            cert.verify(created + ChronoDuration::minutes(10)),
            Err(GatewayError::Expired { .. })
        ));
    }

    #[test]
    fn tampered_certificate_is_rejected() {
        let identity = Identity::generate("agent").unwrap();
        let mut cert = signed_session(&identity, Utc::now()).certificate().unwrap();
        cert.ttl_min = 20;
        assert!(cert.verify(Utc::now()).unwrap_err().is_unauthorized());
    }

    #[test]
    fn request_signatures_use_session_key() {
        let identity = Identity::generate("agent").unwrap();
        let session = signed_session(&identity, Utc::now());
        let cert = session.certificate().unwrap();

        let sig = session.sign_request(b"body");
        assert!(cert.verify_request(b"body", &sig).is_ok());
        assert!(cert.verify_request(b"other", &sig).is_err());
    }
}
