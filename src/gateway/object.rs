// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Encrypted object envelope.
//!
//! A payload is encrypted once with a random data key (AES-256-GCM, the
//! policy tuple as associated data). The data key is then wrapped separately
//! for every key server: an ephemeral X25519 agreement with the server's
//! public key, bound to the policy tuple and server id through HMAC-SHA256,
//! yields the wrapping key. Only a server that approves the policy check can
//! unwrap its share.

use hmac::{Hmac, Mac};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::error::GatewayError;
use crate::chain::ObjectId;
use crate::encoding::hex_bytes;

/// Current envelope format version.
pub const ENVELOPE_VERSION: u8 = 1;

/// Symmetric key length in bytes.
pub const KEY_LEN: usize = 32;

/// Encryption/decryption scope: package plus identity bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyTuple {
    pub package_id: ObjectId,
    #[serde(with = "hex_bytes")]
    pub id: Vec<u8>,
}

impl PolicyTuple {
    pub fn new(package_id: ObjectId, id: Vec<u8>) -> Self {
        Self { package_id, id }
    }

    /// Scope data under a whitelist: the id is the whitelist object id.
    pub fn for_whitelist(package_id: ObjectId, whitelist_id: ObjectId) -> Self {
        Self::new(package_id, whitelist_id.as_bytes().to_vec())
    }

    /// Associated data binding ciphertexts to this tuple.
    pub fn aad(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(32 + self.id.len());
        out.extend_from_slice(self.package_id.as_bytes());
        out.extend_from_slice(&self.id);
        out
    }
}

/// Data key wrapped for one key server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyShare {
    pub server_id: ObjectId,
    #[serde(with = "hex_bytes")]
    pub ephemeral_public: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub nonce: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub wrapped_key: Vec<u8>,
}

/// Ciphertext plus everything needed to re-derive its policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedObject {
    pub version: u8,
    pub policy: PolicyTuple,
    pub threshold: u8,
    pub shares: Vec<KeyShare>,
    #[serde(with = "hex_bytes")]
    pub nonce: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub ciphertext: Vec<u8>,
}

impl EncryptedObject {
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, GatewayError> {
        let object: Self = serde_json::from_slice(bytes)
            .map_err(|e| GatewayError::InvalidCiphertext(e.to_string()))?;

        if object.version != ENVELOPE_VERSION {
            return Err(GatewayError::InvalidCiphertext(format!(
                "unsupported envelope version {}",
                object.version
            )));
        }
        if object.threshold == 0 || usize::from(object.threshold) > object.shares.len() {
            return Err(GatewayError::InvalidCiphertext(format!(
                "threshold {} with {} share(s)",
                object.threshold,
                object.shares.len()
            )));
        }
        Ok(object)
    }
}

/// Symmetric data key. Returned from encryption as an escrow backup.
#[derive(Clone, PartialEq, Eq)]
pub struct DataKey([u8; KEY_LEN]);

impl DataKey {
    pub fn generate() -> Result<Self, GatewayError> {
        random_array().map(Self)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, GatewayError> {
        let array: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| GatewayError::Crypto(format!("expected {KEY_LEN}-byte key")))?;
        Ok(Self(array))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Debug for DataKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DataKey(..)")
    }
}

pub(crate) fn random_array<const N: usize>() -> Result<[u8; N], GatewayError> {
    let mut out = [0u8; N];
    SystemRandom::new()
        .fill(&mut out)
        .map_err(|_| GatewayError::Crypto("randomness unavailable".to_string()))?;
    Ok(out)
}

/// AES-256-GCM encrypt; returns ciphertext with the tag appended.
pub(crate) fn seal(
    key: &[u8; KEY_LEN],
    nonce: [u8; NONCE_LEN],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, GatewayError> {
    let key = aead_key(key)?;
    let mut in_out = plaintext.to_vec();
    key.seal_in_place_append_tag(
        Nonce::assume_unique_for_key(nonce),
        Aad::from(aad),
        &mut in_out,
    )
    .map_err(|_| GatewayError::Crypto("seal failed".to_string()))?;
    Ok(in_out)
}

/// AES-256-GCM decrypt and authenticate.
pub(crate) fn open(
    key: &[u8; KEY_LEN],
    nonce: &[u8],
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, GatewayError> {
    let nonce: [u8; NONCE_LEN] = nonce
        .try_into()
        .map_err(|_| GatewayError::InvalidCiphertext("bad nonce length".to_string()))?;
    let key = aead_key(key)?;
    let mut in_out = ciphertext.to_vec();
    let plaintext = key
        .open_in_place(Nonce::assume_unique_for_key(nonce), Aad::from(aad), &mut in_out)
        .map_err(|_| GatewayError::InvalidCiphertext("authentication failed".to_string()))?;
    Ok(plaintext.to_vec())
}

fn aead_key(key: &[u8; KEY_LEN]) -> Result<LessSafeKey, GatewayError> {
    UnboundKey::new(&AES_256_GCM, key)
        .map(LessSafeKey::new)
        .map_err(|_| GatewayError::Crypto("invalid AES key".to_string()))
}

/// Wrapping key for one server's share.
pub(crate) fn wrapping_key(
    shared_secret: &[u8],
    policy: &PolicyTuple,
    server_id: &ObjectId,
) -> Result<[u8; KEY_LEN], GatewayError> {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(shared_secret)
        .map_err(|e| GatewayError::Crypto(e.to_string()))?;
    mac.update(b"data-wallet/key-share/v1");
    mac.update(server_id.as_bytes());
    mac.update(&policy.aad());
    Ok(mac.finalize().into_bytes().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> PolicyTuple {
        PolicyTuple::for_whitelist("0x2".parse().unwrap(), ObjectId::new([7; 32]))
    }

    #[test]
    fn seal_open_binds_associated_data() {
        let key = DataKey::generate().unwrap();
        let nonce = random_array::<NONCE_LEN>().unwrap();
        let sealed = seal(key.as_bytes(), nonce, &policy().aad(), b"secret").unwrap();

        assert_eq!(
            open(key.as_bytes(), &nonce, &policy().aad(), &sealed).unwrap(),
            b"secret"
        );

        let other = PolicyTuple::for_whitelist("0x2".parse().unwrap(), ObjectId::new([8; 32]));
        assert!(open(key.as_bytes(), &nonce, &other.aad(), &sealed).is_err());
    }

    #[test]
    fn wrapping_key_depends_on_server_and_policy() {
        let secret = [5u8; 32];
        let a = wrapping_key(&secret, &policy(), &ObjectId::new([1; 32])).unwrap();
        let b = wrapping_key(&secret, &policy(), &ObjectId::new([2; 32])).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_inconsistent_threshold() {
        let object = EncryptedObject {
            version: ENVELOPE_VERSION,
            policy: policy(),
            threshold: 2,
            shares: Vec::new(),
            nonce: vec![0; NONCE_LEN],
            ciphertext: Vec::new(),
        };
        assert!(matches!(
            EncryptedObject::from_bytes(&object.to_bytes()),
            Err(GatewayError::InvalidCiphertext(_))
        ));
        assert!(EncryptedObject::from_bytes(b"not json").is_err());
    }

    #[test]
    fn data_key_debug_is_redacted() {
        let key = DataKey::generate().unwrap();
        assert_eq!(format!("{key:?}"), "DataKey(..)");
        assert_eq!(key.to_hex().len(), 64);
    }
}
