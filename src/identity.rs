// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ed25519 identities, ledger addresses and intent-scoped signatures.
//!
//! Every role in the demo (owner and agents) is an [`Identity`] loaded from a
//! base64-encoded 32-byte seed. The address derived from its public key is the
//! principal used by whitelists, transactions and session credentials.
//!
//! Signatures are always taken over an *intent digest*: a three-byte intent
//! prefix (scope, version, app id) followed by the message, hashed with
//! SHA-256. A transaction signature therefore can never be replayed as a
//! personal-message signature and vice versa.

use base64ct::{Base64, Encoding};
use ring::{
    rand::{SecureRandom, SystemRandom},
    signature::{Ed25519KeyPair, KeyPair, UnparsedPublicKey, ED25519},
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::encoding::{hex_bytes, hex_id32};

/// Signature scheme flag for Ed25519 keys.
pub const ED25519_FLAG: u8 = 0x00;

/// Length of an Ed25519 seed in bytes.
pub const SEED_LEN: usize = 32;

/// Ledger address: SHA-256 of the scheme flag followed by the public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 32]);

hex_id32!(Address);

impl Address {
    /// Derive the address of an Ed25519 public key.
    pub fn from_public_key(public_key: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update([ED25519_FLAG]);
        hasher.update(public_key);
        Self(hasher.finalize().into())
    }
}

/// What a signature is allowed to authorize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IntentScope {
    TransactionData = 0,
    PersonalMessage = 3,
}

/// SHA-256 over `[scope, version, app_id] || message`.
pub fn intent_digest(scope: IntentScope, message: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update([scope as u8, 0, 0]);
    hasher.update(message);
    hasher.finalize().into()
}

/// Errors raised while loading keys or checking signatures.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("Invalid secret key encoding: {0}")]
    InvalidEncoding(String),

    #[error("Invalid secret key: {0}")]
    InvalidKey(String),

    #[error("Signature verification failed")]
    BadSignature,

    #[error("Randomness unavailable")]
    Randomness,
}

/// Ed25519 signature together with the signer's public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    #[serde(with = "hex_bytes")]
    pub signature: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub public_key: Vec<u8>,
}

impl Signature {
    /// Address of the key that produced this signature.
    pub fn signer(&self) -> Address {
        Address::from_public_key(&self.public_key)
    }

    /// Verify the signature over `message` under `scope`.
    ///
    /// Returns the signer address on success.
    pub fn verify(&self, scope: IntentScope, message: &[u8]) -> Result<Address, IdentityError> {
        let digest = intent_digest(scope, message);
        UnparsedPublicKey::new(&ED25519, &self.public_key)
            .verify(&digest, &self.signature)
            .map_err(|_| IdentityError::BadSignature)?;
        Ok(self.signer())
    }
}

/// A named keypair acting as one role of the scenario.
pub struct Identity {
    label: String,
    keypair: Ed25519KeyPair,
    address: Address,
}

impl Identity {
    /// Load an identity from a base64-encoded 32-byte seed.
    pub fn from_base64_secret(
        label: impl Into<String>,
        secret: &str,
    ) -> Result<Self, IdentityError> {
        let bytes = Base64::decode_vec(secret.trim())
            .map_err(|e| IdentityError::InvalidEncoding(e.to_string()))?;
        let seed: [u8; SEED_LEN] = bytes.as_slice().try_into().map_err(|_| {
            IdentityError::InvalidKey(format!(
                "expected {SEED_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Self::from_seed(label, &seed)
    }

    /// Build an identity from a raw seed.
    pub fn from_seed(label: impl Into<String>, seed: &[u8; SEED_LEN]) -> Result<Self, IdentityError> {
        let keypair = Ed25519KeyPair::from_seed_unchecked(seed)
            .map_err(|e| IdentityError::InvalidKey(e.to_string()))?;
        let address = Address::from_public_key(keypair.public_key().as_ref());

        Ok(Self {
            label: label.into(),
            keypair,
            address,
        })
    }

    /// Generate a fresh identity from system randomness.
    pub fn generate(label: impl Into<String>) -> Result<Self, IdentityError> {
        let mut seed = [0u8; SEED_LEN];
        SystemRandom::new()
            .fill(&mut seed)
            .map_err(|_| IdentityError::Randomness)?;
        Self::from_seed(label, &seed)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn public_key(&self) -> &[u8] {
        self.keypair.public_key().as_ref()
    }

    /// Sign serialized transaction data.
    pub fn sign_transaction(&self, tx_bytes: &[u8]) -> Signature {
        self.sign(IntentScope::TransactionData, tx_bytes)
    }

    /// Sign a personal message (session certificates).
    pub fn sign_personal_message(&self, message: &[u8]) -> Signature {
        self.sign(IntentScope::PersonalMessage, message)
    }

    fn sign(&self, scope: IntentScope, message: &[u8]) -> Signature {
        let digest = intent_digest(scope, message);
        Signature {
            signature: self.keypair.sign(&digest).as_ref().to_vec(),
            public_key: self.public_key().to_vec(),
        }
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("label", &self.label)
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}
