// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Encryption gateway errors.

use chrono::{DateTime, Utc};

use super::session::SessionError;
use crate::chain::{ChainClientError, ObjectId};
use crate::identity::Address;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The requesting address is not allowed to obtain the key for this
    /// policy id. Expected outcome for out-of-whitelist agents.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Session credential expired at {expired_at}")]
    Expired { expired_at: DateTime<Utc> },

    #[error("Session credential is not signed by {address}")]
    UnsignedSession { address: Address },

    #[error("Threshold {threshold} is invalid for {servers} key server(s)")]
    InvalidThreshold { threshold: u8, servers: usize },

    #[error("Key server {0} is not on the network allowlist")]
    UnverifiedKeyServer(ObjectId),

    #[error("Only {available} of {needed} key server(s) released a key: {last_error}")]
    InsufficientKeyServers {
        needed: u8,
        available: usize,
        last_error: String,
    },

    #[error("Invalid ciphertext: {0}")]
    InvalidCiphertext(String),

    #[error("Invalid policy-check transaction: {0}")]
    InvalidPolicyCheck(String),

    #[error("Cryptographic failure: {0}")]
    Crypto(String),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Chain(#[from] ChainClientError),
}

impl GatewayError {
    /// Whether this is a policy decision rather than a fault.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, GatewayError::Unauthorized(_))
    }
}
