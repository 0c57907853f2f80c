// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Key servers.
//!
//! A key server releases its share of a data key only after it has:
//! 1. verified the session certificate and the request signature,
//! 2. checked the certificate has not expired,
//! 3. confirmed the policy-check transaction is sent by the certified
//!    address and calls a `seal_approve*` entry point of the certified
//!    package for exactly the requested id,
//! 4. evaluated that transaction against current ledger state.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey, StaticSecret};

use super::error::GatewayError;
use super::object::{open, random_array, wrapping_key, DataKey};
use super::session::{request_body, KeyRequest};
use crate::chain::{CallArg, ChainRpc, ExecutionStatus, ObjectId, TransactionData};
use crate::encoding::hex_bytes;

/// Prefix every approval entry point must carry.
pub const APPROVE_PREFIX: &str = "seal_approve";

/// Public description of a key server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyServerInfo {
    pub object_id: ObjectId,
    pub name: String,
    pub url: String,
    /// X25519 public key used to wrap key shares.
    #[serde(with = "hex_bytes")]
    pub public_key: Vec<u8>,
}

/// A key-holding party.
#[async_trait]
pub trait KeyServer: Send + Sync {
    fn info(&self) -> &KeyServerInfo;

    /// Release this server's share for `request` if the policy allows it.
    async fn fetch_key(&self, request: &KeyRequest) -> Result<DataKey, GatewayError>;
}

/// Key server that evaluates policies against an in-process ledger.
pub struct LocalKeyServer {
    info: KeyServerInfo,
    secret: StaticSecret,
    chain: Arc<dyn ChainRpc>,
}

impl LocalKeyServer {
    /// Create a server with a fresh X25519 key.
    pub fn new(name: impl Into<String>, chain: Arc<dyn ChainRpc>) -> Result<Self, GatewayError> {
        let secret = StaticSecret::from(random_array::<32>()?);
        let public_key = PublicKey::from(&secret).as_bytes().to_vec();
        let object_id = ObjectId::new(Sha256::digest(&public_key).into());
        let name = name.into();

        Ok(Self {
            info: KeyServerInfo {
                object_id,
                url: format!("local://{name}"),
                name,
                public_key,
            },
            secret,
            chain,
        })
    }

    /// Validate sender, package, entry point and id of the policy check.
    fn check_transaction(
        &self,
        request: &KeyRequest,
    ) -> Result<TransactionData, GatewayError> {
        let tx = TransactionData::from_bytes(&request.tx_bytes)
            .map_err(|e| GatewayError::InvalidPolicyCheck(e.to_string()))?;
        let cert = &request.certificate;

        if tx.sender != cert.address {
            return Err(GatewayError::Unauthorized(format!(
                "policy check sent by {}, session belongs to {}",
                tx.sender, cert.address
            )));
        }
        if tx.call.package != cert.package_id || tx.call.package != request.policy.package_id {
            return Err(GatewayError::Unauthorized(format!(
                "policy check targets package {}, session is for {}",
                tx.call.package, cert.package_id
            )));
        }
        if !tx.call.function.starts_with(APPROVE_PREFIX) {
            return Err(GatewayError::Unauthorized(format!(
                "`{}` is not an approval entry point",
                tx.call.function
            )));
        }
        match tx.call.arguments.first() {
            Some(CallArg::Bytes(id)) if *id == request.policy.id => Ok(tx),
            _ => Err(GatewayError::Unauthorized(format!(
                "policy check does not cover id 0x{}",
                hex::encode(&request.policy.id)
            ))),
        }
    }
}

#[async_trait]
impl KeyServer for LocalKeyServer {
    fn info(&self) -> &KeyServerInfo {
        &self.info
    }

    async fn fetch_key(&self, request: &KeyRequest) -> Result<DataKey, GatewayError> {
        if request.share.server_id != self.info.object_id {
            return Err(GatewayError::InvalidCiphertext(format!(
                "share addressed to {}, not {}",
                request.share.server_id, self.info.object_id
            )));
        }

        let cert = &request.certificate;
        cert.verify(Utc::now())?;
        cert.verify_request(
            &request_body(&request.tx_bytes, &request.policy),
            &request.request_signature,
        )?;

        let tx = self.check_transaction(request)?;

        let inspect = self.chain.dev_inspect(&request.tx_bytes).await?;
        if let ExecutionStatus::Failure { error } = inspect.status {
            tracing::debug!(
                server = %self.info.name,
                address = %tx.sender,
                %error,
                "Policy check rejected"
            );
            return Err(GatewayError::Unauthorized(format!(
                "{} denied {}: {error}",
                tx.call.target(),
                tx.sender
            )));
        }

        let ephemeral: [u8; 32] = request
            .share
            .ephemeral_public
            .as_slice()
            .try_into()
            .map_err(|_| GatewayError::InvalidCiphertext("bad ephemeral key".to_string()))?;
        let shared = self.secret.diffie_hellman(&PublicKey::from(ephemeral));
        let wrap = wrapping_key(shared.as_bytes(), &request.policy, &self.info.object_id)?;
        let key = open(
            &wrap,
            &request.share.nonce,
            &request.policy.aad(),
            &request.share.wrapped_key,
        )?;

        tracing::debug!(
            server = %self.info.name,
            address = %tx.sender,
            "Key share released"
        );
        DataKey::from_slice(&key)
    }
}
