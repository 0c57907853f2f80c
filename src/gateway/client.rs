// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Encryption gateway client.

use std::sync::Arc;

use chrono::Utc;
use ring::aead::NONCE_LEN;
use x25519_dalek::{PublicKey, StaticSecret};

use super::error::GatewayError;
use super::key_server::KeyServer;
use super::object::{
    open, random_array, seal, wrapping_key, DataKey, EncryptedObject, KeyShare, PolicyTuple,
    ENVELOPE_VERSION,
};
use super::session::{request_body, KeyRequest, SessionCredential};
use crate::chain::{ObjectId, TransactionData};

/// Output of [`EncryptionGateway::encrypt`].
#[derive(Debug, Clone)]
pub struct Encrypted {
    /// Serialized [`EncryptedObject`].
    pub ciphertext: Vec<u8>,
    /// Data key, usable to decrypt without the key servers.
    pub backup_key: DataKey,
}

/// Client for a committee of key servers.
#[derive(Clone)]
pub struct EncryptionGateway {
    servers: Vec<Arc<dyn KeyServer>>,
}

impl EncryptionGateway {
    /// Build a gateway over `servers`.
    ///
    /// With `verify_key_servers`, every server must appear in `allowlist`.
    pub fn new(
        servers: Vec<Arc<dyn KeyServer>>,
        allowlist: &[ObjectId],
        verify_key_servers: bool,
    ) -> Result<Self, GatewayError> {
        if verify_key_servers {
            if let Some(unknown) = servers
                .iter()
                .map(|server| server.info().object_id)
                .find(|id| !allowlist.contains(id))
            {
                return Err(GatewayError::UnverifiedKeyServer(unknown));
            }
        }

        tracing::debug!(servers = servers.len(), verify_key_servers, "Encryption gateway ready");
        Ok(Self { servers })
    }

    pub fn server_count(&self) -> usize {
        self.servers.len()
    }

    /// Encrypt `data` under `policy`; `threshold` servers must cooperate to
    /// decrypt.
    pub fn encrypt(
        &self,
        data: &[u8],
        policy: &PolicyTuple,
        threshold: u8,
    ) -> Result<Encrypted, GatewayError> {
        if threshold == 0 || usize::from(threshold) > self.servers.len() {
            return Err(GatewayError::InvalidThreshold {
                threshold,
                servers: self.servers.len(),
            });
        }

        let data_key = DataKey::generate()?;
        let aad = policy.aad();

        let mut shares = Vec::with_capacity(self.servers.len());
        for server in &self.servers {
            let info = server.info();
            let server_public: [u8; 32] = info.public_key.as_slice().try_into().map_err(|_| {
                GatewayError::Crypto(format!("key server {} has a malformed public key", info.name))
            })?;

            let ephemeral = StaticSecret::from(random_array::<32>()?);
            let shared = ephemeral.diffie_hellman(&PublicKey::from(server_public));
            let wrap = wrapping_key(shared.as_bytes(), policy, &info.object_id)?;
            let nonce = random_array::<NONCE_LEN>()?;

            shares.push(KeyShare {
                server_id: info.object_id,
                ephemeral_public: PublicKey::from(&ephemeral).as_bytes().to_vec(),
                nonce: nonce.to_vec(),
                wrapped_key: seal(&wrap, nonce, &aad, data_key.as_bytes())?,
            });
        }

        let nonce = random_array::<NONCE_LEN>()?;
        let object = EncryptedObject {
            version: ENVELOPE_VERSION,
            policy: policy.clone(),
            threshold,
            shares,
            nonce: nonce.to_vec(),
            ciphertext: seal(data_key.as_bytes(), nonce, &aad, data)?,
        };

        Ok(Encrypted {
            ciphertext: object.to_bytes(),
            backup_key: data_key,
        })
    }

    /// Decrypt `ciphertext` using `session` and the unsigned policy-check
    /// transaction `tx_bytes`.
    pub async fn decrypt(
        &self,
        ciphertext: &[u8],
        session: &SessionCredential,
        tx_bytes: &[u8],
    ) -> Result<Vec<u8>, GatewayError> {
        let object = EncryptedObject::from_bytes(ciphertext)?;

        if session.is_expired_at(Utc::now()) {
            return Err(GatewayError::Expired {
                expired_at: session.expires_at(),
            });
        }

        let sender = TransactionData::from_bytes(tx_bytes)
            .map_err(|e| GatewayError::InvalidPolicyCheck(e.to_string()))?
            .sender;
        if sender != session.address() {
            return Err(GatewayError::Unauthorized(format!(
                "policy check sent by {sender}, session belongs to {}",
                session.address()
            )));
        }

        let certificate = session.certificate()?;
        let request_signature = session.sign_request(&request_body(tx_bytes, &object.policy));

        let needed = usize::from(object.threshold);
        let mut keys: Vec<DataKey> = Vec::with_capacity(needed);
        let mut last_error = String::from("no key server holds a share");

        for share in &object.shares {
            if keys.len() >= needed {
                break;
            }
            let Some(server) = self
                .servers
                .iter()
                .find(|server| server.info().object_id == share.server_id)
            else {
                continue;
            };

            let request = KeyRequest {
                tx_bytes: tx_bytes.to_vec(),
                policy: object.policy.clone(),
                share: share.clone(),
                certificate: certificate.clone(),
                request_signature: request_signature.clone(),
            };

            match server.fetch_key(&request).await {
                Ok(key) => keys.push(key),
                // Policy decisions are the same on every server.
                Err(e @ (GatewayError::Unauthorized(_) | GatewayError::Expired { .. })) => {
                    return Err(e)
                }
                Err(e) => {
                    tracing::warn!(server = %server.info().name, error = %e, "Key server failed");
                    last_error = e.to_string();
                }
            }
        }

        if keys.len() < needed {
            return Err(GatewayError::InsufficientKeyServers {
                needed: object.threshold,
                available: keys.len(),
                last_error,
            });
        }
        if keys.windows(2).any(|pair| pair[0] != pair[1]) {
            return Err(GatewayError::InvalidCiphertext(
                "key servers returned different keys".to_string(),
            ));
        }

        open(
            keys[0].as_bytes(),
            &object.nonce,
            &object.policy.aad(),
            &object.ciphertext,
        )
    }

    /// Decrypt with an escrowed data key, bypassing the key servers.
    pub fn decrypt_with_backup_key(
        ciphertext: &[u8],
        backup_key: &DataKey,
    ) -> Result<Vec<u8>, GatewayError> {
        let object = EncryptedObject::from_bytes(ciphertext)?;
        open(
            backup_key.as_bytes(),
            &object.nonce,
            &object.policy.aad(),
            &object.ciphertext,
        )
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::chain::{
        ledger::POLICY_MODULE, CallArg, LocalLedger, MoveCall, PollPolicy, TxBuilder,
    };
    use crate::gateway::key_server::LocalKeyServer;
    use crate::identity::Identity;
    use crate::registry::{PolicyRegistry, WhitelistHandle};

    struct Fixture {
        gateway: EncryptionGateway,
        registry: PolicyRegistry,
        owner: Identity,
    }

    fn package() -> ObjectId {
        "0x178a15e9921f9988d7bf092b4252d203700e0de9e2384f80fbb9a5dae22ae26c"
            .parse()
            .unwrap()
    }

    fn fixture(servers: usize) -> Fixture {
        let ledger = Arc::new(LocalLedger::new(package(), Duration::ZERO));
        let servers: Vec<Arc<dyn KeyServer>> = (0..servers)
            .map(|i| {
                Arc::new(LocalKeyServer::new(format!("ks-{i}"), ledger.clone()).unwrap())
                    as Arc<dyn KeyServer>
            })
            .collect();
        let allowlist: Vec<ObjectId> = servers.iter().map(|s| s.info().object_id).collect();

        Fixture {
            gateway: EncryptionGateway::new(servers, &allowlist, true).unwrap(),
            registry: PolicyRegistry::new(
                TxBuilder::new(ledger, PollPolicy::default()),
                package(),
                POLICY_MODULE,
            ),
            owner: Identity::generate("owner").unwrap(),
        }
    }

    async fn whitelist_with(fx: &Fixture, member: &Identity) -> WhitelistHandle {
        let handle = fx.registry.create_whitelist(&fx.owner).await.unwrap();
        fx.registry
            .add_address(&fx.owner, &handle, member.address())
            .await
            .unwrap();
        handle
    }

    fn session_for(identity: &Identity) -> SessionCredential {
        let mut session = SessionCredential::new(identity.address(), package(), 10).unwrap();
        let sig = identity.sign_personal_message(&session.personal_message());
        session.set_personal_message_signature(sig).unwrap();
        session
    }

    fn approve_tx(sender: &Identity, whitelist_id: ObjectId) -> Vec<u8> {
        TxBuilder::build_unsigned(
            sender.address(),
            MoveCall::new(
                package(),
                POLICY_MODULE,
                "seal_approve",
                vec![
                    CallArg::Bytes(whitelist_id.as_bytes().to_vec()),
                    CallArg::Object(whitelist_id),
                ],
            ),
        )
    }

    #[tokio::test]
    async fn member_round_trips_plaintext() {
        let fx = fixture(1);
        let agent = Identity::generate("agent").unwrap();
        let wl = whitelist_with(&fx, &agent).await;
        let policy = PolicyTuple::for_whitelist(package(), wl.whitelist_id);

        let data = br#"{"subject":"hello"}"#;
        let encrypted = fx.gateway.encrypt(data, &policy, 1).unwrap();

        let plaintext = fx
            .gateway
            .decrypt(
                &encrypted.ciphertext,
                &session_for(&agent),
                &approve_tx(&agent, wl.whitelist_id),
            )
            .await
            .unwrap();
        assert_eq!(plaintext, data);

        let escrow =
            EncryptionGateway::decrypt_with_backup_key(&encrypted.ciphertext, &encrypted.backup_key)
                .unwrap();
        assert_eq!(escrow, data);
    }

    #[tokio::test]
    async fn non_member_is_unauthorized_with_valid_session() {
        let fx = fixture(1);
        let agent = Identity::generate("agent").unwrap();
        let outsider = Identity::generate("outsider").unwrap();
        let wl = whitelist_with(&fx, &agent).await;
        let policy = PolicyTuple::for_whitelist(package(), wl.whitelist_id);
        let encrypted = fx.gateway.encrypt(b"secret", &policy, 1).unwrap();

        let err = fx
            .gateway
            .decrypt(
                &encrypted.ciphertext,
                &session_for(&outsider),
                &approve_tx(&outsider, wl.whitelist_id),
            )
            .await
            .unwrap_err();
        assert!(err.is_unauthorized(), "{err}");
    }

    #[tokio::test]
    async fn whitelists_are_isolated() {
        let fx = fixture(1);
        let x = Identity::generate("x").unwrap();
        let y = Identity::generate("y").unwrap();
        let wl_x = whitelist_with(&fx, &x).await;
        let wl_y = whitelist_with(&fx, &y).await;

        let for_y = fx
            .gateway
            .encrypt(b"only y", &PolicyTuple::for_whitelist(package(), wl_y.whitelist_id), 1)
            .unwrap();

        // X is whitelisted elsewhere, and reuses its own approval.
        let err = fx
            .gateway
            .decrypt(&for_y.ciphertext, &session_for(&x), &approve_tx(&x, wl_x.whitelist_id))
            .await
            .unwrap_err();
        assert!(err.is_unauthorized(), "{err}");

        // X points the approval at Y's whitelist instead.
        let err = fx
            .gateway
            .decrypt(&for_y.ciphertext, &session_for(&x), &approve_tx(&x, wl_y.whitelist_id))
            .await
            .unwrap_err();
        assert!(err.is_unauthorized(), "{err}");
    }

    #[tokio::test]
    async fn session_must_match_policy_check_sender() {
        let fx = fixture(1);
        let agent = Identity::generate("agent").unwrap();
        let other = Identity::generate("other").unwrap();
        let wl = whitelist_with(&fx, &agent).await;
        let encrypted = fx
            .gateway
            .encrypt(b"secret", &PolicyTuple::for_whitelist(package(), wl.whitelist_id), 1)
            .unwrap();

        let err = fx
            .gateway
            .decrypt(
                &encrypted.ciphertext,
                &session_for(&other),
                &approve_tx(&agent, wl.whitelist_id),
            )
            .await
            .unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn expired_session_is_rejected() {
        let fx = fixture(1);
        let agent = Identity::generate("agent").unwrap();
        let wl = whitelist_with(&fx, &agent).await;
        let encrypted = fx
            .gateway
            .encrypt(b"secret", &PolicyTuple::for_whitelist(package(), wl.whitelist_id), 1)
            .unwrap();

        let mut session = SessionCredential::new_at(
            agent.address(),
            package(),
            10,
            Utc::now() - ChronoDuration::minutes(11),
        )
        .unwrap();
        let sig = agent.sign_personal_message(&session.personal_message());
        session.set_personal_message_signature(sig).unwrap();

        let err = fx
            .gateway
            .decrypt(&encrypted.ciphertext, &session, &approve_tx(&agent, wl.whitelist_id))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Expired { .. }));
    }

    #[tokio::test]
    async fn threshold_two_of_three() {
        let fx = fixture(3);
        let agent = Identity::generate("agent").unwrap();
        let wl = whitelist_with(&fx, &agent).await;
        let policy = PolicyTuple::for_whitelist(package(), wl.whitelist_id);

        let encrypted = fx.gateway.encrypt(b"payload", &policy, 2).unwrap();
        let object = EncryptedObject::from_bytes(&encrypted.ciphertext).unwrap();
        assert_eq!(object.shares.len(), 3);
        assert_eq!(object.threshold, 2);

        let plaintext = fx
            .gateway
            .decrypt(
                &encrypted.ciphertext,
                &session_for(&agent),
                &approve_tx(&agent, wl.whitelist_id),
            )
            .await
            .unwrap();
        assert_eq!(plaintext, b"payload");
    }

    #[tokio::test]
    async fn non_approval_entry_point_is_unauthorized() {
        let fx = fixture(1);
        let agent = Identity::generate("agent").unwrap();
        let wl = whitelist_with(&fx, &agent).await;
        let encrypted = fx
            .gateway
            .encrypt(b"secret", &PolicyTuple::for_whitelist(package(), wl.whitelist_id), 1)
            .unwrap();

        let add_tx = TxBuilder::build_unsigned(
            agent.address(),
            MoveCall::new(
                package(),
                POLICY_MODULE,
                "add",
                vec![
                    CallArg::Object(wl.whitelist_id),
                    CallArg::Object(wl.cap_id),
                    CallArg::Address(agent.address()),
                ],
            ),
        );

        let err = fx
            .gateway
            .decrypt(&encrypted.ciphertext, &session_for(&agent), &add_tx)
            .await
            .unwrap_err();
        assert!(err.is_unauthorized(), "{err}");
    }

    #[tokio::test]
    async fn membership_is_judged_at_decrypt_time() {
        let fx = fixture(1);
        let agent = Identity::generate("agent").unwrap();
        let wl = fx.registry.create_whitelist(&fx.owner).await.unwrap();
        let encrypted = fx
            .gateway
            .encrypt(b"late joiner", &PolicyTuple::for_whitelist(package(), wl.whitelist_id), 1)
            .unwrap();

        let err = fx
            .gateway
            .decrypt(
                &encrypted.ciphertext,
                &session_for(&agent),
                &approve_tx(&agent, wl.whitelist_id),
            )
            .await
            .unwrap_err();
        assert!(err.is_unauthorized(), "{err}");

        fx.registry
            .add_address(&fx.owner, &wl, agent.address())
            .await
            .unwrap();

        let plaintext = fx
            .gateway
            .decrypt(
                &encrypted.ciphertext,
                &session_for(&agent),
                &approve_tx(&agent, wl.whitelist_id),
            )
            .await
            .unwrap();
        assert_eq!(plaintext, b"late joiner");
    }

    #[test]
    fn threshold_must_fit_committee() {
        let fx = fixture(2);
        let policy = PolicyTuple::for_whitelist(package(), ObjectId::new([1; 32]));
        assert!(matches!(
            fx.gateway.encrypt(b"x", &policy, 0),
            Err(GatewayError::InvalidThreshold { .. })
        ));
        assert!(matches!(
            fx.gateway.encrypt(b"x", &policy, 3),
            Err(GatewayError::InvalidThreshold { .. })
        ));
    }

    #[test]
    fn unverified_key_server_is_rejected() {
        let ledger = Arc::new(LocalLedger::new(package(), Duration::ZERO));
        let server: Arc<dyn KeyServer> = Arc::new(LocalKeyServer::new("rogue", ledger).unwrap());

        assert!(matches!(
            EncryptionGateway::new(vec![server.clone()], &[], true),
            Err(GatewayError::UnverifiedKeyServer(_))
        ));
        assert!(EncryptionGateway::new(vec![server], &[], false).is_ok());
    }
}
