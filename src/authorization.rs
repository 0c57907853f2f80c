// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session authorization builder.
//!
//! Produces what a decrypt call needs from an identity: a signed session
//! credential and the unsigned bytes of a `seal_approve` policy check. The
//! policy check is evaluated by key servers and never has to be broadcast.
//!
//! With `broadcast_probe` enabled the same call is additionally signed and
//! executed. The probe only reports how the ledger judges the call at that
//! moment; its outcome does not affect the returned authorization.

use crate::chain::{CallArg, MoveCall, ObjectId, TxBuilder};
use crate::gateway::session::{SessionCredential, SessionError};
use crate::identity::Identity;

/// Default session lifetime in minutes.
pub const DEFAULT_TTL_MIN: u16 = 10;

/// Name of the approval entry point.
pub const SEAL_APPROVE: &str = "seal_approve";

/// Inputs for one decrypt attempt.
#[derive(Debug, Clone)]
pub struct SessionAuthorization {
    /// Unsigned policy-check transaction.
    pub tx_bytes: Vec<u8>,
    pub credential: SessionCredential,
}

#[derive(Clone)]
pub struct SessionAuthorizationBuilder {
    tx: TxBuilder,
    ttl_min: u16,
    broadcast_probe: bool,
}

impl SessionAuthorizationBuilder {
    pub fn new(tx: TxBuilder, ttl_min: u16, broadcast_probe: bool) -> Self {
        Self {
            tx,
            ttl_min,
            broadcast_probe,
        }
    }

    /// Build a session credential for `identity` and a policy check proving
    /// its membership of `whitelist_id` for `data_id`.
    pub async fn build(
        &self,
        identity: &Identity,
        package_id: ObjectId,
        module: &str,
        data_id: &[u8],
        whitelist_id: ObjectId,
    ) -> Result<SessionAuthorization, SessionError> {
        let mut credential = SessionCredential::new(identity.address(), package_id, self.ttl_min)?;
        let signature = identity.sign_personal_message(&credential.personal_message());
        credential.set_personal_message_signature(signature)?;

        let call = MoveCall::new(
            package_id,
            module,
            SEAL_APPROVE,
            vec![
                CallArg::Bytes(data_id.to_vec()),
                CallArg::Object(whitelist_id),
            ],
        );

        if self.broadcast_probe {
            self.probe(identity, call.clone()).await;
        }

        let tx_bytes = TxBuilder::build_unsigned(identity.address(), call);

        tracing::debug!(
            agent = %identity.label(),
            address = %identity.address(),
            %whitelist_id,
            expires_at = %credential.expires_at(),
            "Session authorization built"
        );

        Ok(SessionAuthorization {
            tx_bytes,
            credential,
        })
    }

    async fn probe(&self, identity: &Identity, call: MoveCall) {
        match self.tx.sign_and_execute(identity, call).await {
            Ok(effects) => tracing::info!(
                agent = %identity.label(),
                digest = %effects.digest,
                "Policy check probe executed"
            ),
            Err(e) => tracing::info!(
                agent = %identity.label(),
                error = %e,
                "Policy check probe rejected"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;

    use super::*;
    use crate::chain::ledger::POLICY_MODULE;
    use crate::chain::{LocalLedger, PollPolicy, TransactionData};
    use crate::identity::IntentScope;

    fn package() -> ObjectId {
        "0x2".parse().unwrap()
    }

    fn builder(probe: bool) -> SessionAuthorizationBuilder {
        let ledger = Arc::new(LocalLedger::new(package(), Duration::ZERO));
        SessionAuthorizationBuilder::new(
            TxBuilder::new(ledger, PollPolicy::default()),
            DEFAULT_TTL_MIN,
            probe,
        )
    }

    #[tokio::test]
    async fn builds_policy_check_for_identity() {
        let agent = Identity::generate("agent").unwrap();
        let whitelist_id = ObjectId::new([9; 32]);

        let auth = builder(false)
            .build(
                &agent,
                package(),
                POLICY_MODULE,
                whitelist_id.as_bytes(),
                whitelist_id,
            )
            .await
            .unwrap();

        let tx = TransactionData::from_bytes(&auth.tx_bytes).unwrap();
        assert_eq!(tx.sender, agent.address());
        assert_eq!(tx.call.function, SEAL_APPROVE);
        assert_eq!(
            tx.call.arguments,
            vec![
                CallArg::Bytes(whitelist_id.as_bytes().to_vec()),
                CallArg::Object(whitelist_id)
            ]
        );

        let cert = auth.credential.certificate().unwrap();
        assert_eq!(cert.address, agent.address());
        assert_eq!(cert.ttl_min, DEFAULT_TTL_MIN);
        assert!(cert.verify(Utc::now()).is_ok());
        assert_eq!(
            cert.signature
                .verify(IntentScope::PersonalMessage, &auth.credential.personal_message())
                .unwrap(),
            agent.address()
        );
    }

    #[tokio::test]
    async fn rejected_probe_does_not_fail_build() {
        let agent = Identity::generate("agent").unwrap();
        let whitelist_id = ObjectId::new([9; 32]);

        // The whitelist does not exist, so the probe aborts.
        let auth = builder(true)
            .build(
                &agent,
                package(),
                POLICY_MODULE,
                whitelist_id.as_bytes(),
                whitelist_id,
            )
            .await;
        assert!(auth.is_ok());
    }

    #[tokio::test]
    async fn ttl_is_validated() {
        let ledger = Arc::new(LocalLedger::new(package(), Duration::ZERO));
        let builder =
            SessionAuthorizationBuilder::new(TxBuilder::new(ledger, PollPolicy::default()), 0, false);
        let agent = Identity::generate("agent").unwrap();

        let err = builder
            .build(&agent, package(), POLICY_MODULE, &[1], ObjectId::new([1; 32]))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidTtl(0)));
    }
}
