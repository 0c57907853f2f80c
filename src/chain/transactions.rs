// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Transaction building, signing and confirmation.

use std::sync::Arc;

use super::client::{wait_for_effects, ChainClientError, ChainRpc, PollPolicy};
use super::types::{MoveCall, SignedTransaction, TransactionData, TransactionEffects};
use crate::identity::{Address, Identity};

/// Transaction builder bound to a ledger RPC endpoint.
#[derive(Clone)]
pub struct TxBuilder {
    rpc: Arc<dyn ChainRpc>,
    poll: PollPolicy,
}

impl TxBuilder {
    pub fn new(rpc: Arc<dyn ChainRpc>, poll: PollPolicy) -> Self {
        Self { rpc, poll }
    }

    /// Serialize `call` as an unsigned transaction from `sender`.
    ///
    /// The bytes are meant for evaluation only and are never broadcast.
    pub fn build_unsigned(sender: Address, call: MoveCall) -> Vec<u8> {
        TransactionData::new(sender, call).to_bytes()
    }

    /// Sign `call` with `signer`, submit it and wait for its effects.
    ///
    /// Returns an error if the transaction aborts or is not confirmed within
    /// the poll policy.
    pub async fn sign_and_execute(
        &self,
        signer: &Identity,
        call: MoveCall,
    ) -> Result<TransactionEffects, ChainClientError> {
        let target = call.target();
        let tx_bytes = Self::build_unsigned(signer.address(), call);
        let signature = signer.sign_transaction(&tx_bytes);

        let digest = self
            .rpc
            .execute_transaction(SignedTransaction {
                tx_bytes,
                signature,
            })
            .await?;

        tracing::debug!(%digest, %target, signer = %signer.address(), "Transaction submitted");

        wait_for_effects(self.rpc.as_ref(), &digest, self.poll).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::chain::ledger::{LocalLedger, POLICY_MODULE};
    use crate::chain::types::{CallArg, ObjectId};

    fn package() -> ObjectId {
        "0x2".parse().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn waits_through_indexing_delay() {
        let ledger = Arc::new(LocalLedger::new(package(), Duration::from_secs(1)));
        let builder = TxBuilder::new(ledger, PollPolicy::default());
        let owner = Identity::generate("owner").unwrap();

        let effects = builder
            .sign_and_execute(
                &owner,
                MoveCall::new(package(), POLICY_MODULE, "create_whitelist_entry", vec![]),
            )
            .await
            .unwrap();

        assert_eq!(effects.created().count(), 2);
    }

    #[tokio::test]
    async fn surfaces_move_aborts() {
        let ledger = Arc::new(LocalLedger::new(package(), Duration::ZERO));
        let builder = TxBuilder::new(ledger, PollPolicy::default());
        let owner = Identity::generate("owner").unwrap();

        let err = builder
            .sign_and_execute(
                &owner,
                MoveCall::new(
                    package(),
                    POLICY_MODULE,
                    "add",
                    vec![CallArg::Address(owner.address())],
                ),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ChainClientError::ExecutionFailed { .. }));
    }

    #[test]
    fn unsigned_bytes_carry_sender() {
        let sender = Address::new([4; 32]);
        let bytes = TxBuilder::build_unsigned(
            sender,
            MoveCall::new(package(), POLICY_MODULE, "seal_approve", vec![]),
        );
        assert_eq!(TransactionData::from_bytes(&bytes).unwrap().sender, sender);
    }
}
