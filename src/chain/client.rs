// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger RPC seam and confirmation polling.

use std::time::Duration;

use async_trait::async_trait;

use super::types::{
    ExecutionStatus, InspectResult, SignedTransaction, TransactionDigest, TransactionEffects,
};

/// Errors that can occur during ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainClientError {
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("RPC error: {0}")]
    RpcError(String),

    #[error("Transaction {digest} failed: {error}")]
    ExecutionFailed {
        digest: TransactionDigest,
        error: String,
    },

    #[error("Transaction {digest} not confirmed after {waited:?}")]
    ConfirmationTimeout {
        digest: TransactionDigest,
        waited: Duration,
    },
}

/// Ledger operations the demo depends on.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Submit a signed transaction. Returns once it is accepted for
    /// execution; effects may not be readable yet.
    async fn execute_transaction(
        &self,
        tx: SignedTransaction,
    ) -> Result<TransactionDigest, ChainClientError>;

    /// Read the effects of a transaction. `None` while not yet indexed.
    async fn get_transaction_effects(
        &self,
        digest: &TransactionDigest,
    ) -> Result<Option<TransactionEffects>, ChainClientError>;

    /// Evaluate unsigned transaction bytes against current state without
    /// committing anything.
    async fn dev_inspect(&self, tx_bytes: &[u8]) -> Result<InspectResult, ChainClientError>;
}

/// Bounded exponential backoff used while waiting for effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(200),
            max_interval: Duration::from_secs(2),
            timeout: Duration::from_secs(30),
        }
    }
}

impl PollPolicy {
    fn next_interval(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max_interval)
    }
}

/// Poll until effects for `digest` are readable or the policy times out.
///
/// Effects reporting a failed execution are turned into
/// [`ChainClientError::ExecutionFailed`].
pub async fn wait_for_effects(
    rpc: &dyn ChainRpc,
    digest: &TransactionDigest,
    policy: PollPolicy,
) -> Result<TransactionEffects, ChainClientError> {
    let started = tokio::time::Instant::now();
    let mut interval = policy.initial_interval;
    let mut polls = 0u32;

    loop {
        polls += 1;
        if let Some(effects) = rpc.get_transaction_effects(digest).await? {
            tracing::debug!(%digest, polls, "Transaction effects available");
            return match &effects.status {
                ExecutionStatus::Success => Ok(effects),
                ExecutionStatus::Failure { error } => {
                    Err(ChainClientError::ExecutionFailed {
                        digest: *digest,
                        error: error.clone(),
                    })
                }
            };
        }

        let waited = started.elapsed();
        if waited >= policy.timeout {
            return Err(ChainClientError::ConfirmationTimeout {
                digest: *digest,
                waited,
            });
        }

        let remaining = policy.timeout - waited;
        tokio::time::sleep(interval.min(remaining)).await;
        interval = policy.next_interval(interval);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    /// Returns effects after a fixed number of polls.
    struct SlowIndexer {
        ready_after: u32,
        polls: AtomicU32,
        status: ExecutionStatus,
    }

    #[async_trait]
    impl ChainRpc for SlowIndexer {
        async fn execute_transaction(
            &self,
            _tx: SignedTransaction,
        ) -> Result<TransactionDigest, ChainClientError> {
            unreachable!()
        }

        async fn get_transaction_effects(
            &self,
            digest: &TransactionDigest,
        ) -> Result<Option<TransactionEffects>, ChainClientError> {
            let n = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < self.ready_after {
                return Ok(None);
            }
            Ok(Some(TransactionEffects {
                digest: *digest,
                status: self.status.clone(),
                object_changes: Vec::new(),
            }))
        }

        async fn dev_inspect(&self, _tx_bytes: &[u8]) -> Result<InspectResult, ChainClientError> {
            unreachable!()
        }
    }

    fn digest() -> TransactionDigest {
        TransactionDigest::new([1; 32])
    }

    #[tokio::test(start_paused = true)]
    async fn polls_until_effects_are_indexed() {
        let rpc = SlowIndexer {
            ready_after: 4,
            polls: AtomicU32::new(0),
            status: ExecutionStatus::Success,
        };

        let effects = wait_for_effects(&rpc, &digest(), PollPolicy::default())
            .await
            .unwrap();
        assert_eq!(effects.digest, digest());
        assert_eq!(rpc.polls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_with_explicit_error() {
        let rpc = SlowIndexer {
            ready_after: u32::MAX,
            polls: AtomicU32::new(0),
            status: ExecutionStatus::Success,
        };
        let policy = PollPolicy {
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_millis(400),
            timeout: Duration::from_secs(2),
        };

        let err = wait_for_effects(&rpc, &digest(), policy).await.unwrap_err();
        match err {
            ChainClientError::ConfirmationTimeout { waited, .. } => {
                assert!(waited >= Duration::from_secs(2));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_execution_is_an_error() {
        let rpc = SlowIndexer {
            ready_after: 1,
            polls: AtomicU32::new(0),
            status: ExecutionStatus::Failure {
                error: "MoveAbort(EInvalidCap)".to_string(),
            },
        };

        let err = wait_for_effects(&rpc, &digest(), PollPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ChainClientError::ExecutionFailed { .. }));
    }

    #[test]
    fn backoff_is_capped() {
        let policy = PollPolicy::default();
        let mut interval = policy.initial_interval;
        for _ in 0..10 {
            interval = policy.next_interval(interval);
        }
        assert_eq!(interval, policy.max_interval);
    }
}
