// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process ledger hosting the `access_policy` package.
//!
//! The ledger verifies transaction signatures, executes the whitelist entry
//! points against its object table and indexes effects after a configurable
//! delay, so callers must poll for confirmation exactly as they would against
//! a remote full node.
//!
//! ## Entry points
//!
//! | Function | Arguments | Aborts |
//! |----------|-----------|--------|
//! | `create_whitelist_entry` | none | never |
//! | `add` | whitelist, cap, address | `EInvalidCap`, `EDuplicate` |
//! | `seal_approve` | id bytes, whitelist | `ENoAccess` |

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::time::Instant;

use super::client::{ChainClientError, ChainRpc};
use super::types::*;
use crate::identity::{Address, IntentScope};

/// Module name of the whitelist policy package.
pub const POLICY_MODULE: &str = "access_policy";
/// Type name of whitelist objects.
pub const WHITELIST_TYPE: &str = "Whitelist";
/// Type name of whitelist capability objects.
pub const CAP_TYPE: &str = "Cap";

/// Abort codes raised by the policy module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveAbort {
    InvalidCap,
    Duplicate,
    NoAccess,
    ObjectNotFound,
    FunctionNotFound,
    InvalidArguments,
}

impl std::fmt::Display for MoveAbort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = match self {
            MoveAbort::InvalidCap => "EInvalidCap",
            MoveAbort::Duplicate => "EDuplicate",
            MoveAbort::NoAccess => "ENoAccess",
            MoveAbort::ObjectNotFound => "EObjectNotFound",
            MoveAbort::FunctionNotFound => "EFunctionNotFound",
            MoveAbort::InvalidArguments => "EInvalidArguments",
        };
        write!(f, "MoveAbort({code})")
    }
}

#[derive(Debug, Clone)]
enum LedgerObject {
    Whitelist { addresses: BTreeSet<Address> },
    Cap { whitelist_id: ObjectId },
}

#[derive(Debug, Clone)]
struct StoredObject {
    owner: Option<Address>,
    object: LedgerObject,
}

/// State change produced by a successful execution.
enum Mutation {
    Create {
        id: ObjectId,
        owner: Option<Address>,
        object: LedgerObject,
    },
    AddAddress {
        whitelist_id: ObjectId,
        address: Address,
    },
}

struct IndexedEffects {
    visible_at: Instant,
    effects: TransactionEffects,
}

#[derive(Default)]
struct LedgerState {
    objects: HashMap<ObjectId, StoredObject>,
    effects: HashMap<TransactionDigest, IndexedEffects>,
    sequence: u64,
}

/// In-memory ledger implementing [`ChainRpc`].
pub struct LocalLedger {
    package_id: ObjectId,
    indexing_delay: Duration,
    state: Mutex<LedgerState>,
}

impl LocalLedger {
    /// Create a ledger with the policy package published at `package_id`.
    pub fn new(package_id: ObjectId, indexing_delay: Duration) -> Self {
        Self {
            package_id,
            indexing_delay,
            state: Mutex::new(LedgerState::default()),
        }
    }

    pub fn package_id(&self) -> ObjectId {
        self.package_id
    }

    /// Whether `address` is currently a member of `whitelist_id`.
    pub fn is_member(&self, whitelist_id: &ObjectId, address: &Address) -> bool {
        let Ok(state) = self.state.lock() else {
            return false;
        };
        matches!(
            state.objects.get(whitelist_id),
            Some(StoredObject {
                object: LedgerObject::Whitelist { addresses },
                ..
            }) if addresses.contains(address)
        )
    }

    fn type_of(&self, object: &LedgerObject) -> StructTag {
        let name = match object {
            LedgerObject::Whitelist { .. } => WHITELIST_TYPE,
            LedgerObject::Cap { .. } => CAP_TYPE,
        };
        StructTag::new(self.package_id, POLICY_MODULE, name)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, LedgerState>, ChainClientError> {
        self.state
            .lock()
            .map_err(|_| ChainClientError::RpcError("ledger state poisoned".to_string()))
    }

    /// Run `tx` against `state` without mutating it.
    fn execute(
        &self,
        state: &LedgerState,
        tx: &TransactionData,
        digest: &TransactionDigest,
    ) -> Result<Vec<Mutation>, MoveAbort> {
        let call = &tx.call;
        if call.package != self.package_id || call.module != POLICY_MODULE {
            return Err(MoveAbort::FunctionNotFound);
        }

        match call.function.as_str() {
            "create_whitelist_entry" => {
                if !call.arguments.is_empty() {
                    return Err(MoveAbort::InvalidArguments);
                }
                let whitelist_id = derive_object_id(digest, 0);
                let cap_id = derive_object_id(digest, 1);
                Ok(vec![
                    Mutation::Create {
                        id: whitelist_id,
                        owner: None,
                        object: LedgerObject::Whitelist {
                            addresses: BTreeSet::new(),
                        },
                    },
                    Mutation::Create {
                        id: cap_id,
                        owner: Some(tx.sender),
                        object: LedgerObject::Cap { whitelist_id },
                    },
                ])
            }
            "add" => {
                let [CallArg::Object(wl_id), CallArg::Object(cap_id), CallArg::Address(account)] =
                    call.arguments.as_slice()
                else {
                    return Err(MoveAbort::InvalidArguments);
                };

                let addresses = whitelist(state, wl_id)?;
                match state.objects.get(cap_id) {
                    Some(StoredObject {
                        owner,
                        object: LedgerObject::Cap { whitelist_id },
                    }) if whitelist_id == wl_id && *owner == Some(tx.sender) => {}
                    Some(_) => return Err(MoveAbort::InvalidCap),
                    None => return Err(MoveAbort::ObjectNotFound),
                }
                if addresses.contains(account) {
                    return Err(MoveAbort::Duplicate);
                }

                Ok(vec![Mutation::AddAddress {
                    whitelist_id: *wl_id,
                    address: *account,
                }])
            }
            "seal_approve" => {
                let [CallArg::Bytes(id), CallArg::Object(wl_id)] = call.arguments.as_slice() else {
                    return Err(MoveAbort::InvalidArguments);
                };

                let addresses = whitelist(state, wl_id)?;
                // The id must be namespaced by the whitelist it claims to be under.
                if !id.starts_with(wl_id.as_bytes()) || !addresses.contains(&tx.sender) {
                    return Err(MoveAbort::NoAccess);
                }
                Ok(Vec::new())
            }
            _ => Err(MoveAbort::FunctionNotFound),
        }
    }

    fn apply(&self, state: &mut LedgerState, mutations: Vec<Mutation>) -> Vec<ObjectChange> {
        let mut changes = Vec::with_capacity(mutations.len());
        for mutation in mutations {
            match mutation {
                Mutation::Create { id, owner, object } => {
                    changes.push(ObjectChange {
                        kind: ObjectChangeKind::Created,
                        object_id: id,
                        object_type: self.type_of(&object),
                        owner,
                    });
                    state.objects.insert(id, StoredObject { owner, object });
                }
                Mutation::AddAddress {
                    whitelist_id,
                    address,
                } => {
                    if let Some(stored) = state.objects.get_mut(&whitelist_id) {
                        if let LedgerObject::Whitelist { addresses } = &mut stored.object {
                            addresses.insert(address);
                        }
                        changes.push(ObjectChange {
                            kind: ObjectChangeKind::Mutated,
                            object_id: whitelist_id,
                            object_type: self.type_of(&stored.object),
                            owner: stored.owner,
                        });
                    }
                }
            }
        }
        changes
    }
}

fn whitelist<'a>(
    state: &'a LedgerState,
    id: &ObjectId,
) -> Result<&'a BTreeSet<Address>, MoveAbort> {
    match state.objects.get(id) {
        Some(StoredObject {
            object: LedgerObject::Whitelist { addresses },
            ..
        }) => Ok(addresses),
        Some(_) => Err(MoveAbort::InvalidArguments),
        None => Err(MoveAbort::ObjectNotFound),
    }
}

fn derive_object_id(digest: &TransactionDigest, index: u64) -> ObjectId {
    let mut hasher = Sha256::new();
    hasher.update(digest.as_bytes());
    hasher.update(index.to_le_bytes());
    ObjectId::new(hasher.finalize().into())
}

fn derive_digest(tx_bytes: &[u8], sequence: u64) -> TransactionDigest {
    let mut hasher = Sha256::new();
    hasher.update(tx_bytes);
    hasher.update(sequence.to_le_bytes());
    TransactionDigest::new(hasher.finalize().into())
}

#[async_trait]
impl ChainRpc for LocalLedger {
    async fn execute_transaction(
        &self,
        tx: SignedTransaction,
    ) -> Result<TransactionDigest, ChainClientError> {
        let data = TransactionData::from_bytes(&tx.tx_bytes)
            .map_err(|e| ChainClientError::InvalidTransaction(e.to_string()))?;

        let signer = tx
            .signature
            .verify(IntentScope::TransactionData, &tx.tx_bytes)
            .map_err(|e| ChainClientError::InvalidSignature(e.to_string()))?;
        if signer != data.sender {
            return Err(ChainClientError::InvalidSignature(format!(
                "signed by {signer}, sender is {}",
                data.sender
            )));
        }

        let mut state = self.lock()?;
        state.sequence += 1;
        let digest = derive_digest(&tx.tx_bytes, state.sequence);

        let (status, object_changes) = match self.execute(&state, &data, &digest) {
            Ok(mutations) => {
                let changes = self.apply(&mut state, mutations);
                (ExecutionStatus::Success, changes)
            }
            Err(abort) => (
                ExecutionStatus::Failure {
                    error: abort.to_string(),
                },
                Vec::new(),
            ),
        };

        tracing::debug!(
            %digest,
            call = %data.call.target(),
            sender = %data.sender,
            success = status.is_success(),
            "Ledger executed transaction"
        );

        state.effects.insert(
            digest,
            IndexedEffects {
                visible_at: Instant::now() + self.indexing_delay,
                effects: TransactionEffects {
                    digest,
                    status,
                    object_changes,
                },
            },
        );

        Ok(digest)
    }

    async fn get_transaction_effects(
        &self,
        digest: &TransactionDigest,
    ) -> Result<Option<TransactionEffects>, ChainClientError> {
        let state = self.lock()?;
        Ok(state
            .effects
            .get(digest)
            .filter(|indexed| Instant::now() >= indexed.visible_at)
            .map(|indexed| indexed.effects.clone()))
    }

    async fn dev_inspect(&self, tx_bytes: &[u8]) -> Result<InspectResult, ChainClientError> {
        let data = TransactionData::from_bytes(tx_bytes)
            .map_err(|e| ChainClientError::InvalidTransaction(e.to_string()))?;

        let state = self.lock()?;
        let digest = derive_digest(tx_bytes, state.sequence);
        let status = match self.execute(&state, &data, &digest) {
            Ok(_) => ExecutionStatus::Success,
            Err(abort) => ExecutionStatus::Failure {
                error: abort.to_string(),
            },
        };

        Ok(InspectResult { status })
    }
}
