// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Whitelist policy registry client.
//!
//! Creates whitelist objects with their capability and adds members. Created
//! objects are discovered from transaction effects by exact type match against
//! [`PolicyResource`].

use std::fmt;

use crate::chain::{
    CallArg, ChainClientError, MoveCall, ObjectId, StructTag, TransactionDigest,
    TransactionEffects, TxBuilder,
};
use crate::identity::{Address, Identity};

/// Ledger resources the policy package creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyResource {
    Whitelist,
    Cap,
}

impl PolicyResource {
    pub fn type_name(&self) -> &'static str {
        match self {
            PolicyResource::Whitelist => crate::chain::ledger::WHITELIST_TYPE,
            PolicyResource::Cap => crate::chain::ledger::CAP_TYPE,
        }
    }

    /// Fully qualified type of this resource under `package`/`module`.
    pub fn type_tag(&self, package: ObjectId, module: &str) -> StructTag {
        StructTag::new(package, module, self.type_name())
    }
}

impl fmt::Display for PolicyResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// A whitelist together with the capability that may mutate it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WhitelistHandle {
    pub whitelist_id: ObjectId,
    pub cap_id: ObjectId,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The transaction succeeded but did not create the expected object.
    /// On-chain state is ambiguous, so this is never retried.
    #[error("Transaction {digest} did not create a {resource} object")]
    ResourceNotFound {
        resource: PolicyResource,
        digest: TransactionDigest,
    },

    #[error(transparent)]
    Chain(#[from] ChainClientError),
}

/// Client for the whitelist policy package.
#[derive(Clone)]
pub struct PolicyRegistry {
    tx: TxBuilder,
    package_id: ObjectId,
    module: String,
}

impl PolicyRegistry {
    pub fn new(tx: TxBuilder, package_id: ObjectId, module: impl Into<String>) -> Self {
        Self {
            tx,
            package_id,
            module: module.into(),
        }
    }

    pub fn package_id(&self) -> ObjectId {
        self.package_id
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    /// Create a whitelist owned by `identity`, returning it and its cap.
    pub async fn create_whitelist(
        &self,
        identity: &Identity,
    ) -> Result<WhitelistHandle, RegistryError> {
        let call = MoveCall::new(
            self.package_id,
            &self.module,
            "create_whitelist_entry",
            Vec::new(),
        );
        let effects = self.tx.sign_and_execute(identity, call).await?;

        let handle = WhitelistHandle {
            whitelist_id: self.find_created(&effects, PolicyResource::Whitelist)?,
            cap_id: self.find_created(&effects, PolicyResource::Cap)?,
        };

        tracing::info!(
            owner = %identity.address(),
            whitelist_id = %handle.whitelist_id,
            cap_id = %handle.cap_id,
            "Whitelist created"
        );
        Ok(handle)
    }

    /// Add `address` to the whitelist; `identity` must own the cap.
    pub async fn add_address(
        &self,
        identity: &Identity,
        handle: &WhitelistHandle,
        address: Address,
    ) -> Result<(), RegistryError> {
        let call = MoveCall::new(
            self.package_id,
            &self.module,
            "add",
            vec![
                CallArg::Object(handle.whitelist_id),
                CallArg::Object(handle.cap_id),
                CallArg::Address(address),
            ],
        );
        let effects = self.tx.sign_and_execute(identity, call).await?;

        tracing::info!(
            digest = %effects.digest,
            whitelist_id = %handle.whitelist_id,
            %address,
            "Address added to whitelist"
        );
        Ok(())
    }

    fn find_created(
        &self,
        effects: &TransactionEffects,
        resource: PolicyResource,
    ) -> Result<ObjectId, RegistryError> {
        let expected = resource.type_tag(self.package_id, &self.module);
        effects
            .created()
            .find(|change| change.object_type == expected)
            .map(|change| change.object_id)
            .ok_or(RegistryError::ResourceNotFound {
                resource,
                digest: effects.digest,
            })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::chain::{
        ExecutionStatus, LocalLedger, ObjectChange, ObjectChangeKind, PollPolicy,
    };

    fn package() -> ObjectId {
        "0x178a15e9921f9988d7bf092b4252d203700e0de9e2384f80fbb9a5dae22ae26c"
            .parse()
            .unwrap()
    }

    fn registry(ledger: Arc<LocalLedger>) -> PolicyRegistry {
        PolicyRegistry::new(
            TxBuilder::new(ledger, PollPolicy::default()),
            package(),
            "access_policy",
        )
    }

    #[tokio::test]
    async fn create_then_add() {
        let ledger = Arc::new(LocalLedger::new(package(), Duration::ZERO));
        let registry = registry(ledger.clone());
        let owner = Identity::generate("owner").unwrap();
        let agent = Identity::generate("agent").unwrap();

        let handle = registry.create_whitelist(&owner).await.unwrap();
        assert_ne!(handle.whitelist_id, handle.cap_id);

        registry
            .add_address(&owner, &handle, agent.address())
            .await
            .unwrap();
        assert!(ledger.is_member(&handle.whitelist_id, &agent.address()));
    }

    #[tokio::test]
    async fn add_with_foreign_cap_fails() {
        let ledger = Arc::new(LocalLedger::new(package(), Duration::ZERO));
        let registry = registry(ledger);
        let owner = Identity::generate("owner").unwrap();

        let a = registry.create_whitelist(&owner).await.unwrap();
        let b = registry.create_whitelist(&owner).await.unwrap();
        let mixed = WhitelistHandle {
            whitelist_id: a.whitelist_id,
            cap_id: b.cap_id,
        };

        let err = registry
            .add_address(&owner, &mixed, owner.address())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::Chain(ChainClientError::ExecutionFailed { .. })
        ));
    }

    #[test]
    fn lookup_is_exact_not_substring() {
        let registry = registry(Arc::new(LocalLedger::new(package(), Duration::ZERO)));
        let digest = TransactionDigest::new([3; 32]);
        let effects = TransactionEffects {
            digest,
            status: ExecutionStatus::Success,
            object_changes: vec![ObjectChange {
                kind: ObjectChangeKind::Created,
                object_id: ObjectId::new([1; 32]),
                // Contains `Cap` as a substring but is a different type.
                object_type: StructTag::new(package(), "access_policy", "CapRegistry"),
                owner: None,
            }],
        };

        let err = registry
            .find_created(&effects, PolicyResource::Cap)
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::ResourceNotFound {
                resource: PolicyResource::Cap,
                ..
            }
        ));
    }

    #[test]
    fn lookup_ignores_mutated_objects() {
        let registry = registry(Arc::new(LocalLedger::new(package(), Duration::ZERO)));
        let effects = TransactionEffects {
            digest: TransactionDigest::new([3; 32]),
            status: ExecutionStatus::Success,
            object_changes: vec![ObjectChange {
                kind: ObjectChangeKind::Mutated,
                object_id: ObjectId::new([1; 32]),
                object_type: PolicyResource::Whitelist.type_tag(package(), "access_policy"),
                owner: None,
            }],
        };

        assert!(registry
            .find_created(&effects, PolicyResource::Whitelist)
            .is_err());
    }
}
