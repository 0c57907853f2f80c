// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger types and constants.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::encoding::{hex_bytes, hex_id32};
use crate::identity::{Address, Signature};

/// Default gas budget attached to every move call.
pub const DEFAULT_GAS_BUDGET: u64 = 10_000_000;

/// Ledger object identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 32]);

hex_id32!(ObjectId);

/// Transaction digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionDigest([u8; 32]);

hex_id32!(TransactionDigest);

/// Fully qualified type of a ledger object: `0x<package>::<module>::<Name>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructTag {
    pub package: ObjectId,
    pub module: String,
    pub name: String,
}

impl StructTag {
    pub fn new(package: ObjectId, module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            package,
            module: module.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for StructTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}::{}", self.package, self.module, self.name)
    }
}

impl FromStr for StructTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split("::");
        let (Some(package), Some(module), Some(name), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(format!("expected `package::module::Name`, got `{s}`"));
        };

        if module.is_empty() || name.is_empty() {
            return Err(format!("empty module or name in `{s}`"));
        }

        Ok(Self {
            package: package.parse().map_err(|e| format!("{e}"))?,
            module: module.to_string(),
            name: name.to_string(),
        })
    }
}

impl Serialize for StructTag {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for StructTag {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Argument to a move call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CallArg {
    /// Pure `vector<u8>` value.
    Bytes(#[serde(with = "hex_bytes")] Vec<u8>),
    /// Pure `address` value.
    Address(Address),
    /// Reference to a ledger object.
    Object(ObjectId),
}

/// A single entry-function invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveCall {
    pub package: ObjectId,
    pub module: String,
    pub function: String,
    pub arguments: Vec<CallArg>,
}

impl MoveCall {
    pub fn new(
        package: ObjectId,
        module: impl Into<String>,
        function: impl Into<String>,
        arguments: Vec<CallArg>,
    ) -> Self {
        Self {
            package,
            module: module.into(),
            function: function.into(),
            arguments,
        }
    }

    /// `package::module::function`, for logs.
    pub fn target(&self) -> String {
        format!("{}::{}::{}", self.package, self.module, self.function)
    }
}

/// Unsigned transaction: sender plus the call to execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionData {
    pub sender: Address,
    pub call: MoveCall,
    pub gas_budget: u64,
}

impl TransactionData {
    pub fn new(sender: Address, call: MoveCall) -> Self {
        Self {
            sender,
            call,
            gas_budget: DEFAULT_GAS_BUDGET,
        }
    }

    /// Canonical wire bytes. These are what gets signed and what the key
    /// servers evaluate.
    pub fn to_bytes(&self) -> Vec<u8> {
        // Serializing plain structs of strings and hex ids cannot fail.
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Transaction bytes plus the sender's signature over them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedTransaction {
    #[serde(with = "hex_bytes")]
    pub tx_bytes: Vec<u8>,
    pub signature: Signature,
}

/// Outcome of executing a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Failure { error: String },
}

impl ExecutionStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionStatus::Success)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectChangeKind {
    Created,
    Mutated,
}

/// One object touched by a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectChange {
    pub kind: ObjectChangeKind,
    pub object_id: ObjectId,
    pub object_type: StructTag,
    pub owner: Option<Address>,
}

/// Effects of an executed transaction as reported by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionEffects {
    pub digest: TransactionDigest,
    pub status: ExecutionStatus,
    pub object_changes: Vec<ObjectChange>,
}

impl TransactionEffects {
    /// Iterate over objects created by this transaction.
    pub fn created(&self) -> impl Iterator<Item = &ObjectChange> {
        self.object_changes
            .iter()
            .filter(|change| change.kind == ObjectChangeKind::Created)
    }
}

/// Result of evaluating a transaction against current state without
/// committing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectResult {
    pub status: ExecutionStatus,
}

/// Network configuration.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Network name for display
    pub name: &'static str,
    /// Blob publisher endpoint (None for in-process storage)
    pub publisher_url: Option<&'static str>,
    /// Blob aggregator endpoint (None for in-process storage)
    pub aggregator_url: Option<&'static str>,
}

/// In-process network: ledger, key servers and blob store all local.
pub const LOCALNET: NetworkConfig = NetworkConfig {
    name: "localnet",
    publisher_url: None,
    aggregator_url: None,
};

/// Public testnet blob storage endpoints.
pub const TESTNET: NetworkConfig = NetworkConfig {
    name: "testnet",
    publisher_url: Some("https://publisher.walrus-testnet.walrus.space"),
    aggregator_url: Some("https://aggregator.walrus-testnet.walrus.space"),
};

/// Resolve a network by name.
pub fn network_by_name(raw: &str) -> Result<NetworkConfig, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "localnet" | "local" => Ok(LOCALNET),
        "testnet" => Ok(TESTNET),
        other => Err(format!(
            "Unknown network `{other}` (expected `localnet` or `testnet`)"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn struct_tag_parses_and_displays() {
        let tag: StructTag = "0x2::access_policy::Whitelist".parse().unwrap();
        assert_eq!(tag.module, "access_policy");
        assert_eq!(tag.name, "Whitelist");
        assert_eq!(tag.package, "0x2".parse::<ObjectId>().unwrap());
        assert_eq!(tag.to_string().parse::<StructTag>().unwrap(), tag);
    }

    #[test]
    fn struct_tag_rejects_malformed() {
        assert!("0x2::access_policy".parse::<StructTag>().is_err());
        assert!("0x2::a::B::C".parse::<StructTag>().is_err());
        assert!("0x2::::B".parse::<StructTag>().is_err());
    }

    #[test]
    fn transaction_bytes_round_trip() {
        let call = MoveCall::new(
            "0x2".parse().unwrap(),
            "access_policy",
            "seal_approve",
            vec![CallArg::Bytes(vec![1, 2, 3]), CallArg::Object("0x5".parse().unwrap())],
        );
        let sender = Address::new([9; 32]);
        let tx = TransactionData::new(sender, call);

        let decoded = TransactionData::from_bytes(&tx.to_bytes()).unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(decoded.gas_budget, DEFAULT_GAS_BUDGET);
    }

    #[test]
    fn network_lookup() {
        assert_eq!(network_by_name("Testnet").unwrap().name, "testnet");
        assert_eq!(network_by_name("localnet").unwrap().name, "localnet");
        assert!(network_by_name("mainnet").is_err());
    }
}
