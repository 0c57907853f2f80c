// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Blob Storage Module
//!
//! Content is stored as immutable blobs on a storage network and addressed
//! by the blob id returned at write time.
//!
//! ## Backends
//!
//! - [`memory::InMemoryBlobStore`]: process-local, with fault injection
//! - [`walrus::WalrusBlobStore`]: HTTP publisher/aggregator pair
//!
//! ## Retry Policy
//!
//! Writes go through [`client::BlobStorageClient`], which retries up to a
//! fixed ceiling without backoff. Reads are attempted exactly once.

pub mod client;
pub mod memory;
pub mod walrus;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::identity::Identity;

pub use client::{BlobStorageClient, UploadReceipt};
pub use memory::InMemoryBlobStore;
pub use walrus::WalrusBlobStore;

/// Bytes per storage unit used for pricing.
pub const BYTES_PER_UNIT_SIZE: u64 = 1024 * 1024;
/// Erasure-coding expansion applied to the unencoded length.
pub const ENCODING_EXPANSION: u64 = 5;
/// Fixed per-blob metadata overhead in bytes.
pub const METADATA_OVERHEAD: u64 = 64 * 1024;
/// Storage price per unit per epoch, in FROST.
pub const STORAGE_PRICE_PER_UNIT: u64 = 100_000;
/// One-off write price per unit, in FROST.
pub const WRITE_PRICE_PER_UNIT: u64 = 20_000;

/// Identifier of a stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobId(String);

impl BlobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cost of storing a blob, in FROST.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageCost {
    pub storage_cost: u64,
    pub write_cost: u64,
    pub total_cost: u64,
}

impl StorageCost {
    /// Estimate the cost of storing `size` unencoded bytes for `epochs`.
    pub fn estimate(size: u64, epochs: u32) -> Self {
        let encoded = size
            .saturating_mul(ENCODING_EXPANSION)
            .saturating_add(METADATA_OVERHEAD);
        let units = encoded.div_ceil(BYTES_PER_UNIT_SIZE);

        let storage_cost = units
            .saturating_mul(STORAGE_PRICE_PER_UNIT)
            .saturating_mul(u64::from(epochs));
        let write_cost = units.saturating_mul(WRITE_PRICE_PER_UNIT);

        Self {
            storage_cost,
            write_cost,
            total_cost: storage_cost.saturating_add(write_cost),
        }
    }
}

impl fmt::Display for StorageCost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} FROST (storage {}, write {})",
            self.total_cost, self.storage_cost, self.write_cost
        )
    }
}

/// A blob write.
#[derive(Clone, Copy)]
pub struct WriteBlob<'a> {
    pub data: &'a [u8],
    pub epochs: u32,
    pub deletable: bool,
    /// Pays for and owns the resulting blob object.
    pub signer: &'a Identity,
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Blob {0} not found")]
    NotFound(BlobId),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Storage node rejected the request with {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Blob write failed after {attempts} attempt(s): {last_error}")]
    UploadFailed {
        attempts: u32,
        last_error: Box<StorageError>,
    },
}

/// A blob storage network.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Backend name, for logs.
    fn name(&self) -> &str;

    async fn storage_cost(&self, size: u64, epochs: u32) -> Result<StorageCost, StorageError>;

    async fn write_blob(&self, request: WriteBlob<'_>) -> Result<BlobId, StorageError>;

    async fn read_blob(&self, blob_id: &BlobId) -> Result<Vec<u8>, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_scales_with_epochs() {
        let one = StorageCost::estimate(1_000, 1);
        let three = StorageCost::estimate(1_000, 3);

        assert_eq!(one.storage_cost, STORAGE_PRICE_PER_UNIT);
        assert_eq!(three.storage_cost, 3 * STORAGE_PRICE_PER_UNIT);
        assert_eq!(one.write_cost, three.write_cost);
        assert_eq!(three.total_cost, three.storage_cost + three.write_cost);
    }

    #[test]
    fn estimate_rounds_up_to_whole_units() {
        let cost = StorageCost::estimate(BYTES_PER_UNIT_SIZE, 1);
        // 5 MiB encoded plus metadata spills into a sixth unit.
        assert_eq!(cost.write_cost, 6 * WRITE_PRICE_PER_UNIT);
    }
}
