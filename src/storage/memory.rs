// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory blob store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use base64ct::{Base64UrlUnpadded, Encoding};
use sha2::{Digest, Sha256};

use super::{BlobId, BlobStore, StorageCost, StorageError, WriteBlob};
use crate::identity::Address;

#[derive(Debug, Clone)]
struct StoredBlob {
    data: Vec<u8>,
    owner: Address,
}

/// Content-addressed store held in process memory.
///
/// Blob ids are the unpadded base64url SHA-256 of the content, so writing
/// the same bytes twice yields the same id.
#[derive(Default)]
pub struct InMemoryBlobStore {
    blobs: Mutex<HashMap<BlobId, StoredBlob>>,
    failing_writes: AtomicU32,
    write_attempts: AtomicU32,
    failing_reads: AtomicU32,
    read_attempts: AtomicU32,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` writes fail with a transport error.
    pub fn fail_next_writes(&self, count: u32) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Writes attempted so far, failed ones included.
    pub fn write_attempts(&self) -> u32 {
        self.write_attempts.load(Ordering::SeqCst)
    }

    /// Make the next `count` reads fail with a transport error.
    pub fn fail_next_reads(&self, count: u32) {
        self.failing_reads.store(count, Ordering::SeqCst);
    }

    /// Reads attempted so far, failed ones included.
    pub fn read_attempts(&self) -> u32 {
        self.read_attempts.load(Ordering::SeqCst)
    }

    /// Owner recorded for `blob_id`.
    pub fn owner_of(&self, blob_id: &BlobId) -> Option<Address> {
        self.blobs
            .lock()
            .ok()
            .and_then(|blobs| blobs.get(blob_id).map(|blob| blob.owner))
    }

    fn blob_id_for(data: &[u8]) -> BlobId {
        BlobId::new(Base64UrlUnpadded::encode_string(&Sha256::digest(data)))
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn poisoned() -> StorageError {
        StorageError::Transport("blob table lock poisoned".to_string())
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn storage_cost(&self, size: u64, epochs: u32) -> Result<StorageCost, StorageError> {
        Ok(StorageCost::estimate(size, epochs))
    }

    async fn write_blob(&self, request: WriteBlob<'_>) -> Result<BlobId, StorageError> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);

        if Self::take_failure(&self.failing_writes) {
            return Err(StorageError::Transport(
                "injected write failure".to_string(),
            ));
        }

        let blob_id = Self::blob_id_for(request.data);
        let mut blobs = self.blobs.lock().map_err(|_| Self::poisoned())?;
        blobs.entry(blob_id.clone()).or_insert_with(|| StoredBlob {
            data: request.data.to_vec(),
            owner: request.signer.address(),
        });

        tracing::debug!(
            %blob_id,
            size = request.data.len(),
            epochs = request.epochs,
            deletable = request.deletable,
            "Blob stored in memory"
        );
        Ok(blob_id)
    }

    async fn read_blob(&self, blob_id: &BlobId) -> Result<Vec<u8>, StorageError> {
        self.read_attempts.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.failing_reads) {
            return Err(StorageError::Transport("injected read failure".to_string()));
        }

        let blobs = self.blobs.lock().map_err(|_| Self::poisoned())?;
        blobs
            .get(blob_id)
            .map(|blob| blob.data.clone())
            .ok_or_else(|| StorageError::NotFound(blob_id.clone()))
    }
}

impl std::fmt::Debug for InMemoryBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stored = self.blobs.lock().map(|blobs| blobs.len()).unwrap_or(0);
        f.debug_struct("InMemoryBlobStore")
            .field("blobs", &stored)
            .field("write_attempts", &self.write_attempts())
            .field("read_attempts", &self.read_attempts())
            .finish()
    }
}
