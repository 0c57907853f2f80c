// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Blob storage client with a write retry ceiling.

use std::sync::Arc;

use super::{BlobId, BlobStore, StorageError, WriteBlob};
use crate::identity::Identity;

/// Default number of write attempts.
pub const DEFAULT_RETRY_CEILING: u32 = 3;
/// Default storage duration in epochs.
pub const DEFAULT_EPOCHS: u32 = 1;

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub blob_id: BlobId,
    /// Write attempts made, including the successful one.
    pub attempts: u32,
}

#[derive(Clone)]
pub struct BlobStorageClient {
    store: Arc<dyn BlobStore>,
    retry_ceiling: u32,
    epochs: u32,
}

impl BlobStorageClient {
    pub fn new(store: Arc<dyn BlobStore>, retry_ceiling: u32, epochs: u32) -> Self {
        Self {
            store,
            retry_ceiling: retry_ceiling.max(1),
            epochs,
        }
    }

    /// Store `data` as a deletable blob paid for by `signer`.
    ///
    /// Retries immediately on any failure, up to the retry ceiling.
    pub async fn upload(
        &self,
        data: &[u8],
        signer: &Identity,
    ) -> Result<UploadReceipt, StorageError> {
        let size = data.len() as u64;
        match self.store.storage_cost(size, self.epochs).await {
            Ok(cost) => tracing::info!(
                backend = self.store.name(),
                size,
                epochs = self.epochs,
                %cost,
                "Storage cost"
            ),
            Err(e) => tracing::warn!(error = %e, "Storage cost unavailable"),
        }

        let request = WriteBlob {
            data,
            epochs: self.epochs,
            deletable: true,
            signer,
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.store.write_blob(request).await {
                Ok(blob_id) => {
                    tracing::info!(%blob_id, attempts = attempt, "Blob uploaded");
                    return Ok(UploadReceipt {
                        blob_id,
                        attempts: attempt,
                    });
                }
                Err(e) if attempt < self.retry_ceiling => {
                    tracing::warn!(attempt, error = %e, "Blob write failed, retrying");
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Blob write failed");
                    return Err(StorageError::UploadFailed {
                        attempts: attempt,
                        last_error: Box::new(e),
                    });
                }
            }
        }
    }

    /// Fetch a blob. A single attempt; failures are returned as-is.
    pub async fn download(&self, blob_id: &BlobId) -> Result<Vec<u8>, StorageError> {
        let data = self.store.read_blob(blob_id).await?;
        tracing::info!(%blob_id, size = data.len(), "Blob retrieved");
        Ok(data)
    }
}
