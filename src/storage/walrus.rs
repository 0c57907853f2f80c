// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Walrus HTTP blob store.
//!
//! Writes go to a publisher (`PUT /v1/blobs`), reads to an aggregator
//! (`GET /v1/blobs/{blob_id}`). The publisher pays for storage with its own
//! wallet and transfers the resulting blob object to the signer's address.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use url::Url;

use super::{BlobId, BlobStore, StorageCost, StorageError, WriteBlob};
use crate::chain::NetworkConfig;

/// HTTP request timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreResponse {
    newly_created: Option<NewlyCreated>,
    already_certified: Option<AlreadyCertified>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewlyCreated {
    blob_object: BlobObject,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlobObject {
    blob_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlreadyCertified {
    blob_id: String,
}

impl StoreResponse {
    fn into_blob_id(self) -> Result<BlobId, StorageError> {
        match (self.newly_created, self.already_certified) {
            (Some(created), _) => Ok(BlobId::new(created.blob_object.blob_id)),
            (None, Some(certified)) => Ok(BlobId::new(certified.blob_id)),
            (None, None) => Err(StorageError::InvalidResponse(
                "store response has neither newlyCreated nor alreadyCertified".to_string(),
            )),
        }
    }
}

/// Blob store backed by a Walrus publisher and aggregator.
#[derive(Debug, Clone)]
pub struct WalrusBlobStore {
    publisher: Url,
    aggregator: Url,
    http: Client,
}

impl WalrusBlobStore {
    pub fn new(publisher: &str, aggregator: &str) -> Result<Self, StorageError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StorageError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            publisher: parse_base(publisher)?,
            aggregator: parse_base(aggregator)?,
            http,
        })
    }

    /// Store for `network`, which must name both endpoints.
    pub fn from_network(network: &NetworkConfig) -> Result<Self, StorageError> {
        match (network.publisher_url, network.aggregator_url) {
            (Some(publisher), Some(aggregator)) => Self::new(publisher, aggregator),
            _ => Err(StorageError::Transport(format!(
                "network {} has no Walrus endpoints",
                network.name
            ))),
        }
    }

    fn blobs_url(base: &Url, blob_id: Option<&BlobId>) -> Result<Url, StorageError> {
        let path = match blob_id {
            Some(id) => format!("v1/blobs/{id}"),
            None => "v1/blobs".to_string(),
        };
        base.join(&path)
            .map_err(|e| StorageError::Transport(format!("invalid blob URL: {e}")))
    }
}

fn parse_base(raw: &str) -> Result<Url, StorageError> {
    let normalized = format!("{}/", raw.trim_end_matches('/'));
    Url::parse(&normalized)
        .map_err(|e| StorageError::Transport(format!("invalid endpoint {raw}: {e}")))
}

#[async_trait]
impl BlobStore for WalrusBlobStore {
    fn name(&self) -> &str {
        "walrus"
    }

    async fn storage_cost(&self, size: u64, epochs: u32) -> Result<StorageCost, StorageError> {
        // Publishers do not quote prices.
        Ok(StorageCost::estimate(size, epochs))
    }

    async fn write_blob(&self, request: WriteBlob<'_>) -> Result<BlobId, StorageError> {
        let url = Self::blobs_url(&self.publisher, None)?;
        let mut query = vec![
            ("epochs", request.epochs.to_string()),
            ("send_object_to", request.signer.address().to_string()),
        ];
        if request.deletable {
            query.push(("deletable", "true".to_string()));
        }

        let response = self
            .http
            .put(url)
            .query(&query)
            .body(request.data.to_vec())
            .send()
            .await
            .map_err(|e| StorageError::Transport(format!("PUT blob failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let stored: StoreResponse = response
            .json()
            .await
            .map_err(|e| StorageError::InvalidResponse(format!("store response: {e}")))?;
        let blob_id = stored.into_blob_id()?;

        tracing::debug!(%blob_id, size = request.data.len(), "Blob stored on Walrus");
        Ok(blob_id)
    }

    async fn read_blob(&self, blob_id: &BlobId) -> Result<Vec<u8>, StorageError> {
        let url = Self::blobs_url(&self.aggregator, Some(blob_id))?;

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| StorageError::Transport(format!("GET blob failed: {e}")))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(StorageError::NotFound(blob_id.clone())),
            status if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                Err(StorageError::Rejected {
                    status: status.as_u16(),
                    body,
                })
            }
            _ => response
                .bytes()
                .await
                .map(|bytes| bytes.to_vec())
                .map_err(|e| StorageError::Transport(format!("reading blob body failed: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{LOCALNET, TESTNET};

    #[test]
    fn parses_newly_created() {
        let body = r#"{
            "newlyCreated": {
                "blobObject": {
                    "id": "0x0a",
                    "registeredEpoch": 12,
                    "blobId": "M5Ndx0yM1DQgBDsTrzYQIfvxahpCPd1Vt5jnNJMNb1c",
                    "size": 17,
                    "deletable": true
                },
                "cost": 132300
            }
        }"#;
        let parsed: StoreResponse = serde_json::from_str(body).unwrap();
        assert_eq!(
            parsed.into_blob_id().unwrap().as_str(),
            "M5Ndx0yM1DQgBDsTrzYQIfvxahpCPd1Vt5jnNJMNb1c"
        );
    }

    #[test]
    fn parses_already_certified() {
        let body = r#"{"alreadyCertified": {"blobId": "abc", "endEpoch": 40}}"#;
        let parsed: StoreResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.into_blob_id().unwrap(), BlobId::new("abc"));
    }

    #[test]
    fn rejects_empty_store_response() {
        let parsed: StoreResponse = serde_json::from_str("{}").unwrap();
        assert!(matches!(
            parsed.into_blob_id(),
            Err(StorageError::InvalidResponse(_))
        ));
    }

    #[test]
    fn builds_blob_urls() {
        let store = WalrusBlobStore::from_network(&TESTNET).unwrap();
        let url = WalrusBlobStore::blobs_url(&store.aggregator, Some(&BlobId::new("xyz"))).unwrap();
        assert_eq!(
            url.as_str(),
            "https://aggregator.walrus-testnet.walrus.space/v1/blobs/xyz"
        );

        let store = WalrusBlobStore::new("http://127.0.0.1:31415/", "http://127.0.0.1:31416").unwrap();
        let url = WalrusBlobStore::blobs_url(&store.publisher, None).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:31415/v1/blobs");
    }

    #[test]
    fn localnet_has_no_endpoints() {
        assert!(WalrusBlobStore::from_network(&LOCALNET).is_err());
    }
}
