// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Collaborator handles shared by the demo pipeline.

use std::sync::Arc;
use std::time::Duration;

use crate::chain::{ChainRpc, LocalLedger, ObjectId};
use crate::config::{ConfigError, DemoConfig};
use crate::gateway::{GatewayError, KeyServer, LocalKeyServer};
use crate::storage::{BlobStore, InMemoryBlobStore, StorageError, WalrusBlobStore};

#[derive(Debug, thiserror::Error)]
pub enum ServicesError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Ledger, key-server committee and blob store.
#[derive(Clone)]
pub struct DemoServices {
    pub ledger: Arc<dyn ChainRpc>,
    pub key_servers: Vec<Arc<dyn KeyServer>>,
    /// Key servers the network vouches for.
    pub allowlist: Vec<ObjectId>,
    pub blob_store: Arc<dyn BlobStore>,
}

impl DemoServices {
    /// Fully in-process services: ledger, `key_servers` servers (all
    /// allowlisted) and an in-memory blob store.
    pub fn local(
        package_id: ObjectId,
        key_servers: usize,
        indexing_delay: Duration,
        blob_store: Arc<dyn BlobStore>,
    ) -> Result<Self, GatewayError> {
        let ledger: Arc<dyn ChainRpc> = Arc::new(LocalLedger::new(package_id, indexing_delay));

        let key_servers = (0..key_servers)
            .map(|i| {
                LocalKeyServer::new(format!("key-server-{i}"), ledger.clone())
                    .map(|server| Arc::new(server) as Arc<dyn KeyServer>)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let allowlist = key_servers.iter().map(|s| s.info().object_id).collect();

        Ok(Self {
            ledger,
            key_servers,
            allowlist,
            blob_store,
        })
    }

    /// Services for `config.network`. Blob storage is remote on `testnet`;
    /// ledger and key servers always run in process.
    pub fn from_config(config: &DemoConfig) -> Result<Self, ServicesError> {
        let network = config.network_config()?;
        let blob_store: Arc<dyn BlobStore> = match network.publisher_url {
            Some(_) => Arc::new(WalrusBlobStore::from_network(&network)?),
            None => Arc::new(InMemoryBlobStore::new()),
        };

        let services = Self::local(
            config.package_id,
            config.key_servers,
            config.indexing_delay(),
            blob_store,
        )?;

        tracing::info!(
            network = network.name,
            key_servers = services.key_servers.len(),
            blob_store = services.blob_store.name(),
            "Services ready"
        );
        Ok(services)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_services_allowlist_every_server() {
        let services = DemoServices::local(
            ObjectId::new([2; 32]),
            3,
            Duration::ZERO,
            Arc::new(InMemoryBlobStore::new()),
        )
        .unwrap();

        assert_eq!(services.key_servers.len(), 3);
        assert_eq!(services.allowlist.len(), 3);
        for server in &services.key_servers {
            assert!(services.allowlist.contains(&server.info().object_id));
        }
    }

    #[test]
    fn testnet_uses_walrus() {
        let config = DemoConfig {
            network: "testnet".to_string(),
            ..DemoConfig::default()
        };
        let services = DemoServices::from_config(&config).unwrap();
        assert_eq!(services.blob_store.name(), "walrus");

        let services = DemoServices::from_config(&DemoConfig::default()).unwrap();
        assert_eq!(services.blob_store.name(), "memory");
    }
}
