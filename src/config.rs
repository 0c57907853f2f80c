// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and the demo scenario
//! configuration. Configuration is loaded from the environment at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DEMO_CONFIG` | Path to a JSON [`DemoConfig`] file | Built-in reference scenario |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |
//!
//! ## Reference Scenario
//!
//! One owner and two agents (`email`, `discord`), one whitelist per agent,
//! two local key servers with threshold 1, sessions of 10 minutes and up to
//! three blob write attempts.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::authorization::DEFAULT_TTL_MIN;
use crate::chain::ledger::POLICY_MODULE;
use crate::chain::{network_by_name, NetworkConfig, ObjectId, PollPolicy};
use crate::gateway::session::{MAX_TTL_MIN, MIN_TTL_MIN};
use crate::storage::client::{DEFAULT_EPOCHS, DEFAULT_RETRY_CEILING};

/// Environment variable naming the JSON scenario file.
///
/// # Default
/// Unset: the built-in reference scenario is used.
pub const DEMO_CONFIG_ENV: &str = "DEMO_CONFIG";

/// Environment variable selecting the log output format.
///
/// # Values
/// - `pretty` (default): human-readable
/// - `json`: one JSON object per event
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Environment variable holding the `tracing` filter directive.
pub const RUST_LOG_ENV: &str = "RUST_LOG";

/// Default log filter.
pub const DEFAULT_LOG_FILTER: &str = "info";

const DEFAULT_PACKAGE_ID: &str =
    "0x178a15e9921f9988d7bf092b4252d203700e0de9e2384f80fbb9a5dae22ae26c";
const DEFAULT_OWNER_KEY: &str = "BtJfLV7MbPK05KQD6Q+8wxPqyRJx6MSHDiY6AjWuf9k=";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// One agent of the scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Label; also the key of the agent's entry in the combined payload.
    pub label: String,
    /// Base64-encoded 32-byte Ed25519 seed.
    pub secret_key: String,
    /// JSON file holding the agent's data.
    pub input_path: PathBuf,
}

/// Bounded polling for transaction confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmationConfig {
    pub initial_interval_ms: u64,
    pub max_interval_ms: u64,
    pub timeout_ms: u64,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        let policy = PollPolicy::default();
        Self {
            initial_interval_ms: duration_ms(policy.initial_interval),
            max_interval_ms: duration_ms(policy.max_interval),
            timeout_ms: duration_ms(policy.timeout),
        }
    }
}

impl ConfirmationConfig {
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            initial_interval: Duration::from_millis(self.initial_interval_ms),
            max_interval: Duration::from_millis(self.max_interval_ms),
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Demo scenario configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// `localnet` or `testnet`.
    pub network: String,
    /// Base64-encoded seed of the data owner.
    pub owner_key: String,
    pub agents: Vec<AgentConfig>,
    pub package_id: ObjectId,
    pub module_name: String,
    pub threshold: u8,
    pub ttl_minutes: u16,
    pub retry_ceiling: u32,
    pub storage_epochs: u32,
    /// Number of key servers in the committee.
    pub key_servers: usize,
    pub verify_key_servers: bool,
    /// Also sign and execute each policy check, logging the outcome.
    pub broadcast_probe: bool,
    pub confirmation: ConfirmationConfig,
    /// Delay before the local ledger exposes transaction effects.
    pub indexing_delay_ms: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            network: "localnet".to_string(),
            owner_key: DEFAULT_OWNER_KEY.to_string(),
            agents: vec![
                AgentConfig {
                    label: "email".to_string(),
                    secret_key: "AtJfLV7MbPK05KQD6Q+8wxPqyRJx6MSHDiY6AjWuf9k=".to_string(),
                    input_path: PathBuf::from("./data/email_1.json"),
                },
                AgentConfig {
                    label: "discord".to_string(),
                    secret_key: "CtJfLV7MbPK05KQD6Q+8wxPqyRJx6MSHDiY6AjWuf9k=".to_string(),
                    input_path: PathBuf::from("./data/discord.json"),
                },
            ],
            package_id: ObjectId::new(
                crate::encoding::parse_id32(DEFAULT_PACKAGE_ID).unwrap_or([0; 32]),
            ),
            module_name: POLICY_MODULE.to_string(),
            threshold: 1,
            ttl_minutes: DEFAULT_TTL_MIN,
            retry_ceiling: DEFAULT_RETRY_CEILING,
            storage_epochs: DEFAULT_EPOCHS,
            key_servers: 2,
            verify_key_servers: true,
            broadcast_probe: false,
            confirmation: ConfirmationConfig::default(),
            indexing_delay_ms: 500,
        }
    }
}

impl DemoConfig {
    /// Load from the file named by `DEMO_CONFIG`, or the reference scenario.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = match std::env::var(DEMO_CONFIG_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::from_file(path.trim())?,
            _ => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON file; missing fields take reference values.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn network_config(&self) -> Result<NetworkConfig, ConfigError> {
        network_by_name(&self.network).map_err(ConfigError::Invalid)
    }

    pub fn indexing_delay(&self) -> Duration {
        Duration::from_millis(self.indexing_delay_ms)
    }

    /// Reject settings the scenario cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.network_config()?;

        if self.agents.len() < 2 {
            return Err(ConfigError::Invalid(format!(
                "at least two agents are required, got {}",
                self.agents.len()
            )));
        }
        for (i, agent) in self.agents.iter().enumerate() {
            if agent.label.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("agent #{i} has an empty label")));
            }
            if self.agents[..i].iter().any(|other| other.label == agent.label) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate agent label `{}`",
                    agent.label
                )));
            }
        }

        // The in-process ledger only publishes the policy module.
        if self.module_name != POLICY_MODULE {
            return Err(ConfigError::Invalid(format!(
                "module_name `{}` is not published by the ledger, expected `{POLICY_MODULE}`",
                self.module_name
            )));
        }
        if self.key_servers == 0 {
            return Err(ConfigError::Invalid("key_servers must be at least 1".to_string()));
        }
        if self.threshold == 0 || usize::from(self.threshold) > self.key_servers {
            return Err(ConfigError::Invalid(format!(
                "threshold {} must be between 1 and key_servers ({})",
                self.threshold, self.key_servers
            )));
        }
        if !(MIN_TTL_MIN..=MAX_TTL_MIN).contains(&self.ttl_minutes) {
            return Err(ConfigError::Invalid(format!(
                "ttl_minutes {} must be between {MIN_TTL_MIN} and {MAX_TTL_MIN}",
                self.ttl_minutes
            )));
        }
        if self.retry_ceiling == 0 {
            return Err(ConfigError::Invalid("retry_ceiling must be at least 1".to_string()));
        }
        if self.storage_epochs == 0 {
            return Err(ConfigError::Invalid("storage_epochs must be at least 1".to_string()));
        }

        let c = &self.confirmation;
        if c.initial_interval_ms == 0 || c.initial_interval_ms > c.max_interval_ms {
            return Err(ConfigError::Invalid(format!(
                "confirmation intervals must satisfy 0 < initial ({}) <= max ({})",
                c.initial_interval_ms, c.max_interval_ms
            )));
        }
        if c.timeout_ms == 0 {
            return Err(ConfigError::Invalid("confirmation timeout must be positive".to_string()));
        }
        Ok(())
    }
}
