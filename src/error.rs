// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Startup errors that prevent the pipeline from running at all.
//!
//! Failures once the pipeline is running are reported per step in the
//! [`DemoReport`](crate::pipeline::DemoReport) instead.

use crate::config::ConfigError;
use crate::gateway::GatewayError;
use crate::state::ServicesError;

#[derive(Debug, thiserror::Error)]
pub enum DemoError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to start services: {0}")]
    Services(#[from] ServicesError),

    #[error("Failed to set up encryption: {0}")]
    Gateway(#[from] GatewayError),
}

impl DemoError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            DemoError::Config(_) => 2,
            DemoError::Services(_) | DemoError::Gateway(_) => 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_map_to_usage_exit_code() {
        let err: DemoError = ConfigError::Invalid("threshold".to_string()).into();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("threshold"));

        let err: DemoError = GatewayError::InvalidThreshold {
            threshold: 0,
            servers: 1,
        }
        .into();
        assert_eq!(err.exit_code(), 3);
    }
}
