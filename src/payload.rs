// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Agent payloads and the combined ciphertext document.
//!
//! Each agent's input is a JSON file, parsed and re-serialized compactly
//! before encryption. Ciphertexts are stored together as one JSON object
//! mapping agent label to a byte array:
//!
//! ```json
//! {"discord":[123,34,...],"email":[123,34,...]}
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Characters of decrypted content shown in logs.
pub const PREVIEW_CHARS: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not valid JSON: {source}")]
    InvalidJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Combined payload is malformed: {0}")]
    InvalidCombined(#[from] serde_json::Error),

    #[error("Combined payload has no entry for `{0}`")]
    MissingEntry(String),
}

/// Read a JSON file and return its compact serialization.
pub fn read_json_payload(path: impl AsRef<Path>) -> Result<Vec<u8>, PayloadError> {
    let path = path.as_ref();
    let raw = std::fs::read(path).map_err(|source| PayloadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let value: serde_json::Value =
        serde_json::from_slice(&raw).map_err(|source| PayloadError::InvalidJson {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(serde_json::to_vec(&value)?)
}

/// Ciphertexts keyed by agent label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CombinedPayload(BTreeMap<String, Vec<u8>>);

impl CombinedPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, label: impl Into<String>, ciphertext: Vec<u8>) {
        self.0.insert(label.into(), ciphertext);
    }

    pub fn get(&self, label: &str) -> Result<&[u8], PayloadError> {
        self.0
            .get(label)
            .map(Vec::as_slice)
            .ok_or_else(|| PayloadError::MissingEntry(label.to_string()))
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, PayloadError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PayloadError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// First [`PREVIEW_CHARS`] characters of `bytes` as lossy UTF-8.
pub fn preview(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .chars()
        .take(PREVIEW_CHARS)
        .collect()
}
