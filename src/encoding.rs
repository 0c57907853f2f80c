// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Hex helpers shared by addresses, object ids and signatures.

/// Error returned when a `0x`-prefixed 32-byte hex identifier fails to parse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid 32-byte hex identifier `{input}`: {reason}")]
pub struct ParseIdError {
    pub input: String,
    pub reason: String,
}

/// Parse a 32-byte identifier from hex, with or without a `0x` prefix.
///
/// Short inputs are left-padded with zeros so `0x2` and
/// `0x000…002` name the same identifier.
pub fn parse_id32(input: &str) -> Result<[u8; 32], ParseIdError> {
    let trimmed = input.trim();
    let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);

    if digits.is_empty() || digits.len() > 64 {
        return Err(ParseIdError {
            input: input.to_string(),
            reason: format!("expected 1..=64 hex digits, got {}", digits.len()),
        });
    }

    let padded = format!("{digits:0>64}");
    let bytes = hex::decode(&padded).map_err(|e| ParseIdError {
        input: input.to_string(),
        reason: e.to_string(),
    })?;

    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// Serde adapter for `Vec<u8>` fields stored as lowercase hex strings.
pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        hex::decode(raw.trim_start_matches("0x")).map_err(serde::de::Error::custom)
    }
}

/// Implements `Display`, `FromStr` and string-based serde for a `[u8; 32]` newtype.
macro_rules! hex_id32 {
    ($name:ident) => {
        impl $name {
            /// Wrap raw bytes.
            pub const fn new(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            /// Raw bytes.
            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            /// `0x`-prefixed lowercase hex.
            pub fn to_hex(&self) -> String {
                format!("0x{}", hex::encode(self.0))
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::encoding::ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $crate::encoding::parse_id32(s).map(Self)
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

pub(crate) use hex_id32;
