// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Data Wallet - Sealed Access Demo
//!
//! An owner encrypts each agent's data under an on-chain whitelist policy,
//! stores the combined ciphertext as a blob, and agents then try to decrypt
//! it through policy-gated key servers: one authorized, one not.
//!
//! ## Modules
//!
//! - `chain` - Ledger types, RPC seam, confirmation polling, local ledger
//! - `registry` - Whitelist and capability management
//! - `gateway` - Policy-gated encryption, sessions and key servers
//! - `authorization` - Session credentials and policy-check transactions
//! - `storage` - Blob storage with a write retry ceiling
//! - `pipeline` - The scenario as an ordered list of steps

pub mod authorization;
pub mod chain;
pub mod config;
pub mod encoding;
pub mod error;
pub mod gateway;
pub mod identity;
pub mod logging;
pub mod payload;
pub mod pipeline;
pub mod registry;
pub mod state;
pub mod storage;
