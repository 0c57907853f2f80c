// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger integration module.
//!
//! This module provides functionality for:
//! - Describing move calls, transactions and their effects
//! - Signing and submitting transactions, then polling for confirmation
//! - An in-process ledger hosting the whitelist policy package

pub mod client;
pub mod ledger;
pub mod transactions;
pub mod types;

pub use client::{wait_for_effects, ChainClientError, ChainRpc, PollPolicy};
pub use ledger::LocalLedger;
pub use transactions::TxBuilder;
pub use types::*;
