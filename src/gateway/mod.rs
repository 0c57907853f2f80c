// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Policy-gated encryption.
//!
//! This module provides functionality for:
//! - Encrypting payloads under a (package, id) policy tuple
//! - Session credentials that delegate key requests to an ephemeral key
//! - Key servers that release key shares only for approved policy checks
//! - Decrypting with a threshold of cooperating key servers

pub mod client;
pub mod error;
pub mod key_server;
pub mod object;
pub mod session;

pub use client::{Encrypted, EncryptionGateway};
pub use error::GatewayError;
pub use key_server::{KeyServer, KeyServerInfo, LocalKeyServer};
pub use object::{DataKey, EncryptedObject, PolicyTuple};
pub use session::{Certificate, SessionCredential, SessionError};
