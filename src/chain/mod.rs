// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Chain integration module.
//!
//! This module provides:
//! - Network configuration constants
//! - The EntryPoint client (nonce reads, envelope submission, receipts)
//! - Contract bindings and calldata encoders for account actions

pub mod client;
pub mod contracts;
pub mod types;

pub use client::{ChainClientError, EntryPointClient};
pub use contracts::{
    encode_guardian_update, encode_proof_anchor, encode_recovery_execution,
    guardian_update_payload,
};
pub use types::*;
