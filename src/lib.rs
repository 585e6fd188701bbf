// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Adherence Chain Core - Smart-Account Trust Layer
//!
//! This crate binds the smart-account wallet ecosystem to the
//! privacy-preserving adherence-proof system. It owns the three trust
//! paths: circuit-compatible aggregation of weekly commitments, the
//! ERC-4337 pipeline that carries proofs and account actions to the
//! ledger, and guardian-based social recovery.
//!
//! ## Modules
//!
//! - `commitment` - field elements and the weekly Merkle aggregator
//! - `gateway` - proof intake and validation
//! - `userop` - envelopes, builder, sponsor, relay, signing, pipeline
//! - `recovery` - guardian recovery state machine
//! - `chain` - EntryPoint client and calldata encoders
//! - `storage` - durable-store boundary and repositories
//! - `notify` - outbound notification boundary

pub mod chain;
pub mod commitment;
pub mod config;
pub mod gateway;
pub mod notify;
pub mod recovery;
pub mod storage;
pub mod userop;
