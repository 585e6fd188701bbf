// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Adherence commitments and weekly Merkle aggregation.
//!
//! This module provides:
//! - BN254 field elements (the wire form of check-in commitments)
//! - ISO-week batch keys for the (subject, week) namespace
//! - The weekly Merkle aggregation that mirrors the summary circuit

pub mod aggregator;
pub mod types;

pub use aggregator::{
    aggregate, AggregationError, AggregationOutput, TREE_CAPACITY, TREE_LEVELS,
};
pub use types::{BatchKey, Commitment, FieldElement, FieldParseError, MerkleRoot, WeekId};
