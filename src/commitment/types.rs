// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Field elements and batch keys.

use std::fmt;
use std::str::FromStr;

use alloy::primitives::{Address, U256};
use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField, Zero};
use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A BN254 scalar field element.
///
/// Commitments, Merkle roots, and proof public signals are all field
/// elements. The prover exchanges them as decimal strings, which is also
/// the serde representation here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldElement(Fr);

/// A one-way commitment to a single adherence event.
pub type Commitment = FieldElement;

/// The root of a weekly commitment tree.
pub type MerkleRoot = FieldElement;

impl FieldElement {
    /// The sentinel value used to pad a batch up to tree capacity.
    pub fn zero() -> Self {
        Self(Fr::zero())
    }

    /// Wrap a raw field element.
    pub fn from_fr(inner: Fr) -> Self {
        Self(inner)
    }

    /// The raw field element.
    pub fn into_fr(self) -> Fr {
        self.0
    }

    /// Canonical big-endian byte representation (32 bytes).
    ///
    /// Batches are sorted ascending over this representation before tree
    /// construction, which for a prime field is numeric order.
    pub fn to_bytes_be(&self) -> [u8; 32] {
        let bytes = self.0.into_bigint().to_bytes_be();
        let mut out = [0u8; 32];
        out[32 - bytes.len()..].copy_from_slice(&bytes);
        out
    }

    /// The element as a 256-bit word, for ABI encoding.
    pub fn to_u256(&self) -> U256 {
        U256::from_be_bytes(self.to_bytes_be())
    }
}

impl From<u64> for FieldElement {
    fn from(value: u64) -> Self {
        Self(Fr::from(value))
    }
}

impl PartialOrd for FieldElement {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FieldElement {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.into_bigint().cmp(&other.0.into_bigint())
    }
}

impl fmt::Display for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors parsing a field element from its string form.
#[derive(Debug, thiserror::Error)]
pub enum FieldParseError {
    #[error("Invalid field element `{0}`: not a canonical decimal or 0x-hex scalar")]
    Invalid(String),

    #[error("Invalid field element `{0}`: value exceeds 32 bytes")]
    Oversized(String),
}

impl FromStr for FieldElement {
    type Err = FieldParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(hex) = s.strip_prefix("0x") {
            let bytes = alloy::hex::decode(hex)
                .map_err(|_| FieldParseError::Invalid(s.to_string()))?;
            if bytes.len() > 32 {
                return Err(FieldParseError::Oversized(s.to_string()));
            }
            Ok(Self(Fr::from_be_bytes_mod_order(&bytes)))
        } else {
            <Fr as FromStr>::from_str(s)
                .map(Self)
                .map_err(|_| FieldParseError::Invalid(s.to_string()))
        }
    }
}

impl Serialize for FieldElement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for FieldElement {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// An ISO week, the aggregation period for adherence batches.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct WeekId {
    /// ISO week-numbering year (differs from the calendar year at edges).
    pub year: i32,
    /// ISO week number, 1-53.
    pub week: u32,
}

impl WeekId {
    /// The ISO week containing the given date.
    pub fn of(date: NaiveDate) -> Self {
        let iso = date.iso_week();
        Self {
            year: iso.year(),
            week: iso.week(),
        }
    }

    /// The current ISO week (UTC).
    pub fn current() -> Self {
        Self::of(Utc::now().date_naive())
    }
}

impl fmt::Display for WeekId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-W{:02}", self.year, self.week)
    }
}

/// The (subject, week) key under which a batch is aggregated and archived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchKey {
    /// Smart account of the subject the commitments belong to.
    pub subject: Address,
    /// ISO week the commitments were collected in.
    pub week: WeekId,
}

impl BatchKey {
    pub fn new(subject: Address, week: WeekId) -> Self {
        Self { subject, week }
    }

    /// Key form used by the durable-store collaborator.
    pub fn storage_key(&self) -> String {
        format!("{:#x}/{}", self.subject, self.week)
    }
}

impl fmt::Display for BatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}/{}", self.subject, self.week)
    }
}
