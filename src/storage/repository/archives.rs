// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Archived weekly leaf layouts.
//!
//! ## Storage Layout
//!
//! One record per (subject, week), overwritten on resubmission:
//! ```text
//! archives/{subject}/{week}
//! ```
//!
//! The archived leaves are the exact witness sequence the prover consumed,
//! so a proof can be audited or regenerated after the fact.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::super::store::{KeyValueStore, StorageResult};
use crate::commitment::{AggregationOutput, BatchKey, FieldElement, MerkleRoot};

/// An archived weekly batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedBatch {
    /// The (subject, week) the batch summarizes.
    pub key: BatchKey,
    /// The circuit-compatible root.
    pub root: MerkleRoot,
    /// Sorted, padded leaf sequence (the prover's witness input).
    pub leaves: Vec<FieldElement>,
    /// When this layout was archived.
    pub archived_at: DateTime<Utc>,
}

/// Repository for archived leaf layouts.
pub struct ArchiveRepository {
    store: Arc<dyn KeyValueStore>,
}

impl ArchiveRepository {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn storage_key(key: &BatchKey) -> String {
        format!("archives/{}", key.storage_key())
    }

    /// Archive a batch's final layout. At most one record exists per key;
    /// a resubmission for the same week overwrites, never duplicates.
    pub async fn put(
        &self,
        key: &BatchKey,
        output: &AggregationOutput,
    ) -> StorageResult<ArchivedBatch> {
        let record = ArchivedBatch {
            key: *key,
            root: output.root,
            leaves: output.leaves.clone(),
            archived_at: Utc::now(),
        };
        let bytes = serde_json::to_vec(&record)?;
        self.store.put(&Self::storage_key(key), bytes).await?;
        Ok(record)
    }

    /// Load a previously archived layout.
    pub async fn get(&self, key: &BatchKey) -> StorageResult<Option<ArchivedBatch>> {
        match self.store.get(&Self::storage_key(key)).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}
