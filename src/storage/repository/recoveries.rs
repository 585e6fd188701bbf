// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Archived recovery requests.
//!
//! ## Storage Layout
//!
//! One record per request id, written when the request leaves the live
//! state machine (executed, expired, or cancelled):
//! ```text
//! recoveries/{request_id}
//! ```

use std::sync::Arc;

use uuid::Uuid;

use super::super::store::{KeyValueStore, StorageResult};
use crate::recovery::RecoveryRequest;

/// Repository for terminal recovery requests.
pub struct RecoveryRepository {
    store: Arc<dyn KeyValueStore>,
}

impl RecoveryRepository {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn storage_key(request_id: Uuid) -> String {
        format!("recoveries/{request_id}")
    }

    /// Archive a terminal request.
    pub async fn put(&self, request: &RecoveryRequest) -> StorageResult<()> {
        let bytes = serde_json::to_vec(request)?;
        self.store.put(&Self::storage_key(request.id), bytes).await
    }

    /// Load an archived request.
    pub async fn get(&self, request_id: Uuid) -> StorageResult<Option<RecoveryRequest>> {
        match self.store.get(&Self::storage_key(request_id)).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}
