// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Durable Storage Boundary
//!
//! Persistence of archives and recovery requests is delegated to an
//! external durable-store collaborator, reached only through get/put-by-key
//! operations. This module holds that boundary plus the typed repositories
//! built on top of it.
//!
//! ## Storage Layout
//!
//! ```text
//! archives/{subject}/{week}    # Final leaf layout per proven batch
//! recoveries/{request_id}      # Terminal recovery requests
//! ```

pub mod repository;
pub mod store;

pub use repository::{ArchiveRepository, ArchivedBatch, RecoveryRepository};
pub use store::{KeyValueStore, MemoryStore, StorageError, StorageResult};
