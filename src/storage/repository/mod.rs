// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Repository layer providing typed access to the durable store.
//!
//! Each repository serializes one entity type to JSON and goes through the
//! [`KeyValueStore`](super::store::KeyValueStore) boundary for all I/O.

pub mod archives;
pub mod recoveries;

pub use archives::{ArchiveRepository, ArchivedBatch};
pub use recoveries::RecoveryRepository;
