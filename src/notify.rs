// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Outbound notification boundary.
//!
//! Submission outcomes and recovery transitions are published to the
//! notification collaborator so subjects and guardians can be alerted.
//! Publishing must never fail the main flow: implementations log and
//! swallow their own delivery errors.

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::commitment::{BatchKey, MerkleRoot};
use crate::recovery::RecoveryStatus;
use crate::userop::{ActionKind, SubmissionStatus};

/// Events the core publishes outward.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum CoreEvent {
    /// A proof passed gateway validation and entered the pipeline.
    ProofAccepted { key: BatchKey, root: MerkleRoot },
    /// A tracked submission reached a terminal status.
    SubmissionFinalized {
        action: ActionKind,
        status: SubmissionStatus,
    },
    /// A recovery request changed state.
    RecoveryUpdated {
        request_id: Uuid,
        status: RecoveryStatus,
    },
}

/// Notification collaborator.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, event: CoreEvent);
}

/// Default notifier: structured log lines only.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn publish(&self, event: CoreEvent) {
        match serde_json::to_string(&event) {
            Ok(body) => tracing::info!(event = %body, "Core event"),
            Err(e) => tracing::warn!(error = %e, "Core event not serializable"),
        }
    }
}
