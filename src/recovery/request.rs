// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Recovery request types.

use alloy::primitives::{Address, Bytes, B256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The guardians registered for one recovery request.
///
/// Wrapper to keep membership checks in one place; construction dedupes,
/// so threshold counting is always over distinct guardians.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardianSet {
    guardians: Vec<Address>,
}

impl GuardianSet {
    /// Create from guardian addresses, dropping duplicates.
    pub fn new(guardians: Vec<Address>) -> Self {
        let mut deduped = Vec::with_capacity(guardians.len());
        for guardian in guardians {
            if !deduped.contains(&guardian) {
                deduped.push(guardian);
            }
        }
        Self { guardians: deduped }
    }

    pub fn len(&self) -> usize {
        self.guardians.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guardians.is_empty()
    }

    pub fn contains(&self, guardian: &Address) -> bool {
        self.guardians.contains(guardian)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Address> {
        self.guardians.iter()
    }
}

/// Lifecycle of a recovery request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum RecoveryStatus {
    /// Created, no approvals yet.
    Proposed,
    /// At least one approval, threshold not reached.
    Collecting,
    /// Threshold reached; execution may be attempted.
    Executable,
    /// Ownership change included on the ledger. Terminal.
    Executed { tx_hash: B256 },
    /// The time lock ran out before execution. Terminal.
    Expired,
    /// Withdrawn by the subject or their agent. Terminal.
    Cancelled,
}

impl RecoveryStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Executed { .. } | Self::Expired | Self::Cancelled)
    }

    /// States that still accept guardian approvals.
    pub fn accepts_approvals(&self) -> bool {
        matches!(self, Self::Proposed | Self::Collecting | Self::Executable)
    }

    /// States the subject may still cancel from.
    pub fn is_cancellable(&self) -> bool {
        matches!(self, Self::Proposed | Self::Collecting)
    }
}

/// One guardian's recorded approval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Approval {
    pub guardian: Address,
    /// EIP-191 signature over the request's canonical content.
    pub signature: Bytes,
    pub approved_at: DateTime<Utc>,
}

/// An ownership-recovery request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryRequest {
    pub id: Uuid,
    /// The smart account being recovered.
    pub account: Address,
    /// The owner key the account transfers to on execution.
    pub new_owner: Address,
    pub guardians: GuardianSet,
    /// Distinct approvals required before execution.
    pub threshold: usize,
    pub approvals: Vec<Approval>,
    /// Agent allowed to cancel on the subject's behalf.
    pub authorized_agent: Option<Address>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: RecoveryStatus,
    /// Set while an execution attempt is between the relay and a terminal
    /// outcome, so a second attempt cannot be submitted concurrently.
    #[serde(skip, default)]
    pub(crate) execution_in_flight: bool,
}

impl RecoveryRequest {
    /// The canonical content guardians sign to approve this request.
    ///
    /// Binds the request id, account, proposed owner, and expiry, so an
    /// approval cannot be replayed against a different request.
    pub fn approval_message(&self) -> String {
        format!(
            "recovery-approval:{}:{:#x}:{:#x}:{}",
            self.id,
            self.account,
            self.new_owner,
            self.expires_at.timestamp()
        )
    }

    pub fn has_approved(&self, guardian: &Address) -> bool {
        self.approvals.iter().any(|a| &a.guardian == guardian)
    }

    /// Distinct approvals collected so far.
    pub fn approval_count(&self) -> usize {
        self.approvals.len()
    }

    /// Whether `caller` may cancel this request.
    pub fn may_cancel(&self, caller: &Address) -> bool {
        caller == &self.account || self.authorized_agent.as_ref() == Some(caller)
    }
}
