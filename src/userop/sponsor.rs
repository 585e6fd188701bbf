// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Gas sponsorship policy.
//!
//! The sponsor decides whether the paymaster covers an envelope's fees and
//! attaches the paymaster data when it does. It never signs and never
//! submits. Proof anchoring gets a weekly free quota per subject; recovery
//! and guardian administration are always sponsored, because a locked-out
//! owner has no way to fund fees.

use std::collections::HashMap;

use alloy::primitives::{Address, Bytes};
use tokio::sync::Mutex;

use super::envelope::{ActionKind, Funding, UnsignedEnvelope};
use crate::commitment::BatchKey;

/// Sponsorship configuration.
#[derive(Debug, Clone)]
pub struct SponsorPolicy {
    /// The paymaster contract that settles sponsored fees.
    pub paymaster: Address,
    /// Sponsored proof submissions per (subject, week). Resubmissions past
    /// the quota fall through to self-funding or fail.
    pub free_proofs_per_week: u32,
    /// Whether an over-quota envelope may proceed self-funded.
    pub allow_self_funded: bool,
}

impl SponsorPolicy {
    pub fn new(paymaster: Address) -> Self {
        Self {
            paymaster,
            free_proofs_per_week: 1,
            allow_self_funded: false,
        }
    }
}

/// Errors deciding sponsorship.
#[derive(Debug, thiserror::Error)]
pub enum SponsorError {
    /// Quota denied the envelope and no self-funding fallback is configured.
    #[error("Sponsorship quota exceeded for {key}")]
    QuotaExceeded { key: BatchKey },
}

/// Applies [`SponsorPolicy`] to unsigned envelopes.
pub struct PaymasterSponsor {
    policy: SponsorPolicy,
    used: Mutex<HashMap<BatchKey, u32>>,
}

impl PaymasterSponsor {
    pub fn new(policy: SponsorPolicy) -> Self {
        Self {
            policy,
            used: Mutex::new(HashMap::new()),
        }
    }

    /// Decide funding for an envelope.
    ///
    /// Sponsored envelopes get `paymaster_and_data` attached and come back
    /// tagged [`Funding::Sponsored`]; denied envelopes come back unchanged
    /// as [`Funding::SelfFunded`] when the fallback is configured.
    pub async fn sponsor(
        &self,
        mut envelope: UnsignedEnvelope,
    ) -> Result<UnsignedEnvelope, SponsorError> {
        match envelope.action.clone() {
            ActionKind::ProofSubmission { key } => {
                let mut used = self.used.lock().await;
                let count = used.entry(key).or_insert(0);
                if *count < self.policy.free_proofs_per_week {
                    *count += 1;
                    Ok(self.attach(envelope))
                } else if self.policy.allow_self_funded {
                    tracing::info!(key = %key, "Proof quota exhausted, envelope self-funded");
                    envelope.funding = Funding::SelfFunded;
                    Ok(envelope)
                } else {
                    Err(SponsorError::QuotaExceeded { key })
                }
            }
            // Recovery and guardian administration are always sponsored.
            ActionKind::RecoveryExecution { .. } | ActionKind::GuardianUpdate { .. } => {
                Ok(self.attach(envelope))
            }
        }
    }

    fn attach(&self, mut envelope: UnsignedEnvelope) -> UnsignedEnvelope {
        envelope.op.paymaster_and_data = Bytes::from(self.policy.paymaster.to_vec());
        envelope.funding = Funding::Sponsored {
            paymaster: self.policy.paymaster,
        };
        envelope
    }
}
