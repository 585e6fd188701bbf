// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User-operation construction.
//!
//! The builder turns a validated [`ActionPayload`] into an [`UnsignedEnvelope`]:
//! it acquires the sender's EntryPoint nonce through the injected
//! [`NonceSource`], applies the configured fee policy, and leaves signing and
//! sponsorship to the later pipeline stages.
//!
//! Nonce acquisition is serialized per sender and the builder remembers the
//! highest nonce it has handed out, so two envelopes built concurrently for
//! the same account can never share a nonce even before either reaches the
//! chain.

use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use tokio::sync::Mutex;

use super::envelope::{ActionKind, ActionPayload, Funding, UnsignedEnvelope, UserOperation};

/// Ledger-read collaborator for account nonces.
#[async_trait]
pub trait NonceSource: Send + Sync {
    /// The sender's current EntryPoint nonce.
    async fn current_nonce(&self, sender: Address) -> Result<U256, NonceReadError>;
}

/// Failure of the external nonce read.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct NonceReadError(pub String);

/// Errors building an envelope.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The on-chain nonce read failed; the caller may retry the build.
    #[error("Nonce unavailable for {sender:#x}: {reason}")]
    NonceUnavailable { sender: Address, reason: String },
}

/// Gas limits for one action class.
#[derive(Debug, Clone, Copy)]
pub struct GasLimits {
    pub call_gas_limit: u64,
    pub verification_gas_limit: u64,
    pub pre_verification_gas: u64,
}

/// Fee policy applied to every envelope.
///
/// Defaults reproduce the deployed configuration: proof anchoring is a small
/// storage write, recovery and guardian administration go through the
/// account's guardian bookkeeping and need the larger verification budget.
#[derive(Debug, Clone)]
pub struct FeePolicy {
    pub proof_limits: GasLimits,
    pub admin_limits: GasLimits,
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self {
            proof_limits: GasLimits {
                call_gas_limit: 100_000,
                verification_gas_limit: 100_000,
                pre_verification_gas: 50_000,
            },
            admin_limits: GasLimits {
                call_gas_limit: 300_000,
                verification_gas_limit: 500_000,
                pre_verification_gas: 100_000,
            },
            max_fee_per_gas: 10_000_000_000, // 10 gwei
            max_priority_fee_per_gas: 2_000_000_000, // 2 gwei
        }
    }
}

impl FeePolicy {
    fn limits_for(&self, kind: &ActionKind) -> GasLimits {
        match kind {
            ActionKind::ProofSubmission { .. } => self.proof_limits,
            ActionKind::RecoveryExecution { .. } | ActionKind::GuardianUpdate { .. } => {
                self.admin_limits
            }
        }
    }
}

#[derive(Default)]
struct NonceState {
    last_issued: Option<U256>,
}

/// Builds unsigned envelopes against an injected nonce source.
pub struct UserOperationBuilder {
    nonce_source: Arc<dyn NonceSource>,
    fee_policy: FeePolicy,
    accounts: Mutex<HashMap<Address, Arc<Mutex<NonceState>>>>,
}

impl UserOperationBuilder {
    pub fn new(nonce_source: Arc<dyn NonceSource>, fee_policy: FeePolicy) -> Self {
        Self {
            nonce_source,
            fee_policy,
            accounts: Mutex::new(HashMap::new()),
        }
    }

    /// Build an unsigned envelope for an already-deployed account.
    pub async fn build(
        &self,
        sender: Address,
        payload: ActionPayload,
    ) -> Result<UnsignedEnvelope, BuildError> {
        self.build_inner(sender, payload, Bytes::new()).await
    }

    /// Build an unsigned envelope carrying factory `init_code`, for the
    /// first operation of a counterfactual account.
    pub async fn build_deploying(
        &self,
        sender: Address,
        payload: ActionPayload,
        init_code: Bytes,
    ) -> Result<UnsignedEnvelope, BuildError> {
        self.build_inner(sender, payload, init_code).await
    }

    async fn build_inner(
        &self,
        sender: Address,
        payload: ActionPayload,
        init_code: Bytes,
    ) -> Result<UnsignedEnvelope, BuildError> {
        let nonce = self.acquire_nonce(sender).await?;
        let limits = self.fee_policy.limits_for(&payload.kind);

        tracing::debug!(
            sender = %sender,
            nonce = %nonce,
            action = %payload.kind,
            "Built unsigned envelope"
        );

        Ok(UnsignedEnvelope {
            action: payload.kind,
            op: UserOperation {
                sender,
                nonce,
                init_code,
                call_data: payload.call_data,
                call_gas_limit: U256::from(limits.call_gas_limit),
                verification_gas_limit: U256::from(limits.verification_gas_limit),
                pre_verification_gas: U256::from(limits.pre_verification_gas),
                max_fee_per_gas: U256::from(self.fee_policy.max_fee_per_gas),
                max_priority_fee_per_gas: U256::from(self.fee_policy.max_priority_fee_per_gas),
                paymaster_and_data: Bytes::new(),
                signature: Bytes::new(),
            },
            funding: Funding::Undecided,
        })
    }

    /// Acquire the next nonce for `sender`.
    ///
    /// Holds the sender's lock across the external read so concurrent builds
    /// are serialized, and issues `max(on_chain, last_issued + 1)` so an
    /// envelope still in flight cannot be duplicated.
    async fn acquire_nonce(&self, sender: Address) -> Result<U256, BuildError> {
        let slot = {
            let mut accounts = self.accounts.lock().await;
            Arc::clone(accounts.entry(sender).or_default())
        };

        let mut state = slot.lock().await;
        let on_chain = self
            .nonce_source
            .current_nonce(sender)
            .await
            .map_err(|e| BuildError::NonceUnavailable {
                sender,
                reason: e.to_string(),
            })?;

        let nonce = match state.last_issued {
            Some(prev) if prev >= on_chain => prev + U256::from(1),
            _ => on_chain,
        };
        state.last_issued = Some(nonce);
        Ok(nonce)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::commitment::{BatchKey, WeekId};

    struct FixedNonceSource {
        nonce: U256,
        fail: AtomicBool,
    }

    impl FixedNonceSource {
        fn new(nonce: u64) -> Self {
            Self {
                nonce: U256::from(nonce),
                fail: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl NonceSource for FixedNonceSource {
        async fn current_nonce(&self, _sender: Address) -> Result<U256, NonceReadError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(NonceReadError("rpc unreachable".into()));
            }
            Ok(self.nonce)
        }
    }

    fn proof_payload() -> ActionPayload {
        ActionPayload {
            kind: ActionKind::ProofSubmission {
                key: BatchKey::new(
                    Address::repeat_byte(0x22),
                    WeekId {
                        year: 2026,
                        week: 31,
                    },
                ),
            },
            call_data: Bytes::from(vec![0xaa]),
        }
    }

    #[tokio::test]
    async fn builds_unsigned_with_policy_limits() {
        let builder = UserOperationBuilder::new(
            Arc::new(FixedNonceSource::new(5)),
            FeePolicy::default(),
        );
        let envelope = builder
            .build(Address::repeat_byte(0x22), proof_payload())
            .await
            .unwrap();

        assert_eq!(envelope.op.nonce, U256::from(5));
        assert_eq!(envelope.op.call_gas_limit, U256::from(100_000));
        assert_eq!(envelope.op.verification_gas_limit, U256::from(100_000));
        assert_eq!(envelope.funding, Funding::Undecided);
        assert!(envelope.op.signature.is_empty());
        assert!(envelope.op.paymaster_and_data.is_empty());
    }

    #[tokio::test]
    async fn admin_actions_get_the_larger_budget() {
        let builder = UserOperationBuilder::new(
            Arc::new(FixedNonceSource::new(0)),
            FeePolicy::default(),
        );
        let payload = ActionPayload {
            kind: ActionKind::RecoveryExecution {
                request_id: uuid::Uuid::new_v4(),
            },
            call_data: Bytes::from(vec![0xbb]),
        };
        let envelope = builder
            .build(Address::repeat_byte(0x33), payload)
            .await
            .unwrap();
        assert_eq!(envelope.op.call_gas_limit, U256::from(300_000));
        assert_eq!(envelope.op.verification_gas_limit, U256::from(500_000));
    }

    #[tokio::test]
    async fn nonce_read_failure_is_retryable_kind() {
        let source = Arc::new(FixedNonceSource::new(1));
        source.fail.store(true, Ordering::SeqCst);
        let builder = UserOperationBuilder::new(source, FeePolicy::default());

        let err = builder
            .build(Address::repeat_byte(0x44), proof_payload())
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::NonceUnavailable { .. }));
    }

    #[tokio::test]
    async fn concurrent_builds_never_share_a_nonce() {
        // The stub always reports the same on-chain nonce, mimicking many
        // envelopes built before any of them lands.
        let builder = Arc::new(UserOperationBuilder::new(
            Arc::new(FixedNonceSource::new(10)),
            FeePolicy::default(),
        ));
        let sender = Address::repeat_byte(0x55);

        let mut tasks = Vec::new();
        for _ in 0..32 {
            let builder = Arc::clone(&builder);
            tasks.push(tokio::spawn(async move {
                builder.build(sender, proof_payload()).await.unwrap().op.nonce
            }));
        }

        let mut seen = HashSet::new();
        for task in tasks {
            let nonce = task.await.unwrap();
            assert!(seen.insert(nonce), "nonce {nonce} issued twice");
        }
        assert!(seen.contains(&U256::from(10)));
    }

    #[tokio::test]
    async fn accounts_do_not_interfere() {
        let builder = UserOperationBuilder::new(
            Arc::new(FixedNonceSource::new(3)),
            FeePolicy::default(),
        );
        let a = builder
            .build(Address::repeat_byte(0x66), proof_payload())
            .await
            .unwrap();
        let b = builder
            .build(Address::repeat_byte(0x77), proof_payload())
            .await
            .unwrap();
        // Different senders both get the on-chain value.
        assert_eq!(a.op.nonce, U256::from(3));
        assert_eq!(b.op.nonce, U256::from(3));
    }

    #[tokio::test]
    async fn init_code_is_attached_when_deploying() {
        let builder = UserOperationBuilder::new(
            Arc::new(FixedNonceSource::new(0)),
            FeePolicy::default(),
        );
        let init_code = Bytes::from(vec![0xfa, 0xc7]);
        let envelope = builder
            .build_deploying(Address::repeat_byte(0x88), proof_payload(), init_code.clone())
            .await
            .unwrap();
        assert_eq!(envelope.op.init_code, init_code);
    }
}
