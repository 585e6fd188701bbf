// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Proof submission gateway.
//!
//! The gateway is the only entry into the pipeline for adherence proofs.
//! It never trusts the caller's declared root: the root is recomputed from
//! the batch, and a mismatch stops the submission before anything reaches
//! the chain. On success the final leaf layout is archived for audit and
//! the proof-anchoring envelope is handed to the action pipeline.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::chain::encode_proof_anchor;
use crate::commitment::{
    aggregate, AggregationError, BatchKey, Commitment, FieldElement, MerkleRoot,
};
use crate::notify::{CoreEvent, Notifier};
use crate::storage::{ArchiveRepository, StorageError};
use crate::userop::{ActionKind, ActionPayload, ActionPipeline, PipelineError, SubmissionHandle};

/// Expected public signals: `[merkle_root, subject_commitment]`.
pub const PUBLIC_SIGNAL_ARITY: usize = 2;

/// One subject-week's commitments as delivered by the adherence logger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyBatch {
    pub key: BatchKey,
    /// Commitments in any order; the aggregator canonicalizes.
    pub commitments: Vec<Commitment>,
}

/// A finished proof plus its declared public inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofBundle {
    /// The opaque verifier-checkable proof object, forwarded verbatim.
    pub proof: serde_json::Value,
    /// Declared public signals, `[merkle_root, subject_commitment]`.
    pub public_signals: Vec<FieldElement>,
}

/// Receipt of a gateway submission.
#[derive(Debug)]
pub struct SubmissionTicket {
    pub key: BatchKey,
    /// The independently recomputed root.
    pub root: MerkleRoot,
    /// Handle tracking the anchoring envelope.
    pub handle: SubmissionHandle,
}

/// Errors validating or forwarding a proof.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The declared root does not match the recomputed one. The submission
    /// never reaches the envelope builder.
    #[error("Declared root {declared} for {key} does not match recomputed root {computed}")]
    RootMismatch {
        key: BatchKey,
        declared: MerkleRoot,
        computed: MerkleRoot,
    },

    /// Wrong public-signal arity.
    #[error("Malformed proof for {key}: expected {expected} public signals, got {got}")]
    MalformedProof {
        key: BatchKey,
        expected: usize,
        got: usize,
    },

    /// The proof object could not be serialized into calldata.
    #[error("Proof for {key} is not encodable: {reason}")]
    UnencodableProof { key: BatchKey, reason: String },

    #[error("Aggregation failed for {key}: {source}")]
    Aggregation {
        key: BatchKey,
        #[source]
        source: AggregationError,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Per-key locks serializing aggregation and archive writes.
///
/// Different (subject, week) keys proceed concurrently; the same key is
/// serialized so a resubmission cannot race the archive overwrite.
#[derive(Default)]
struct BatchLocks {
    inner: Mutex<HashMap<BatchKey, Arc<Mutex<()>>>>,
}

impl BatchLocks {
    async fn acquire(&self, key: BatchKey) -> OwnedMutexGuard<()> {
        let slot = {
            let mut locks = self.inner.lock().await;
            Arc::clone(locks.entry(key).or_default())
        };
        slot.lock_owned().await
    }
}

/// Validates finished proofs and forwards them to the action pipeline.
pub struct ProofSubmissionGateway {
    pipeline: Arc<ActionPipeline>,
    archives: ArchiveRepository,
    notifier: Arc<dyn Notifier>,
    locks: BatchLocks,
}

impl ProofSubmissionGateway {
    pub fn new(
        pipeline: Arc<ActionPipeline>,
        archives: ArchiveRepository,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            pipeline,
            archives,
            notifier,
            locks: BatchLocks::default(),
        }
    }

    /// Validate a proof against its batch and submit the anchoring envelope.
    pub async fn submit(
        &self,
        batch: WeeklyBatch,
        bundle: ProofBundle,
    ) -> Result<SubmissionTicket, GatewayError> {
        let key = batch.key;

        if bundle.public_signals.len() != PUBLIC_SIGNAL_ARITY {
            return Err(GatewayError::MalformedProof {
                key,
                expected: PUBLIC_SIGNAL_ARITY,
                got: bundle.public_signals.len(),
            });
        }
        let declared_root = bundle.public_signals[0];
        let subject_commitment = bundle.public_signals[1];

        // Recompute and archive under the per-key lock.
        let output = {
            let _guard = self.locks.acquire(key).await;

            let output = aggregate(&batch.commitments)
                .map_err(|source| GatewayError::Aggregation { key, source })?;
            if output.root != declared_root {
                tracing::warn!(
                    key = %key,
                    declared = %declared_root,
                    computed = %output.root,
                    "Root mismatch, submission dropped"
                );
                return Err(GatewayError::RootMismatch {
                    key,
                    declared: declared_root,
                    computed: output.root,
                });
            }

            self.archives.put(&key, &output).await?;
            output
        };

        let call_data =
            encode_proof_anchor(key.subject, output.root, subject_commitment, &bundle.proof)
                .map_err(|e| GatewayError::UnencodableProof {
                    key,
                    reason: e.to_string(),
                })?;

        tracing::info!(key = %key, root = %output.root, "Proof validated, entering pipeline");
        self.notifier
            .publish(CoreEvent::ProofAccepted {
                key,
                root: output.root,
            })
            .await;

        let handle = self
            .pipeline
            .run(
                key.subject,
                ActionPayload {
                    kind: ActionKind::ProofSubmission { key },
                    call_data,
                },
            )
            .await?;

        Ok(SubmissionTicket {
            key,
            root: output.root,
            handle,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use alloy::primitives::{Address, Bytes, B256, U256};
    use async_trait::async_trait;

    use super::*;
    use crate::commitment::WeekId;
    use crate::notify::LogNotifier;
    use crate::storage::{KeyValueStore, MemoryStore};
    use crate::userop::{
        BundlerRelay, EnvelopeSigner, FeePolicy, NonceReadError, NonceSource, PaymasterSponsor,
        RelayEndpoint, RelayEndpointError, RelayReceipt, RetryPolicy, SignError, SignedEnvelope,
        SponsorPolicy, UnsignedEnvelope, UserOperation, UserOperationBuilder,
    };

    struct CountingNonces {
        reads: AtomicU32,
    }

    #[async_trait]
    impl NonceSource for CountingNonces {
        async fn current_nonce(&self, _sender: Address) -> Result<U256, NonceReadError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(U256::ZERO)
        }
    }

    struct StubSigner;

    #[async_trait]
    impl EnvelopeSigner for StubSigner {
        async fn sign(&self, envelope: UnsignedEnvelope) -> Result<SignedEnvelope, SignError> {
            Ok(envelope.into_signed(Bytes::from(vec![0x51; 65])))
        }
    }

    struct InstantEndpoint;

    #[async_trait]
    impl RelayEndpoint for InstantEndpoint {
        async fn submit_op(&self, _op: &UserOperation) -> Result<B256, RelayEndpointError> {
            Ok(B256::repeat_byte(0x0a))
        }

        async fn receipt(
            &self,
            tx_hash: B256,
        ) -> Result<Option<RelayReceipt>, RelayEndpointError> {
            Ok(Some(RelayReceipt {
                tx_hash,
                block_number: 7,
                success: true,
            }))
        }
    }

    struct Fixture {
        gateway: ProofSubmissionGateway,
        store: Arc<MemoryStore>,
        nonces: Arc<CountingNonces>,
    }

    fn fixture() -> Fixture {
        let nonces = Arc::new(CountingNonces {
            reads: AtomicU32::new(0),
        });
        let store = Arc::new(MemoryStore::new());

        let pipeline = Arc::new(ActionPipeline::new(
            UserOperationBuilder::new(
                Arc::clone(&nonces) as Arc<dyn NonceSource>,
                FeePolicy::default(),
            ),
            PaymasterSponsor::new({
                let mut policy = SponsorPolicy::new(Address::repeat_byte(0x99));
                // Resubmission tests go past the weekly free quota.
                policy.allow_self_funded = true;
                policy
            }),
            Arc::new(StubSigner),
            BundlerRelay::new(
                Arc::new(InstantEndpoint),
                Arc::new(LogNotifier),
                RetryPolicy::default(),
            )
            .with_polling(Duration::from_millis(2), Duration::from_millis(200)),
        ));

        let gateway = ProofSubmissionGateway::new(
            pipeline,
            ArchiveRepository::new(Arc::clone(&store) as Arc<dyn KeyValueStore>),
            Arc::new(LogNotifier),
        );

        Fixture {
            gateway,
            store,
            nonces,
        }
    }

    fn batch() -> WeeklyBatch {
        WeeklyBatch {
            key: BatchKey::new(
                Address::repeat_byte(0x21),
                WeekId {
                    year: 2026,
                    week: 31,
                },
            ),
            commitments: vec![
                FieldElement::from(11u64),
                FieldElement::from(22u64),
                FieldElement::from(33u64),
            ],
        }
    }

    fn valid_bundle(batch: &WeeklyBatch) -> ProofBundle {
        let root = aggregate(&batch.commitments).unwrap().root;
        ProofBundle {
            proof: serde_json::json!({ "pi_a": ["1", "2"], "pi_b": [["3"]], "pi_c": ["4"] }),
            public_signals: vec![root, FieldElement::from(777u64)],
        }
    }

    #[tokio::test]
    async fn valid_submission_archives_and_enters_pipeline() {
        let f = fixture();
        let b = batch();
        let ticket = f.gateway.submit(b.clone(), valid_bundle(&b)).await.unwrap();

        assert_eq!(ticket.key, b.key);
        let archived = f
            .gateway
            .archives
            .get(&b.key)
            .await
            .unwrap()
            .expect("layout archived");
        assert_eq!(archived.root, ticket.root);
        assert_eq!(f.nonces.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn tampered_root_never_reaches_the_builder() {
        let f = fixture();
        let b = batch();
        let mut bundle = valid_bundle(&b);
        bundle.public_signals[0] = FieldElement::from(666u64);

        let err = f.gateway.submit(b, bundle).await.unwrap_err();
        assert!(matches!(err, GatewayError::RootMismatch { .. }));
        // Builder untouched, nothing archived.
        assert_eq!(f.nonces.reads.load(Ordering::SeqCst), 0);
        assert!(f.store.is_empty().await);
    }

    #[tokio::test]
    async fn wrong_arity_is_malformed() {
        let f = fixture();
        let b = batch();
        let mut bundle = valid_bundle(&b);
        bundle.public_signals.pop();

        let err = f.gateway.submit(b, bundle).await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::MalformedProof {
                expected: 2,
                got: 1,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn resubmission_overwrites_the_archive() {
        let f = fixture();
        let b = batch();
        f.gateway
            .submit(b.clone(), valid_bundle(&b))
            .await
            .unwrap();

        // Same week, one more commitment: new layout replaces the old one.
        let mut wider = b.clone();
        wider.commitments.push(FieldElement::from(44u64));
        f.gateway
            .submit(wider.clone(), valid_bundle(&wider))
            .await
            .unwrap();

        assert_eq!(f.store.len().await, 1);
        let archived = f.gateway.archives.get(&b.key).await.unwrap().unwrap();
        assert_eq!(archived.root, aggregate(&wider.commitments).unwrap().root);
    }

    #[tokio::test]
    async fn oversized_batch_surfaces_aggregation_error() {
        let f = fixture();
        let mut b = batch();
        b.commitments = (0..40u64).map(FieldElement::from).collect();
        let bundle = ProofBundle {
            proof: serde_json::json!({}),
            public_signals: vec![FieldElement::from(0u64), FieldElement::from(1u64)],
        };

        let err = f.gateway.submit(b, bundle).await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Aggregation {
                source: AggregationError::BatchOversized { .. },
                ..
            }
        ));
    }
}
