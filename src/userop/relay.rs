// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bundler relay.
//!
//! Submits signed envelopes to the external relay endpoint and tracks each
//! submission to a terminal status. Transient transport failures are retried
//! under an explicit [`RetryPolicy`] with the identical envelope every
//! attempt; the nonce and payload never change across retries, so a
//! resubmission that races a slow acceptance is harmless. After acceptance a
//! cancellable background task polls for the receipt until inclusion,
//! rejection, or the wall-clock budget runs out.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::B256;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::envelope::{ActionKind, SignedEnvelope, UserOperation};
use crate::notify::{CoreEvent, Notifier};

/// Default interval between receipt polls.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Default wall-clock budget for receipt polling.
const DEFAULT_POLL_BUDGET: Duration = Duration::from_secs(120);

/// Relay-endpoint collaborator (the external bundler).
#[async_trait]
pub trait RelayEndpoint: Send + Sync {
    /// Submit a user operation. Returns the hash of the carrying transaction.
    async fn submit_op(&self, op: &UserOperation) -> Result<B256, RelayEndpointError>;

    /// Look up the receipt of a previously submitted transaction.
    async fn receipt(&self, tx_hash: B256) -> Result<Option<RelayReceipt>, RelayEndpointError>;
}

/// Failure modes of the relay endpoint.
#[derive(Debug, thiserror::Error)]
pub enum RelayEndpointError {
    /// Network-level failure; retryable with the same envelope.
    #[error("Relay transport failure: {0}")]
    Transport(String),

    /// The relay refused the envelope (nonce collision, insufficient funds,
    /// validation failure). Terminal; the reason is surfaced verbatim.
    #[error("{0}")]
    Rejected(String),
}

/// Receipt of an included transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayReceipt {
    pub tx_hash: B256,
    pub block_number: u64,
    pub success: bool,
}

/// Bounded retry schedule for submission attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (1-based).
    fn delay(&self, attempt: u32) -> Duration {
        self.base_delay * self.multiplier.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Lifecycle of a submission as observed by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionStatus {
    /// Accepted by the relay, waiting for inclusion.
    Pending,
    /// On the ledger. Terminal and irreversible.
    Included { tx_hash: B256 },
    /// Refused by the relay or reverted on chain. Terminal.
    Rejected { reason: String },
    /// The poll budget elapsed without a receipt. Terminal but not
    /// destructive: the caller may rebuild a fresh envelope and retry.
    TimedOut,
}

impl SubmissionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Handle to a tracked submission.
#[derive(Debug)]
pub struct SubmissionHandle {
    pub id: Uuid,
    pub action: ActionKind,
    status: watch::Receiver<SubmissionStatus>,
    cancel: CancellationToken,
}

impl SubmissionHandle {
    /// The status at this moment.
    pub fn status(&self) -> SubmissionStatus {
        self.status.borrow().clone()
    }

    /// Wait until the submission reaches a terminal status.
    pub async fn wait_terminal(&self) -> SubmissionStatus {
        let mut rx = self.status.clone();
        loop {
            let current = rx.borrow_and_update().clone();
            if current.is_terminal() {
                return current;
            }
            if rx.changed().await.is_err() {
                // Poll task gone; the last published status stands.
                return rx.borrow().clone();
            }
        }
    }

    /// Stop polling for this submission. Does not retract the transaction:
    /// once submitted, a ledger action can only be superseded, not recalled.
    pub fn cancel_polling(&self) {
        self.cancel.cancel();
    }
}

/// Errors from the submission path.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The relay refused the envelope; reason verbatim from the endpoint.
    #[error("Relay rejected {action}: {reason}")]
    Rejected { action: ActionKind, reason: String },

    /// Every submission attempt failed at the transport level.
    #[error("Relay submission of {action} timed out after {attempts} attempts")]
    TimedOut { action: ActionKind, attempts: u32 },
}

/// Submits envelopes and tracks them to a terminal status.
pub struct BundlerRelay {
    endpoint: Arc<dyn RelayEndpoint>,
    notifier: Arc<dyn Notifier>,
    retry: RetryPolicy,
    poll_interval: Duration,
    poll_budget: Duration,
    shutdown: CancellationToken,
}

impl BundlerRelay {
    pub fn new(
        endpoint: Arc<dyn RelayEndpoint>,
        notifier: Arc<dyn Notifier>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            endpoint,
            notifier,
            retry,
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_budget: DEFAULT_POLL_BUDGET,
            shutdown: CancellationToken::new(),
        }
    }

    /// Override poll cadence and budget (tests, fast chains).
    pub fn with_polling(mut self, interval: Duration, budget: Duration) -> Self {
        self.poll_interval = interval;
        self.poll_budget = budget;
        self
    }

    /// Stop every in-flight poll task. Already-submitted transactions are
    /// unaffected.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Submit a signed envelope and start tracking it.
    pub async fn submit(&self, envelope: SignedEnvelope) -> Result<SubmissionHandle, RelayError> {
        let action = envelope.action.clone();
        let mut attempt = 0u32;

        let tx_hash = loop {
            attempt += 1;
            match self.endpoint.submit_op(&envelope.op).await {
                Ok(tx_hash) => break tx_hash,
                Err(RelayEndpointError::Rejected(reason)) => {
                    tracing::warn!(action = %action, reason = %reason, "Relay rejected envelope");
                    self.notifier
                        .publish(CoreEvent::SubmissionFinalized {
                            action: action.clone(),
                            status: SubmissionStatus::Rejected {
                                reason: reason.clone(),
                            },
                        })
                        .await;
                    return Err(RelayError::Rejected { action, reason });
                }
                Err(RelayEndpointError::Transport(error)) => {
                    if attempt >= self.retry.max_attempts {
                        tracing::warn!(
                            action = %action,
                            attempts = attempt,
                            error = %error,
                            "Relay unreachable, submission abandoned"
                        );
                        self.notifier
                            .publish(CoreEvent::SubmissionFinalized {
                                action: action.clone(),
                                status: SubmissionStatus::TimedOut,
                            })
                            .await;
                        return Err(RelayError::TimedOut {
                            action,
                            attempts: attempt,
                        });
                    }
                    let delay = self.retry.delay(attempt);
                    tracing::warn!(
                        action = %action,
                        attempt,
                        error = %error,
                        delay_ms = delay.as_millis() as u64,
                        "Relay transport failure, retrying same envelope"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        };

        let id = Uuid::new_v4();
        tracing::info!(
            submission = %id,
            action = %action,
            tx_hash = %tx_hash,
            "Envelope accepted by relay"
        );

        let (status_tx, status_rx) = watch::channel(SubmissionStatus::Pending);
        let cancel = self.shutdown.child_token();

        let poll = PollTask {
            endpoint: Arc::clone(&self.endpoint),
            notifier: Arc::clone(&self.notifier),
            action: action.clone(),
            tx_hash,
            status: status_tx,
            interval: self.poll_interval,
            budget: self.poll_budget,
            cancel: cancel.clone(),
        };
        tokio::spawn(poll.run());

        Ok(SubmissionHandle {
            id,
            action,
            status: status_rx,
            cancel,
        })
    }

    /// The current status of a tracked submission.
    pub fn poll(&self, handle: &SubmissionHandle) -> SubmissionStatus {
        handle.status()
    }
}

/// Background receipt poller for one submission.
struct PollTask {
    endpoint: Arc<dyn RelayEndpoint>,
    notifier: Arc<dyn Notifier>,
    action: ActionKind,
    tx_hash: B256,
    status: watch::Sender<SubmissionStatus>,
    interval: Duration,
    budget: Duration,
    cancel: CancellationToken,
}

impl PollTask {
    async fn run(self) {
        let deadline = tokio::time::Instant::now() + self.budget;

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!(tx_hash = %self.tx_hash, "Submission polling cancelled");
                return;
            }

            match self.endpoint.receipt(self.tx_hash).await {
                Ok(Some(receipt)) => {
                    let status = if receipt.success {
                        SubmissionStatus::Included {
                            tx_hash: receipt.tx_hash,
                        }
                    } else {
                        SubmissionStatus::Rejected {
                            reason: "transaction reverted on chain".to_string(),
                        }
                    };
                    self.finish(status).await;
                    return;
                }
                Ok(None) => {}
                Err(e) => {
                    // Transient read failure; keep polling within the budget.
                    tracing::warn!(tx_hash = %self.tx_hash, error = %e, "Receipt poll failed");
                }
            }

            if tokio::time::Instant::now() >= deadline {
                tracing::warn!(
                    tx_hash = %self.tx_hash,
                    budget_secs = self.budget.as_secs(),
                    "Receipt poll budget elapsed"
                );
                self.finish(SubmissionStatus::TimedOut).await;
                return;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = self.cancel.cancelled() => {
                    tracing::info!(tx_hash = %self.tx_hash, "Submission polling cancelled");
                    return;
                }
            }
        }
    }

    async fn finish(&self, status: SubmissionStatus) {
        tracing::info!(tx_hash = %self.tx_hash, status = ?status, "Submission finalized");
        let _ = self.status.send(status.clone());
        self.notifier
            .publish(CoreEvent::SubmissionFinalized {
                action: self.action.clone(),
                status,
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex as StdMutex;

    use alloy::primitives::{Address, Bytes, U256};

    use super::*;
    use crate::notify::LogNotifier;
    use crate::userop::envelope::{Funding, GuardianChange};

    /// Endpoint stub: fails the first `transport_failures` submissions with
    /// a transport error, then accepts; receipt appears after
    /// `receipt_after_polls` lookups.
    struct ScriptedEndpoint {
        transport_failures: AtomicU32,
        reject_with: Option<String>,
        receipt_after_polls: u32,
        polls: AtomicU32,
        submitted: StdMutex<Vec<UserOperation>>,
        include: bool,
    }

    impl ScriptedEndpoint {
        fn accepting(transport_failures: u32, receipt_after_polls: u32) -> Self {
            Self {
                transport_failures: AtomicU32::new(transport_failures),
                reject_with: None,
                receipt_after_polls,
                polls: AtomicU32::new(0),
                submitted: StdMutex::new(Vec::new()),
                include: true,
            }
        }

        fn rejecting(reason: &str) -> Self {
            Self {
                transport_failures: AtomicU32::new(0),
                reject_with: Some(reason.to_string()),
                receipt_after_polls: 0,
                polls: AtomicU32::new(0),
                submitted: StdMutex::new(Vec::new()),
                include: true,
            }
        }

        fn submissions(&self) -> Vec<UserOperation> {
            self.submitted.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RelayEndpoint for ScriptedEndpoint {
        async fn submit_op(&self, op: &UserOperation) -> Result<B256, RelayEndpointError> {
            self.submitted.lock().unwrap().push(op.clone());
            if let Some(reason) = &self.reject_with {
                return Err(RelayEndpointError::Rejected(reason.clone()));
            }
            if self
                .transport_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(RelayEndpointError::Transport("connection reset".into()));
            }
            Ok(B256::repeat_byte(0xab))
        }

        async fn receipt(&self, tx_hash: B256) -> Result<Option<RelayReceipt>, RelayEndpointError> {
            let polls = self.polls.fetch_add(1, Ordering::SeqCst);
            if polls + 1 >= self.receipt_after_polls {
                Ok(Some(RelayReceipt {
                    tx_hash,
                    block_number: 1234,
                    success: self.include,
                }))
            } else {
                Ok(None)
            }
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(1),
            multiplier: 2,
        }
    }

    fn signed_envelope() -> SignedEnvelope {
        SignedEnvelope {
            action: ActionKind::GuardianUpdate {
                change: GuardianChange::Threshold { new_threshold: 2 },
            },
            op: UserOperation {
                sender: Address::repeat_byte(0x21),
                nonce: U256::from(4),
                init_code: Bytes::new(),
                call_data: Bytes::from(vec![1, 2]),
                call_gas_limit: U256::from(100_000),
                verification_gas_limit: U256::from(100_000),
                pre_verification_gas: U256::from(50_000),
                max_fee_per_gas: U256::from(10u64),
                max_priority_fee_per_gas: U256::from(2u64),
                paymaster_and_data: Bytes::new(),
                signature: Bytes::from(vec![0xaa; 65]),
            },
            funding: Funding::SelfFunded,
        }
    }

    fn relay(endpoint: Arc<ScriptedEndpoint>) -> BundlerRelay {
        BundlerRelay::new(endpoint, Arc::new(LogNotifier), fast_retry())
            .with_polling(Duration::from_millis(5), Duration::from_millis(500))
    }

    #[tokio::test]
    async fn transient_failures_then_success_yields_one_inclusion() {
        let endpoint = Arc::new(ScriptedEndpoint::accepting(3, 1));
        let relay = relay(Arc::clone(&endpoint));

        let handle = relay.submit(signed_envelope()).await.unwrap();
        let status = handle.wait_terminal().await;
        assert!(matches!(status, SubmissionStatus::Included { .. }));

        // Four attempts, all byte-identical: same nonce, same payload.
        let submissions = endpoint.submissions();
        assert_eq!(submissions.len(), 4);
        assert!(submissions.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn exhausted_transport_retries_time_out() {
        let endpoint = Arc::new(ScriptedEndpoint::accepting(100, 1));
        let relay = relay(Arc::clone(&endpoint));

        let err = relay.submit(signed_envelope()).await.unwrap_err();
        assert!(matches!(err, RelayError::TimedOut { attempts: 5, .. }));
        assert_eq!(endpoint.submissions().len(), 5);
    }

    #[tokio::test]
    async fn rejection_reason_is_verbatim() {
        let endpoint = Arc::new(ScriptedEndpoint::rejecting("AA25 invalid account nonce"));
        let relay = relay(endpoint);

        let err = relay.submit(signed_envelope()).await.unwrap_err();
        match err {
            RelayError::Rejected { reason, .. } => {
                assert_eq!(reason, "AA25 invalid account nonce");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn reverted_transaction_is_rejected() {
        let mut endpoint = ScriptedEndpoint::accepting(0, 1);
        endpoint.include = false;
        let relay = relay(Arc::new(endpoint));

        let handle = relay.submit(signed_envelope()).await.unwrap();
        let status = handle.wait_terminal().await;
        assert!(matches!(status, SubmissionStatus::Rejected { .. }));
    }

    #[tokio::test]
    async fn missing_receipt_times_out_after_budget() {
        // Receipt never appears.
        let endpoint: Arc<dyn RelayEndpoint> = Arc::new(ScriptedEndpoint::accepting(0, u32::MAX));
        let relay = BundlerRelay::new(Arc::clone(&endpoint), Arc::new(LogNotifier), fast_retry())
            .with_polling(Duration::from_millis(2), Duration::from_millis(20));

        let handle = relay.submit(signed_envelope()).await.unwrap();
        let status = handle.wait_terminal().await;
        assert_eq!(status, SubmissionStatus::TimedOut);
    }

    #[tokio::test]
    async fn cancellation_stops_polling_without_a_terminal_status() {
        let endpoint: Arc<dyn RelayEndpoint> = Arc::new(ScriptedEndpoint::accepting(0, u32::MAX));
        let relay = BundlerRelay::new(Arc::clone(&endpoint), Arc::new(LogNotifier), fast_retry())
            .with_polling(Duration::from_millis(5), Duration::from_secs(60));

        let handle = relay.submit(signed_envelope()).await.unwrap();
        assert_eq!(relay.poll(&handle), SubmissionStatus::Pending);

        handle.cancel_polling();
        tokio::time::sleep(Duration::from_millis(30)).await;
        // Still pending: cancellation neither includes nor rejects.
        assert_eq!(relay.poll(&handle), SubmissionStatus::Pending);
    }
}
