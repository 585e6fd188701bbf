// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Guardian recovery state machine.
//!
//! Owns every live [`RecoveryRequest`]. All mutation happens under one
//! write lock per machine, so an approval is an atomic
//! read-verify-append-recompute step and two guardians racing past the
//! threshold cannot trigger a second execution. Expiry is lazy: every
//! access checks the time lock first, so no background timer is needed and
//! no stale request can execute past its expiry.

use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::{Address, Bytes, B256};
use chrono::{Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::request::{Approval, GuardianSet, RecoveryRequest, RecoveryStatus};
use crate::chain::encode_recovery_execution;
use crate::notify::{CoreEvent, Notifier};
use crate::storage::RecoveryRepository;
use crate::userop::{ActionKind, ActionPayload, ActionPipeline, PipelineError, SubmissionStatus};

/// Errors from recovery operations. Every variant names the request so the
/// caller can decide whether to retry.
#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    #[error("Recovery request {0} not found")]
    UnknownRequest(Uuid),

    #[error("Invalid threshold {threshold} for a set of {guardians} guardians")]
    InvalidThreshold { threshold: usize, guardians: usize },

    #[error("{guardian:#x} is not a guardian of request {request_id}")]
    UnknownGuardian { request_id: Uuid, guardian: Address },

    #[error("Approval signature from {guardian:#x} does not verify for request {request_id}")]
    BadSignature { request_id: Uuid, guardian: Address },

    #[error("Guardian {guardian:#x} already approved request {request_id}")]
    DuplicateApproval { request_id: Uuid, guardian: Address },

    #[error("Request {request_id} does not allow this transition from {status:?}")]
    InvalidState {
        request_id: Uuid,
        status: RecoveryStatus,
    },

    #[error("Request {0} has expired")]
    Expired(Uuid),

    #[error("{caller:#x} may not cancel request {request_id}")]
    Unauthorized { request_id: Uuid, caller: Address },

    #[error("Execution of request {request_id} was not included: {reason}")]
    ExecutionFailed { request_id: Uuid, reason: String },

    #[error("Execution of request {request_id} could not be submitted")]
    Pipeline {
        request_id: Uuid,
        #[source]
        source: PipelineError,
    },
}

/// Owns recovery request state and drives execution through the pipeline.
pub struct GuardianRecoveryStateMachine {
    requests: RwLock<HashMap<Uuid, RecoveryRequest>>,
    pipeline: Arc<ActionPipeline>,
    archive: RecoveryRepository,
    notifier: Arc<dyn Notifier>,
}

impl GuardianRecoveryStateMachine {
    pub fn new(
        pipeline: Arc<ActionPipeline>,
        archive: RecoveryRepository,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            requests: RwLock::new(HashMap::new()),
            pipeline,
            archive,
            notifier,
        }
    }

    /// Open a recovery request for `account`.
    pub async fn propose(
        &self,
        account: Address,
        new_owner: Address,
        guardians: Vec<Address>,
        threshold: usize,
        ttl: Duration,
        authorized_agent: Option<Address>,
    ) -> Result<RecoveryRequest, RecoveryError> {
        let guardians = GuardianSet::new(guardians);
        if threshold == 0 || threshold > guardians.len() {
            return Err(RecoveryError::InvalidThreshold {
                threshold,
                guardians: guardians.len(),
            });
        }

        let now = Utc::now();
        let request = RecoveryRequest {
            id: Uuid::new_v4(),
            account,
            new_owner,
            guardians,
            threshold,
            approvals: Vec::new(),
            authorized_agent,
            created_at: now,
            expires_at: now + ttl,
            status: RecoveryStatus::Proposed,
            execution_in_flight: false,
        };

        self.requests
            .write()
            .await
            .insert(request.id, request.clone());

        tracing::info!(
            request_id = %request.id,
            account = %account,
            new_owner = %new_owner,
            threshold,
            "Recovery proposed"
        );
        self.publish(request.id, request.status.clone()).await;

        Ok(request)
    }

    /// Record a guardian's approval.
    ///
    /// Verifies membership and the signature over the request's canonical
    /// content, rejects duplicates, and recomputes the derived state in the
    /// same critical section.
    pub async fn approve(
        &self,
        request_id: Uuid,
        guardian: Address,
        signature: &Bytes,
    ) -> Result<RecoveryStatus, RecoveryError> {
        let (status, expired) = {
            let mut requests = self.requests.write().await;
            let request = requests
                .get_mut(&request_id)
                .ok_or(RecoveryError::UnknownRequest(request_id))?;

            if let Some(expired) = force_expiry(request) {
                (RecoveryStatus::Expired, Some(expired))
            } else {
                if !request.status.accepts_approvals() {
                    return Err(RecoveryError::InvalidState {
                        request_id,
                        status: request.status.clone(),
                    });
                }
                if !request.guardians.contains(&guardian) {
                    return Err(RecoveryError::UnknownGuardian {
                        request_id,
                        guardian,
                    });
                }
                if request.has_approved(&guardian) {
                    return Err(RecoveryError::DuplicateApproval {
                        request_id,
                        guardian,
                    });
                }

                verify_approval(request, guardian, signature)?;

                request.approvals.push(Approval {
                    guardian,
                    signature: signature.clone(),
                    approved_at: Utc::now(),
                });

                if request.approval_count() >= request.threshold {
                    request.status = RecoveryStatus::Executable;
                } else {
                    request.status = RecoveryStatus::Collecting;
                }
                (request.status.clone(), None)
            }
        };

        if let Some(expired) = expired {
            self.archive_terminal(&expired).await;
            self.publish(request_id, RecoveryStatus::Expired).await;
            return Err(RecoveryError::Expired(request_id));
        }

        tracing::info!(
            request_id = %request_id,
            guardian = %guardian,
            status = ?status,
            "Guardian approval recorded"
        );
        self.publish(request_id, status.clone()).await;
        Ok(status)
    }

    /// Cancel a request. Only the subject account or its authorized agent
    /// may cancel; guardians alone cannot.
    pub async fn cancel(&self, request_id: Uuid, caller: Address) -> Result<(), RecoveryError> {
        let (cancelled, expired) = {
            let mut requests = self.requests.write().await;
            let request = requests
                .get_mut(&request_id)
                .ok_or(RecoveryError::UnknownRequest(request_id))?;

            if let Some(expired) = force_expiry(request) {
                (None, Some(expired))
            } else {
                if !request.may_cancel(&caller) {
                    return Err(RecoveryError::Unauthorized { request_id, caller });
                }
                if !request.status.is_cancellable() {
                    return Err(RecoveryError::InvalidState {
                        request_id,
                        status: request.status.clone(),
                    });
                }
                request.status = RecoveryStatus::Cancelled;
                (Some(request.clone()), None)
            }
        };

        if let Some(expired) = expired {
            self.archive_terminal(&expired).await;
            self.publish(request_id, RecoveryStatus::Expired).await;
            return Err(RecoveryError::Expired(request_id));
        }

        let cancelled = cancelled.expect("cancelled request present when not expired");
        tracing::info!(request_id = %request_id, caller = %caller, "Recovery cancelled");
        self.archive_terminal(&cancelled).await;
        self.publish(request_id, RecoveryStatus::Cancelled).await;
        Ok(())
    }

    /// Execute an `Executable` request through the action pipeline.
    ///
    /// Exactly one execution attempt can be in flight; a relay rejection or
    /// timeout releases the guard and leaves the request `Executable` so
    /// the recovery can be retried without starting over.
    pub async fn execute(&self, request_id: Uuid) -> Result<B256, RecoveryError> {
        // Claim the execution slot.
        let (account, new_owner, expired) = {
            let mut requests = self.requests.write().await;
            let request = requests
                .get_mut(&request_id)
                .ok_or(RecoveryError::UnknownRequest(request_id))?;

            if let Some(expired) = force_expiry(request) {
                (Address::ZERO, Address::ZERO, Some(expired))
            } else {
                if request.status != RecoveryStatus::Executable || request.execution_in_flight {
                    return Err(RecoveryError::InvalidState {
                        request_id,
                        status: request.status.clone(),
                    });
                }
                request.execution_in_flight = true;
                (request.account, request.new_owner, None)
            }
        };

        if let Some(expired) = expired {
            self.archive_terminal(&expired).await;
            self.publish(request_id, RecoveryStatus::Expired).await;
            return Err(RecoveryError::Expired(request_id));
        }

        let payload = ActionPayload {
            kind: ActionKind::RecoveryExecution { request_id },
            call_data: encode_recovery_execution(account, new_owner),
        };

        let handle = match self.pipeline.run(account, payload).await {
            Ok(handle) => handle,
            Err(source) => {
                self.release_execution(request_id).await;
                return Err(RecoveryError::Pipeline { request_id, source });
            }
        };

        match handle.wait_terminal().await {
            SubmissionStatus::Included { tx_hash } => {
                let executed = {
                    let mut requests = self.requests.write().await;
                    let request = requests
                        .get_mut(&request_id)
                        .ok_or(RecoveryError::UnknownRequest(request_id))?;
                    request.status = RecoveryStatus::Executed { tx_hash };
                    request.execution_in_flight = false;
                    request.clone()
                };

                tracing::info!(request_id = %request_id, tx_hash = %tx_hash, "Recovery executed");
                self.archive_terminal(&executed).await;
                self.publish(request_id, executed.status.clone()).await;
                Ok(tx_hash)
            }
            SubmissionStatus::Rejected { reason } => {
                self.release_execution(request_id).await;
                Err(RecoveryError::ExecutionFailed { request_id, reason })
            }
            SubmissionStatus::TimedOut => {
                self.release_execution(request_id).await;
                Err(RecoveryError::ExecutionFailed {
                    request_id,
                    reason: "relay polling timed out".to_string(),
                })
            }
            SubmissionStatus::Pending => {
                // wait_terminal only returns Pending if the poll task died.
                self.release_execution(request_id).await;
                Err(RecoveryError::ExecutionFailed {
                    request_id,
                    reason: "submission tracking ended without a terminal status".to_string(),
                })
            }
        }
    }

    /// Current view of a request, applying lazy expiry.
    pub async fn get(&self, request_id: Uuid) -> Result<RecoveryRequest, RecoveryError> {
        let (request, expired) = {
            let mut requests = self.requests.write().await;
            let request = requests
                .get_mut(&request_id)
                .ok_or(RecoveryError::UnknownRequest(request_id))?;
            let expired = force_expiry(request);
            (request.clone(), expired)
        };

        if let Some(expired) = expired {
            self.archive_terminal(&expired).await;
            self.publish(request_id, RecoveryStatus::Expired).await;
        }
        Ok(request)
    }

    async fn release_execution(&self, request_id: Uuid) {
        if let Some(request) = self.requests.write().await.get_mut(&request_id) {
            request.execution_in_flight = false;
        }
    }

    /// Archive a terminal request. Archiving is best-effort: the in-memory
    /// transition already happened, and the store can be repaired from the
    /// notification trail.
    async fn archive_terminal(&self, request: &RecoveryRequest) {
        if let Err(e) = self.archive.put(request).await {
            tracing::warn!(request_id = %request.id, error = %e, "Failed to archive recovery request");
        }
    }

    async fn publish(&self, request_id: Uuid, status: RecoveryStatus) {
        self.notifier
            .publish(CoreEvent::RecoveryUpdated { request_id, status })
            .await;
    }
}

/// Verify a guardian's EIP-191 signature over the canonical content.
fn verify_approval(
    request: &RecoveryRequest,
    guardian: Address,
    signature: &Bytes,
) -> Result<(), RecoveryError> {
    let bad_signature = || RecoveryError::BadSignature {
        request_id: request.id,
        guardian,
    };

    let parsed =
        alloy::primitives::Signature::try_from(signature.as_ref()).map_err(|_| bad_signature())?;
    let recovered = parsed
        .recover_address_from_msg(request.approval_message().as_bytes())
        .map_err(|_| bad_signature())?;

    if recovered == guardian {
        Ok(())
    } else {
        Err(bad_signature())
    }
}

/// Force `Expired` if the time lock ran out while the request was open.
/// Returns a clone of the newly expired request for archiving.
fn force_expiry(request: &mut RecoveryRequest) -> Option<RecoveryRequest> {
    if !request.status.is_terminal() && Utc::now() > request.expires_at {
        request.status = RecoveryStatus::Expired;
        request.execution_in_flight = false;
        Some(request.clone())
    } else {
        None
    }
}
