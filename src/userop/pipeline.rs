// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The shared action pipeline.
//!
//! Both producers of pending actions (proof submissions and recovery
//! executions) go through the same chain: build -> sponsor -> sign ->
//! submit. All collaborator handles are injected at construction; there is
//! no ambient relay or signer state.

use std::sync::Arc;

use alloy::primitives::{Address, Bytes};

use super::builder::{BuildError, UserOperationBuilder};
use super::envelope::ActionPayload;
use super::relay::{BundlerRelay, RelayError, SubmissionHandle};
use super::signer::{EnvelopeSigner, SignError};
use super::sponsor::{PaymasterSponsor, SponsorError};

/// Errors from any pipeline stage, with the originating kind preserved.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Sponsor(#[from] SponsorError),

    #[error(transparent)]
    Sign(#[from] SignError),

    #[error(transparent)]
    Relay(#[from] RelayError),
}

/// Runs validated actions through build, sponsorship, signing, and relay.
pub struct ActionPipeline {
    builder: UserOperationBuilder,
    sponsor: PaymasterSponsor,
    signer: Arc<dyn EnvelopeSigner>,
    relay: BundlerRelay,
}

impl ActionPipeline {
    pub fn new(
        builder: UserOperationBuilder,
        sponsor: PaymasterSponsor,
        signer: Arc<dyn EnvelopeSigner>,
        relay: BundlerRelay,
    ) -> Self {
        Self {
            builder,
            sponsor,
            signer,
            relay,
        }
    }

    /// Run an action for an already-deployed account.
    pub async fn run(
        &self,
        sender: Address,
        payload: ActionPayload,
    ) -> Result<SubmissionHandle, PipelineError> {
        let envelope = self.builder.build(sender, payload).await?;
        let envelope = self.sponsor.sponsor(envelope).await?;
        let signed = self.signer.sign(envelope).await?;
        Ok(self.relay.submit(signed).await?)
    }

    /// Run the first action of a counterfactual account, deploying it.
    pub async fn run_deploying(
        &self,
        sender: Address,
        payload: ActionPayload,
        init_code: Bytes,
    ) -> Result<SubmissionHandle, PipelineError> {
        let envelope = self.builder.build_deploying(sender, payload, init_code).await?;
        let envelope = self.sponsor.sponsor(envelope).await?;
        let signed = self.signer.sign(envelope).await?;
        Ok(self.relay.submit(signed).await?)
    }

    /// The relay tracking this pipeline's submissions.
    pub fn relay(&self) -> &BundlerRelay {
        &self.relay
    }
}
