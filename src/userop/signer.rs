// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Envelope signing.
//!
//! Signing is a collaborator seam: production uses a local session key held
//! by the service, tests inject stubs. The account contract accepts an
//! EIP-191 signature over the v0.6 user-op hash.

use alloy::primitives::{Address, Bytes};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use async_trait::async_trait;

use super::envelope::{SignedEnvelope, UnsignedEnvelope};

/// Signing collaborator.
#[async_trait]
pub trait EnvelopeSigner: Send + Sync {
    async fn sign(&self, envelope: UnsignedEnvelope) -> Result<SignedEnvelope, SignError>;
}

/// Failure producing an envelope signature.
#[derive(Debug, thiserror::Error)]
#[error("Signing failed: {0}")]
pub struct SignError(pub String);

/// Signs envelopes with a local private key.
pub struct LocalEnvelopeSigner {
    signer: PrivateKeySigner,
    entry_point: Address,
    chain_id: u64,
}

impl LocalEnvelopeSigner {
    pub fn new(signer: PrivateKeySigner, entry_point: Address, chain_id: u64) -> Self {
        Self {
            signer,
            entry_point,
            chain_id,
        }
    }

    /// Address the signatures recover to.
    pub fn address(&self) -> Address {
        self.signer.address()
    }
}

#[async_trait]
impl EnvelopeSigner for LocalEnvelopeSigner {
    async fn sign(&self, envelope: UnsignedEnvelope) -> Result<SignedEnvelope, SignError> {
        let hash = envelope.op.hash(self.entry_point, self.chain_id);
        let signature = self
            .signer
            .sign_message_sync(hash.as_slice())
            .map_err(|e| SignError(e.to_string()))?;
        Ok(envelope.into_signed(Bytes::from(signature.as_bytes().to_vec())))
    }
}
