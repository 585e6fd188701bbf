// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Account-abstraction action envelopes.
//!
//! An action (proof anchoring, recovery execution, guardian administration)
//! travels to the ledger as an ERC-4337 v0.6 user operation. The envelope
//! moves through distinct types as it is prepared: [`UnsignedEnvelope`] out
//! of the builder, [`SignedEnvelope`] out of the signer. The relay only
//! accepts the signed form, so an unsigned or double-signed submission does
//! not typecheck.

use std::fmt;

use alloy::primitives::{keccak256, Address, Bytes, B256, U256};
use alloy::sol_types::SolValue;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::commitment::BatchKey;

/// ERC-4337 v0.6 user operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserOperation {
    /// Smart account the operation executes as.
    pub sender: Address,
    /// EntryPoint nonce for the sender.
    pub nonce: U256,
    /// Factory calldata for counterfactual deployment; empty once deployed.
    pub init_code: Bytes,
    /// The account call to execute.
    pub call_data: Bytes,
    /// Gas limit for the execution phase.
    pub call_gas_limit: U256,
    /// Gas limit for the verification phase.
    pub verification_gas_limit: U256,
    /// Gas paid to the bundler before verification.
    pub pre_verification_gas: U256,
    /// EIP-1559 max fee per gas.
    pub max_fee_per_gas: U256,
    /// EIP-1559 priority fee per gas.
    pub max_priority_fee_per_gas: U256,
    /// Paymaster address plus extra data; empty when self-funded.
    pub paymaster_and_data: Bytes,
    /// Owner (or session-key) signature over the user-op hash.
    pub signature: Bytes,
}

impl UserOperation {
    /// The v0.6 user-operation hash the account signs.
    ///
    /// `keccak256(abi.encode(keccak256(pack), entryPoint, chainId))`, where
    /// `pack` hashes the byte fields and lays the rest out as static words.
    /// Computed locally so signing does not need an `eth_call` round trip.
    pub fn hash(&self, entry_point: Address, chain_id: u64) -> B256 {
        let packed = (
            self.sender,
            self.nonce,
            keccak256(&self.init_code),
            keccak256(&self.call_data),
            self.call_gas_limit,
            self.verification_gas_limit,
            self.pre_verification_gas,
            self.max_fee_per_gas,
            self.max_priority_fee_per_gas,
            keccak256(&self.paymaster_and_data),
        )
            .abi_encode();

        let envelope = (keccak256(packed), entry_point, U256::from(chain_id)).abi_encode();
        keccak256(envelope)
    }
}

/// What an envelope carries to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    /// Anchor a verified weekly adherence proof.
    ProofSubmission { key: BatchKey },
    /// Execute an approved ownership recovery.
    RecoveryExecution { request_id: Uuid },
    /// Owner-driven guardian-set administration.
    GuardianUpdate { change: GuardianChange },
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProofSubmission { key } => write!(f, "proof-submission {key}"),
            Self::RecoveryExecution { request_id } => {
                write!(f, "recovery-execution {request_id}")
            }
            Self::GuardianUpdate { change } => write!(f, "guardian-update {change}"),
        }
    }
}

/// A guardian-set administration call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuardianChange {
    Add { guardian: Address },
    Remove { guardian: Address },
    Threshold { new_threshold: u64 },
}

impl fmt::Display for GuardianChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add { guardian } => write!(f, "add {guardian:#x}"),
            Self::Remove { guardian } => write!(f, "remove {guardian:#x}"),
            Self::Threshold { new_threshold } => write!(f, "threshold {new_threshold}"),
        }
    }
}

/// A validated action ready for envelope construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionPayload {
    pub kind: ActionKind,
    /// Encoded account call (the account's `execute` wrapping the inner call).
    pub call_data: Bytes,
}

/// How the envelope's gas is paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Funding {
    /// The sponsor has not decided yet.
    Undecided,
    /// Fees are covered by the paymaster.
    Sponsored { paymaster: Address },
    /// The sender pays; the caller must have funded the account.
    SelfFunded,
}

/// An envelope produced by the builder, not yet signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedEnvelope {
    pub action: ActionKind,
    pub op: UserOperation,
    pub funding: Funding,
}

impl UnsignedEnvelope {
    /// Attach a signature, producing the form the relay accepts.
    pub fn into_signed(mut self, signature: Bytes) -> SignedEnvelope {
        self.op.signature = signature;
        SignedEnvelope {
            action: self.action,
            op: self.op,
            funding: self.funding,
        }
    }
}

/// A fully prepared envelope. Immutable from here on: retries resubmit
/// exactly these bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedEnvelope {
    pub action: ActionKind,
    pub op: UserOperation,
    pub funding: Funding,
}
