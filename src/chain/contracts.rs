// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Contract bindings and calldata encoders.
//!
//! Every action an envelope carries is an `execute` call on the subject's
//! smart account wrapping one of the account's own entry points: proof
//! anchoring, recovery execution, or guardian administration.

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;

use crate::commitment::{FieldElement, MerkleRoot};
use crate::userop::{ActionKind, ActionPayload, GuardianChange, UserOperation};

sol! {
    /// ERC-4337 v0.6 user operation as the EntryPoint ABI encodes it.
    #[derive(Debug)]
    struct PackedUserOperation {
        address sender;
        uint256 nonce;
        bytes initCode;
        bytes callData;
        uint256 callGasLimit;
        uint256 verificationGasLimit;
        uint256 preVerificationGas;
        uint256 maxFeePerGas;
        uint256 maxPriorityFeePerGas;
        bytes paymasterAndData;
        bytes signature;
    }

    #[sol(rpc)]
    interface IEntryPoint {
        function getNonce(address sender, uint192 key) external view returns (uint256);
        function handleOps(PackedUserOperation[] calldata ops, address payable beneficiary) external;
    }

    /// The recoverable adherence smart account.
    interface IAdherenceAccount {
        function execute(address dest, uint256 value, bytes calldata func) external;
        function recordAdherenceProof(uint256 merkleRoot, uint256 subjectCommitment, bytes calldata proofData) external;
        function executeRecovery(address newOwner) external;
        function addGuardian(address guardian) external;
        function removeGuardian(address guardian) external;
        function changeThreshold(uint256 newThreshold) external;
    }
}

/// Convert the domain envelope into the EntryPoint's ABI struct.
pub(crate) fn pack_user_op(op: &UserOperation) -> PackedUserOperation {
    PackedUserOperation {
        sender: op.sender,
        nonce: op.nonce,
        initCode: op.init_code.clone(),
        callData: op.call_data.clone(),
        callGasLimit: op.call_gas_limit,
        verificationGasLimit: op.verification_gas_limit,
        preVerificationGas: op.pre_verification_gas,
        maxFeePerGas: op.max_fee_per_gas,
        maxPriorityFeePerGas: op.max_priority_fee_per_gas,
        paymasterAndData: op.paymaster_and_data.clone(),
        signature: op.signature.clone(),
    }
}

/// Wrap an inner account call in the account's `execute` on itself.
fn wrap_self_execute(account: Address, inner: Vec<u8>) -> Bytes {
    IAdherenceAccount::executeCall {
        dest: account,
        value: U256::ZERO,
        func: inner.into(),
    }
    .abi_encode()
    .into()
}

/// Calldata anchoring a verified weekly proof on the subject's account.
///
/// The opaque proof object is forwarded as its JSON bytes; the account
/// contract hands it to the on-chain verifier unchanged.
pub fn encode_proof_anchor(
    account: Address,
    root: MerkleRoot,
    subject_commitment: FieldElement,
    proof: &serde_json::Value,
) -> Result<Bytes, serde_json::Error> {
    let proof_data = serde_json::to_vec(proof)?;
    let inner = IAdherenceAccount::recordAdherenceProofCall {
        merkleRoot: root.to_u256(),
        subjectCommitment: subject_commitment.to_u256(),
        proofData: proof_data.into(),
    }
    .abi_encode();
    Ok(wrap_self_execute(account, inner))
}

/// Calldata executing an approved ownership recovery.
pub fn encode_recovery_execution(account: Address, new_owner: Address) -> Bytes {
    let inner = IAdherenceAccount::executeRecoveryCall {
        newOwner: new_owner,
    }
    .abi_encode();
    wrap_self_execute(account, inner)
}

/// Ready-to-run pipeline payload for a guardian-set administration call.
pub fn guardian_update_payload(account: Address, change: GuardianChange) -> ActionPayload {
    ActionPayload {
        kind: ActionKind::GuardianUpdate { change },
        call_data: encode_guardian_update(account, &change),
    }
}

/// Calldata for a guardian-set administration call.
pub fn encode_guardian_update(account: Address, change: &GuardianChange) -> Bytes {
    let inner = match change {
        GuardianChange::Add { guardian } => IAdherenceAccount::addGuardianCall {
            guardian: *guardian,
        }
        .abi_encode(),
        GuardianChange::Remove { guardian } => IAdherenceAccount::removeGuardianCall {
            guardian: *guardian,
        }
        .abi_encode(),
        GuardianChange::Threshold { new_threshold } => IAdherenceAccount::changeThresholdCall {
            newThreshold: U256::from(*new_threshold),
        }
        .abi_encode(),
    };
    wrap_self_execute(account, inner)
}
