// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! EntryPoint client.
//!
//! The production implementation of the two ledger collaborators: nonce
//! reads ([`NonceSource`]) and envelope submission with receipt lookups
//! ([`RelayEndpoint`]). Everything goes through one wallet-backed alloy
//! provider; the wallet only pays the bundler role's gas, it never holds
//! user funds.

use alloy::{
    network::{Ethereum, EthereumWallet, NetworkWallet},
    primitives::{aliases::U192, Address, B256, U256},
    providers::{
        fillers::{
            BlobGasFiller, ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller,
            WalletFiller,
        },
        Identity, Provider, ProviderBuilder, RootProvider,
    },
    signers::local::PrivateKeySigner,
};
use async_trait::async_trait;

use super::contracts::{pack_user_op, IEntryPoint};
use super::types::NetworkConfig;
use crate::userop::{
    NonceReadError, NonceSource, RelayEndpoint, RelayEndpointError, RelayReceipt, UserOperation,
};

/// Wallet-backed HTTP provider type (with all fillers).
type WalletProvider = FillProvider<
    JoinFill<
        JoinFill<
            Identity,
            JoinFill<GasFiller, JoinFill<BlobGasFiller, JoinFill<NonceFiller, ChainIdFiller>>>,
        >,
        WalletFiller<EthereumWallet>,
    >,
    RootProvider<Ethereum>,
>;

/// Errors from chain access.
#[derive(Debug, thiserror::Error)]
pub enum ChainClientError {
    #[error("Invalid RPC URL: {0}")]
    InvalidRpcUrl(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("RPC error: {0}")]
    RpcError(String),
}

/// Client for the ERC-4337 EntryPoint contract.
pub struct EntryPointClient {
    network: NetworkConfig,
    entry_point: Address,
    beneficiary: Address,
    provider: WalletProvider,
}

impl EntryPointClient {
    /// Create a client against the given network and EntryPoint deployment.
    pub fn new(
        network: NetworkConfig,
        entry_point: Address,
        wallet: EthereumWallet,
    ) -> Result<Self, ChainClientError> {
        let url: url::Url = network
            .rpc_url
            .parse()
            .map_err(|e: url::ParseError| ChainClientError::InvalidRpcUrl(e.to_string()))?;

        let beneficiary = NetworkWallet::<Ethereum>::default_signer_address(&wallet);
        let provider = ProviderBuilder::new().wallet(wallet).connect_http(url);

        Ok(Self {
            network,
            entry_point,
            beneficiary,
            provider,
        })
    }

    /// The EntryPoint address envelopes are hashed against.
    pub fn entry_point(&self) -> Address {
        self.entry_point
    }

    /// The network configuration.
    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    /// Create a signer from a private key (hex string without 0x prefix).
    pub fn create_signer(private_key_hex: &str) -> Result<PrivateKeySigner, ChainClientError> {
        let key_bytes = alloy::hex::decode(private_key_hex)
            .map_err(|e| ChainClientError::InvalidPrivateKey(e.to_string()))?;

        PrivateKeySigner::from_slice(&key_bytes)
            .map_err(|e| ChainClientError::InvalidPrivateKey(e.to_string()))
    }

    /// Create an Ethereum wallet from a signer.
    pub fn create_wallet(signer: PrivateKeySigner) -> EthereumWallet {
        EthereumWallet::from(signer)
    }
}

#[async_trait]
impl NonceSource for EntryPointClient {
    async fn current_nonce(&self, sender: Address) -> Result<U256, NonceReadError> {
        let entry_point = IEntryPoint::new(self.entry_point, self.provider.clone());
        entry_point
            .getNonce(sender, U192::ZERO)
            .call()
            .await
            .map_err(|e| NonceReadError(e.to_string()))
    }
}

#[async_trait]
impl RelayEndpoint for EntryPointClient {
    async fn submit_op(&self, op: &UserOperation) -> Result<B256, RelayEndpointError> {
        let entry_point = IEntryPoint::new(self.entry_point, self.provider.clone());
        let pending = entry_point
            .handleOps(vec![pack_user_op(op)], self.beneficiary)
            .send()
            .await
            .map_err(classify_submit_error)?;

        Ok(*pending.tx_hash())
    }

    async fn receipt(&self, tx_hash: B256) -> Result<Option<RelayReceipt>, RelayEndpointError> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| RelayEndpointError::Transport(e.to_string()))?;

        Ok(receipt.map(|r| RelayReceipt {
            tx_hash,
            block_number: r.block_number.unwrap_or(0),
            success: r.status(),
        }))
    }
}

/// An error response from the node is a rejection (validation, nonce,
/// funds); anything else is transport and worth retrying.
fn classify_submit_error(e: alloy::contract::Error) -> RelayEndpointError {
    match e {
        alloy::contract::Error::TransportError(rpc) if rpc.is_error_resp() => {
            RelayEndpointError::Rejected(rpc.to_string())
        }
        other => RelayEndpointError::Transport(other.to_string()),
    }
}
