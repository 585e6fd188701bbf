// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration Constants
//!
//! This module defines environment variable names used by services
//! embedding the core. Configuration is loaded from the environment at
//! startup by the embedding service; the core itself takes everything as
//! constructor arguments.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `ETH_RPC_URL` | EVM node RPC endpoint | `http://localhost:8545` |
//! | `CHAIN_ID` | Chain id envelopes are hashed against | `31337` |
//! | `ENTRY_POINT_ADDRESS` | ERC-4337 EntryPoint deployment | Required |
//! | `PAYMASTER_ADDRESS` | Paymaster settling sponsored fees | Required |
//! | `ACCOUNT_FACTORY_ADDRESS` | Smart-account factory (init code) | Required |
//! | `RELAY_SIGNER_KEY` | Hex private key of the relay signer | Required |

/// Environment variable name for the EVM RPC endpoint.
pub const ETH_RPC_URL_ENV: &str = "ETH_RPC_URL";

/// Environment variable name for the chain id.
pub const CHAIN_ID_ENV: &str = "CHAIN_ID";

/// Environment variable name for the EntryPoint contract address.
pub const ENTRY_POINT_ADDRESS_ENV: &str = "ENTRY_POINT_ADDRESS";

/// Environment variable name for the paymaster contract address.
pub const PAYMASTER_ADDRESS_ENV: &str = "PAYMASTER_ADDRESS";

/// Environment variable name for the account factory address.
pub const ACCOUNT_FACTORY_ADDRESS_ENV: &str = "ACCOUNT_FACTORY_ADDRESS";

/// Environment variable name for the relay signer's private key.
///
/// The key signs envelopes and pays the bundler role's gas. It never holds
/// or moves user funds.
pub const RELAY_SIGNER_KEY_ENV: &str = "RELAY_SIGNER_KEY";
