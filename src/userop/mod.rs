// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! ERC-4337 action envelopes and the pipeline that carries them.
//!
//! This module provides:
//! - Typed envelope states (unsigned -> signed -> tracked submission)
//! - Envelope construction with per-account nonce serialization
//! - Paymaster sponsorship policy
//! - Bundler relay with bounded retries and receipt polling
//! - The pipeline chaining all of the above

pub mod builder;
pub mod envelope;
pub mod pipeline;
pub mod relay;
pub mod signer;
pub mod sponsor;

pub use builder::{
    BuildError, FeePolicy, GasLimits, NonceReadError, NonceSource, UserOperationBuilder,
};
pub use envelope::{
    ActionKind, ActionPayload, Funding, GuardianChange, SignedEnvelope, UnsignedEnvelope,
    UserOperation,
};
pub use pipeline::{ActionPipeline, PipelineError};
pub use relay::{
    BundlerRelay, RelayEndpoint, RelayEndpointError, RelayError, RelayReceipt, RetryPolicy,
    SubmissionHandle, SubmissionStatus,
};
pub use signer::{EnvelopeSigner, LocalEnvelopeSigner, SignError};
pub use sponsor::{PaymasterSponsor, SponsorError, SponsorPolicy};
