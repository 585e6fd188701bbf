// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Guardian-based social recovery.
//!
//! A quorum of pre-registered guardians can reassign ownership of a smart
//! account without the original private key. The state machine here owns
//! every live request; execution goes through the same action pipeline as
//! proof submissions.

pub mod request;
pub mod state_machine;

pub use request::{Approval, GuardianSet, RecoveryRequest, RecoveryStatus};
pub use state_machine::{GuardianRecoveryStateMachine, RecoveryError};
