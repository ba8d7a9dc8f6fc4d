// Copyright (c) 2026 ampexp Contributors
// SPDX-License-Identifier: Apache-2.0

//! ampexp-core
//!
//! Per-session experiment (feature flag) resolution.
//!
//! - Override list parsed from the `AMP_EXP` cookie
//! - Decision cache owned by the [`Session`], filled lazily and cleared only on reset
//! - Frequency resolver for host-configured activation thresholds
//! - Toggle writer that updates the cache and persists the cookie
//! - One-shot branch bucketing for experiments with variants
//! - Origin experiments enabled by signed, origin-scoped tokens
//!
//! Resolution never fails: malformed inputs resolve to "off".

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod branch;
pub mod config;
pub mod cookie;
pub mod error;
pub mod origin;
pub mod overrides;
pub mod page;
pub mod random;
pub mod resolver;
pub mod session;
pub mod toggle;

pub use crate::branch::{
    force_experiment_branch, get_experiment_branch, randomly_select_unset_experiments,
    ExperimentDescriptor,
};
pub use crate::config::{Frequency, HostConfig};
pub use crate::error::{ExperimentError, ExperimentResult};
pub use crate::origin::{is_origin_experiment_on, Ed25519Verifier, SignatureVerifier};
pub use crate::resolver::{
    experiment_toggles, is_experiment_on, reset_experiment_toggles, resolve_experiment,
    DecisionSource,
};
pub use crate::session::{Session, SessionBuilder};
pub use crate::toggle::toggle_experiment;
