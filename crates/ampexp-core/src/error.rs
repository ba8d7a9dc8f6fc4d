// Copyright (c) 2026 ampexp Contributors
// SPDX-License-Identifier: Apache-2.0

use ampexp_token::TokenError;
use thiserror::Error;

pub type ExperimentResult<T> = Result<T, ExperimentError>;

/// Errors raised while building a session or loading its inputs.
///
/// Resolution and toggling never return these; they fall back to the safe default.
#[derive(Debug, Error)]
pub enum ExperimentError {
    #[error("invalid host config: {0}")]
    InvalidConfig(String),

    #[error("invalid location: {0}")]
    InvalidLocation(String),

    #[error("token error: {0}")]
    Token(#[from] TokenError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
