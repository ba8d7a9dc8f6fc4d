// Copyright (c) 2026 ampexp Contributors
// SPDX-License-Identifier: Apache-2.0

//! ampexp-token
//!
//! Signed origin-experiment token envelope.
//!
//! Layout before base64 encoding:
//! - `version`: 1 byte, currently `0`
//! - `config_len`: 4 bytes, big-endian
//! - `config`: `config_len` bytes of UTF-8 JSON (`origin`, `experiment`, `expiration`)
//! - `signature`: 64 bytes, Ed25519 over `version | config_len | config`

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const TOKEN_VERSION: u8 = 0;
pub const SIGNATURE_LEN: usize = 64;
pub const MAX_CONFIG_BYTES: usize = 4096;
const HEADER_LEN: usize = 1 + 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is not valid base64")]
    Encoding,

    #[error("token envelope too short")]
    Truncated,

    #[error("unsupported token version {0}")]
    UnsupportedVersion(u8),

    #[error("token length does not match declared config length {0}")]
    LengthMismatch(usize),

    #[error("token config exceeds {MAX_CONFIG_BYTES} bytes")]
    ConfigTooLarge,

    #[error("invalid token config: {0}")]
    Config(String),

    #[error("invalid key material")]
    InvalidKey,
}

/// Payload carried inside a token.
///
/// `expiration` is milliseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfig {
    pub origin: String,
    pub experiment: String,
    pub expiration: i64,
}

impl TokenConfig {
    pub fn new(origin: impl Into<String>, experiment: impl Into<String>, expiration: i64) -> Self {
        Self {
            origin: origin.into(),
            experiment: experiment.into(),
            expiration,
        }
    }

    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        self.expiration < now_ms
    }
}

/// A decoded envelope whose signature has not been checked yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenEnvelope {
    signed: Vec<u8>,
    signature: Vec<u8>,
}

impl TokenEnvelope {
    pub fn decode(token: &str) -> Result<Self, TokenError> {
        let bytes = decode_base64(token.trim())?;
        if bytes.len() < HEADER_LEN {
            return Err(TokenError::Truncated);
        }
        if bytes[0] != TOKEN_VERSION {
            return Err(TokenError::UnsupportedVersion(bytes[0]));
        }
        let config_len = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as usize;
        if config_len > MAX_CONFIG_BYTES {
            return Err(TokenError::ConfigTooLarge);
        }
        let signature_start = HEADER_LEN + config_len;
        if bytes.len() != signature_start + SIGNATURE_LEN {
            return Err(TokenError::LengthMismatch(config_len));
        }
        Ok(Self {
            signed: bytes[..signature_start].to_vec(),
            signature: bytes[signature_start..].to_vec(),
        })
    }

    pub fn version(&self) -> u8 {
        self.signed[0]
    }

    /// Bytes covered by the signature.
    pub fn signed_bytes(&self) -> &[u8] {
        &self.signed
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    pub fn config_bytes(&self) -> &[u8] {
        &self.signed[HEADER_LEN..]
    }

    pub fn config(&self) -> Result<TokenConfig, TokenError> {
        let config: TokenConfig = serde_json::from_slice(self.config_bytes())
            .map_err(|err| TokenError::Config(err.to_string()))?;
        if config.origin.is_empty() {
            return Err(TokenError::Config("origin must not be empty".to_string()));
        }
        if config.experiment.is_empty() {
            return Err(TokenError::Config("experiment must not be empty".to_string()));
        }
        Ok(config)
    }
}

/// Builds the signed portion of an envelope for `config`.
pub fn signed_payload(config: &TokenConfig) -> Result<Vec<u8>, TokenError> {
    let json = serde_json::to_vec(config).map_err(|err| TokenError::Config(err.to_string()))?;
    if json.len() > MAX_CONFIG_BYTES {
        return Err(TokenError::ConfigTooLarge);
    }
    let mut out = Vec::with_capacity(HEADER_LEN + json.len());
    out.push(TOKEN_VERSION);
    out.extend_from_slice(&(json.len() as u32).to_be_bytes());
    out.extend_from_slice(&json);
    Ok(out)
}

/// Signs `config` and returns the base64 token string.
pub fn encode_token(config: &TokenConfig, signing_key: &SigningKey) -> Result<String, TokenError> {
    let mut bytes = signed_payload(config)?;
    let signature = signing_key.sign(&bytes);
    bytes.extend_from_slice(&signature.to_bytes());
    Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
}

/// Verifies a detached Ed25519 signature over `payload`.
pub fn verify_signature(public_key: &VerifyingKey, signature: &[u8], payload: &[u8]) -> bool {
    let Ok(signature) = Signature::from_slice(signature) else {
        return false;
    };
    public_key.verify(payload, &signature).is_ok()
}

pub fn verifying_key_from_hex(key_hex: &str) -> Result<VerifyingKey, TokenError> {
    let bytes = decode_hex32(key_hex)?;
    VerifyingKey::from_bytes(&bytes).map_err(|_| TokenError::InvalidKey)
}

/// Loads a signing key from a hex-encoded 32-byte seed.
pub fn signing_key_from_hex(seed_hex: &str) -> Result<SigningKey, TokenError> {
    let seed = decode_hex32(seed_hex)?;
    Ok(SigningKey::from_bytes(&seed))
}

fn decode_hex32(value: &str) -> Result<[u8; 32], TokenError> {
    let bytes = hex::decode(value.trim()).map_err(|_| TokenError::InvalidKey)?;
    bytes.try_into().map_err(|_| TokenError::InvalidKey)
}

fn decode_base64(token: &str) -> Result<Vec<u8>, TokenError> {
    use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
    STANDARD
        .decode(token)
        .or_else(|_| STANDARD_NO_PAD.decode(token))
        .map_err(|_| TokenError::Encoding)
}
