// Copyright (c) 2026 ampexp Contributors
// SPDX-License-Identifier: Apache-2.0

//! Origin experiments: experiments switched on by a signed token that the
//! page carries in a meta tag and that is scoped to one web origin.

use std::collections::BTreeSet;

use ampexp_token::{verify_signature, verifying_key_from_hex, TokenConfig, TokenEnvelope};
use async_trait::async_trait;
use ed25519_dalek::VerifyingKey;

use crate::error::ExperimentResult;
use crate::page::{Location, ORIGIN_TOKEN_META};
use crate::session::Session;

/// Checks a detached signature over a payload.
#[async_trait]
pub trait SignatureVerifier: Send + Sync {
    async fn verify(&self, signature: &[u8], payload: &[u8]) -> bool;
}

/// Verifies token signatures against one trusted Ed25519 public key.
#[derive(Debug, Clone)]
pub struct Ed25519Verifier {
    key: VerifyingKey,
}

impl Ed25519Verifier {
    pub fn new(key: VerifyingKey) -> Self {
        Self { key }
    }

    pub fn from_hex(public_key_hex: &str) -> ExperimentResult<Self> {
        Ok(Self::new(verifying_key_from_hex(public_key_hex)?))
    }
}

#[async_trait]
impl SignatureVerifier for Ed25519Verifier {
    async fn verify(&self, signature: &[u8], payload: &[u8]) -> bool {
        verify_signature(&self.key, signature, payload)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRejection {
    Malformed,
    BadSignature,
    InvalidPayload,
    OriginMismatch,
    Expired,
}

/// Validates one token for `expected_origin` and returns its payload.
///
/// The reason is for logging only; callers must treat every rejection alike.
pub async fn validate_origin_token(
    token: &str,
    verifier: &dyn SignatureVerifier,
    expected_origin: &str,
    now_ms: i64,
) -> Result<TokenConfig, TokenRejection> {
    let envelope = TokenEnvelope::decode(token).map_err(|_| TokenRejection::Malformed)?;
    if !verifier
        .verify(envelope.signature(), envelope.signed_bytes())
        .await
    {
        return Err(TokenRejection::BadSignature);
    }
    let config = envelope
        .config()
        .map_err(|_| TokenRejection::InvalidPayload)?;
    let approved_origin = Location::parse(&config.origin)
        .map_err(|_| TokenRejection::InvalidPayload)?
        .origin();
    if approved_origin != expected_origin {
        return Err(TokenRejection::OriginMismatch);
    }
    if config.is_expired_at(now_ms) {
        return Err(TokenRejection::Expired);
    }
    Ok(config)
}

/// Whether a valid origin-experiment token on the page enables `experiment`.
///
/// Fails closed: no verifier, no token, or any invalid token yields `false`.
/// Results are cached per session; `refresh_token` re-validates the page's tokens.
pub async fn is_origin_experiment_on(
    session: &mut Session,
    experiment: &str,
    refresh_token: bool,
) -> bool {
    if refresh_token || session.origin_experiments.is_none() {
        let enabled = enabled_origin_experiments(session).await;
        session.origin_experiments = Some(enabled);
    }
    session
        .origin_experiments
        .as_ref()
        .is_some_and(|enabled| enabled.contains(experiment))
}

async fn enabled_origin_experiments(session: &Session) -> BTreeSet<String> {
    let mut enabled = BTreeSet::new();
    let Some(verifier) = session.verifier().cloned() else {
        tracing::debug!("no signature verifier; origin experiments disabled");
        return enabled;
    };
    let tokens: Vec<String> = session
        .document()
        .meta_contents(ORIGIN_TOKEN_META)
        .into_iter()
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
        .collect();
    if tokens.is_empty() {
        tracing::debug!("no origin experiment token on page");
        return enabled;
    }

    let origin = session.location().origin();
    let now_ms = session.clock().now().timestamp_millis();
    for token in &tokens {
        match validate_origin_token(token, verifier.as_ref(), &origin, now_ms).await {
            Ok(config) => {
                tracing::debug!(experiment = %config.experiment, "origin experiment token accepted");
                enabled.insert(config.experiment);
            }
            Err(reason) => {
                tracing::debug!(reason = ?reason, origin = %origin, "origin experiment token rejected");
            }
        }
    }
    enabled
}

#[cfg(test)]
mod tests {
    use super::*;
    use ampexp_token::encode_token;
    use ed25519_dalek::SigningKey;

    struct AcceptAll;

    #[async_trait]
    impl SignatureVerifier for AcceptAll {
        async fn verify(&self, _signature: &[u8], _payload: &[u8]) -> bool {
            true
        }
    }

    fn token(origin: &str, experiment: &str, expiration: i64) -> String {
        let key = SigningKey::from_bytes(&[5; 32]);
        encode_token(&TokenConfig::new(origin, experiment, expiration), &key).unwrap()
    }

    #[tokio::test]
    async fn origin_comparison_ignores_path_and_case() {
        let t = token("HTTPS://Origin.com/some/page", "foo", i64::MAX);
        let config = validate_origin_token(&t, &AcceptAll, "https://origin.com", 0)
            .await
            .unwrap();
        assert_eq!(config.experiment, "foo");
    }

    #[tokio::test]
    async fn rejections_are_classified() {
        let ed = Ed25519Verifier::new(SigningKey::from_bytes(&[6; 32]).verifying_key());
        let good = token("https://origin.com", "foo", 1_000);

        assert_eq!(
            validate_origin_token("@@", &AcceptAll, "https://origin.com", 0).await,
            Err(TokenRejection::Malformed)
        );
        assert_eq!(
            validate_origin_token(&good, &ed, "https://origin.com", 0).await,
            Err(TokenRejection::BadSignature)
        );
        assert_eq!(
            validate_origin_token(&good, &AcceptAll, "https://not-origin.com", 0).await,
            Err(TokenRejection::OriginMismatch)
        );
        assert_eq!(
            validate_origin_token(&good, &AcceptAll, "https://origin.com", 1_001).await,
            Err(TokenRejection::Expired)
        );
        let bad_origin = token("not a url", "foo", 1_000);
        assert_eq!(
            validate_origin_token(&bad_origin, &AcceptAll, "https://origin.com", 0).await,
            Err(TokenRejection::InvalidPayload)
        );
    }

    #[tokio::test]
    async fn ed25519_verifier_accepts_matching_key() {
        let key = SigningKey::from_bytes(&[5; 32]);
        let verifier =
            Ed25519Verifier::from_hex(&hex::encode(key.verifying_key().to_bytes())).unwrap();
        let t = token("https://origin.com", "foo", i64::MAX);
        assert!(validate_origin_token(&t, &verifier, "https://origin.com", 0)
            .await
            .is_ok());
    }
}
