use std::{collections::HashSet, time::Duration};

use jsonwebtoken::{errors::ErrorKind as JwtErrorKind, DecodingKey, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};

use crate::prelude::*;

use super::User;


#[derive(Debug, confique::Config)]
pub(crate) struct JwtConfig {
    /// Shared secret used to verify the signature of bearer tokens. If this is
    /// not set, the `Authorization` header is ignored completely and every
    /// caller is anonymous.
    pub(crate) secret: Option<SecretString>,

    /// Signing algorithm of the tokens. Valid values: "HS256", "HS384", "HS512".
    #[config(default = "HS256")]
    pub(crate) algorithm: Algorithm,

    /// If set, tokens must contain this `aud` claim.
    pub(crate) audience: Option<String>,

    /// If set, tokens must contain this `iss` claim.
    pub(crate) issuer: Option<String>,

    /// Tolerance for clock differences when checking `exp` and `nbf`.
    #[config(default = "0s", deserialize_with = crate::config::deserialize_duration)]
    pub(crate) leeway: Duration,
}

/// A supported JWT signing algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
pub(crate) enum Algorithm {
    HS256,
    HS384,
    HS512,
}

impl From<Algorithm> for jsonwebtoken::Algorithm {
    fn from(src: Algorithm) -> Self {
        match src {
            Algorithm::HS256 => Self::HS256,
            Algorithm::HS384 => Self::HS384,
            Algorithm::HS512 => Self::HS512,
        }
    }
}

/// Everything needed to verify bearer tokens. Created once at startup.
pub(crate) struct JwtContext {
    key: DecodingKey,
    validation: Validation,
}

impl JwtContext {
    /// Returns `None` if no secret is configured, i.e. JWT is disabled.
    pub(crate) fn new(config: &JwtConfig) -> Option<Self> {
        let secret = config.secret.as_ref()?;

        let mut validation = Validation::new(config.algorithm.into());
        validation.required_spec_claims = HashSet::new();
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.leeway = config.leeway.as_secs();
        match &config.audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }
        if let Some(iss) = &config.issuer {
            validation.set_issuer(&[iss]);
        }

        Some(Self {
            key: DecodingKey::from_secret(secret.expose_secret().as_bytes()),
            validation,
        })
    }

    /// Verifies the token and returns the user described by its claims. The
    /// error is a short description suitable to be shown to the client.
    pub(crate) fn decode(&self, token: &str) -> Result<User, &'static str> {
        jsonwebtoken::decode::<Map<String, Value>>(token, &self.key, &self.validation)
            .map(|data| User::from_claims(data.claims))
            .map_err(|e| {
                debug!("Rejected JWT: {e}");
                error_message(e.kind())
            })
    }
}

fn error_message(kind: &JwtErrorKind) -> &'static str {
    match kind {
        JwtErrorKind::InvalidToken
            | JwtErrorKind::Base64(_)
            | JwtErrorKind::Json(_)
            | JwtErrorKind::Utf8(_) => "jwt malformed",
        JwtErrorKind::InvalidSignature => "invalid signature",
        JwtErrorKind::ExpiredSignature => "jwt expired",
        JwtErrorKind::ImmatureSignature => "jwt not active",
        JwtErrorKind::InvalidAlgorithm | JwtErrorKind::InvalidAlgorithmName => "invalid algorithm",
        JwtErrorKind::InvalidAudience => "jwt audience invalid",
        JwtErrorKind::InvalidIssuer => "jwt issuer invalid",
        _ => "invalid token",
    }
}
