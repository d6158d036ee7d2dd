//! Stateless bearer tokens.
//!
//! A token is an HS256 JWS over `{sub, iat, exp}`. Nothing is stored server
//! side: validity is recomputed from the signature and the clock on every
//! request, which also means a token cannot be withdrawn before `exp`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Config;
use crate::models::UserId;

const BEARER_PREFIX: &str = "Bearer ";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("signing secret is missing or unusable")]
    Signing,
    #[error("token is malformed or its signature does not match")]
    Invalid,
    #[error("token has expired")]
    Expired,
    #[error("no bearer token supplied")]
    Missing,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: i64,
    exp: i64,
}

pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
    has_secret: bool,
}

impl TokenService {
    pub fn new(config: &Config) -> Self {
        let secret = config.secret_key.as_slice();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl: config.token_ttl,
            has_secret: !secret.iter().all(u8::is_ascii_whitespace),
        }
    }

    pub fn issue(&self, identity: UserId) -> Result<String, TokenError> {
        self.issue_at(identity, Utc::now())
    }

    pub fn issue_at(&self, identity: UserId, now: DateTime<Utc>) -> Result<String, TokenError> {
        if !self.has_secret {
            return Err(TokenError::Signing);
        }

        let ttl = chrono::Duration::from_std(self.ttl).map_err(|_| TokenError::Signing)?;
        let claims = Claims {
            sub: identity.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| {
                tracing::error!(error = %e, "token signing failed");
                TokenError::Signing
            })
    }

    pub fn validate(&self, token: &str) -> Result<UserId, TokenError> {
        if !self.has_secret {
            return Err(TokenError::Invalid);
        }

        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })?;

        data.claims.sub.parse::<UserId>().map_err(|_| TokenError::Invalid)
    }
}

/// Pulls the token out of an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, TokenError> {
    let token = header
        .and_then(|h| h.strip_prefix(BEARER_PREFIX))
        .map(str::trim)
        .ok_or(TokenError::Missing)?;

    if token.is_empty() || token.contains(' ') {
        return Err(TokenError::Missing);
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new(&Config::new("unit-test-signing-secret"))
    }

    #[test]
    fn issued_token_validates_to_its_identity() {
        let tokens = service();
        for identity in [1, 42, u64::MAX] {
            let token = tokens.issue(identity).unwrap();
            assert_eq!(tokens.validate(&token), Ok(identity));
        }
    }

    #[test]
    fn expired_token_is_reported_as_expired() {
        let tokens = TokenService::new(
            &Config::new("unit-test-signing-secret").with_token_ttl(Duration::from_secs(3600)),
        );
        let two_hours_ago = Utc::now() - chrono::Duration::hours(2);
        let token = tokens.issue_at(7, two_hours_ago).unwrap();
        assert_eq!(tokens.validate(&token), Err(TokenError::Expired));
    }

    #[test]
    fn altered_signature_is_invalid() {
        let tokens = service();
        let token = tokens.issue(7).unwrap();

        let sig_start = token.rfind('.').unwrap() + 1;
        let mut bytes = token.into_bytes();
        let target = sig_start + 4;
        bytes[target] = if bytes[target] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(bytes).unwrap();

        assert_eq!(tokens.validate(&tampered), Err(TokenError::Invalid));
    }

    #[test]
    fn altered_claims_are_invalid() {
        let tokens = service();
        let token = tokens.issue(7).unwrap();
        let other = tokens.issue(8).unwrap();

        // Payload of one token with the signature of another.
        let mut parts: Vec<&str> = token.split('.').collect();
        let other_parts: Vec<&str> = other.split('.').collect();
        parts[1] = other_parts[1];
        let spliced = parts.join(".");

        assert_eq!(tokens.validate(&spliced), Err(TokenError::Invalid));
    }

    #[test]
    fn token_from_another_secret_is_invalid() {
        let ours = service();
        let theirs = TokenService::new(&Config::new("a-different-secret"));
        let token = theirs.issue(7).unwrap();
        assert_eq!(ours.validate(&token), Err(TokenError::Invalid));
    }

    #[test]
    fn garbage_is_invalid() {
        let tokens = service();
        assert_eq!(tokens.validate(""), Err(TokenError::Invalid));
        assert_eq!(tokens.validate("abc.def.ghi"), Err(TokenError::Invalid));
        assert_eq!(tokens.validate("not a token"), Err(TokenError::Invalid));
    }

    #[test]
    fn missing_secret_cannot_sign() {
        let tokens = TokenService::new(&Config::new(""));
        assert_eq!(tokens.issue(1), Err(TokenError::Signing));

        let blank = TokenService::new(&Config::new("   "));
        assert_eq!(blank.issue(1), Err(TokenError::Signing));
    }

    #[test]
    fn missing_secret_never_validates() {
        let signer = service();
        let token = signer.issue(1).unwrap();
        let tokens = TokenService::new(&Config::new(""));
        assert_eq!(tokens.validate(&token), Err(TokenError::Invalid));
    }

    #[test]
    fn bearer_header_parsing() {
        assert_eq!(bearer_token(Some("Bearer abc.def.ghi")), Ok("abc.def.ghi"));
        assert_eq!(bearer_token(None), Err(TokenError::Missing));
        assert_eq!(bearer_token(Some("")), Err(TokenError::Missing));
        assert_eq!(bearer_token(Some("Bearer ")), Err(TokenError::Missing));
        assert_eq!(bearer_token(Some("Basic dXNlcjpwYXNz")), Err(TokenError::Missing));
        assert_eq!(bearer_token(Some("Bearer a b")), Err(TokenError::Missing));
        assert_eq!(bearer_token(Some("abc.def.ghi")), Err(TokenError::Missing));
    }
}
