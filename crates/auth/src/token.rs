//! Bearer tokens: JWT claims, HS256 codec and the server-side token record.
//!
//! A JWT alone is not enough to authenticate: its `jti` must also name a
//! stored [`AccessToken`] that is still usable, which is what makes logout
//! and revocation work.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use pktracker_core::{TokenId, UserId};

/// JWT claims carried by every access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: the user the token was issued to.
    pub sub: UserId,

    /// Token id, matching the stored [`AccessToken`].
    pub jti: TokenId,

    /// Issued-at (unix seconds).
    pub iat: i64,

    /// Expiration (unix seconds).
    pub exp: i64,

    /// Token name (e.g. "auth_token").
    pub name: String,
}

impl TokenClaims {
    pub fn for_token(token: &AccessToken) -> Self {
        Self {
            sub: token.user_id,
            jti: token.id,
            iat: token.created_at.timestamp(),
            exp: token.expires_at.timestamp(),
            name: token.name.clone(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (iat is in the future)")]
    NotYetValid,

    #[error("invalid token time window (exp <= iat)")]
    InvalidTimeWindow,
}

/// Deterministically validate token claims against `now`.
pub fn validate_claims(claims: &TokenClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    let now = now.timestamp();
    if claims.exp <= claims.iat {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now < claims.iat {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.exp {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("failed to sign token: {0}")]
    Signing(String),

    #[error(transparent)]
    Invalid(#[from] TokenValidationError),
}

/// HS256 encoder/decoder for [`TokenClaims`].
///
/// Time-based checks are left to [`validate_claims`] so callers control the
/// clock.
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenCodec {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.set_required_spec_claims(&["exp", "sub", "iat"]);

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    pub fn encode(&self, claims: &TokenClaims) -> Result<String, TokenError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Verify the signature and decode, without time checks.
    pub fn decode(&self, token: &str) -> Result<TokenClaims, TokenError> {
        jsonwebtoken::decode::<TokenClaims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| TokenError::Malformed(e.to_string()))
    }

    /// Decode and validate the claims against `now`.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<TokenClaims, TokenError> {
        let claims = self.decode(token)?;
        validate_claims(&claims, now)?;
        Ok(claims)
    }
}

impl core::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenCodec").finish_non_exhaustive()
    }
}

/// Server-side record of an issued token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub id: TokenId,
    pub user_id: UserId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn issue(user_id: UserId, name: impl Into<String>, now: DateTime<Utc>, lifetime: Duration) -> Self {
        Self {
            id: TokenId::new(),
            user_id,
            name: name.into(),
            created_at: now,
            expires_at: now + lifetime,
            revoked: false,
            last_used_at: None,
        }
    }

    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && now < self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(now: DateTime<Utc>) -> AccessToken {
        AccessToken::issue(UserId::new(), "auth_token", now, Duration::days(30))
    }

    #[test]
    fn encode_then_verify() {
        let now = Utc::now();
        let codec = TokenCodec::new(b"test-secret");
        let t = token(now);

        let jwt = codec.encode(&TokenClaims::for_token(&t)).unwrap();
        let claims = codec.verify(&jwt, now).unwrap();

        assert_eq!(claims.sub, t.user_id);
        assert_eq!(claims.jti, t.id);
        assert_eq!(claims.exp - claims.iat, 30 * 24 * 3600);
    }

    #[test]
    fn wrong_secret_is_malformed() {
        let now = Utc::now();
        let jwt = TokenCodec::new(b"one")
            .encode(&TokenClaims::for_token(&token(now)))
            .unwrap();

        assert!(matches!(
            TokenCodec::new(b"two").decode(&jwt),
            Err(TokenError::Malformed(_))
        ));
        assert!(matches!(
            TokenCodec::new(b"one").decode("not.a.jwt"),
            Err(TokenError::Malformed(_))
        ));
    }

    #[test]
    fn expired_claims_are_rejected() {
        let now = Utc::now();
        let codec = TokenCodec::new(b"s");
        let jwt = codec.encode(&TokenClaims::for_token(&token(now))).unwrap();

        let later = now + Duration::days(31);
        assert_eq!(
            codec.verify(&jwt, later),
            Err(TokenError::Invalid(TokenValidationError::Expired))
        );
    }

    #[test]
    fn claim_time_window_checks() {
        let now = Utc::now();
        let mut claims = TokenClaims::for_token(&token(now));

        assert_eq!(
            validate_claims(&claims, now - Duration::hours(1)),
            Err(TokenValidationError::NotYetValid)
        );

        claims.exp = claims.iat;
        assert_eq!(validate_claims(&claims, now), Err(TokenValidationError::InvalidTimeWindow));
    }

    #[test]
    fn revoked_or_expired_tokens_are_not_usable() {
        let now = Utc::now();
        let mut t = token(now);
        assert!(t.is_usable(now));
        assert!(!t.is_usable(now + Duration::days(30)));

        t.revoked = true;
        assert!(!t.is_usable(now));
    }
}
