use axum::extract::FromRef;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use time::OffsetDateTime;
use tracing::debug;

use super::{claims::Claims, repo_types::User};
use crate::{config::JwtConfig, state::AppState};

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("token malformed or signature mismatch")]
    Malformed,
    #[error("token signing failed: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

/// HS256 signing and verification keys, built once from [`JwtConfig`].
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        state.keys.clone()
    }
}

impl JwtKeys {
    pub fn new(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
        }
    }

    /// Mint a session token for `user`, valid for seven days from now.
    pub fn issue_for(&self, user: &User) -> Result<String, TokenError> {
        self.issue_for_at(user, OffsetDateTime::now_utc())
    }

    pub fn issue_for_at(&self, user: &User, now: OffsetDateTime) -> Result<String, TokenError> {
        let claims = Claims::for_user(user, now, &self.issuer, &self.audience);
        self.issue(&claims)
    }

    /// Sign prepared claims.
    pub fn issue(&self, claims: &Claims) -> Result<String, TokenError> {
        let token = encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(TokenError::Signing)?;
        debug!(user_id = %claims.sub, role = %claims.role, "session token signed");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_at(token, OffsetDateTime::now_utc())
    }

    /// Parse, check the signature, issuer and audience, then reject if `now >= exp`.
    pub fn verify_at(&self, token: &str, now: OffsetDateTime) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        // Expiry is checked below against `now`, with no leeway.
        validation.validate_exp = false;
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            debug!(error = %e, "session token rejected");
            match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Malformed,
            }
        })?;

        let claims = data.claims;
        if claims.exp - claims.iat != super::claims::SESSION_TTL.whole_seconds() {
            return Err(TokenError::Malformed);
        }
        if claims.is_expired_at(now) {
            return Err(TokenError::Expired);
        }
        debug!(user_id = %claims.sub, "session token verified");
        Ok(claims)
    }
}
