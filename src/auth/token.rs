//! Bearer token issue and verification (HS256).

use jwt_simple::prelude::*;
use jwt_simple::JWTError;
use std::sync::Arc;

use crate::config::JwtSettings;
use crate::error::TokenError;

/// Verified token contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    /// Username the token was issued to.
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// Signs and verifies stateless, time-limited tokens with a server-held
/// symmetric secret. There is no revocation list.
#[derive(Clone)]
pub struct TokenService {
    key: Arc<HS256Key>,
    lifetime_minutes: u64,
    leeway_secs: u64,
}

impl TokenService {
    pub fn new(secret: &[u8], lifetime_minutes: u64, leeway_secs: u64) -> Self {
        Self {
            key: Arc::new(HS256Key::from_bytes(secret)),
            lifetime_minutes,
            leeway_secs,
        }
    }

    pub fn from_settings(settings: &JwtSettings) -> Self {
        Self::new(
            settings.secret.as_bytes(),
            settings.expiry_minutes,
            settings.leeway_secs,
        )
    }

    pub fn lifetime_secs(&self) -> u64 {
        self.lifetime_minutes * 60
    }

    pub fn issue(&self, username: &str) -> Result<String, jwt_simple::Error> {
        let claims =
            Claims::create(Duration::from_mins(self.lifetime_minutes)).with_subject(username);
        self.key.authenticate(claims)
    }

    /// Signs a token with an explicit expiry instant.
    #[cfg(test)]
    pub(crate) fn issue_expiring_at(
        &self,
        username: &str,
        expires_at: UnixTimeStamp,
    ) -> Result<String, jwt_simple::Error> {
        let mut claims = Claims::create(Duration::from_mins(self.lifetime_minutes))
            .with_subject(username);
        claims.issued_at = Some(expires_at.min(Clock::now_since_epoch()));
        claims.expires_at = Some(expires_at);
        self.key.authenticate(claims)
    }

    pub fn verify(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let options = VerificationOptions {
            time_tolerance: Some(Duration::from_secs(self.leeway_secs)),
            ..VerificationOptions::default()
        };

        let claims = self
            .key
            .verify_token::<NoCustomClaims>(token, Some(options))
            .map_err(|e| classify(&e))?;

        let sub = claims
            .subject
            .filter(|s| !s.is_empty())
            .ok_or(TokenError::Malformed)?;
        let exp = claims.expires_at.ok_or(TokenError::Malformed)?;

        Ok(TokenClaims {
            sub,
            iat: claims.issued_at.map(|t| t.as_secs() as i64).unwrap_or(0),
            exp: exp.as_secs() as i64,
        })
    }
}

fn classify(err: &jwt_simple::Error) -> TokenError {
    match err.downcast_ref::<JWTError>() {
        Some(JWTError::TokenHasExpired) => TokenError::Expired,
        Some(JWTError::InvalidAuthenticationTag) | Some(JWTError::InvalidSignature) => {
            TokenError::BadSignature
        }
        _ => TokenError::Malformed,
    }
}
