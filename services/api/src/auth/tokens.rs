//! services/api/src/auth/tokens.rs
//!
//! JWT issuance, verification and revocation.
//!
//! Tokens are HS256-signed and carry `sub`, `type`, `iat`, `exp` and a random `jti`.
//! A token is valid only while it is absent from the blacklist, correctly signed,
//! unexpired and of the type the caller expects.

use chrono::{DateTime, Duration, TimeZone, Utc};
use flashcard_lms_core::domain::{Role, User};
use jsonwebtoken::{errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::blacklist::TokenBlacklist;
use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Why a presented token was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("Token has been revoked")]
    Revoked,
    #[error("Token has expired")]
    Expired,
    #[error("Invalid token type")]
    WrongType,
    #[error("Could not validate credentials")]
    Malformed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub iat: i64,
    pub exp: i64,
    pub jti: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

impl Claims {
    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0).single().unwrap_or_else(Utc::now)
    }
}

/// An access token and a refresh token issued together.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    access_ttl: Duration,
    refresh_ttl: Duration,
    blacklist: Arc<TokenBlacklist>,
}

impl TokenService {
    pub fn new(secret: &[u8], access_ttl: Duration, refresh_ttl: Duration, blacklist: Arc<TokenBlacklist>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            access_ttl,
            refresh_ttl,
            blacklist,
        }
    }

    pub fn from_config(config: &Config, blacklist: Arc<TokenBlacklist>) -> Self {
        Self::new(
            config.jwt_secret.as_bytes(),
            Duration::minutes(config.access_token_expire_minutes),
            Duration::days(config.refresh_token_expire_days),
            blacklist,
        )
    }

    pub fn blacklist(&self) -> &Arc<TokenBlacklist> {
        &self.blacklist
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    /// Issues a fresh access/refresh pair for the user.
    pub fn issue_pair(&self, user: &User) -> Result<TokenPair, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let access = Claims {
            sub: user.id,
            token_type: TokenType::Access,
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
            jti: Uuid::new_v4(),
            email: Some(user.email.clone()),
            username: Some(user.username.clone()),
            role: Some(user.role),
        };
        let refresh = Claims {
            sub: user.id,
            token_type: TokenType::Refresh,
            iat: now.timestamp(),
            exp: (now + self.refresh_ttl).timestamp(),
            jti: Uuid::new_v4(),
            email: None,
            username: None,
            role: None,
        };

        Ok(TokenPair {
            access_token: self.encode(&access)?,
            refresh_token: self.encode(&refresh)?,
            expires_in: self.access_ttl.num_seconds(),
        })
    }

    pub fn encode(&self, claims: &Claims) -> Result<String, jsonwebtoken::errors::Error> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
    }

    /// Verifies a token for the expected use.
    pub fn verify(&self, token: &str, expected: TokenType) -> Result<Claims, TokenError> {
        if self.blacklist.is_revoked(token) {
            debug!("rejected revoked {:?} token", expected);
            return Err(TokenError::Revoked);
        }

        let claims = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Malformed,
            })?;

        if claims.token_type != expected {
            return Err(TokenError::WrongType);
        }
        Ok(claims)
    }

    /// Adds the raw token string to the blacklist until its own expiry.
    ///
    /// Tokens that cannot be decoded are kept for the refresh lifetime, the longest
    /// any token issued here can live. Returns `false` if it was already revoked.
    pub fn revoke(&self, token: &str) -> bool {
        let expires_at = self
            .peek_expiry(token)
            .unwrap_or_else(|| Utc::now() + self.refresh_ttl);
        self.blacklist.revoke(token, expires_at)
    }

    /// Revokes an already-verified token. Exactly one caller wins for a given token.
    pub fn revoke_verified(&self, token: &str, claims: &Claims) -> bool {
        self.blacklist.revoke(token, claims.expires_at())
    }

    fn peek_expiry(&self, token: &str) -> Option<DateTime<Utc>> {
        let mut validation = self.validation.clone();
        validation.validate_exp = false;
        match jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation) {
            Ok(data) => Some(data.claims.expires_at()),
            Err(e) => {
                warn!("revoking a token that could not be decoded: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(access_ttl: Duration) -> TokenService {
        TokenService::new(
            b"0123456789abcdef0123456789abcdef",
            access_ttl,
            Duration::days(7),
            Arc::new(TokenBlacklist::new()),
        )
    }

    fn user() -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            email: "ada@example.com".to_string(),
            username: "ada".to_string(),
            full_name: "Ada Lovelace".to_string(),
            role: Role::Teacher,
            is_active: true,
            email_verified: true,
            force_password_change: false,
            created_at: now,
            updated_at: now,
            last_login_at: None,
        }
    }

    #[test]
    fn issued_pair_verifies_for_its_own_type_only() {
        let tokens = service(Duration::minutes(30));
        let user = user();
        let pair = tokens.issue_pair(&user).unwrap();

        let claims = tokens.verify(&pair.access_token, TokenType::Access).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.role, Some(Role::Teacher));
        assert_eq!(pair.expires_in, 30 * 60);

        assert_eq!(tokens.verify(&pair.refresh_token, TokenType::Refresh).unwrap().sub, user.id);
        assert_eq!(tokens.verify(&pair.access_token, TokenType::Refresh).unwrap_err(), TokenError::WrongType);
        assert_eq!(tokens.verify(&pair.refresh_token, TokenType::Access).unwrap_err(), TokenError::WrongType);
    }

    #[test]
    fn tokens_minted_back_to_back_differ() {
        let tokens = service(Duration::minutes(30));
        let user = user();
        let first = tokens.issue_pair(&user).unwrap();
        let second = tokens.issue_pair(&user).unwrap();
        assert_ne!(first.refresh_token, second.refresh_token);
    }

    #[test]
    fn revoked_tokens_fail_before_expiry() {
        let tokens = service(Duration::minutes(30));
        let pair = tokens.issue_pair(&user()).unwrap();

        assert!(tokens.revoke(&pair.access_token));
        assert!(!tokens.revoke(&pair.access_token));
        assert_eq!(tokens.verify(&pair.access_token, TokenType::Access).unwrap_err(), TokenError::Revoked);
        assert!(tokens.verify(&pair.refresh_token, TokenType::Refresh).is_ok());
        assert!(tokens.blacklist().len() == 1);
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let tokens = service(Duration::minutes(30));
        let now = Utc::now();
        let stale = Claims {
            sub: Uuid::new_v4(),
            token_type: TokenType::Access,
            iat: (now - Duration::hours(2)).timestamp(),
            exp: (now - Duration::hours(1)).timestamp(),
            jti: Uuid::new_v4(),
            email: None,
            username: None,
            role: None,
        };
        let token = tokens.encode(&stale).unwrap();
        assert_eq!(tokens.verify(&token, TokenType::Access).unwrap_err(), TokenError::Expired);
    }

    #[test]
    fn revoked_token_stays_rejected_after_a_purge_in_its_last_second() {
        let tokens = service(Duration::minutes(30));
        let now = Utc::now();
        let last_second = Claims {
            sub: Uuid::new_v4(),
            token_type: TokenType::Access,
            iat: (now - Duration::minutes(30)).timestamp(),
            exp: now.timestamp(),
            jti: Uuid::new_v4(),
            email: None,
            username: None,
            role: None,
        };
        let token = tokens.encode(&last_second).unwrap();

        assert!(tokens.revoke(&token));
        tokens.blacklist().purge_expired(Utc::now());
        assert!(tokens.verify(&token, TokenType::Access).is_err());
    }

    #[test]
    fn foreign_signatures_and_garbage_are_malformed() {
        let tokens = service(Duration::minutes(30));
        let other = TokenService::new(
            b"ffffffffffffffffffffffffffffffff",
            Duration::minutes(30),
            Duration::days(7),
            Arc::new(TokenBlacklist::new()),
        );
        let forged = other.issue_pair(&user()).unwrap();

        assert_eq!(tokens.verify(&forged.access_token, TokenType::Access).unwrap_err(), TokenError::Malformed);
        assert_eq!(tokens.verify("not.a.jwt", TokenType::Access).unwrap_err(), TokenError::Malformed);
    }

    #[test]
    fn undecodable_tokens_can_still_be_revoked() {
        let tokens = service(Duration::minutes(30));
        tokens.revoke("garbage");
        assert!(tokens.blacklist().is_revoked("garbage"));
    }
}
