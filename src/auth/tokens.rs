//! Signed credentials: general access tokens and scoped stream tokens
//!
//! Both kinds are HS256 JWTs signed with the same secret. A stream token
//! carries `scope = "document:stream"`; an access token carries a role and no
//! scope, so neither can stand in for the other.

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::config::AuthConfig;
use crate::error::{AppError, TokenRejection};

/// Scope marker carried by stream tokens
pub const STREAM_SCOPE: &str = "document:stream";

/// Issues and checks the credentials that gate a document stream
///
/// Tokens are stateless; there is no revocation before expiry.
pub trait StreamTokenAuthority: Send + Sync {
    fn issue(&self, book_id: &str, user_id: &str) -> Result<IssuedStreamToken, AppError>;

    fn verify(&self, token: &str, book_id: &str) -> Result<StreamClaims, TokenRejection>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamClaims {
    /// Book id
    pub sub: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub user_id: String,
    pub exp: i64,
    #[serde(default)]
    pub iat: i64,
}

#[derive(Debug, Clone)]
pub struct IssuedStreamToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub ttl_seconds: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Moderator,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// User id
    pub sub: String,
    pub role: Role,
    pub exp: i64,
    #[serde(default)]
    pub iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// JWT signer/verifier for both token kinds
pub struct JwtTokens {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    stream_ttl: Duration,
    access_ttl: Duration,
}

impl JwtTokens {
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against an explicit clock in `check_expiry`
        validation.validate_exp = false;
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
            stream_ttl: Duration::seconds(config.stream_token_ttl_seconds),
            access_ttl: Duration::minutes(config.access_token_expire_minutes),
        }
    }

    pub fn stream_ttl_seconds(&self) -> i64 {
        self.stream_ttl.num_seconds()
    }

    /// Mint a stream token as of `now`
    pub fn issue_at(
        &self,
        book_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<IssuedStreamToken, AppError> {
        let expires_at = now + self.stream_ttl;
        let claims = StreamClaims {
            sub: book_id.to_string(),
            scope: STREAM_SCOPE.to_string(),
            user_id: user_id.to_string(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
        };

        let token = self.sign(&claims)?;

        Ok(IssuedStreamToken {
            token,
            // Whole seconds, as carried in the token
            expires_at: Utc
                .timestamp_opt(claims.exp, 0)
                .single()
                .unwrap_or(expires_at),
            ttl_seconds: self.stream_ttl.num_seconds(),
        })
    }

    /// Check a stream token for `book_id` as of `now`
    pub fn verify_at(
        &self,
        token: &str,
        book_id: &str,
        now: DateTime<Utc>,
    ) -> Result<StreamClaims, TokenRejection> {
        let claims: StreamClaims = self.decode(token)?;
        check_expiry(claims.exp, now)?;

        if claims.scope != STREAM_SCOPE {
            return Err(TokenRejection::ScopeMismatch);
        }
        if claims.sub != book_id {
            return Err(TokenRejection::SubjectMismatch);
        }

        Ok(claims)
    }

    pub fn issue_access_token(&self, user_id: &str, role: Role) -> Result<String, AppError> {
        self.issue_access_token_at(user_id, role, Utc::now())
    }

    pub fn issue_access_token_at(
        &self,
        user_id: &str,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<String, AppError> {
        self.sign(&AccessClaims {
            sub: user_id.to_string(),
            role,
            exp: (now + self.access_ttl).timestamp(),
            iat: now.timestamp(),
            scope: None,
        })
    }

    /// Check a general access token; stream tokens are refused
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenRejection> {
        self.verify_access_at(token, Utc::now())
    }

    pub fn verify_access_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<AccessClaims, TokenRejection> {
        let claims: AccessClaims = self.decode(token)?;
        check_expiry(claims.exp, now)?;

        if claims.scope.is_some() {
            return Err(TokenRejection::ScopeMismatch);
        }

        Ok(claims)
    }

    fn sign<T: Serialize>(&self, claims: &T) -> Result<String, AppError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("Failed to sign token: {}", e)))
    }

    fn decode<T: DeserializeOwned>(&self, token: &str) -> Result<T, TokenRejection> {
        decode::<T>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => TokenRejection::BadSignature,
                ErrorKind::ExpiredSignature => TokenRejection::Expired,
                _ => TokenRejection::Malformed,
            })
    }
}

impl StreamTokenAuthority for JwtTokens {
    fn issue(&self, book_id: &str, user_id: &str) -> Result<IssuedStreamToken, AppError> {
        self.issue_at(book_id, user_id, Utc::now())
    }

    fn verify(&self, token: &str, book_id: &str) -> Result<StreamClaims, TokenRejection> {
        self.verify_at(token, book_id, Utc::now())
    }
}

/// Zero leeway: valid through `exp`, expired one second after
fn check_expiry(exp: i64, now: DateTime<Utc>) -> Result<(), TokenRejection> {
    if now.timestamp() > exp {
        Err(TokenRejection::Expired)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens() -> JwtTokens {
        JwtTokens::new(&AuthConfig::new("test-secret"))
    }

    #[test]
    fn test_issue_and_verify() {
        let tokens = tokens();
        let now = Utc::now();

        let issued = tokens.issue_at("book-a", "user-1", now).unwrap();
        assert_eq!(issued.ttl_seconds, 300);
        assert_eq!(issued.expires_at.timestamp(), now.timestamp() + 300);

        let claims = tokens.verify_at(&issued.token, "book-a", now).unwrap();
        assert_eq!(claims.sub, "book-a");
        assert_eq!(claims.user_id, "user-1");
        assert_eq!(claims.scope, STREAM_SCOPE);
    }

    #[test]
    fn test_other_book_rejected() {
        let tokens = tokens();
        let now = Utc::now();
        let issued = tokens.issue_at("book-a", "user-1", now).unwrap();

        assert_eq!(
            tokens.verify_at(&issued.token, "book-b", now),
            Err(TokenRejection::SubjectMismatch)
        );
    }

    #[test]
    fn test_expiry_boundary() {
        let tokens = tokens();
        let now = Utc::now();
        let issued = tokens.issue_at("book-a", "user-1", now).unwrap();

        assert!(tokens
            .verify_at(&issued.token, "book-a", now + Duration::seconds(300))
            .is_ok());
        assert_eq!(
            tokens.verify_at(&issued.token, "book-a", now + Duration::seconds(301)),
            Err(TokenRejection::Expired)
        );
    }

    #[test]
    fn test_foreign_secret_rejected() {
        let now = Utc::now();
        let issued = JwtTokens::new(&AuthConfig::new("another-secret"))
            .issue_at("book-a", "user-1", now)
            .unwrap();

        assert_eq!(
            tokens().verify_at(&issued.token, "book-a", now),
            Err(TokenRejection::BadSignature)
        );
        assert_eq!(
            tokens().verify_at("not.a.token", "book-a", now),
            Err(TokenRejection::Malformed)
        );
    }

    #[test]
    fn test_token_kinds_do_not_mix() {
        let tokens = tokens();
        let now = Utc::now();

        let access = tokens.issue_access_token_at("user-1", Role::Admin, now).unwrap();
        assert_eq!(
            tokens.verify_at(&access, "user-1", now),
            Err(TokenRejection::ScopeMismatch)
        );

        let stream = tokens.issue_at("book-a", "user-1", now).unwrap();
        assert!(tokens.verify_access_at(&stream.token, now).is_err());

        let claims = tokens.verify_access_at(&access, now).unwrap();
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.sub, "user-1");
    }
}
