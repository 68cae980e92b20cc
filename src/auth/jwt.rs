//! JWT token handling
//!
//! Access and invite tokens are signed with the access secret, refresh tokens
//! with the refresh secret, so a leaked access secret cannot mint sessions
//! that outlive the access TTL.

use std::time::Duration;

use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};

use super::error::TokenError;
use super::models::{Claims, Role, TokenPurpose};

/// Invite tokens are always short lived
pub const INVITE_TTL: Duration = Duration::from_secs(5 * 60);

/// JWT configuration
#[derive(Clone)]
pub struct JwtConfig {
    access_secret: String,
    refresh_secret: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl JwtConfig {
    pub fn new(
        access_secret: String,
        refresh_secret: String,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            access_secret,
            refresh_secret,
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }
}

/// Issues and verifies access, refresh and invite tokens
#[derive(Clone)]
pub struct TokenCodec {
    config: JwtConfig,
}

impl TokenCodec {
    pub fn new(config: JwtConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &JwtConfig {
        &self.config
    }

    pub fn issue_access(&self, user_id: &str, role: Role) -> Result<String, TokenError> {
        let claims = session_claims(user_id, role, TokenPurpose::Access, self.config.access_ttl);
        self.sign(&claims, &self.config.access_secret)
    }

    pub fn issue_refresh(&self, user_id: &str, role: Role) -> Result<String, TokenError> {
        let claims = session_claims(user_id, role, TokenPurpose::Refresh, self.config.refresh_ttl);
        self.sign(&claims, &self.config.refresh_secret)
    }

    pub fn issue_invite(&self, email: &str) -> Result<String, TokenError> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: None,
            role: None,
            email: Some(email.to_string()),
            exp: now + INVITE_TTL.as_secs() as i64,
            iat: now,
            jti: uuid::Uuid::new_v4().to_string(),
            purpose: TokenPurpose::Invite,
        };
        self.sign(&claims, &self.config.access_secret)
    }

    /// Returns `(user_id, role)` of a valid access token
    pub fn verify_access(&self, token: &str) -> Result<(String, Role), TokenError> {
        let claims = self.verify(token, &self.config.access_secret, TokenPurpose::Access)?;
        session_identity(claims)
    }

    /// Returns `(user_id, role)` of a valid refresh token
    pub fn verify_refresh(&self, token: &str) -> Result<(String, Role), TokenError> {
        let claims = self.verify(token, &self.config.refresh_secret, TokenPurpose::Refresh)?;
        session_identity(claims)
    }

    /// Returns the email an invite token was issued for
    pub fn verify_invite(&self, token: &str) -> Result<String, TokenError> {
        let claims = self.verify(token, &self.config.access_secret, TokenPurpose::Invite)?;
        claims.email.ok_or(TokenError::Invalid)
    }

    fn sign(&self, claims: &Claims, secret: &str) -> Result<String, TokenError> {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .map_err(TokenError::Signing)
    }

    /// Signature first, then purpose, then expiry.
    fn verify(&self, token: &str, secret: &str, expected: TokenPurpose) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;

        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Invalid,
        })?;

        if claims.purpose != expected {
            return Err(TokenError::WrongPurpose);
        }
        if claims.exp <= chrono::Utc::now().timestamp() {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }
}

fn session_claims(user_id: &str, role: Role, purpose: TokenPurpose, ttl: Duration) -> Claims {
    let now = chrono::Utc::now().timestamp();
    Claims {
        sub: Some(user_id.to_string()),
        role: Some(role),
        email: None,
        exp: now + ttl.as_secs() as i64,
        iat: now,
        jti: uuid::Uuid::new_v4().to_string(),
        purpose,
    }
}

fn session_identity(claims: Claims) -> Result<(String, Role), TokenError> {
    match (claims.sub, claims.role) {
        (Some(sub), Some(role)) if !sub.is_empty() => Ok((sub, role)),
        _ => Err(TokenError::Invalid),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn create_test_codec() -> TokenCodec {
        TokenCodec::new(JwtConfig::new(
            "access-secret".to_string(),
            "refresh-secret".to_string(),
            Duration::from_secs(15 * 60),
            Duration::from_secs(30 * 24 * 3600),
        ))
    }

    fn expired_claims(purpose: TokenPurpose) -> Claims {
        let now = chrono::Utc::now().timestamp();
        Claims {
            sub: Some("user_123".to_string()),
            role: Some(Role::User),
            email: Some("a@b.com".to_string()),
            exp: now - 60,
            iat: now - 120,
            jti: "jti".to_string(),
            purpose,
        }
    }

    #[test]
    fn test_access_round_trip() {
        let codec = create_test_codec();
        for role in [Role::User, Role::Editor, Role::SuperAdmin] {
            let token = codec.issue_access("user_123", role).unwrap();
            assert_eq!(codec.verify_access(&token).unwrap(), ("user_123".to_string(), role));
        }
    }

    #[test]
    fn test_refresh_and_invite_round_trip() {
        let codec = create_test_codec();

        let refresh = codec.issue_refresh("user_9", Role::Editor).unwrap();
        assert_eq!(
            codec.verify_refresh(&refresh).unwrap(),
            ("user_9".to_string(), Role::Editor)
        );

        let invite = codec.issue_invite("a@b.com").unwrap();
        assert_eq!(codec.verify_invite(&invite).unwrap(), "a@b.com");
    }

    #[test]
    fn test_cross_purpose_is_rejected() {
        let codec = create_test_codec();
        let access = codec.issue_access("u", Role::User).unwrap();
        let refresh = codec.issue_refresh("u", Role::User).unwrap();
        let invite = codec.issue_invite("a@b.com").unwrap();

        // same secret, different purpose
        assert_matches!(codec.verify_invite(&access), Err(TokenError::WrongPurpose));
        assert_matches!(codec.verify_access(&invite), Err(TokenError::WrongPurpose));
        // different secret
        assert!(codec.verify_access(&refresh).is_err());
        assert!(codec.verify_refresh(&access).is_err());
        assert!(codec.verify_refresh(&invite).is_err());
        assert!(codec.verify_invite(&refresh).is_err());
    }

    #[test]
    fn test_expired_tokens() {
        let codec = create_test_codec();

        let access = codec
            .sign(&expired_claims(TokenPurpose::Access), "access-secret")
            .unwrap();
        assert_matches!(codec.verify_access(&access), Err(TokenError::Expired));

        let refresh = codec
            .sign(&expired_claims(TokenPurpose::Refresh), "refresh-secret")
            .unwrap();
        assert_matches!(codec.verify_refresh(&refresh), Err(TokenError::Expired));

        let invite = codec
            .sign(&expired_claims(TokenPurpose::Invite), "access-secret")
            .unwrap();
        assert_matches!(codec.verify_invite(&invite), Err(TokenError::Expired));
    }

    #[test]
    fn test_purpose_checked_before_expiry() {
        let codec = create_test_codec();
        let expired_invite = codec
            .sign(&expired_claims(TokenPurpose::Invite), "access-secret")
            .unwrap();
        assert_matches!(codec.verify_access(&expired_invite), Err(TokenError::WrongPurpose));
    }

    #[test]
    fn test_invalid_token() {
        let codec = create_test_codec();
        assert_matches!(codec.verify_access("invalid.token.here"), Err(TokenError::Invalid));

        let foreign = TokenCodec::new(JwtConfig::new(
            "other".to_string(),
            "other".to_string(),
            Duration::from_secs(60),
            Duration::from_secs(60),
        ))
        .issue_access("u", Role::User)
        .unwrap();
        assert_matches!(codec.verify_access(&foreign), Err(TokenError::Invalid));
    }

    #[test]
    fn test_tokens_are_unique_per_issue() {
        let codec = create_test_codec();
        let a = codec.issue_access("u", Role::User).unwrap();
        let b = codec.issue_access("u", Role::User).unwrap();
        assert_ne!(a, b);
    }
}
