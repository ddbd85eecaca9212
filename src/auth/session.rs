//! Session management for authentication

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::Result;

/// The identity a session belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    /// The user ID
    pub id: String,

    /// The user's email address
    pub email: Option<String>,
}

/// An authenticated session.
///
/// Sessions are plain values: every component that scopes a read or write
/// takes one explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// The access token
    pub access_token: String,

    /// The refresh token
    pub refresh_token: String,

    /// The token type
    pub token_type: String,

    /// The expiry timestamp (seconds since the epoch)
    pub expires_at: Option<i64>,

    /// The signed-in user
    pub user: SessionUser,
}

/// Claims read from an access token
#[derive(Debug, Clone, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    pub email: Option<String>,
    pub exp: Option<i64>,
}

impl Session {
    /// Create a new session that expires `expires_in` seconds from now
    pub fn new(
        access_token: String,
        refresh_token: String,
        user: SessionUser,
        expires_in: Option<i64>,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type: "bearer".to_string(),
            expires_at: expires_in.map(|secs| now() + secs),
            user,
        }
    }

    /// Build a session from an access token, reading the user from its claims.
    ///
    /// The signature is not verified; the token came straight from the auth
    /// provider and the backend checks it on every request anyway.
    pub fn from_access_token(access_token: &str, refresh_token: &str) -> Result<Self> {
        let claims = read_claims(access_token)?;
        Ok(Self {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.to_string(),
            token_type: "bearer".to_string(),
            expires_at: claims.exp,
            user: SessionUser {
                id: claims.sub,
                email: claims.email,
            },
        })
    }

    /// The signed-in user's ID
    pub fn user_id(&self) -> &str {
        &self.user.id
    }

    /// Check if the session has expired
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => now() >= expires_at,
            None => false,
        }
    }
}

/// Decode the claims of an access token without verifying its signature
pub fn read_claims(access_token: &str) -> Result<AccessClaims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<AccessClaims>(access_token, &DecodingKey::from_secret(&[]), &validation)?;
    Ok(data.claims)
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    fn token(claims: serde_json::Value) -> String {
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"not-the-real-secret"),
        )
        .unwrap()
    }

    #[test]
    fn test_session_from_access_token() {
        let access = token(json!({
            "sub": "user-1",
            "email": "cook@example.com",
            "exp": 4_102_444_800i64,
            "aud": "authenticated"
        }));

        let session = Session::from_access_token(&access, "refresh").unwrap();
        assert_eq!(session.user_id(), "user-1");
        assert_eq!(session.user.email.as_deref(), Some("cook@example.com"));
        assert_eq!(session.expires_at, Some(4_102_444_800));
        assert!(!session.is_expired());
    }

    #[test]
    fn test_garbage_token_is_rejected() {
        assert!(Session::from_access_token("not-a-jwt", "").is_err());
    }

    #[test]
    fn test_expiry() {
        let user = SessionUser {
            id: "u".to_string(),
            email: None,
        };
        let fresh = Session::new("a".into(), "r".into(), user.clone(), Some(3600));
        assert!(!fresh.is_expired());

        let stale = Session::new("a".into(), "r".into(), user.clone(), Some(-1));
        assert!(stale.is_expired());

        let forever = Session::new("a".into(), "r".into(), user, None);
        assert!(!forever.is_expired());
    }
}
