//! Wire types for the auth provider

use serde::{Deserialize, Serialize};

use crate::error::{AuthError, AuthErrorCode};

/// Response to sign-up and password sign-in
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    /// The access token; absent when sign-up still awaits email confirmation
    pub access_token: Option<String>,

    /// The refresh token
    pub refresh_token: Option<String>,

    /// The token type
    pub token_type: Option<String>,

    /// The expiry time in seconds
    pub expires_in: Option<i64>,

    /// The expiry timestamp
    pub expires_at: Option<i64>,

    /// The user data when a session was issued
    pub user: Option<User>,

    /// The user ID when sign-up returns the bare user object
    pub id: Option<String>,

    /// The email when sign-up returns the bare user object
    pub email: Option<String>,
}

/// User data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// The user ID
    pub id: String,

    /// The user's email address
    pub email: Option<String>,

    /// The user's phone number
    pub phone: Option<String>,

    /// The user's role
    pub role: Option<String>,
}

/// Email/password pair sent to the provider
#[derive(Debug, Clone, Serialize)]
pub(crate) struct PasswordCredentials<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Error body returned by the provider.
///
/// Newer deployments send `error_code`/`msg`; older ones `error`/`error_description`.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ProviderError {
    pub error_code: Option<String>,
    pub error: Option<String>,
    pub msg: Option<String>,
    pub message: Option<String>,
    pub error_description: Option<String>,
}

impl ProviderError {
    pub(crate) fn into_auth_error(self, fallback: &str) -> AuthError {
        let code = self
            .error_code
            .as_deref()
            .or(self.error.as_deref())
            .map(AuthErrorCode::from_provider)
            .unwrap_or(AuthErrorCode::Other);

        let message = self
            .msg
            .or(self.message)
            .or(self.error_description)
            .unwrap_or_else(|| fallback.to_string());

        AuthError::new(code, message)
    }
}
