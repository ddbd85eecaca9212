//! Error handling for the recipe-share client

use serde::Deserialize;
use std::fmt;
use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the recipe-share client
#[derive(Error, Debug)]
pub enum Error {
    /// Network or HTTP related errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization or deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing errors
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// JWT errors
    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    /// Authentication errors reported by the auth provider
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// A form failed local validation; no request was sent
    #[error("Validation error: {0}")]
    Validation(String),

    /// The backend answered with a non-success status
    #[error("API error: {details} (Status: {status})")]
    Api {
        status: u16,
        details: ApiErrorDetails,
    },

    /// Database read/write errors
    #[error("Database error: {0}")]
    Database(String),

    /// The requested document does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Realtime subscription errors
    #[error("Realtime error: {0}")]
    Realtime(String),

    /// Missing or invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// General errors
    #[error("{0}")]
    General(String),
}

impl Error {
    /// Create a new validation error
    pub fn validation<T: fmt::Display>(msg: T) -> Self {
        Error::Validation(msg.to_string())
    }

    /// Create a new database error
    pub fn database<T: fmt::Display>(msg: T) -> Self {
        Error::Database(msg.to_string())
    }

    /// Create a new realtime error
    pub fn realtime<T: fmt::Display>(msg: T) -> Self {
        Error::Realtime(msg.to_string())
    }

    /// Create a new configuration error
    pub fn config<T: fmt::Display>(msg: T) -> Self {
        Error::Config(msg.to_string())
    }

    /// Create a new general error
    pub fn general<T: fmt::Display>(msg: T) -> Self {
        Error::General(msg.to_string())
    }

    /// Whether the error was raised locally before any request went out
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    /// The message a screen shows for this error.
    ///
    /// Validation and auth errors are shown as-is; everything coming from the
    /// backend collapses into a generic failure.
    pub fn user_message(&self) -> String {
        match self {
            Error::Validation(msg) => msg.clone(),
            Error::Auth(err) => err.message.clone(),
            Error::NotFound(_) => "The requested item no longer exists.".to_string(),
            _ => "Something went wrong. Please try again later.".to_string(),
        }
    }
}

/// Error body returned by the REST API
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiErrorDetails {
    pub code: Option<String>,
    pub message: Option<String>,
    pub details: Option<String>,
    pub hint: Option<String>,
}

impl fmt::Display for ApiErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(code) = &self.code {
            parts.push(format!("Code: {}", code));
        }
        if let Some(message) = &self.message {
            parts.push(format!("Message: {}", message));
        }
        if let Some(details) = &self.details {
            parts.push(format!("Details: {}", details));
        }
        if let Some(hint) = &self.hint {
            parts.push(format!("Hint: {}", hint));
        }
        write!(f, "{}", parts.join(", "))
    }
}

/// Classified auth provider failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} ({code})")]
pub struct AuthError {
    pub code: AuthErrorCode,
    pub message: String,
}

impl AuthError {
    pub fn new<T: fmt::Display>(code: AuthErrorCode, message: T) -> Self {
        Self {
            code,
            message: message.to_string(),
        }
    }

    /// An operation needed a signed-in user
    pub fn missing_session() -> Self {
        Self::new(AuthErrorCode::MissingSession, "Not logged in")
    }

    /// Whether the error means the email/password pair was rejected
    pub fn is_invalid_credentials(&self) -> bool {
        matches!(
            self.code,
            AuthErrorCode::UserNotFound
                | AuthErrorCode::WrongPassword
                | AuthErrorCode::InvalidCredential
                | AuthErrorCode::InvalidEmail
        )
    }
}

/// Failure codes the auth provider can report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorCode {
    UserNotFound,
    WrongPassword,
    InvalidCredential,
    InvalidEmail,
    EmailAlreadyInUse,
    WeakPassword,
    MissingSession,
    Other,
}

impl AuthErrorCode {
    /// Map a provider error code (`error_code` or `error` field) to a known code
    pub fn from_provider(code: &str) -> Self {
        match code {
            "user_not_found" => AuthErrorCode::UserNotFound,
            "wrong_password" => AuthErrorCode::WrongPassword,
            "invalid_credentials" | "invalid_grant" => AuthErrorCode::InvalidCredential,
            "email_address_invalid" | "validation_failed" => AuthErrorCode::InvalidEmail,
            "user_already_exists" | "email_exists" => AuthErrorCode::EmailAlreadyInUse,
            "weak_password" => AuthErrorCode::WeakPassword,
            "session_not_found" | "no_authorization" => AuthErrorCode::MissingSession,
            _ => AuthErrorCode::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthErrorCode::UserNotFound => "user_not_found",
            AuthErrorCode::WrongPassword => "wrong_password",
            AuthErrorCode::InvalidCredential => "invalid_credentials",
            AuthErrorCode::InvalidEmail => "invalid_email",
            AuthErrorCode::EmailAlreadyInUse => "email_already_in_use",
            AuthErrorCode::WeakPassword => "weak_password",
            AuthErrorCode::MissingSession => "missing_session",
            AuthErrorCode::Other => "other",
        }
    }
}

impl fmt::Display for AuthErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
