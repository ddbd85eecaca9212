//! Sign-up, sign-in and profile handling

use log::{error, info, warn};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::auth::{AuthProvider, Session};
use crate::config::ClientOptions;
use crate::context::UserContext;
use crate::error::{Error, Result};
use crate::models::UserProfile;
use crate::store::{DocumentStore, Fields};

/// Fields of the sign-up form
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignupForm {
    pub name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub phone: String,
    pub address: String,
    pub country: String,
}

impl SignupForm {
    /// Check the form before anything is sent.
    ///
    /// Passwords are compared first, then required fields, then the phone
    /// format when a phone was given.
    pub fn validate(&self) -> Result<()> {
        if self.password != self.confirm_password {
            return Err(Error::validation("Passwords do not match."));
        }
        let required = [
            &self.name,
            &self.email,
            &self.password,
            &self.address,
            &self.country,
        ];
        if required.iter().any(|field| field.trim().is_empty()) {
            return Err(Error::validation("All fields are required."));
        }
        let phone = self.phone.trim();
        if !phone.is_empty() && !is_valid_phone(phone) {
            return Err(Error::validation(
                "Phone number must start with + and a country code.",
            ));
        }
        Ok(())
    }

    fn profile(&self, uid: &str) -> UserProfile {
        let phone = self.phone.trim();
        UserProfile {
            uid: uid.to_string(),
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            phone: (!phone.is_empty()).then(|| phone.to_string()),
            address: self.address.trim().to_string(),
            country: self.country.trim().to_string(),
            favorites: Vec::new(),
        }
    }
}

/// `+`, a country code, then digits, spaces or dashes
fn is_valid_phone(phone: &str) -> bool {
    let rest = match phone.strip_prefix('+') {
        Some(rest) => rest,
        None => return false,
    };
    let digits = rest.chars().filter(char::is_ascii_digit).count();
    rest.starts_with(|c: char| c.is_ascii_digit() && c != '0')
        && rest
            .chars()
            .all(|c| c.is_ascii_digit() || c == ' ' || c == '-')
        && (7..=15).contains(&digits)
}

/// Why a sign-in was refused, as shown to the user
#[derive(Debug)]
pub enum LoginFailure {
    /// Unknown user, wrong password or malformed email
    InvalidCredentials,
    /// Anything else, including network failures
    Other(Error),
}

impl LoginFailure {
    pub fn title(&self) -> &'static str {
        match self {
            LoginFailure::InvalidCredentials => "Invalid username or password",
            LoginFailure::Other(_) => "Login Failed",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            LoginFailure::InvalidCredentials => "Please check your credentials and try again.",
            LoginFailure::Other(_) => "Something went wrong. Please try again later.",
        }
    }
}

impl fmt::Display for LoginFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title(), self.message())
    }
}

impl std::error::Error for LoginFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoginFailure::InvalidCredentials => None,
            LoginFailure::Other(e) => Some(e),
        }
    }
}

impl From<Error> for LoginFailure {
    fn from(error: Error) -> Self {
        match &error {
            Error::Auth(auth) if auth.is_invalid_credentials() => LoginFailure::InvalidCredentials,
            _ => LoginFailure::Other(error),
        }
    }
}

/// Account flows over an auth provider and the users collection
#[derive(Clone)]
pub struct Accounts {
    auth: Arc<dyn AuthProvider>,
    store: Arc<dyn DocumentStore>,
    options: ClientOptions,
}

impl fmt::Debug for Accounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accounts").field("options", &self.options).finish()
    }
}

impl Accounts {
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        store: Arc<dyn DocumentStore>,
        options: ClientOptions,
    ) -> Self {
        Self {
            auth,
            store,
            options,
        }
    }

    /// Context for a session obtained from this account service
    pub fn context(&self, session: Session) -> UserContext {
        UserContext::new(session, self.store.as_ref(), &self.options)
    }

    /// Create the identity and its profile document
    pub async fn sign_up(&self, form: &SignupForm) -> Result<Session> {
        form.validate()?;

        let session = self
            .auth
            .sign_up(form.email.trim(), &form.password)
            .await
            .map_err(|e| {
                warn!("Signup failed: {}", e);
                e
            })?;

        let profile = form.profile(session.user_id());
        let data = match serde_json::to_value(&profile)? {
            Value::Object(data) => data,
            _ => Fields::new(),
        };
        // Merge, so a favorites list created earlier survives
        self.store
            .authorized(&session)
            .upsert(&self.options.users_collection, session.user_id(), data)
            .await
            .map_err(|e| {
                error!("Failed to store profile for {}: {}", session.user_id(), e);
                e
            })?;

        info!("Account created for {}", session.user_id());
        Ok(session)
    }

    /// Sign in, classifying failures for display
    pub async fn sign_in(&self, email: &str, password: &str) -> std::result::Result<Session, LoginFailure> {
        match self.auth.sign_in(email.trim(), password).await {
            Ok(session) => Ok(session),
            Err(e) => {
                warn!("Login failed: {}", e);
                Err(LoginFailure::from(e))
            }
        }
    }

    pub async fn sign_out(&self, session: &Session) -> Result<()> {
        self.auth.sign_out(session).await.map_err(|e| {
            error!("Logout failed: {}", e);
            e
        })
    }

    /// Send a password reset email; a blank email is rejected locally
    pub async fn reset_password(&self, email: &str) -> Result<()> {
        let email = email.trim();
        if email.is_empty() {
            return Err(Error::validation(
                "Please enter your email to reset password.",
            ));
        }
        self.auth.reset_password_for_email(email).await.map_err(|e| {
            error!("Password reset failed: {}", e);
            e
        })?;
        info!("Password reset email requested");
        Ok(())
    }

    /// The signed-in user's profile, `None` if none was stored
    pub async fn profile(&self, ctx: &UserContext) -> Result<Option<UserProfile>> {
        let doc = ctx
            .store()
            .get(&ctx.collections().users, ctx.user_id())
            .await?;
        let mut profile = match doc {
            Some(doc) => doc.decode::<UserProfile>()?,
            None => return Ok(None),
        };
        if profile.uid.is_empty() {
            profile.uid = ctx.user_id().to_string();
        }
        Ok(Some(profile))
    }
}
