//! Authentication against the hosted auth provider

mod memory;
mod session;
mod types;

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::{Client, Response};
use serde_json::json;
use std::time::Duration;

use crate::config::Config;
use crate::error::{AuthError, AuthErrorCode, Error, Result};
use crate::fetch::Fetch;

pub use memory::MemoryAuth;
pub use session::*;
pub use types::{AuthResponse, User};

use types::{PasswordCredentials, ProviderError};

/// Operations the app needs from an authentication provider
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Create a new identity and sign it in
    async fn sign_up(&self, email: &str, password: &str) -> Result<Session>;

    /// Sign in with email and password
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session>;

    /// Invalidate a session
    async fn sign_out(&self, session: &Session) -> Result<()>;

    /// Send a password reset email
    async fn reset_password_for_email(&self, email: &str) -> Result<()>;
}

/// Client for the hosted auth API
#[derive(Debug, Clone)]
pub struct Auth {
    /// The base URL for the project
    url: String,

    /// The anonymous API key for the project
    key: String,

    /// HTTP client used for requests
    client: Client,

    /// Per-request timeout
    timeout: Option<Duration>,
}

impl Auth {
    /// Create a new Auth client
    pub fn new(config: &Config, client: Client, timeout: Option<Duration>) -> Self {
        Self {
            url: config.base_url(),
            key: config.anon_key.clone(),
            client,
            timeout,
        }
    }

    fn get_auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1{}", self.url, path)
    }

    async fn password_request(&self, path: &str, email: &str, password: &str) -> Result<AuthResponse> {
        let url = self.get_auth_url(path);
        let response = Fetch::post(&self.client, &url)
            .header("apikey", &self.key)
            .timeout(self.timeout)
            .json(&PasswordCredentials { email, password })?
            .execute_raw()
            .await?;

        let response = check_auth_response(response).await?;
        Ok(response.json::<AuthResponse>().await?)
    }
}

#[async_trait]
impl AuthProvider for Auth {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Session> {
        debug!("Signing up {}", email);
        let response = self.password_request("/signup", email, password).await?;
        let session = session_from_response(response)?;
        info!("Signed up user {}", session.user_id());
        Ok(session)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        debug!("Signing in {}", email);
        let response = self
            .password_request("/token?grant_type=password", email, password)
            .await?;
        let session = session_from_response(response)?;
        info!("Signed in user {}", session.user_id());
        Ok(session)
    }

    async fn sign_out(&self, session: &Session) -> Result<()> {
        let url = self.get_auth_url("/logout");
        let response = Fetch::post(&self.client, &url)
            .header("apikey", &self.key)
            .bearer_auth(&session.access_token)
            .timeout(self.timeout)
            .execute_raw()
            .await?;
        check_auth_response(response).await?;
        info!("Signed out user {}", session.user_id());
        Ok(())
    }

    async fn reset_password_for_email(&self, email: &str) -> Result<()> {
        let url = self.get_auth_url("/recover");
        let response = Fetch::post(&self.client, &url)
            .header("apikey", &self.key)
            .timeout(self.timeout)
            .json(&json!({ "email": email }))?
            .execute_raw()
            .await?;
        check_auth_response(response).await?;
        Ok(())
    }
}

async fn check_auth_response(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    warn!("Auth request failed with status {}: {}", status, text);
    let body = serde_json::from_str::<ProviderError>(&text).unwrap_or_default();
    let fallback = format!("Request failed with status {}", status);
    Err(Error::Auth(body.into_auth_error(&fallback)))
}

fn session_from_response(response: AuthResponse) -> Result<Session> {
    let access_token = match response.access_token {
        Some(token) => token,
        None => {
            return Err(Error::Auth(AuthError::new(
                AuthErrorCode::Other,
                "Confirm your email address before signing in",
            )))
        }
    };
    let refresh_token = response.refresh_token.unwrap_or_default();

    match response.user {
        Some(user) => {
            let mut session = Session::new(
                access_token,
                refresh_token,
                SessionUser {
                    id: user.id,
                    email: user.email,
                },
                response.expires_in,
            );
            if response.expires_at.is_some() {
                session.expires_at = response.expires_at;
            }
            if let Some(token_type) = response.token_type {
                session.token_type = token_type;
            }
            Ok(session)
        }
        None => Session::from_access_token(&access_token, &refresh_token),
    }
}
