//! In-process auth provider for tests and offline use

use async_trait::async_trait;
use log::debug;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use super::{AuthProvider, Session, SessionUser};
use crate::error::{AuthError, AuthErrorCode, Error, Result};

const MIN_PASSWORD_LEN: usize = 6;
const SESSION_TTL_SECS: i64 = 3600;

#[derive(Debug, Clone)]
struct Account {
    id: String,
    password: String,
}

#[derive(Debug, Default)]
struct Inner {
    accounts: HashMap<String, Account>,
    reset_requests: Vec<String>,
}

/// Auth provider that keeps accounts in memory.
///
/// Mirrors the hosted provider's failure modes (duplicate email, weak
/// password, unknown user, wrong password) and counts every call so tests
/// can assert that local validation stopped a request.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuth {
    inner: Arc<Mutex<Inner>>,
    calls: Arc<AtomicUsize>,
}

impl MemoryAuth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of provider calls made so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Emails a password reset was requested for
    pub fn reset_requests(&self) -> Vec<String> {
        self.lock().reset_requests.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn issue(id: &str, email: &str) -> Session {
        Session::new(
            Uuid::new_v4().to_string(),
            Uuid::new_v4().to_string(),
            SessionUser {
                id: id.to_string(),
                email: Some(email.to_string()),
            },
            Some(SESSION_TTL_SECS),
        )
    }
}

fn auth_error(code: AuthErrorCode, message: &str) -> Error {
    Error::Auth(AuthError::new(code, message))
}

fn normalize(email: &str) -> String {
    email.trim().to_lowercase()
}

#[async_trait]
impl AuthProvider for MemoryAuth {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Session> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let email = normalize(email);
        if !email.contains('@') {
            return Err(auth_error(AuthErrorCode::InvalidEmail, "Unable to validate email address"));
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(auth_error(
                AuthErrorCode::WeakPassword,
                "Password should be at least 6 characters",
            ));
        }

        let mut inner = self.lock();
        if inner.accounts.contains_key(&email) {
            return Err(auth_error(AuthErrorCode::EmailAlreadyInUse, "User already registered"));
        }
        let id = Uuid::new_v4().to_string();
        inner.accounts.insert(
            email.clone(),
            Account {
                id: id.clone(),
                password: password.to_string(),
            },
        );
        debug!("Registered in-memory user {}", id);
        Ok(Self::issue(&id, &email))
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let email = normalize(email);
        if !email.contains('@') {
            return Err(auth_error(AuthErrorCode::InvalidEmail, "Unable to validate email address"));
        }

        let inner = self.lock();
        let account = inner
            .accounts
            .get(&email)
            .ok_or_else(|| auth_error(AuthErrorCode::UserNotFound, "User not found"))?;
        if account.password != password {
            return Err(auth_error(AuthErrorCode::WrongPassword, "Invalid login credentials"));
        }
        Ok(Self::issue(&account.id, &email))
    }

    async fn sign_out(&self, _session: &Session) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn reset_password_for_email(&self, email: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.lock().reset_requests.push(normalize(email));
        Ok(())
    }
}
