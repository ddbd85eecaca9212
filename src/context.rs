//! The signed-in user's view of the backend

use std::sync::Arc;

use crate::auth::Session;
use crate::config::{ClientOptions, Collections};
use crate::store::DocumentStore;

/// Everything a screen needs to act on behalf of the signed-in user.
///
/// Built from a [`Session`] and passed explicitly to every component that
/// scopes reads or writes to the current user.
#[derive(Clone)]
pub struct UserContext {
    session: Session,
    store: Arc<dyn DocumentStore>,
    collections: Collections,
    snapshot_buffer: usize,
}

impl UserContext {
    /// Bind a session to a store; requests run with the session's token
    pub fn new(session: Session, store: &dyn DocumentStore, options: &ClientOptions) -> Self {
        let store = store.authorized(&session);
        Self {
            session,
            store,
            collections: options.collections(),
            snapshot_buffer: options.snapshot_buffer,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn user_id(&self) -> &str {
        self.session.user_id()
    }

    pub fn email(&self) -> Option<&str> {
        self.session.user.email.as_deref()
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn collections(&self) -> &Collections {
        &self.collections
    }

    /// Snapshots buffered per live query opened for this user
    pub fn snapshot_buffer(&self) -> usize {
        self.snapshot_buffer
    }
}

impl std::fmt::Debug for UserContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserContext")
            .field("user_id", &self.user_id())
            .field("collections", &self.collections)
            .finish()
    }
}
