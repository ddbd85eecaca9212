//! Recipe sharing client
//!
//! Sign in, browse a live recipe catalog, keep favorites and manage your own
//! recipes against a hosted auth + database backend, or against the
//! in-memory backend used by tests and offline demos.

pub mod accounts;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod context;
pub mod error;
pub mod favorites;
pub mod fetch;
pub mod models;
pub mod navigation;
pub mod realtime;
pub mod recipes;
pub mod schema;
pub mod search;
pub mod store;
pub mod subscription;

use reqwest::Client;
use std::sync::Arc;

use crate::accounts::Accounts;
use crate::auth::{Auth, AuthProvider, MemoryAuth, Session};
use crate::config::{ClientOptions, Config};
use crate::context::UserContext;
use crate::error::Result;
use crate::store::{DocumentStore, MemoryStore, RestStore};

/// Entry point: an auth provider and a document store sharing one set of
/// options
#[derive(Clone)]
pub struct RecipeShare {
    auth: Arc<dyn AuthProvider>,
    store: Arc<dyn DocumentStore>,
    options: ClientOptions,
}

impl RecipeShare {
    /// Connect to a hosted project
    ///
    /// # Example
    ///
    /// ```
    /// use recipe_share::RecipeShare;
    ///
    /// let app = RecipeShare::new("https://your-project-url.supabase.co", "your-anon-key").unwrap();
    /// ```
    pub fn new(url: &str, anon_key: &str) -> Result<Self> {
        Self::new_with_options(url, anon_key, ClientOptions::default())
    }

    /// Connect to a hosted project with custom options
    pub fn new_with_options(url: &str, anon_key: &str, options: ClientOptions) -> Result<Self> {
        let config = Config::new(url, anon_key)?;
        Self::from_config(&config, options)
    }

    pub fn from_config(config: &Config, options: ClientOptions) -> Result<Self> {
        let http_client = Client::builder().build()?;
        let auth = Auth::new(config, http_client.clone(), options.request_timeout);
        let store = RestStore::new(config, http_client, &options);
        Ok(Self::with_backends(Arc::new(auth), Arc::new(store), options))
    }

    /// Connect using `SUPABASE_URL` and `SUPABASE_ANON_KEY`
    pub fn from_env() -> Result<Self> {
        Self::from_config(&Config::from_env()?, ClientOptions::default())
    }

    /// Run entirely in memory
    ///
    /// # Example
    ///
    /// ```
    /// use recipe_share::RecipeShare;
    ///
    /// let app = RecipeShare::offline();
    /// let accounts = app.accounts();
    /// ```
    pub fn offline() -> Self {
        let options = ClientOptions::default();
        let store = MemoryStore::new().with_snapshot_buffer(options.snapshot_buffer);
        Self::with_backends(Arc::new(MemoryAuth::new()), Arc::new(store), options)
    }

    /// Use explicit backends
    pub fn with_backends(
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

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn auth(&self) -> &Arc<dyn AuthProvider> {
        &self.auth
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Sign-up, sign-in and profile flows
    pub fn accounts(&self) -> Accounts {
        Accounts::new(self.auth.clone(), self.store.clone(), self.options.clone())
    }

    /// Bind a session for the screens that act on the user's behalf
    pub fn context(&self, session: Session) -> UserContext {
        UserContext::new(session, self.store.as_ref(), &self.options)
    }
}

impl std::fmt::Debug for RecipeShare {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecipeShare")
            .field("options", &self.options)
            .finish()
    }
}

/// A convenience module for common imports
pub mod prelude {
    pub use crate::accounts::{Accounts, LoginFailure, SignupForm};
    pub use crate::auth::Session;
    pub use crate::catalog::CatalogView;
    pub use crate::config::{ClientOptions, Config};
    pub use crate::context::UserContext;
    pub use crate::error::{Error, Result};
    pub use crate::favorites::{FavoriteSet, FavoriteStatus, Favorites};
    pub use crate::models::{CategoryFilter, Recipe, RecipeInput, UserProfile, CATEGORIES};
    pub use crate::navigation::{Navigator, Route};
    pub use crate::recipes::Recipes;
    pub use crate::search::filter_recipes;
    pub use crate::subscription::{Snapshot, Subscription};
    pub use crate::RecipeShare;
}
