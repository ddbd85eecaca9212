//! Configuration for the recipe-share client

use std::time::Duration;
use url::Url;

use crate::error::{Error, Result};

/// Connection settings for the hosted backend
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the project, e.g. `https://xyz.supabase.co`
    pub url: Url,

    /// Anonymous (public) API key
    pub anon_key: String,
}

impl Config {
    /// Create a new configuration, validating the URL and key
    pub fn new(url: &str, anon_key: &str) -> Result<Self> {
        let url = Url::parse(url)?;
        if anon_key.is_empty() {
            return Err(Error::config("anon_key cannot be empty"));
        }
        Ok(Self {
            url,
            anon_key: anon_key.to_string(),
        })
    }

    /// Read `SUPABASE_URL` and `SUPABASE_ANON_KEY` from the environment
    pub fn from_env() -> Result<Self> {
        let url = std::env::var("SUPABASE_URL")
            .map_err(|_| Error::config("SUPABASE_URL environment variable not found"))?;
        let anon_key = std::env::var("SUPABASE_ANON_KEY")
            .map_err(|_| Error::config("SUPABASE_ANON_KEY environment variable not found"))?;
        Self::new(&url, &anon_key)
    }

    /// Base URL without a trailing slash
    pub fn base_url(&self) -> String {
        self.url.as_str().trim_end_matches('/').to_string()
    }
}

/// Configuration options for the client
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// The request timeout
    pub request_timeout: Option<Duration>,

    /// The database schema
    pub db_schema: String,

    /// Collection holding recipes
    pub recipes_collection: String,

    /// Collection holding user profiles (and their favorites)
    pub users_collection: String,

    /// Interval between realtime heartbeats
    pub heartbeat_interval: Duration,

    /// Number of undelivered snapshots buffered per subscription
    pub snapshot_buffer: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Some(Duration::from_secs(30)),
            db_schema: "public".to_string(),
            recipes_collection: "recipes".to_string(),
            users_collection: "users".to_string(),
            heartbeat_interval: Duration::from_secs(30),
            snapshot_buffer: 16,
        }
    }
}

impl ClientOptions {
    /// Set the request timeout
    pub fn with_request_timeout(mut self, value: Option<Duration>) -> Self {
        self.request_timeout = value;
        self
    }

    /// Set the database schema
    pub fn with_db_schema(mut self, value: &str) -> Self {
        self.db_schema = value.to_string();
        self
    }

    /// Set the recipes collection name
    pub fn with_recipes_collection(mut self, value: &str) -> Self {
        self.recipes_collection = value.to_string();
        self
    }

    /// Set the users collection name
    pub fn with_users_collection(mut self, value: &str) -> Self {
        self.users_collection = value.to_string();
        self
    }

    /// Set the realtime heartbeat interval
    pub fn with_heartbeat_interval(mut self, value: Duration) -> Self {
        self.heartbeat_interval = value;
        self
    }

    /// Set the per-subscription snapshot buffer
    pub fn with_snapshot_buffer(mut self, value: usize) -> Self {
        self.snapshot_buffer = value.max(1);
        self
    }

    /// Collection names as a standalone value
    pub fn collections(&self) -> Collections {
        Collections {
            recipes: self.recipes_collection.clone(),
            users: self.users_collection.clone(),
        }
    }
}

/// Names of the collections the app reads and writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collections {
    pub recipes: String,
    pub users: String,
}

impl Default for Collections {
    fn default() -> Self {
        ClientOptions::default().collections()
    }
}
