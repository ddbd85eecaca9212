//! Document storage: the trait the app talks to and its two backends

pub mod memory;
pub mod query;
pub mod rest;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::auth::Session;
use crate::error::Result;
use crate::subscription::Subscription;

pub use memory::MemoryStore;
pub use query::{Filter, FilterOperator, OrderBy, Query};
pub use rest::RestStore;

/// Field map of a document
pub type Fields = Map<String, Value>;

/// A schema-flexible record in a named collection
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Fields,
}

impl Document {
    pub fn new(id: &str, data: Fields) -> Self {
        Self {
            id: id.to_string(),
            data,
        }
    }

    /// Value of a top-level field
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    /// Deserialize the document into `T`, exposing the document id as `id`
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        let mut data = self.data.clone();
        data.insert("id".to_string(), Value::String(self.id.clone()));
        Ok(serde_json::from_value(Value::Object(data))?)
    }
}

/// A single field mutation applied by [`DocumentStore::update`]
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    /// Replace the field
    Set(String, Value),

    /// Add the value to an array field unless already present
    ArrayUnion(String, Value),

    /// Remove every occurrence of the value from an array field
    ArrayRemove(String, Value),
}

impl FieldUpdate {
    pub fn set<T: Into<Value>>(field: &str, value: T) -> Self {
        FieldUpdate::Set(field.to_string(), value.into())
    }

    pub fn array_union<T: Into<Value>>(field: &str, value: T) -> Self {
        FieldUpdate::ArrayUnion(field.to_string(), value.into())
    }

    pub fn array_remove<T: Into<Value>>(field: &str, value: T) -> Self {
        FieldUpdate::ArrayRemove(field.to_string(), value.into())
    }

    /// Name of the field this update touches
    pub fn field(&self) -> &str {
        match self {
            FieldUpdate::Set(field, _)
            | FieldUpdate::ArrayUnion(field, _)
            | FieldUpdate::ArrayRemove(field, _) => field,
        }
    }

    /// Apply the mutation to a field map.
    ///
    /// Array operations on a missing or non-array field start from an empty
    /// array.
    pub fn apply(&self, data: &mut Fields) {
        match self {
            FieldUpdate::Set(field, value) => {
                data.insert(field.clone(), value.clone());
            }
            FieldUpdate::ArrayUnion(field, value) => {
                let mut items = take_array(data, field);
                if !items.contains(value) {
                    items.push(value.clone());
                }
                data.insert(field.clone(), Value::Array(items));
            }
            FieldUpdate::ArrayRemove(field, value) => {
                let mut items = take_array(data, field);
                items.retain(|item| item != value);
                data.insert(field.clone(), Value::Array(items));
            }
        }
    }
}

fn take_array(data: &mut Fields, field: &str) -> Vec<Value> {
    match data.remove(field) {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    }
}

/// Operations the app needs from a document store
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// A handle whose requests run as the session's user
    fn authorized(&self, session: &Session) -> Arc<dyn DocumentStore>;

    /// Fetch one document, `None` if it does not exist
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Create the document or merge `data` into the existing one
    async fn upsert(&self, collection: &str, id: &str, data: Fields) -> Result<()>;

    /// Insert a new document with a store-assigned id
    async fn add(&self, collection: &str, data: Fields) -> Result<Document>;

    /// Apply field updates to an existing document; `NotFound` if absent
    async fn update(&self, collection: &str, id: &str, updates: Vec<FieldUpdate>) -> Result<()>;

    /// Remove a document
    async fn delete(&self, collection: &str, id: &str) -> Result<()>;

    /// One-shot query
    async fn query(&self, query: &Query) -> Result<Vec<Document>>;

    /// Live query: a full snapshot now and after every change
    async fn watch(&self, query: Query) -> Result<Subscription<Document>>;
}

/// A restartable live query.
///
/// Holds only the description; every call to [`subscribe`](Self::subscribe)
/// opens a fresh subscription against the store.
#[derive(Clone)]
pub struct LiveQuery {
    store: Arc<dyn DocumentStore>,
    query: Query,
}

impl LiveQuery {
    pub fn new(store: Arc<dyn DocumentStore>, query: Query) -> Self {
        Self { store, query }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub async fn subscribe(&self) -> Result<Subscription<Document>> {
        self.store.watch(self.query.clone()).await
    }

    /// Run the query once
    pub async fn fetch(&self) -> Result<Vec<Document>> {
        self.store.query(&self.query).await
    }
}

impl std::fmt::Debug for LiveQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveQuery").field("query", &self.query).finish()
    }
}
