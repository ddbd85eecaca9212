//! Document store backed by the hosted REST API and realtime feed

use async_trait::async_trait;
use log::{debug, error, trace, warn};
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::{Document, DocumentStore, FieldUpdate, Fields, Query};
use crate::auth::Session;
use crate::config::{ClientOptions, Config};
use crate::error::{Error, Result};
use crate::fetch::{Fetch, FetchBuilder};
use crate::realtime::{ChangeParams, RealtimeClient};
use crate::subscription::Subscription;

/// REST store: every collection is a table with a text `id` primary key.
///
/// Live queries join a realtime channel for the table and re-run the REST
/// query on join and after every change notification.
#[derive(Debug, Clone)]
pub struct RestStore {
    /// The base URL for the project
    url: String,

    /// The anonymous API key for the project
    key: String,

    /// Access token of the signed-in user, if any
    token: Option<String>,

    /// HTTP client used for requests
    client: Client,

    /// Database schema
    schema: String,

    /// Per-request timeout
    timeout: Option<Duration>,

    /// Shared websocket for live queries
    realtime: Arc<RealtimeClient>,

    /// Snapshots buffered per live query
    buffer: usize,
}

impl RestStore {
    pub fn new(config: &Config, client: Client, options: &ClientOptions) -> Self {
        Self {
            url: config.base_url(),
            key: config.anon_key.clone(),
            token: None,
            client,
            schema: options.db_schema.clone(),
            timeout: options.request_timeout,
            realtime: Arc::new(RealtimeClient::new(config, options.heartbeat_interval)),
            buffer: options.snapshot_buffer,
        }
    }

    /// The realtime client live queries run on
    pub fn realtime(&self) -> &Arc<RealtimeClient> {
        &self.realtime
    }

    fn table_url(&self, collection: &str) -> String {
        format!("{}/rest/v1/{}", self.url, collection)
    }

    fn with_headers<'a>(&self, fetch: FetchBuilder<'a>) -> FetchBuilder<'a> {
        let token = self.token.as_deref().unwrap_or(&self.key);
        let mut fetch = fetch
            .header("apikey", &self.key)
            .bearer_auth(token)
            .timeout(self.timeout);
        if self.schema != "public" {
            fetch = fetch
                .header("Accept-Profile", &self.schema)
                .header("Content-Profile", &self.schema);
        }
        fetch
    }

    fn get_request(&self, collection: &str) -> FetchBuilder<'_> {
        self.with_headers(Fetch::get(&self.client, &self.table_url(collection)))
    }

    fn post_request(&self, collection: &str) -> FetchBuilder<'_> {
        self.with_headers(Fetch::post(&self.client, &self.table_url(collection)))
    }

    fn patch_request(&self, collection: &str) -> FetchBuilder<'_> {
        self.with_headers(Fetch::patch(&self.client, &self.table_url(collection)))
    }

    fn delete_request(&self, collection: &str) -> FetchBuilder<'_> {
        self.with_headers(Fetch::delete(&self.client, &self.table_url(collection)))
    }
}

/// Split a row into its id and remaining columns
fn into_document(row: Value) -> Result<Document> {
    let mut data = match row {
        Value::Object(data) => data,
        other => return Err(Error::database(format!("Unexpected row: {}", other))),
    };
    let id = match data.remove("id") {
        Some(Value::String(id)) => id,
        Some(Value::Number(id)) => id.to_string(),
        _ => return Err(Error::database("Row without an id")),
    };
    Ok(Document { id, data })
}

fn into_documents(rows: Vec<Value>) -> Vec<Document> {
    rows.into_iter()
        .filter_map(|row| match into_document(row) {
            Ok(doc) => Some(doc),
            Err(e) => {
                warn!("Skipping row: {}", e);
                None
            }
        })
        .collect()
}

fn with_id(id: &str, mut data: Fields) -> Fields {
    data.insert("id".to_string(), Value::String(id.to_string()));
    data
}

fn log_failure<T>(action: &str, collection: &str, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        error!("{} on {} failed: {}", action, collection, e);
    }
    result
}

/// Row-level security hides rows the caller may not write, so a filtered
/// write that touched nothing is either a missing row or a denied one.
fn expect_affected(action: &str, collection: &str, id: &str, rows: &[Value]) -> Result<()> {
    if rows.is_empty() {
        error!("{} on {}/{} matched no row", action, collection, id);
        return Err(Error::NotFound(format!(
            "{}/{} (missing or not writable)",
            collection, id
        )));
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for RestStore {
    fn authorized(&self, session: &Session) -> Arc<dyn DocumentStore> {
        let mut store = self.clone();
        store.token = Some(session.access_token.clone());
        Arc::new(store)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let result = self
            .get_request(collection)
            .query("select", "*")
            .query("id", &format!("eq.{}", id))
            .query("limit", "1")
            .execute::<Vec<Value>>()
            .await;
        let rows = log_failure("Get", collection, result)?;
        rows.into_iter().next().map(into_document).transpose()
    }

    async fn upsert(&self, collection: &str, id: &str, data: Fields) -> Result<()> {
        debug!("Upserting {}/{}", collection, id);
        let result = self
            .post_request(collection)
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .query("on_conflict", "id")
            .json(&with_id(id, data))?
            .execute_empty()
            .await;
        log_failure("Upsert", collection, result)
    }

    async fn add(&self, collection: &str, data: Fields) -> Result<Document> {
        let id = Uuid::new_v4().to_string();
        debug!("Adding {}/{}", collection, id);
        let result = self
            .post_request(collection)
            .header("Prefer", "return=representation")
            .json(&with_id(&id, data))?
            .execute::<Vec<Value>>()
            .await;
        let rows = log_failure("Insert", collection, result)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| Error::database("Insert returned no row"))?;
        into_document(row)
    }

    async fn update(&self, collection: &str, id: &str, updates: Vec<FieldUpdate>) -> Result<()> {
        // Array operators have no REST equivalent: read, apply, write back the
        // touched fields.
        let current = self
            .get(collection, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("{}/{}", collection, id)))?;

        let mut data = current.data;
        for update in &updates {
            update.apply(&mut data);
        }
        let mut changed = Fields::new();
        for update in &updates {
            let field = update.field();
            if let Some(value) = data.get(field) {
                changed.insert(field.to_string(), value.clone());
            }
        }

        debug!("Updating {}/{} ({} fields)", collection, id, changed.len());
        let result = self
            .patch_request(collection)
            .header("Prefer", "return=representation")
            .query("id", &format!("eq.{}", id))
            .json(&changed)?
            .execute::<Vec<Value>>()
            .await;
        let rows = log_failure("Update", collection, result)?;
        expect_affected("Update", collection, id, &rows)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        debug!("Deleting {}/{}", collection, id);
        let result = self
            .delete_request(collection)
            .header("Prefer", "return=representation")
            .query("id", &format!("eq.{}", id))
            .execute::<Vec<Value>>()
            .await;
        let rows = log_failure("Delete", collection, result)?;
        expect_affected("Delete", collection, id, &rows)
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>> {
        let result = self
            .get_request(&query.collection)
            .query("select", "*")
            .query_pairs(query.to_rest_params())
            .execute::<Vec<Value>>()
            .await;
        let rows = log_failure("Query", &query.collection, result)?;
        Ok(into_documents(rows))
    }

    async fn watch(&self, query: Query) -> Result<Subscription<Document>> {
        let params = ChangeParams {
            schema: self.schema.clone(),
            table: query.collection.clone(),
            filter: query.to_realtime_filter(),
        };
        let mut feed = self
            .realtime
            .subscribe(params, self.token.as_deref())
            .await?;
        let initial = self.query(&query).await?;

        let (tx, rx) = Subscription::channel(self.buffer);
        let store = self.clone();
        let task = tokio::spawn(async move {
            let mut last = Arc::new(initial);
            if tx.send(Ok(last.clone())).await.is_err() {
                return;
            }
            loop {
                let item = match feed.recv().await {
                    Some(Ok(change)) => {
                        trace!("{:?} on {}, re-running query", change.kind, change.table);
                        match store.query(&query).await {
                            Ok(docs) if docs == *last => continue,
                            Ok(docs) => {
                                last = Arc::new(docs);
                                Ok(last.clone())
                            }
                            Err(e) => Err(e),
                        }
                    }
                    Some(Err(e)) => {
                        error!("Live query on {} failed: {}", query.collection, e);
                        Err(e)
                    }
                    None => {
                        warn!("Change feed for {} closed", query.collection);
                        let _ = tx
                            .send(Err(Error::realtime("Live query connection closed")))
                            .await;
                        break;
                    }
                };
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        });

        Ok(Subscription::new(rx, task))
    }
}
