//! Per-user favorite recipes

use log::{debug, error, info};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::catalog::recipes_from;
use crate::context::UserContext;
use crate::error::{Error, Result};
use crate::models::Recipe;
use crate::store::{Document, FieldUpdate, Fields, Query};

const FAVORITES_FIELD: &str = "favorites";

/// Set of favorite recipe ids
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FavoriteSet {
    ids: HashSet<String>,
}

impl FavoriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    /// The set with `id` removed if present, added otherwise
    pub fn toggled(&self, id: &str) -> Self {
        let mut ids = self.ids.clone();
        if !ids.remove(id) {
            ids.insert(id.to_string());
        }
        Self { ids }
    }

    fn from_document(doc: &Document) -> Self {
        let ids = match doc.get(FAVORITES_FIELD) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            _ => HashSet::new(),
        };
        Self { ids }
    }
}

impl<S: Into<String>> FromIterator<S> for FavoriteSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Write state of a single favorite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FavoriteStatus {
    /// A write is in flight
    Pending,
    /// The last write was rejected; the set still shows the old state
    Failed,
}

#[derive(Debug, Default)]
struct State {
    set: FavoriteSet,
    status: HashMap<String, FavoriteStatus>,
}

/// The signed-in user's favorites.
///
/// The local set only changes after the store confirmed the write. Clones
/// share state, so a screen can read [`status`](Self::status) while a
/// toggle is in flight.
///
/// Writes to the stored list run one at a time: the REST store applies
/// array updates as read-modify-write, and two overlapping toggles would
/// otherwise overwrite each other.
#[derive(Debug, Clone)]
pub struct Favorites {
    ctx: UserContext,
    state: Arc<Mutex<State>>,
    writes: Arc<tokio::sync::Mutex<()>>,
}

impl Favorites {
    pub fn new(ctx: UserContext) -> Self {
        Self {
            ctx,
            state: Arc::new(Mutex::new(State::default())),
            writes: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn users(&self) -> &str {
        &self.ctx.collections().users
    }

    /// Read the favorites, creating an empty list for a user that has none
    pub async fn load(&self) -> Result<FavoriteSet> {
        let store = self.ctx.store();
        let uid = self.ctx.user_id();
        let _writing = self.writes.lock().await;
        let set = match store.get(self.users(), uid).await? {
            Some(doc) => FavoriteSet::from_document(&doc),
            None => {
                debug!("Creating favorites for {}", uid);
                let mut data = Fields::new();
                data.insert(FAVORITES_FIELD.to_string(), json!([]));
                store.upsert(self.users(), uid, data).await?;
                FavoriteSet::new()
            }
        };

        let mut state = self.lock();
        state.set = set.clone();
        state.status.retain(|_, status| *status == FavoriteStatus::Pending);
        Ok(set)
    }

    /// Current local set
    pub fn set(&self) -> FavoriteSet {
        self.lock().set.clone()
    }

    pub fn is_favorite(&self, recipe_id: &str) -> bool {
        self.lock().set.contains(recipe_id)
    }

    /// Write state of a favorite, `None` when it is settled
    pub fn status(&self, recipe_id: &str) -> Option<FavoriteStatus> {
        self.lock().status.get(recipe_id).copied()
    }

    /// Add or remove a favorite; returns whether it is now a favorite.
    ///
    /// On failure the set is left as it was and the id is marked
    /// [`FavoriteStatus::Failed`].
    pub async fn toggle(&self, recipe_id: &str) -> Result<bool> {
        let was_favorite = {
            let mut state = self.lock();
            if state.status.get(recipe_id) == Some(&FavoriteStatus::Pending) {
                return Err(Error::general(format!(
                    "Favorite {} is already being updated",
                    recipe_id
                )));
            }
            state
                .status
                .insert(recipe_id.to_string(), FavoriteStatus::Pending);
            state.set.contains(recipe_id)
        };

        let result = {
            let _writing = self.writes.lock().await;
            self.write(recipe_id, was_favorite).await
        };

        let mut state = self.lock();
        match result {
            Ok(()) => {
                state.set = state.set.toggled(recipe_id);
                state.status.remove(recipe_id);
                info!(
                    "{} favorite {}",
                    if was_favorite { "Removed" } else { "Added" },
                    recipe_id
                );
                Ok(!was_favorite)
            }
            Err(e) => {
                error!("Failed to update favorite {}: {}", recipe_id, e);
                state
                    .status
                    .insert(recipe_id.to_string(), FavoriteStatus::Failed);
                Err(e)
            }
        }
    }

    async fn write(&self, recipe_id: &str, remove: bool) -> Result<()> {
        let store = self.ctx.store();
        let uid = self.ctx.user_id();
        let update = if remove {
            FieldUpdate::array_remove(FAVORITES_FIELD, recipe_id)
        } else {
            FieldUpdate::array_union(FAVORITES_FIELD, recipe_id)
        };

        match store.update(self.users(), uid, vec![update]).await {
            // Toggled before load created the document
            Err(Error::NotFound(_)) if !remove => {
                let mut data = Fields::new();
                data.insert(FAVORITES_FIELD.to_string(), json!([recipe_id]));
                store.upsert(self.users(), uid, data).await
            }
            other => other,
        }
    }

    /// Recipes in the favorites, re-read from the store
    pub async fn favorite_recipes(&self) -> Result<Vec<Recipe>> {
        let store = self.ctx.store();
        let ids = store
            .get(self.users(), self.ctx.user_id())
            .await?
            .map(|doc| FavoriteSet::from_document(&doc))
            .unwrap_or_default();

        let docs = store
            .query(&Query::new(&self.ctx.collections().recipes))
            .await?;
        Ok(recipes_from(&docs)
            .into_iter()
            .filter(|recipe| ids.contains(&recipe.id))
            .collect())
    }
}
