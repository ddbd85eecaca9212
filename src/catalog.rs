//! Live recipe lists: the home catalog and "My Recipes"

use log::{debug, error, warn};
use std::sync::Arc;

use crate::context::UserContext;
use crate::error::{Error, Result};
use crate::models::{CategoryFilter, Recipe};
use crate::search::filter_recipes;
use crate::store::{Document, LiveQuery, Query};
use crate::subscription::{Snapshot, Subscription};

/// Query over the recipe collection, filtered to one category if given.
///
/// The category comparison is exact and case-sensitive, as the store
/// compares; free-text search is the separate, case-insensitive path in
/// [`filter_recipes`].
pub fn catalog_query(collection: &str, category: &CategoryFilter) -> Query {
    let query = Query::new(collection);
    match category.as_category() {
        Some(category) => query.eq("category", category),
        None => query,
    }
}

/// Query over the recipes owned by `user_id`
pub fn owner_query(collection: &str, user_id: &str) -> Query {
    Query::new(collection).eq("userId", user_id)
}

/// Decode a recipe document, skipping (and logging) malformed ones
pub fn decode_recipe(doc: &Document) -> Option<Recipe> {
    match doc.decode::<Recipe>() {
        Ok(recipe) => Some(recipe),
        Err(e) => {
            warn!("Skipping malformed recipe {}: {}", doc.id, e);
            None
        }
    }
}

/// Decode every readable recipe in a result set
pub fn recipes_from(docs: &[Document]) -> Vec<Recipe> {
    docs.iter().filter_map(decode_recipe).collect()
}

/// Restartable catalog query for the given category
pub fn catalog_live_query(ctx: &UserContext, category: &CategoryFilter) -> LiveQuery {
    LiveQuery::new(
        ctx.store().clone(),
        catalog_query(&ctx.collections().recipes, category),
    )
}

async fn subscribe_recipes(ctx: &UserContext, live: LiveQuery) -> Result<Subscription<Recipe>> {
    let docs = live.subscribe().await?;
    Ok(docs.map(ctx.snapshot_buffer(), decode_recipe))
}

/// Open the catalog live query
pub async fn subscribe_catalog(
    ctx: &UserContext,
    category: &CategoryFilter,
) -> Result<Subscription<Recipe>> {
    debug!("Subscribing to catalog ({:?})", category);
    subscribe_recipes(ctx, catalog_live_query(ctx, category)).await
}

/// Open the live query over the signed-in user's own recipes
pub async fn subscribe_my_recipes(ctx: &UserContext) -> Result<Subscription<Recipe>> {
    let query = owner_query(&ctx.collections().recipes, ctx.user_id());
    subscribe_recipes(ctx, LiveQuery::new(ctx.store().clone(), query)).await
}

/// View model of the home screen.
///
/// Owns exactly one live subscription at a time; changing the category
/// cancels the old one before opening the next.
pub struct CatalogView {
    ctx: UserContext,
    category: CategoryFilter,
    search: String,
    recipes: Snapshot<Recipe>,
    subscription: Option<Subscription<Recipe>>,
    loading: bool,
    last_error: Option<Error>,
}

impl CatalogView {
    pub fn new(ctx: UserContext) -> Self {
        Self {
            ctx,
            category: CategoryFilter::All,
            search: String::new(),
            recipes: Arc::new(Vec::new()),
            subscription: None,
            loading: false,
            last_error: None,
        }
    }

    /// (Re)open the live query for the current category
    pub async fn open(&mut self) {
        self.close();
        self.loading = true;
        match subscribe_catalog(&self.ctx, &self.category).await {
            Ok(subscription) => self.subscription = Some(subscription),
            Err(e) => self.fail(e),
        }
    }

    /// Switch category; the previous subscription is released first
    pub async fn set_category(&mut self, category: CategoryFilter) {
        self.category = category;
        self.open().await;
    }

    pub fn set_search(&mut self, search: &str) {
        self.search = search.to_string();
    }

    /// Wait for the next push and apply it.
    ///
    /// Returns `false` once there is no live subscription left to wait on.
    pub async fn next_update(&mut self) -> bool {
        let subscription = match self.subscription.as_mut() {
            Some(subscription) => subscription,
            None => return false,
        };
        match subscription.next_snapshot().await {
            Some(Ok(recipes)) => {
                self.recipes = recipes;
                self.loading = false;
                self.last_error = None;
                true
            }
            Some(Err(e)) => {
                self.fail(e);
                true
            }
            None => {
                self.subscription = None;
                self.loading = false;
                false
            }
        }
    }

    fn fail(&mut self, e: Error) {
        error!("Error fetching recipes: {}", e);
        self.loading = false;
        self.last_error = Some(e);
    }

    /// Current recipes after the search filter
    pub fn visible(&self) -> Vec<Recipe> {
        filter_recipes(&self.recipes, &self.search)
    }

    /// Latest unfiltered snapshot
    pub fn recipes(&self) -> &Snapshot<Recipe> {
        &self.recipes
    }

    pub fn category(&self) -> &CategoryFilter {
        &self.category
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_open(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn last_error(&self) -> Option<&Error> {
        self.last_error.as_ref()
    }

    /// Release the live subscription
    pub fn close(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.cancel();
        }
    }
}

impl std::fmt::Debug for CatalogView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogView")
            .field("category", &self.category)
            .field("search", &self.search)
            .field("recipes", &self.recipes.len())
            .field("loading", &self.loading)
            .finish()
    }
}
