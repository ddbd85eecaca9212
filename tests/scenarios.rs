use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use recipe_share::auth::{AuthProvider, MemoryAuth, SessionUser};
use recipe_share::catalog::{catalog_live_query, subscribe_catalog, subscribe_my_recipes};
use recipe_share::error::Error;
use recipe_share::prelude::*;
use recipe_share::store::{Document, DocumentStore, FieldUpdate, Fields, MemoryStore, Query};
use tokio::sync::Notify;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

struct Harness {
    app: RecipeShare,
    auth: MemoryAuth,
    store: MemoryStore,
}

fn harness() -> Harness {
    let auth = MemoryAuth::new();
    let store = MemoryStore::new();
    let app = RecipeShare::with_backends(
        Arc::new(auth.clone()),
        Arc::new(store.clone()),
        ClientOptions::default(),
    );
    Harness { app, auth, store }
}

fn signup_form(email: &str) -> SignupForm {
    SignupForm {
        name: "Ada".into(),
        email: email.into(),
        password: "secret1".into(),
        confirm_password: "secret1".into(),
        phone: "+44 7700 900000".into(),
        address: "1 Main St".into(),
        country: "UK".into(),
    }
}

async fn signed_in(h: &Harness, email: &str) -> UserContext {
    let session = h.app.accounts().sign_up(&signup_form(email)).await.unwrap();
    h.app.context(session)
}

async fn next_update(view: &mut CatalogView) -> bool {
    timeout(WAIT, view.next_update())
        .await
        .expect("timed out waiting for a catalog update")
}

fn pasta() -> RecipeInput {
    RecipeInput::new("Pasta", "pasta, sauce", "boil, mix", "Veg")
}

#[tokio::test]
async fn added_recipe_appears_in_catalog_with_owner() {
    let h = harness();
    let ctx = signed_in(&h, "ada@example.com").await;

    let mut view = CatalogView::new(ctx.clone());
    view.open().await;
    assert!(view.is_loading());
    assert!(next_update(&mut view).await);
    assert!(!view.is_loading());
    assert!(view.visible().is_empty());

    let added = Recipes::new(ctx.clone()).add(&pasta()).await.unwrap();
    assert!(next_update(&mut view).await);

    let visible = view.visible();
    assert_eq!(visible.len(), 1);
    let recipe = &visible[0];
    assert_eq!(recipe.id, added.id);
    assert_eq!(recipe.title, "Pasta");
    assert_eq!(recipe.ingredients, "pasta, sauce");
    assert_eq!(recipe.instructions, "boil, mix");
    assert_eq!(recipe.category, "Veg");
    assert_eq!(recipe.image_url, None);
    assert_eq!(recipe.user_id, ctx.user_id());
    assert!(recipe.created_at.is_some());
    assert!(recipe.is_owned_by(ctx.user_id()));
}

#[tokio::test]
async fn invalid_recipe_is_rejected_before_any_write() {
    let h = harness();
    let ctx = signed_in(&h, "ada@example.com").await;
    let writes = h.store.writes();

    let input = RecipeInput::new("Pasta", "", "boil", "Veg");
    let err = Recipes::new(ctx).add(&input).await.unwrap_err();
    assert!(err.is_validation());
    assert_eq!(h.store.writes(), writes);
}

#[tokio::test]
async fn category_filter_is_exact_and_case_sensitive() {
    let h = harness();
    let ctx = signed_in(&h, "ada@example.com").await;
    let recipes = Recipes::new(ctx.clone());
    recipes.add(&pasta()).await.unwrap();
    recipes
        .add(&RecipeInput::new("Salad", "greens", "toss", "veg"))
        .await
        .unwrap();
    recipes
        .add(&RecipeInput::new("Cake", "flour", "bake", "Dessert"))
        .await
        .unwrap();

    let mut view = CatalogView::new(ctx.clone());
    view.set_category(CategoryFilter::parse("Veg")).await;
    assert!(next_update(&mut view).await);

    let recipes = view.recipes();
    assert_eq!(recipes.len(), 1);
    assert!(recipes.iter().all(|r| r.category == "Veg"));
}

#[tokio::test]
async fn switching_category_drops_the_old_subscription() {
    let h = harness();
    let ctx = signed_in(&h, "ada@example.com").await;
    let recipes = Recipes::new(ctx.clone());

    let mut view = CatalogView::new(ctx.clone());
    view.set_category(CategoryFilter::parse("Veg")).await;
    assert!(next_update(&mut view).await);

    view.set_category(CategoryFilter::parse("Dessert")).await;
    assert!(next_update(&mut view).await);
    assert!(view.recipes().is_empty());

    // Only visible to the old subscription
    recipes.add(&pasta()).await.unwrap();
    recipes
        .add(&RecipeInput::new("Cake", "flour", "bake", "Dessert"))
        .await
        .unwrap();

    assert!(next_update(&mut view).await);
    let snapshot = view.recipes();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].category, "Dessert");
}

#[tokio::test]
async fn search_narrows_the_visible_list() {
    let h = harness();
    let ctx = signed_in(&h, "ada@example.com").await;
    let recipes = Recipes::new(ctx.clone());
    recipes
        .add(&RecipeInput::new("Veg Biryani", "rice", "steam", "Veg"))
        .await
        .unwrap();
    recipes
        .add(&RecipeInput::new("Cake", "flour", "bake", "Dessert"))
        .await
        .unwrap();

    let mut view = CatalogView::new(ctx);
    view.open().await;
    assert!(next_update(&mut view).await);

    view.set_search("veg");
    let visible = view.visible();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].title, "Veg Biryani");

    view.set_search("");
    assert_eq!(view.visible().len(), 2);
}

#[tokio::test]
async fn subscription_failure_is_reported_not_raised() {
    let h = harness();
    let ctx = signed_in(&h, "ada@example.com").await;

    let mut view = CatalogView::new(ctx);
    view.open().await;
    assert!(next_update(&mut view).await);

    h.store.inject_fault("recipes", "permission denied");
    assert!(next_update(&mut view).await);
    assert!(!view.is_loading());
    assert!(matches!(view.last_error(), Some(Error::Database(_))));

    view.close();
    assert!(!view.is_open());
    assert!(!view.next_update().await);
}

#[tokio::test]
async fn opening_while_offline_sets_last_error() {
    let h = harness();
    let ctx = signed_in(&h, "ada@example.com").await;
    h.store.set_offline(true);

    let mut view = CatalogView::new(ctx);
    view.open().await;
    assert!(!view.is_loading());
    assert!(view.last_error().is_some());
    assert!(!view.is_open());
}

#[tokio::test]
async fn live_query_is_restartable() {
    let h = harness();
    let ctx = signed_in(&h, "ada@example.com").await;
    Recipes::new(ctx.clone()).add(&pasta()).await.unwrap();

    let live = catalog_live_query(&ctx, &CategoryFilter::All);
    let first = live.subscribe().await.unwrap();
    first.cancel();

    let mut second = live.subscribe().await.unwrap();
    let snapshot = timeout(WAIT, second.next_snapshot()).await.unwrap().unwrap().unwrap();
    assert_eq!(snapshot.len(), 1);
}

#[tokio::test]
async fn my_recipes_only_lists_own() {
    let h = harness();
    let ada = signed_in(&h, "ada@example.com").await;
    let bob = signed_in(&h, "bob@example.com").await;
    Recipes::new(ada.clone()).add(&pasta()).await.unwrap();
    Recipes::new(bob.clone())
        .add(&RecipeInput::new("Curry", "chicken", "simmer", "Non-Veg"))
        .await
        .unwrap();

    let mut mine = subscribe_my_recipes(&bob).await.unwrap();
    let snapshot = timeout(WAIT, mine.next_snapshot()).await.unwrap().unwrap().unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].title, "Curry");
    assert_eq!(snapshot[0].user_id, bob.user_id());

    let mut all = subscribe_catalog(&bob, &CategoryFilter::All).await.unwrap();
    let snapshot = timeout(WAIT, all.next_snapshot()).await.unwrap().unwrap().unwrap();
    assert_eq!(snapshot.len(), 2);
}

#[tokio::test]
async fn update_get_and_delete_recipe() {
    let h = harness();
    let ctx = signed_in(&h, "ada@example.com").await;
    let recipes = Recipes::new(ctx);

    let added = recipes.add(&pasta()).await.unwrap();
    let mut edit = RecipeInput::from(&added);
    edit.title = "Pasta al pomodoro".into();
    edit.image_url = "https://img/pasta.png".into();
    recipes.update(&added.id, &edit).await.unwrap();

    let stored = recipes.get(&added.id).await.unwrap();
    assert_eq!(stored.title, "Pasta al pomodoro");
    assert_eq!(stored.image_url.as_deref(), Some("https://img/pasta.png"));
    assert_eq!(stored.user_id, added.user_id);
    assert_eq!(stored.created_at, added.created_at);

    recipes.delete(&added.id).await.unwrap();
    assert!(matches!(recipes.get(&added.id).await, Err(Error::NotFound(_))));
    assert!(matches!(recipes.delete(&added.id).await, Err(Error::NotFound(_))));
    assert!(matches!(
        recipes.update(&added.id, &edit).await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn favorite_toggle_round_trip() {
    let h = harness();
    let ctx = signed_in(&h, "ada@example.com").await;
    let favorites = Favorites::new(ctx.clone());

    assert!(favorites.load().await.unwrap().is_empty());

    assert!(favorites.toggle("r1").await.unwrap());
    assert_eq!(favorites.set(), FavoriteSet::from_iter(["r1"]));
    assert_eq!(favorites.status("r1"), None);

    assert!(!favorites.toggle("r1").await.unwrap());
    assert!(favorites.set().is_empty());

    // The stored list agrees with the local set
    assert!(favorites.load().await.unwrap().is_empty());
}

#[tokio::test]
async fn load_creates_missing_favorites_document() {
    let h = harness();
    let session = h.auth.sign_up("cook@example.com", "secret1").await.unwrap();
    let ctx = h.app.context(session);

    assert!(h.store.get("users", ctx.user_id()).await.unwrap().is_none());
    let set = Favorites::new(ctx.clone()).load().await.unwrap();
    assert!(set.is_empty());

    let doc = h.store.get("users", ctx.user_id()).await.unwrap().unwrap();
    assert_eq!(doc.get("favorites"), Some(&serde_json::json!([])));
}

#[tokio::test]
async fn failed_favorite_write_leaves_set_unchanged() {
    let h = harness();
    let ctx = signed_in(&h, "ada@example.com").await;
    let favorites = Favorites::new(ctx);
    favorites.load().await.unwrap();
    favorites.toggle("r1").await.unwrap();

    h.store.set_offline(true);
    assert!(favorites.toggle("r2").await.is_err());
    assert!(favorites.toggle("r1").await.is_err());
    assert_eq!(favorites.set(), FavoriteSet::from_iter(["r1"]));
    assert_eq!(favorites.status("r2"), Some(FavoriteStatus::Failed));
    assert_eq!(favorites.status("r1"), Some(FavoriteStatus::Failed));

    h.store.set_offline(false);
    assert!(favorites.toggle("r2").await.unwrap());
    assert_eq!(favorites.status("r2"), None);
    assert_eq!(favorites.set(), FavoriteSet::from_iter(["r1", "r2"]));
}

/// Store that applies updates the way the REST store does: read the row,
/// wait, write the whole field back. `gate` holds each update open until
/// the test releases it; `entered` fires once an update has read the row.
#[derive(Clone)]
struct ReadModifyWriteStore {
    inner: MemoryStore,
    gate: Option<Arc<Notify>>,
    entered: Arc<Notify>,
}

impl ReadModifyWriteStore {
    fn new(gate: Option<Arc<Notify>>) -> Self {
        Self {
            inner: MemoryStore::new(),
            gate,
            entered: Arc::new(Notify::new()),
        }
    }
}

#[async_trait]
impl DocumentStore for ReadModifyWriteStore {
    fn authorized(&self, _session: &Session) -> Arc<dyn DocumentStore> {
        Arc::new(self.clone())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        self.inner.get(collection, id).await
    }

    async fn upsert(&self, collection: &str, id: &str, data: Fields) -> Result<()> {
        self.inner.upsert(collection, id, data).await
    }

    async fn add(&self, collection: &str, data: Fields) -> Result<Document> {
        self.inner.add(collection, data).await
    }

    async fn update(&self, collection: &str, id: &str, updates: Vec<FieldUpdate>) -> Result<()> {
        let mut data = self
            .inner
            .get(collection, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("{}/{}", collection, id)))?
            .data;
        self.entered.notify_one();
        match &self.gate {
            Some(gate) => gate.notified().await,
            None => tokio::time::sleep(Duration::from_millis(20)).await,
        }
        for update in &updates {
            update.apply(&mut data);
        }
        self.inner.upsert(collection, id, data).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        self.inner.delete(collection, id).await
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>> {
        self.inner.query(query).await
    }

    async fn watch(&self, query: Query) -> Result<Subscription<Document>> {
        self.inner.watch(query).await
    }
}

async fn signed_in_with(store: &ReadModifyWriteStore) -> UserContext {
    let app = RecipeShare::with_backends(
        Arc::new(MemoryAuth::new()),
        Arc::new(store.clone()),
        ClientOptions::default(),
    );
    let session = app.accounts().sign_up(&signup_form("ada@example.com")).await.unwrap();
    app.context(session)
}

#[tokio::test]
async fn overlapping_toggles_keep_every_favorite() {
    let store = ReadModifyWriteStore::new(None);
    let favorites = Favorites::new(signed_in_with(&store).await);
    favorites.load().await.unwrap();
    favorites.toggle("r1").await.unwrap();

    let (r2, r3) = tokio::join!(favorites.toggle("r2"), favorites.toggle("r3"));
    assert!(r2.unwrap());
    assert!(r3.unwrap());

    let local = favorites.set();
    assert_eq!(local, FavoriteSet::from_iter(["r1", "r2", "r3"]));
    assert_eq!(favorites.load().await.unwrap(), local);
}

#[tokio::test]
async fn toggle_in_flight_is_pending_and_blocks_a_second_toggle() {
    let gate = Arc::new(Notify::new());
    let store = ReadModifyWriteStore::new(Some(gate.clone()));
    let favorites = Favorites::new(signed_in_with(&store).await);
    favorites.load().await.unwrap();

    let in_flight = tokio::spawn({
        let favorites = favorites.clone();
        async move { favorites.toggle("r1").await }
    });
    timeout(WAIT, store.entered.notified()).await.unwrap();

    assert_eq!(favorites.status("r1"), Some(FavoriteStatus::Pending));
    assert!(!favorites.is_favorite("r1"));
    assert!(matches!(favorites.toggle("r1").await, Err(Error::General(_))));
    assert_eq!(favorites.status("r1"), Some(FavoriteStatus::Pending));

    gate.notify_one();
    assert!(timeout(WAIT, in_flight).await.unwrap().unwrap().unwrap());
    assert_eq!(favorites.status("r1"), None);
    assert!(favorites.is_favorite("r1"));
}

#[tokio::test]
async fn favorite_recipes_lists_only_favorites() {
    let h = harness();
    let ctx = signed_in(&h, "ada@example.com").await;
    let recipes = Recipes::new(ctx.clone());
    let pasta = recipes.add(&pasta()).await.unwrap();
    recipes
        .add(&RecipeInput::new("Cake", "flour", "bake", "Dessert"))
        .await
        .unwrap();

    let favorites = Favorites::new(ctx);
    favorites.load().await.unwrap();
    favorites.toggle(&pasta.id).await.unwrap();

    let listed = favorites.favorite_recipes().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, pasta.id);
}

#[tokio::test]
async fn signup_with_mismatched_passwords_makes_no_call() {
    let h = harness();
    let form = SignupForm {
        confirm_password: "different".into(),
        ..signup_form("ada@example.com")
    };

    let err = h.app.accounts().sign_up(&form).await.unwrap_err();
    assert_eq!(err.user_message(), "Passwords do not match.");
    assert_eq!(h.auth.calls(), 0);
    assert_eq!(h.store.writes(), 0);
}

#[tokio::test]
async fn signup_with_missing_field_makes_no_call() {
    let h = harness();
    let form = SignupForm {
        address: String::new(),
        ..signup_form("ada@example.com")
    };

    let err = h.app.accounts().sign_up(&form).await.unwrap_err();
    assert_eq!(err.user_message(), "All fields are required.");
    assert_eq!(h.auth.calls(), 0);
}

#[tokio::test]
async fn signup_stores_profile_alongside_favorites() {
    let h = harness();
    let ctx = signed_in(&h, "ada@example.com").await;
    let favorites = Favorites::new(ctx.clone());
    favorites.load().await.unwrap();
    favorites.toggle("r1").await.unwrap();

    let profile = h.app.accounts().profile(&ctx).await.unwrap().unwrap();
    assert_eq!(profile.uid, ctx.user_id());
    assert_eq!(profile.name, "Ada");
    assert_eq!(profile.phone.as_deref(), Some("+44 7700 900000"));
    assert_eq!(profile.favorites, vec!["r1".to_string()]);
}

/// Auth stub that always hands out the same identity
struct FixedAuth;

#[async_trait]
impl AuthProvider for FixedAuth {
    async fn sign_up(&self, email: &str, _password: &str) -> Result<Session> {
        Ok(Session::new(
            "token".into(),
            "refresh".into(),
            SessionUser {
                id: "u1".into(),
                email: Some(email.to_string()),
            },
            Some(3600),
        ))
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        self.sign_up(email, password).await
    }

    async fn sign_out(&self, _session: &Session) -> Result<()> {
        Ok(())
    }

    async fn reset_password_for_email(&self, _email: &str) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn signup_keeps_existing_favorites() {
    let store = MemoryStore::new();
    let mut existing = serde_json::Map::new();
    existing.insert("favorites".to_string(), serde_json::json!(["r9"]));
    store.upsert("users", "u1", existing).await.unwrap();

    let app = RecipeShare::with_backends(
        Arc::new(FixedAuth),
        Arc::new(store.clone()),
        ClientOptions::default(),
    );
    let session = app.accounts().sign_up(&signup_form("ada@example.com")).await.unwrap();
    let ctx = app.context(session);

    let profile = app.accounts().profile(&ctx).await.unwrap().unwrap();
    assert_eq!(profile.name, "Ada");
    assert_eq!(profile.favorites, vec!["r9".to_string()]);
    assert!(Favorites::new(ctx).load().await.unwrap().contains("r9"));
}

#[tokio::test]
async fn login_failures_are_classified() {
    let h = harness();
    signed_in(&h, "ada@example.com").await;
    let accounts = h.app.accounts();

    let wrong = accounts.sign_in("ada@example.com", "nope").await.unwrap_err();
    assert!(matches!(wrong, LoginFailure::InvalidCredentials));
    assert_eq!(wrong.message(), "Please check your credentials and try again.");

    let unknown = accounts.sign_in("ghost@example.com", "secret1").await.unwrap_err();
    assert!(matches!(unknown, LoginFailure::InvalidCredentials));

    let session = accounts.sign_in("ada@example.com", "secret1").await.unwrap();
    accounts.sign_out(&session).await.unwrap();
}

#[tokio::test]
async fn reset_password_requires_email() {
    let h = harness();
    let accounts = h.app.accounts();

    let err = accounts.reset_password("  ").await.unwrap_err();
    assert!(err.is_validation());
    assert_eq!(h.auth.calls(), 0);

    accounts.reset_password("ada@example.com").await.unwrap();
    assert_eq!(h.auth.reset_requests(), vec!["ada@example.com".to_string()]);
}

#[tokio::test]
async fn navigation_follows_login_flow() {
    let h = harness();
    let mut nav = Navigator::new();
    assert_eq!(nav.current(), &Route::Login);

    let session = match h.app.accounts().sign_in("nobody@example.com", "secret1").await {
        Ok(session) => Some(session),
        Err(_) => None,
    };
    assert!(session.is_none());
    assert_eq!(nav.current(), &Route::Login);

    nav.navigate(Route::Signup);
    h.app
        .accounts()
        .sign_up(&signup_form("ada@example.com"))
        .await
        .unwrap();
    nav.replace(Route::Home);
    assert_eq!(nav.current(), &Route::Home);

    nav.navigate(Route::AddRecipe);
    assert!(nav.go_back());
    assert_eq!(nav.current(), &Route::Home);
}
