//! Creating, editing and deleting recipes

use chrono::Utc;
use log::{error, info};
use serde_json::json;

use crate::context::UserContext;
use crate::error::{Error, Result};
use crate::models::{Recipe, RecipeInput};
use crate::store::FieldUpdate;

/// Recipe writes on behalf of the signed-in user.
///
/// Input is validated before any request is made. Ownership is enforced by
/// the backend; a write to someone else's recipe comes back as an error.
#[derive(Debug, Clone)]
pub struct Recipes {
    ctx: UserContext,
}

impl Recipes {
    pub fn new(ctx: UserContext) -> Self {
        Self { ctx }
    }

    fn collection(&self) -> &str {
        &self.ctx.collections().recipes
    }

    /// Store a new recipe owned by the signed-in user
    pub async fn add(&self, input: &RecipeInput) -> Result<Recipe> {
        input.validate()?;

        let mut data = input.to_fields();
        data.insert("userId".to_string(), json!(self.ctx.user_id()));
        data.insert("createdAt".to_string(), json!(Utc::now()));

        let doc = self
            .ctx
            .store()
            .add(self.collection(), data)
            .await
            .map_err(|e| {
                error!("Error adding recipe: {}", e);
                e
            })?;
        let recipe: Recipe = doc.decode()?;
        info!("Added recipe {} ({})", recipe.id, recipe.title);
        Ok(recipe)
    }

    /// Replace the editable fields of a recipe
    pub async fn update(&self, id: &str, input: &RecipeInput) -> Result<()> {
        input.validate()?;

        let updates = input
            .to_fields()
            .into_iter()
            .map(|(field, value)| FieldUpdate::Set(field, value))
            .collect();
        self.ctx
            .store()
            .update(self.collection(), id, updates)
            .await
            .map_err(|e| {
                error!("Failed to update recipe {}: {}", id, e);
                e
            })?;
        info!("Updated recipe {}", id);
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.ctx
            .store()
            .delete(self.collection(), id)
            .await
            .map_err(|e| {
                error!("Error deleting recipe {}: {}", id, e);
                e
            })?;
        info!("Deleted recipe {}", id);
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Recipe> {
        self.ctx
            .store()
            .get(self.collection(), id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("recipe {}", id)))?
            .decode()
    }
}
