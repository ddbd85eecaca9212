use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

use crate::error::{Error, Result};
use crate::store::Fields;

/// Categories offered by the recipe forms and the home screen filter
pub const CATEGORIES: [&str; 5] = ["Veg", "Non-Veg", "Starter", "Drinks", "Dessert"];

/// A shared recipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RecipeRecord")]
pub struct Recipe {
    /// Assigned by the store
    pub id: String,
    pub title: String,
    pub ingredients: String,
    pub instructions: String,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Owner
    pub user_id: String,
    /// Absent on legacy records
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Stored shape; older records carry the image under `image`
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecipeRecord {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    ingredients: String,
    #[serde(default)]
    instructions: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl From<RecipeRecord> for Recipe {
    fn from(record: RecipeRecord) -> Self {
        Self {
            id: record.id,
            title: record.title,
            ingredients: record.ingredients,
            instructions: record.instructions,
            category: record.category,
            image_url: non_empty(record.image_url).or_else(|| non_empty(record.image)),
            user_id: record.user_id,
            created_at: record.created_at,
        }
    }
}

impl Recipe {
    /// Whether `user_id` may be offered edit and delete
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        !self.user_id.is_empty() && self.user_id == user_id
    }
}

impl fmt::Display for Recipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.title, self.category)
    }
}

/// The editable part of a recipe, as filled in by the add and edit forms
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipeInput {
    pub title: String,
    pub ingredients: String,
    pub instructions: String,
    pub category: String,
    pub image_url: String,
}

impl RecipeInput {
    pub fn new(title: &str, ingredients: &str, instructions: &str, category: &str) -> Self {
        Self {
            title: title.to_string(),
            ingredients: ingredients.to_string(),
            instructions: instructions.to_string(),
            category: category.to_string(),
            image_url: String::new(),
        }
    }

    pub fn with_image_url(mut self, image_url: &str) -> Self {
        self.image_url = image_url.to_string();
        self
    }

    /// Every field except the image is required
    pub fn validate(&self) -> Result<()> {
        let required = [
            &self.title,
            &self.ingredients,
            &self.instructions,
            &self.category,
        ];
        if required.iter().any(|field| field.trim().is_empty()) {
            return Err(Error::validation("All fields are required (except image)."));
        }
        Ok(())
    }

    /// Stored fields, trimmed; a blank image clears it
    pub fn to_fields(&self) -> Fields {
        let image = self.image_url.trim();
        let mut fields = Fields::new();
        fields.insert("title".into(), json!(self.title.trim()));
        fields.insert("ingredients".into(), json!(self.ingredients.trim()));
        fields.insert("instructions".into(), json!(self.instructions.trim()));
        fields.insert("category".into(), json!(self.category.trim()));
        fields.insert(
            "imageUrl".into(),
            if image.is_empty() { Value::Null } else { json!(image) },
        );
        fields
    }
}

impl From<&Recipe> for RecipeInput {
    fn from(recipe: &Recipe) -> Self {
        Self {
            title: recipe.title.clone(),
            ingredients: recipe.ingredients.clone(),
            instructions: recipe.instructions.clone(),
            category: recipe.category.clone(),
            image_url: recipe.image_url.clone().unwrap_or_default(),
        }
    }
}

/// Category selector of the catalog
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CategoryFilter {
    #[default]
    All,
    Only(String),
}

impl CategoryFilter {
    /// `All` for empty input or the "All" pill, otherwise an exact category
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty() || value == "All" {
            CategoryFilter::All
        } else {
            CategoryFilter::Only(value.to_string())
        }
    }

    pub fn as_category(&self) -> Option<&str> {
        match self {
            CategoryFilter::All => None,
            CategoryFilter::Only(category) => Some(category),
        }
    }
}

impl From<&str> for CategoryFilter {
    fn from(value: &str) -> Self {
        CategoryFilter::parse(value)
    }
}
