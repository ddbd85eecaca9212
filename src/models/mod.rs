//! Records the app reads and writes

mod profile;
mod recipe;

pub use profile::UserProfile;
pub use recipe::{CategoryFilter, Recipe, RecipeInput, CATEGORIES};
