//! Text search over a loaded recipe list

use crate::models::Recipe;

/// Whether `recipe` matches an already normalized (trimmed, lowercase) needle
fn matches(recipe: &Recipe, needle: &str) -> bool {
    recipe.title.to_lowercase().contains(needle) || recipe.category.to_lowercase().contains(needle)
}

/// Keep recipes whose title or category contains `search`, ignoring case.
///
/// Order is preserved; blank search returns the list unchanged.
pub fn filter_recipes(recipes: &[Recipe], search: &str) -> Vec<Recipe> {
    let needle = search.trim().to_lowercase();
    if needle.is_empty() {
        return recipes.to_vec();
    }
    recipes
        .iter()
        .filter(|recipe| matches(recipe, &needle))
        .cloned()
        .collect()
}
