//! Screen destinations and the stack navigator

use log::trace;

use crate::models::Recipe;

/// A screen and the parameters it is opened with
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    Login,
    Signup,
    Home,
    AddRecipe,
    EditRecipe(Recipe),
    RecipeDetail(Recipe),
    Profile,
    MyRecipes,
    MyFavorites,
}

impl Route {
    pub fn name(&self) -> &'static str {
        match self {
            Route::Login => "Login",
            Route::Signup => "Signup",
            Route::Home => "Home",
            Route::AddRecipe => "AddRecipe",
            Route::EditRecipe(_) => "EditRecipe",
            Route::RecipeDetail(_) => "RecipeDetail",
            Route::Profile => "Profile",
            Route::MyRecipes => "MyRecipes",
            Route::MyFavorites => "MyFavorites",
        }
    }

    /// The recipe handed to the screen, if any
    pub fn recipe(&self) -> Option<&Recipe> {
        match self {
            Route::EditRecipe(recipe) | Route::RecipeDetail(recipe) => Some(recipe),
            _ => None,
        }
    }
}

/// Stack of open screens.
///
/// Parameters flow one way, into the screen being opened; a screen never
/// hands a result back to the one below it.
#[derive(Debug, Clone)]
pub struct Navigator {
    stack: Vec<Route>,
}

impl Default for Navigator {
    fn default() -> Self {
        Self::new()
    }
}

impl Navigator {
    /// A navigator showing the login screen
    pub fn new() -> Self {
        Self {
            stack: vec![Route::Login],
        }
    }

    pub fn current(&self) -> &Route {
        // The stack always holds the root screen
        &self.stack[self.stack.len() - 1]
    }

    /// Open a screen on top of the current one
    pub fn navigate(&mut self, route: Route) {
        trace!("navigate {} -> {}", self.current().name(), route.name());
        self.stack.push(route);
    }

    /// Swap the current screen, e.g. after login or logout
    pub fn replace(&mut self, route: Route) {
        trace!("replace {} -> {}", self.current().name(), route.name());
        let last = self.stack.len() - 1;
        self.stack[last] = route;
    }

    /// Close the current screen; returns `false` at the root
    pub fn go_back(&mut self) -> bool {
        if self.stack.len() <= 1 {
            return false;
        }
        self.stack.pop();
        true
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipe() -> Recipe {
        Recipe {
            id: "r1".into(),
            title: "Dal".into(),
            ingredients: "lentils".into(),
            instructions: "boil".into(),
            category: "Veg".into(),
            image_url: None,
            user_id: "u1".into(),
            created_at: None,
        }
    }

    #[test]
    fn test_starts_at_login_and_never_pops_root() {
        let mut nav = Navigator::new();
        assert_eq!(nav.current(), &Route::Login);
        assert!(!nav.go_back());
        assert_eq!(nav.depth(), 1);
    }

    #[test]
    fn test_login_flow() {
        let mut nav = Navigator::new();
        nav.navigate(Route::Signup);
        nav.replace(Route::Home);
        assert_eq!(nav.current(), &Route::Home);
        assert_eq!(nav.depth(), 2);

        nav.navigate(Route::RecipeDetail(recipe()));
        assert_eq!(nav.current().recipe().map(|r| r.id.as_str()), Some("r1"));
        nav.navigate(Route::EditRecipe(recipe()));
        assert_eq!(nav.current().name(), "EditRecipe");

        assert!(nav.go_back());
        assert!(nav.go_back());
        assert_eq!(nav.current(), &Route::Home);
    }

    #[test]
    fn test_logout_replaces_with_login() {
        let mut nav = Navigator::new();
        nav.replace(Route::Home);
        nav.navigate(Route::Profile);
        nav.replace(Route::Login);
        assert_eq!(nav.current(), &Route::Login);
    }
}
