use anyhow::Context;
use clap::{Parser, Subcommand};
use recipe_share::prelude::*;
use recipe_share::catalog::{catalog_live_query, recipes_from, subscribe_my_recipes};
use recipe_share::schema::schema_sql;

#[derive(Parser, Debug)]
#[clap(name = "recipe-share", version)]
#[clap(about = "Browse and share recipes", long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,

    /// Use the in-memory backend with a demo account instead of SUPABASE_URL
    #[clap(long)]
    offline: bool,

    /// Account email; falls back to RECIPE_SHARE_EMAIL
    #[clap(long)]
    email: Option<String>,

    /// Account password; falls back to RECIPE_SHARE_PASSWORD
    #[clap(long)]
    password: Option<String>,

    /// Output debug logs to stderr
    #[clap(long)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List recipes once
    List {
        /// Only this category (exact match)
        #[clap(long)]
        category: Option<String>,
        /// Case-insensitive text search over title and category
        #[clap(long)]
        search: Option<String>,
    },
    /// Print the catalog every time it changes
    Watch {
        #[clap(long)]
        category: Option<String>,
        #[clap(long)]
        search: Option<String>,
    },
    /// Toggle a recipe in your favorites
    Favorite { id: String },
    /// List your favorite recipes
    Favorites,
    /// List your own recipes
    Mine,
    /// Add a recipe
    Add {
        #[clap(long)]
        title: String,
        #[clap(long)]
        ingredients: String,
        #[clap(long)]
        instructions: String,
        #[clap(long)]
        category: String,
        #[clap(long)]
        image_url: Option<String>,
    },
    /// Show your profile
    Profile,
    /// Print the SQL that sets up tables and access policies
    Schema,
}

const DEMO_EMAIL: &str = "demo@example.com";
const DEMO_PASSWORD: &str = "demo-password";

fn print_recipes(recipes: &[Recipe]) {
    if recipes.is_empty() {
        println!("No recipes found.");
        return;
    }
    for recipe in recipes {
        println!("{}  {}", recipe.id, recipe);
    }
}

async fn seed_demo(app: &RecipeShare) -> anyhow::Result<Session> {
    let accounts = app.accounts();
    let session = accounts
        .sign_up(&SignupForm {
            name: "Demo Cook".into(),
            email: DEMO_EMAIL.into(),
            password: DEMO_PASSWORD.into(),
            confirm_password: DEMO_PASSWORD.into(),
            phone: String::new(),
            address: "1 Demo Street".into(),
            country: "Nowhere".into(),
        })
        .await?;

    let recipes = Recipes::new(app.context(session.clone()));
    for (title, ingredients, instructions, category) in [
        ("Veg Biryani", "rice, vegetables, spices", "layer and steam", "Veg"),
        ("Butter Chicken", "chicken, butter, tomato", "marinate, cook, simmer", "Non-Veg"),
        ("Mango Lassi", "mango, yogurt, sugar", "blend", "Drinks"),
        ("Chocolate Cake", "flour, cocoa, eggs", "mix and bake", "Dessert"),
    ] {
        recipes
            .add(&RecipeInput::new(title, ingredients, instructions, category))
            .await?;
    }
    Ok(session)
}

async fn sign_in(app: &RecipeShare, cli: &Cli) -> anyhow::Result<Session> {
    let email = cli
        .email
        .clone()
        .or_else(|| std::env::var("RECIPE_SHARE_EMAIL").ok())
        .ok_or_else(|| anyhow::anyhow!("--email or RECIPE_SHARE_EMAIL is required"))?;
    let password = cli
        .password
        .clone()
        .or_else(|| std::env::var("RECIPE_SHARE_PASSWORD").ok())
        .ok_or_else(|| anyhow::anyhow!("--password or RECIPE_SHARE_PASSWORD is required"))?;

    app.accounts()
        .sign_in(&email, &password)
        .await
        .map_err(|failure| anyhow::anyhow!("{}", failure))
}

async fn run() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let mut logger = pretty_env_logger::formatted_builder();
    if let Ok(filter) = std::env::var("RUST_LOG") {
        logger.parse_filters(&filter);
    }
    if cli.debug {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    if let Commands::Schema = cli.command {
        println!("{}", schema_sql(&ClientOptions::default()));
        return Ok(());
    }

    let (app, session) = if cli.offline {
        let app = RecipeShare::offline();
        let session = seed_demo(&app).await?;
        (app, session)
    } else {
        let app = RecipeShare::from_env().context("Failed to configure the backend")?;
        let session = sign_in(&app, &cli).await?;
        (app, session)
    };
    let ctx = app.context(session.clone());

    match cli.command {
        Commands::List { category, search } => {
            let category = CategoryFilter::parse(category.as_deref().unwrap_or(""));
            let docs = catalog_live_query(&ctx, &category).fetch().await?;
            let recipes = recipes_from(&docs);
            print_recipes(&filter_recipes(&recipes, search.as_deref().unwrap_or("")));
        }
        Commands::Watch { category, search } => {
            let mut view = CatalogView::new(ctx.clone());
            view.set_search(search.as_deref().unwrap_or(""));
            view.set_category(CategoryFilter::parse(category.as_deref().unwrap_or("")))
                .await;
            loop {
                tokio::select! {
                    more = view.next_update() => {
                        if !more {
                            break;
                        }
                        match view.last_error() {
                            Some(e) => eprintln!("{}", e.user_message()),
                            None => {
                                println!("--- {} recipes", view.visible().len());
                                print_recipes(&view.visible());
                            }
                        }
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
            view.close();
        }
        Commands::Favorite { id } => {
            let favorites = Favorites::new(ctx.clone());
            favorites.load().await?;
            let now_favorite = favorites.toggle(&id).await?;
            println!(
                "{} {} favorites",
                if now_favorite { "Added to" } else { "Removed from" },
                id
            );
        }
        Commands::Favorites => {
            let favorites = Favorites::new(ctx.clone());
            print_recipes(&favorites.favorite_recipes().await?);
        }
        Commands::Mine => {
            let mut subscription = subscribe_my_recipes(&ctx).await?;
            if let Some(recipes) = subscription.next_snapshot().await {
                print_recipes(&recipes?);
            }
        }
        Commands::Add {
            title,
            ingredients,
            instructions,
            category,
            image_url,
        } => {
            let input = RecipeInput::new(&title, &ingredients, &instructions, &category)
                .with_image_url(image_url.as_deref().unwrap_or(""));
            match Recipes::new(ctx.clone()).add(&input).await {
                Ok(recipe) => println!("Recipe added successfully! ({})", recipe.id),
                Err(e) => anyhow::bail!("{}", e.user_message()),
            }
        }
        Commands::Profile => match app.accounts().profile(&ctx).await? {
            Some(profile) => {
                println!("Name:    {}", profile.name);
                println!("Email:   {}", profile.email);
                println!("Phone:   {}", profile.phone.as_deref().unwrap_or("-"));
                println!("Address: {}", profile.address);
                println!("Country: {}", profile.country);
            }
            None => println!("No profile data found."),
        },
        Commands::Schema => {}
    }

    if !cli.offline {
        app.accounts().sign_out(&session).await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {:?}", e);
        std::process::exit(1);
    }
}
