//! Table definitions and row-level security for the backend.
//!
//! Ownership of recipes and profiles is enforced here, by the database,
//! rather than by the client.

use std::fmt;

use crate::config::ClientOptions;

/// SQL command an RLS policy restricts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RlsCommand {
    All,
    Select,
    Insert,
    Update,
    Delete,
}

impl fmt::Display for RlsCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RlsCommand::All => write!(f, "ALL"),
            RlsCommand::Select => write!(f, "SELECT"),
            RlsCommand::Insert => write!(f, "INSERT"),
            RlsCommand::Update => write!(f, "UPDATE"),
            RlsCommand::Delete => write!(f, "DELETE"),
        }
    }
}

/// Role an RLS policy applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RlsRole {
    Authenticated,
    Anon,
}

impl fmt::Display for RlsRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RlsRole::Authenticated => write!(f, "authenticated"),
            RlsRole::Anon => write!(f, "anon"),
        }
    }
}

/// A row-level security policy
#[derive(Debug, Clone)]
pub struct RlsPolicy {
    pub name: String,
    pub schema: String,
    pub table: String,
    pub command: RlsCommand,
    pub role: RlsRole,
    /// `USING` expression; rows it rejects are invisible to the command
    pub using: Option<String>,
    /// `WITH CHECK` expression for inserted or updated rows
    pub check: Option<String>,
}

impl RlsPolicy {
    pub fn create_policy_sql(&self) -> String {
        let using = self
            .using
            .as_ref()
            .map_or(String::new(), |u| format!(" USING ({})", u));
        let check = self
            .check
            .as_ref()
            .map_or(String::new(), |c| format!(" WITH CHECK ({})", c));
        format!(
            "CREATE POLICY \"{name}\" ON \"{schema}\".\"{table}\" FOR {command} TO {role}{using}{check};",
            name = self.name,
            schema = self.schema,
            table = self.table,
            command = self.command,
            role = self.role,
            using = using,
            check = check,
        )
    }

    pub fn drop_policy_sql(&self) -> String {
        format!(
            "DROP POLICY IF EXISTS \"{}\" ON \"{}\".\"{}\";",
            self.name, self.schema, self.table
        )
    }
}

pub fn enable_rls_sql(schema: &str, table: &str) -> String {
    format!(
        "ALTER TABLE \"{}\".\"{}\" ENABLE ROW LEVEL SECURITY;",
        schema, table
    )
}

const OWNER_IS_CALLER: &str = "auth.uid()::text = \"userId\"";
const ROW_IS_CALLER: &str = "auth.uid()::text = id";

fn policy(
    options: &ClientOptions,
    table: &str,
    name: &str,
    command: RlsCommand,
    using: Option<&str>,
    check: Option<&str>,
) -> RlsPolicy {
    RlsPolicy {
        name: name.to_string(),
        schema: options.db_schema.clone(),
        table: table.to_string(),
        command,
        role: RlsRole::Authenticated,
        using: using.map(str::to_string),
        check: check.map(str::to_string),
    }
}

/// Policies: everyone signed in reads every recipe, only the owner writes
/// it; a profile is visible and writable only by its user.
pub fn policies(options: &ClientOptions) -> Vec<RlsPolicy> {
    let recipes = options.recipes_collection.as_str();
    let users = options.users_collection.as_str();
    vec![
        policy(options, recipes, "recipes are readable", RlsCommand::Select, Some("true"), None),
        policy(options, recipes, "owners insert recipes", RlsCommand::Insert, None, Some(OWNER_IS_CALLER)),
        policy(
            options,
            recipes,
            "owners update recipes",
            RlsCommand::Update,
            Some(OWNER_IS_CALLER),
            Some(OWNER_IS_CALLER),
        ),
        policy(options, recipes, "owners delete recipes", RlsCommand::Delete, Some(OWNER_IS_CALLER), None),
        policy(
            options,
            users,
            "users manage own profile",
            RlsCommand::All,
            Some(ROW_IS_CALLER),
            Some(ROW_IS_CALLER),
        ),
    ]
}

/// Full setup script: tables, RLS, policies and realtime publication
pub fn schema_sql(options: &ClientOptions) -> String {
    let schema = options.db_schema.as_str();
    let recipes = options.recipes_collection.as_str();
    let users = options.users_collection.as_str();

    let mut statements = vec![
        format!(
            "CREATE TABLE IF NOT EXISTS \"{schema}\".\"{recipes}\" (\n\
             \x20   id text PRIMARY KEY,\n\
             \x20   title text NOT NULL,\n\
             \x20   ingredients text NOT NULL,\n\
             \x20   instructions text NOT NULL,\n\
             \x20   category text NOT NULL,\n\
             \x20   \"imageUrl\" text,\n\
             \x20   \"userId\" text NOT NULL DEFAULT auth.uid()::text,\n\
             \x20   \"createdAt\" timestamptz NOT NULL DEFAULT now()\n\
             );"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS \"{recipes}_category_idx\" ON \"{schema}\".\"{recipes}\" (category);"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS \"{recipes}_user_idx\" ON \"{schema}\".\"{recipes}\" (\"userId\");"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS \"{schema}\".\"{users}\" (\n\
             \x20   id text PRIMARY KEY,\n\
             \x20   uid text,\n\
             \x20   name text,\n\
             \x20   email text,\n\
             \x20   \"phoneNumber\" text,\n\
             \x20   address text,\n\
             \x20   country text,\n\
             \x20   favorites jsonb NOT NULL DEFAULT '[]'::jsonb\n\
             );"
        ),
        enable_rls_sql(schema, recipes),
        enable_rls_sql(schema, users),
    ];
    for policy in policies(options) {
        statements.push(policy.drop_policy_sql());
        statements.push(policy.create_policy_sql());
    }
    statements.push(format!(
        "ALTER PUBLICATION supabase_realtime ADD TABLE \"{schema}\".\"{recipes}\";"
    ));
    statements.join("\n")
}
