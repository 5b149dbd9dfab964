mod schema;
pub mod migrate;
pub mod models;
pub mod seed;
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "postgres")]
pub mod postgres_schema;
#[cfg(feature = "postgres")]
pub mod transfer;

use anyhow::Result;
use chrono::{NaiveDate, NaiveDateTime};

pub use migrate::{AdminAccount, MigrationReport, DEFAULT_ADMIN_EMAIL};
pub use models::{
    BoundingBox, DetectedIngredient, Ingredient, InventoryAction, InventoryEntry, InventoryUpdate,
    MealType, NewIngredient, NewRecipe, NewStep, NewUser, PlanEntry, Preference, Recipe,
    RecipeStep, Role, Suggestion, Token, User, WeekPlan,
};
pub use schema::{ADD_ROL_COLUMN, SCHEMA, TABLE_ORDER};
pub use seed::{SeedOptions, SeedReport};

use crate::config::{DatabaseConfig, DatabaseType};
use crate::planner::WeekSuggestions;

/// Macro to dispatch a method call to the active backend variant.
macro_rules! dispatch {
    // No arguments beyond self
    ($self:expr, $method:ident()) => {
        match &$self.inner {
            DatabaseInner::Sqlite(db) => db.$method(),
            #[cfg(feature = "postgres")]
            DatabaseInner::Postgres(db) => db.$method(),
        }
    };
    // With arguments
    ($self:expr, $method:ident($($arg:expr),+ $(,)?)) => {
        match &$self.inner {
            DatabaseInner::Sqlite(db) => db.$method($($arg),+),
            #[cfg(feature = "postgres")]
            DatabaseInner::Postgres(db) => db.$method($($arg),+),
        }
    };
}

enum DatabaseInner {
    Sqlite(sqlite::SqliteDb),
    #[cfg(feature = "postgres")]
    Postgres(postgres::PgDb),
}

pub struct Database {
    inner: DatabaseInner,
}

impl Database {
    /// Open a database connection based on the provided configuration.
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        if config.backend == DatabaseType::Postgresql {
            #[cfg(feature = "postgres")]
            {
                let url = config.postgresql_url.as_deref()
                    .ok_or_else(|| anyhow::anyhow!("PostgreSQL URL not configured"))?;
                let pool_size = config.pool_size.unwrap_or(10);
                let pg = postgres::PgDb::open(url, pool_size)?;
                return Ok(Self { inner: DatabaseInner::Postgres(pg) });
            }
            #[cfg(not(feature = "postgres"))]
            anyhow::bail!("PostgreSQL backend selected but lazyfood was built without the `postgres` feature");
        }

        let db = sqlite::SqliteDb::open(&config.sqlite_path)?;
        Ok(Self { inner: DatabaseInner::Sqlite(db) })
    }

    /// Private SQLite database that lives as long as this handle.
    pub fn open_in_memory() -> Result<Self> {
        let db = sqlite::SqliteDb::open_in_memory()?;
        Ok(Self { inner: DatabaseInner::Sqlite(db) })
    }

    pub fn backend(&self) -> DatabaseType {
        match &self.inner {
            DatabaseInner::Sqlite(_) => DatabaseType::Sqlite,
            #[cfg(feature = "postgres")]
            DatabaseInner::Postgres(_) => DatabaseType::Postgresql,
        }
    }

    // ========================================================================
    // Schema lifecycle
    // ========================================================================

    pub fn create_schema(&self) -> Result<()> {
        dispatch!(self, create_schema())
    }

    pub fn initialize(&self) -> Result<()> {
        dispatch!(self, initialize())
    }

    pub fn has_column(&self, table: &str, column: &str) -> Result<bool> {
        dispatch!(self, has_column(table, column))
    }

    pub fn migrate(&self, admin: &AdminAccount) -> Result<MigrationReport> {
        dispatch!(self, migrate(admin))
    }

    pub fn seed(&self, options: &SeedOptions) -> Result<SeedReport> {
        dispatch!(self, seed(options))
    }

    pub fn table_counts(&self) -> Result<Vec<(String, i64)>> {
        dispatch!(self, table_counts())
    }

    // ========================================================================
    // Users
    // ========================================================================

    pub fn create_user(&self, user: &NewUser) -> Result<i64> {
        dispatch!(self, create_user(user))
    }

    pub fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        dispatch!(self, get_user(user_id))
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        dispatch!(self, find_user_by_email(email))
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        dispatch!(self, list_users())
    }

    pub fn set_user_active(&self, user_id: i64, active: bool) -> Result<()> {
        dispatch!(self, set_user_active(user_id, active))
    }

    pub fn set_user_role(&self, user_id: i64, role: Role) -> Result<()> {
        dispatch!(self, set_user_role(user_id, role))
    }

    pub fn set_reset_token(&self, user_id: i64, token: &str, expires_at: NaiveDateTime) -> Result<()> {
        dispatch!(self, set_reset_token(user_id, token, expires_at))
    }

    pub fn find_user_by_reset_token(&self, token: &str, now: NaiveDateTime) -> Result<Option<User>> {
        dispatch!(self, find_user_by_reset_token(token, now))
    }

    pub fn clear_reset_token(&self, user_id: i64) -> Result<()> {
        dispatch!(self, clear_reset_token(user_id))
    }

    pub fn delete_user(&self, user_id: i64) -> Result<bool> {
        dispatch!(self, delete_user(user_id))
    }

    // ========================================================================
    // Preferences
    // ========================================================================

    pub fn upsert_preference(&self, user_id: i64, preference: &Preference) -> Result<()> {
        dispatch!(self, upsert_preference(user_id, preference))
    }

    pub fn get_preference(&self, user_id: i64) -> Result<Option<Preference>> {
        dispatch!(self, get_preference(user_id))
    }

    // ========================================================================
    // Ingredients and inventory
    // ========================================================================

    pub fn create_ingredient(&self, ingredient: &NewIngredient) -> Result<i64> {
        dispatch!(self, create_ingredient(ingredient))
    }

    pub fn find_ingredient_by_name(&self, name: &str) -> Result<Option<Ingredient>> {
        dispatch!(self, find_ingredient_by_name(name))
    }

    pub fn ingredients_by_category(&self, category: &str) -> Result<Vec<Ingredient>> {
        dispatch!(self, ingredients_by_category(category))
    }

    pub fn list_ingredients(&self) -> Result<Vec<Ingredient>> {
        dispatch!(self, list_ingredients())
    }

    pub fn record_detection(&self, user_id: i64, detected: &DetectedIngredient) -> Result<InventoryUpdate> {
        dispatch!(self, record_detection(user_id, detected))
    }

    /// Record a batch of detections. Entries that fail validation are
    /// returned alongside their error instead of aborting the batch.
    pub fn record_detections(
        &self,
        user_id: i64,
        detections: &[DetectedIngredient],
    ) -> Result<(Vec<InventoryUpdate>, Vec<(String, anyhow::Error)>)> {
        let mut updates = Vec::new();
        let mut rejected = Vec::new();
        for detected in detections {
            match self.record_detection(user_id, detected) {
                Ok(update) => updates.push(update),
                Err(e) if e.downcast_ref::<crate::error::ValidationError>().is_some() => {
                    rejected.push((detected.name.clone(), e));
                }
                Err(e) => return Err(e),
            }
        }
        Ok((updates, rejected))
    }

    pub fn update_inventory_quantity(&self, user_id: i64, ingredient_id: i64, quantity: f64) -> Result<bool> {
        dispatch!(self, update_inventory_quantity(user_id, ingredient_id, quantity))
    }

    pub fn remove_inventory_item(&self, user_id: i64, ingredient_id: i64) -> Result<bool> {
        dispatch!(self, remove_inventory_item(user_id, ingredient_id))
    }

    pub fn inventory_for_user(&self, user_id: i64) -> Result<Vec<InventoryEntry>> {
        dispatch!(self, inventory_for_user(user_id))
    }

    // ========================================================================
    // Recipes and steps
    // ========================================================================

    pub fn create_recipe(&self, recipe: &NewRecipe) -> Result<i64> {
        dispatch!(self, create_recipe(recipe))
    }

    pub fn find_or_create_recipe(&self, recipe: &NewRecipe) -> Result<i64> {
        dispatch!(self, find_or_create_recipe(recipe))
    }

    pub fn get_recipe(&self, recipe_id: i64) -> Result<Option<Recipe>> {
        dispatch!(self, get_recipe(recipe_id))
    }

    pub fn list_recipes(&self) -> Result<Vec<Recipe>> {
        dispatch!(self, list_recipes())
    }

    pub fn delete_recipe(&self, recipe_id: i64) -> Result<bool> {
        dispatch!(self, delete_recipe(recipe_id))
    }

    pub fn recipe_steps(&self, recipe_id: i64) -> Result<Vec<RecipeStep>> {
        dispatch!(self, recipe_steps(recipe_id))
    }

    pub fn replace_recipe_steps(&self, recipe_id: i64, steps: &[NewStep]) -> Result<Vec<RecipeStep>> {
        dispatch!(self, replace_recipe_steps(recipe_id, steps))
    }

    // ========================================================================
    // Suggestions
    // ========================================================================

    pub fn record_suggestion(&self, user_id: i64, recipe_id: i64, match_percentage: f64) -> Result<i64> {
        dispatch!(self, record_suggestion(user_id, recipe_id, match_percentage))
    }

    pub fn suggestion_history(&self, user_id: i64, limit: usize) -> Result<Vec<Suggestion>> {
        dispatch!(self, suggestion_history(user_id, limit))
    }

    // ========================================================================
    // Planner
    // ========================================================================

    pub fn set_plan_entry(
        &self,
        user_id: i64,
        date: NaiveDate,
        meal: MealType,
        recipe_id: Option<i64>,
        suggested: bool,
    ) -> Result<i64> {
        dispatch!(self, set_plan_entry(user_id, date, meal, recipe_id, suggested))
    }

    pub fn week_plan(&self, user_id: i64, start: NaiveDate) -> Result<WeekPlan> {
        dispatch!(self, week_plan(user_id, start))
    }

    pub fn clear_week(&self, user_id: i64, start: NaiveDate) -> Result<usize> {
        dispatch!(self, clear_week(user_id, start))
    }

    pub fn apply_week_plan(&self, user_id: i64, start: NaiveDate, suggestions: &WeekSuggestions) -> Result<usize> {
        dispatch!(self, apply_week_plan(user_id, start, suggestions))
    }

    // ========================================================================
    // Tokens
    // ========================================================================

    pub fn store_token(&self, user_id: i64, jwt: &str, expires_at: NaiveDateTime) -> Result<i64> {
        dispatch!(self, store_token(user_id, jwt, expires_at))
    }

    pub fn tokens_for_user(&self, user_id: i64) -> Result<Vec<Token>> {
        dispatch!(self, tokens_for_user(user_id))
    }

    pub fn purge_expired_tokens(&self, now: NaiveDateTime) -> Result<usize> {
        dispatch!(self, purge_expired_tokens(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_detections_collects_rejections() {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        let user = db
            .create_user(&NewUser::new("Ana Torres", "ana@lazyfood.com", "hash"))
            .unwrap();

        let detections = vec![
            DetectedIngredient {
                name: "tomate".to_string(),
                quantity: Some(2.0),
                ..Default::default()
            },
            DetectedIngredient {
                name: "  ".to_string(),
                ..Default::default()
            },
            DetectedIngredient {
                name: "Tomate".to_string(),
                quantity: Some(3.0),
                ..Default::default()
            },
        ];

        let (updates, rejected) = db.record_detections(user, &detections).unwrap();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].action, InventoryAction::Added);
        assert_eq!(updates[1].action, InventoryAction::Updated);
        assert_eq!(rejected.len(), 1);
        assert_eq!(db.inventory_for_user(user).unwrap()[0].quantity, 3.0);
    }

    #[test]
    fn test_in_memory_backend_is_sqlite() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.backend(), DatabaseType::Sqlite);
    }

    #[cfg(not(feature = "postgres"))]
    #[test]
    fn test_postgres_requires_feature() {
        let config = DatabaseConfig {
            backend: DatabaseType::Postgresql,
            postgresql_url: Some("postgresql://localhost/lazyfood_db".to_string()),
            ..Default::default()
        };
        assert!(Database::open(&config).is_err());
    }
}
