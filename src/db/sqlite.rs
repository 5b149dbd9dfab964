//! SQLite backend implementation.

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime, Utc};
use rusqlite::functions::FunctionFlags;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::{debug, info, warn};

use super::migrate::{AdminAccount, MigrationReport};
use super::models::{
    number_steps, BoundingBox, DetectedIngredient, Ingredient, InventoryAction, InventoryEntry,
    InventoryUpdate, MealType, NewIngredient, NewRecipe, NewStep, NewUser, PlanEntry, Preference,
    Recipe, RecipeStep, Role, Suggestion, Token, User, WeekPlan,
};
use super::schema::{ADD_ROL_COLUMN, SCHEMA, TABLE_ORDER};
use super::seed::{self, SeedOptions, SeedReport};
use crate::error::{StoreError, ValidationError};
use crate::planner::{week_end, WeekSuggestions};
use crate::validation::{normalize_detection, title_case, validate_email, validate_name};

pub struct SqliteDb {
    pub(crate) conn: Connection,
}

const USER_COLUMNS: &str = "id, nombre, correo, password, rol, pais, fecha_creacion, \
                            nivel_cocina, metas_nutricionales, activo";

fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    let role: String = row.get(4)?;
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        role: Role::from_str(&role).unwrap_or_default(),
        country: row.get(5)?,
        created_at: row.get(6)?,
        cooking_level: row.get::<_, Option<i32>>(7)?.unwrap_or(1),
        nutrition_goals: row.get(8)?,
        active: row.get(9)?,
    })
}

fn row_to_ingredient(row: &rusqlite::Row) -> rusqlite::Result<Ingredient> {
    Ok(Ingredient {
        id: row.get(0)?,
        name: row.get(1)?,
        category: row.get(2)?,
        unit: row.get(3)?,
        emoji: row.get(4)?,
    })
}

fn row_to_recipe(row: &rusqlite::Row) -> rusqlite::Result<Recipe> {
    Ok(Recipe {
        id: row.get(0)?,
        name: row.get(1)?,
        prep_minutes: row.get(2)?,
        calories: row.get(3)?,
        difficulty: row.get::<_, Option<i32>>(4)?.unwrap_or(1),
        emoji: row.get(5)?,
        image_url: row.get(6)?,
    })
}

/// Name comparison key: trimmed, lowercased with full Unicode folding.
/// SQLite's built-in `lower()` only folds ASCII and would miss "BRÓCOLI".
fn register_fold_name(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "fold_name",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let value: Option<String> = ctx.get(0)?;
            Ok(value.map(|v| v.trim().to_lowercase()))
        },
    )
}

fn find_ingredient_by_name_in(conn: &Connection, name: &str) -> Result<Option<Ingredient>> {
    let ingredient = conn
        .query_row(
            "SELECT id, nombre, categoria, unidad, emoji FROM ingrediente
             WHERE fold_name(nombre) = fold_name(?1)
             ORDER BY id LIMIT 1",
            [name],
            row_to_ingredient,
        )
        .optional()?;
    Ok(ingredient)
}

fn recipe_id_by_name_in(conn: &Connection, name: &str) -> Result<Option<i64>> {
    let id = conn
        .query_row(
            "SELECT id FROM receta WHERE fold_name(nombre) = fold_name(?1) ORDER BY id LIMIT 1",
            [name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

fn insert_steps_in(conn: &Connection, recipe_id: i64, steps: &[RecipeStep]) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO paso_receta (receta_id, numero_paso, instruccion, temporizador_segundos)
         VALUES (?, ?, ?, ?)",
    )?;
    for step in steps {
        stmt.execute(params![
            recipe_id,
            step.number,
            step.instruction,
            step.timer_seconds
        ])?;
    }
    Ok(())
}

fn exists_in(conn: &Connection, sql: &str, id: i64) -> Result<bool> {
    let found: Option<i64> = conn.query_row(sql, [id], |row| row.get(0)).optional()?;
    Ok(found.is_some())
}

impl SqliteDb {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory: {}", parent.display())
                })?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite database: {}", path.display()))?;
        Self::configure(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::configure(Connection::open_in_memory()?)
    }

    fn configure(conn: Connection) -> Result<Self> {
        // Cascading deletes depend on this; SQLite leaves it off per connection.
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        register_fold_name(&conn)?;
        Ok(Self { conn })
    }

    // ========================================================================
    // Schema lifecycle
    // ========================================================================

    pub fn create_schema(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        debug!("SQLite schema applied ({} tables)", TABLE_ORDER.len());
        Ok(())
    }

    pub fn initialize(&self) -> Result<()> {
        self.create_schema()?;
        self.ensure_rol_column()?;
        Ok(())
    }

    pub fn has_column(&self, table: &str, column: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
            params![table, column],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn ensure_rol_column(&self) -> Result<bool> {
        if self.has_column("usuario", "rol")? {
            debug!("usuario.rol already present");
            return Ok(false);
        }
        self.conn.execute(ADD_ROL_COLUMN, [])?;
        info!("Added column usuario.rol");
        Ok(true)
    }

    pub fn migrate(&self, admin: &AdminAccount) -> Result<MigrationReport> {
        let rol_column_added = self.ensure_rol_column()?;

        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM usuario WHERE correo = ?",
                [&admin.email],
                |row| row.get(0),
            )
            .optional()?;

        let admin_created = match existing {
            Some(id) => {
                debug!("Admin {} already exists (id {})", admin.email, id);
                false
            }
            None => {
                self.conn.execute(
                    "INSERT INTO usuario (nombre, correo, password, rol, activo)
                     VALUES (?, ?, ?, 'admin', 1)",
                    params![admin.name, admin.email, admin.password_hash],
                )?;
                info!("Created default admin {}", admin.email);
                true
            }
        };

        Ok(MigrationReport {
            rol_column_added,
            admin_created,
        })
    }

    pub fn seed(&self, options: &SeedOptions) -> Result<SeedReport> {
        let tx = self.conn.unchecked_transaction()?;
        let mut report = SeedReport::default();

        for item in seed::SEED_INGREDIENTS {
            if find_ingredient_by_name_in(&tx, item.name)?.is_some() {
                continue;
            }
            tx.execute(
                "INSERT INTO ingrediente (nombre, categoria, unidad, emoji) VALUES (?, ?, ?, ?)",
                params![item.name, item.category, item.unit, item.emoji],
            )?;
            report.ingredients_added += 1;
        }

        for recipe in seed::SEED_RECIPES {
            if recipe_id_by_name_in(&tx, recipe.name)?.is_some() {
                continue;
            }
            tx.execute(
                "INSERT INTO receta (nombre, tiempo_preparacion, calorias, nivel_dificultad, emoji)
                 VALUES (?, ?, ?, ?, ?)",
                params![
                    recipe.name,
                    recipe.prep_minutes,
                    recipe.calories,
                    recipe.difficulty,
                    recipe.emoji
                ],
            )?;
            let recipe_id = tx.last_insert_rowid();
            let steps: Vec<NewStep> = recipe
                .steps
                .iter()
                .map(|(instruction, timer)| NewStep {
                    number: None,
                    instruction: instruction.to_string(),
                    timer_seconds: *timer,
                })
                .collect();
            let numbered = number_steps(&steps);
            insert_steps_in(&tx, recipe_id, &numbered)?;
            report.recipes_added += 1;
            report.steps_added += numbered.len();
        }

        if options.demo_data {
            let existing: Option<i64> = tx
                .query_row(
                    "SELECT id FROM usuario WHERE correo = ?",
                    [seed::DEMO_USER_EMAIL],
                    |row| row.get(0),
                )
                .optional()?;

            if existing.is_none() {
                tx.execute(
                    "INSERT INTO usuario (nombre, correo, password, pais, nivel_cocina)
                     VALUES (?, ?, ?, ?, 1)",
                    params![
                        seed::DEMO_USER_NAME,
                        seed::DEMO_USER_EMAIL,
                        seed::DEMO_USER_PASSWORD_HASH,
                        seed::DEMO_USER_COUNTRY
                    ],
                )?;
                let user_id = tx.last_insert_rowid();

                let preference = Preference {
                    diet: Some(seed::DEMO_DIET.to_string()),
                    allergies: seed::DEMO_ALLERGIES.iter().map(|s| s.to_string()).collect(),
                    likes: seed::DEMO_LIKES.iter().map(|s| s.to_string()).collect(),
                };
                tx.execute(
                    "INSERT INTO preferencia (usuario_id, dieta, alergias, gustos) VALUES (?, ?, ?, ?)",
                    params![
                        user_id,
                        preference.diet,
                        preference.allergies_json(),
                        preference.likes_json()
                    ],
                )?;

                for (name, quantity) in seed::DEMO_INVENTORY {
                    if let Some(ingredient) = find_ingredient_by_name_in(&tx, name)? {
                        tx.execute(
                            "INSERT INTO inventario (usuario_id, ingrediente_id, cantidad, confianza)
                             VALUES (?, ?, ?, 1.0)",
                            params![user_id, ingredient.id, quantity],
                        )?;
                    }
                }

                let (meal, recipe_name) = seed::DEMO_PLAN;
                if let Some(recipe_id) = recipe_id_by_name_in(&tx, recipe_name)? {
                    tx.execute(
                        "INSERT INTO planificador (usuario_id, fecha, tipo_comida, receta_id, es_sugerida)
                         VALUES (?, ?, ?, ?, 0)",
                        params![user_id, Utc::now().date_naive(), meal.as_str(), recipe_id],
                    )?;
                }
                report.demo_user_created = true;
            }
        }

        tx.commit()?;
        info!(
            "Seed applied: {} ingredients, {} recipes, {} steps, demo user: {}",
            report.ingredients_added,
            report.recipes_added,
            report.steps_added,
            report.demo_user_created
        );
        Ok(report)
    }

    pub fn table_counts(&self) -> Result<Vec<(String, i64)>> {
        let mut counts = Vec::with_capacity(TABLE_ORDER.len());
        for table in TABLE_ORDER {
            let count: i64 =
                self.conn
                    .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
            counts.push((table.to_string(), count));
        }
        Ok(counts)
    }

    // ========================================================================
    // Users
    // ========================================================================

    pub fn create_user(&self, user: &NewUser) -> Result<i64> {
        validate_name(&user.name)?;
        validate_email(&user.email)?;
        if user.password_hash.is_empty() {
            return Err(ValidationError::EmptyPasswordHash.into());
        }
        if self.find_user_by_email(&user.email)?.is_some() {
            return Err(StoreError::DuplicateEmail(user.email.clone()).into());
        }

        self.conn.execute(
            "INSERT INTO usuario (nombre, correo, password, rol, pais, nivel_cocina, metas_nutricionales)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                user.name,
                user.email,
                user.password_hash,
                user.role.as_str(),
                user.country,
                user.cooking_level,
                user.nutrition_goals
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!("Created user {} ({})", id, user.email);
        Ok(id)
    }

    pub fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                &format!("SELECT {} FROM usuario WHERE id = ?", USER_COLUMNS),
                [user_id],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                &format!("SELECT {} FROM usuario WHERE correo = ?", USER_COLUMNS),
                [email],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM usuario ORDER BY id", USER_COLUMNS))?;
        let users = stmt
            .query_map([], row_to_user)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    pub fn set_user_active(&self, user_id: i64, active: bool) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE usuario SET activo = ? WHERE id = ?",
            params![active, user_id],
        )?;
        if changed == 0 {
            return Err(StoreError::UserNotFound(user_id).into());
        }
        Ok(())
    }

    pub fn set_user_role(&self, user_id: i64, role: Role) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE usuario SET rol = ? WHERE id = ?",
            params![role.as_str(), user_id],
        )?;
        if changed == 0 {
            return Err(StoreError::UserNotFound(user_id).into());
        }
        Ok(())
    }

    pub fn set_reset_token(&self, user_id: i64, token: &str, expires_at: NaiveDateTime) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE usuario SET reset_token = ?, reset_token_expiration = ? WHERE id = ?",
            params![token, expires_at, user_id],
        )?;
        if changed == 0 {
            return Err(StoreError::UserNotFound(user_id).into());
        }
        Ok(())
    }

    pub fn find_user_by_reset_token(&self, token: &str, now: NaiveDateTime) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM usuario WHERE reset_token = ? AND reset_token_expiration > ?",
                    USER_COLUMNS
                ),
                params![token, now],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    pub fn clear_reset_token(&self, user_id: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE usuario SET reset_token = NULL, reset_token_expiration = NULL WHERE id = ?",
            [user_id],
        )?;
        Ok(())
    }

    pub fn delete_user(&self, user_id: i64) -> Result<bool> {
        let deleted = self.conn.execute("DELETE FROM usuario WHERE id = ?", [user_id])?;
        if deleted > 0 {
            info!("Deleted user {} and dependent rows", user_id);
        }
        Ok(deleted > 0)
    }

    fn require_user(&self, user_id: i64) -> Result<()> {
        if !exists_in(&self.conn, "SELECT id FROM usuario WHERE id = ?", user_id)? {
            return Err(StoreError::UserNotFound(user_id).into());
        }
        Ok(())
    }

    // ========================================================================
    // Preferences
    // ========================================================================

    pub fn upsert_preference(&self, user_id: i64, preference: &Preference) -> Result<()> {
        self.require_user(user_id)?;
        self.conn.execute(
            "INSERT INTO preferencia (usuario_id, dieta, alergias, gustos) VALUES (?, ?, ?, ?)
             ON CONFLICT(usuario_id) DO UPDATE SET
                dieta = excluded.dieta,
                alergias = excluded.alergias,
                gustos = excluded.gustos",
            params![
                user_id,
                preference.diet,
                preference.allergies_json(),
                preference.likes_json()
            ],
        )?;
        Ok(())
    }

    pub fn get_preference(&self, user_id: i64) -> Result<Option<Preference>> {
        let preference = self
            .conn
            .query_row(
                "SELECT dieta, alergias, gustos FROM preferencia WHERE usuario_id = ?",
                [user_id],
                |row| {
                    Ok(Preference {
                        diet: row.get(0)?,
                        allergies: Preference::set_from_json(row.get(1)?),
                        likes: Preference::set_from_json(row.get(2)?),
                    })
                },
            )
            .optional()?;
        Ok(preference)
    }

    // ========================================================================
    // Ingredients and inventory
    // ========================================================================

    pub fn create_ingredient(&self, ingredient: &NewIngredient) -> Result<i64> {
        if ingredient.name.trim().is_empty() {
            return Err(ValidationError::EmptyIngredientName.into());
        }
        self.conn.execute(
            "INSERT INTO ingrediente (nombre, categoria, unidad, emoji) VALUES (?, ?, ?, ?)",
            params![
                ingredient.name.trim(),
                ingredient.category,
                ingredient.unit,
                ingredient.emoji
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn find_ingredient_by_name(&self, name: &str) -> Result<Option<Ingredient>> {
        find_ingredient_by_name_in(&self.conn, name)
    }

    pub fn ingredients_by_category(&self, category: &str) -> Result<Vec<Ingredient>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, nombre, categoria, unidad, emoji FROM ingrediente
             WHERE categoria = ? ORDER BY nombre",
        )?;
        let ingredients = stmt
            .query_map([category], row_to_ingredient)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ingredients)
    }

    pub fn list_ingredients(&self) -> Result<Vec<Ingredient>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, nombre, categoria, unidad, emoji FROM ingrediente ORDER BY id")?;
        let ingredients = stmt
            .query_map([], row_to_ingredient)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ingredients)
    }

    pub fn record_detection(
        &self,
        user_id: i64,
        detected: &DetectedIngredient,
    ) -> Result<InventoryUpdate> {
        let detection = normalize_detection(detected)?;
        self.require_user(user_id)?;

        let tx = self.conn.unchecked_transaction()?;

        let ingredient = match find_ingredient_by_name_in(&tx, &detection.name)? {
            Some(mut existing) => {
                if existing.emoji.is_none() && detection.emoji.is_some() {
                    tx.execute(
                        "UPDATE ingrediente SET emoji = ? WHERE id = ?",
                        params![detection.emoji, existing.id],
                    )?;
                    existing.emoji = detection.emoji.clone();
                }
                existing
            }
            None => {
                let name = title_case(&detection.name);
                tx.execute(
                    "INSERT INTO ingrediente (nombre, categoria, unidad, emoji) VALUES (?, ?, ?, ?)",
                    params![name, detection.category, detection.unit, detection.emoji],
                )?;
                let id = tx.last_insert_rowid();
                debug!("Created ingredient {} ({})", id, name);
                Ingredient {
                    id,
                    name,
                    category: Some(detection.category.clone()),
                    unit: Some(detection.unit.clone()),
                    emoji: detection.emoji.clone(),
                }
            }
        };

        let existing: Option<(i64, Option<serde_json::Value>)> = tx
            .query_row(
                "SELECT id, bounding_box FROM inventario WHERE usuario_id = ? AND ingrediente_id = ?",
                params![user_id, ingredient.id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let (action, bounding_box) = match existing {
            Some((row_id, stored_box)) => {
                // A detection without a box keeps the previous one.
                let bounding_box = detection
                    .bounding_box
                    .or_else(|| BoundingBox::from_json(stored_box));
                tx.execute(
                    "UPDATE inventario
                     SET cantidad = ?, confianza = ?, bounding_box = ?,
                         fecha_actualizacion = CURRENT_TIMESTAMP
                     WHERE id = ?",
                    params![
                        detection.quantity,
                        detection.confidence,
                        bounding_box.map(|b| b.to_json()),
                        row_id
                    ],
                )?;
                (InventoryAction::Updated, bounding_box)
            }
            None => {
                tx.execute(
                    "INSERT INTO inventario (usuario_id, ingrediente_id, cantidad, confianza, bounding_box)
                     VALUES (?, ?, ?, ?, ?)",
                    params![
                        user_id,
                        ingredient.id,
                        detection.quantity,
                        detection.confidence,
                        detection.bounding_box.map(|b| b.to_json())
                    ],
                )?;
                (InventoryAction::Added, detection.bounding_box)
            }
        };

        tx.commit()?;

        Ok(InventoryUpdate {
            ingredient_id: ingredient.id,
            ingredient_name: ingredient.name,
            action,
            quantity: detection.quantity,
            confidence: detection.confidence,
            emoji: ingredient.emoji,
            bounding_box,
        })
    }

    pub fn update_inventory_quantity(
        &self,
        user_id: i64,
        ingredient_id: i64,
        quantity: f64,
    ) -> Result<bool> {
        if !quantity.is_finite() || quantity < 0.0 {
            return Err(ValidationError::InvalidQuantity {
                name: format!("ingredient {}", ingredient_id),
                value: quantity,
            }
            .into());
        }
        let changed = self.conn.execute(
            "UPDATE inventario SET cantidad = ?, fecha_actualizacion = CURRENT_TIMESTAMP
             WHERE usuario_id = ? AND ingrediente_id = ?",
            params![quantity, user_id, ingredient_id],
        )?;
        Ok(changed > 0)
    }

    pub fn remove_inventory_item(&self, user_id: i64, ingredient_id: i64) -> Result<bool> {
        let deleted = self.conn.execute(
            "DELETE FROM inventario WHERE usuario_id = ? AND ingrediente_id = ?",
            params![user_id, ingredient_id],
        )?;
        Ok(deleted > 0)
    }

    pub fn inventory_for_user(&self, user_id: i64) -> Result<Vec<InventoryEntry>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT inv.id, inv.usuario_id, inv.ingrediente_id, ing.nombre, ing.categoria,
                   ing.unidad, ing.emoji, inv.cantidad, inv.confianza, inv.bounding_box,
                   inv.fecha_actualizacion
            FROM inventario inv
            JOIN ingrediente ing ON ing.id = inv.ingrediente_id
            WHERE inv.usuario_id = ?
            ORDER BY ing.nombre
            "#,
        )?;
        let entries = stmt
            .query_map([user_id], |row| {
                Ok(InventoryEntry {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    ingredient_id: row.get(2)?,
                    ingredient_name: row.get(3)?,
                    category: row.get(4)?,
                    unit: row.get(5)?,
                    emoji: row.get(6)?,
                    quantity: row.get::<_, Option<f64>>(7)?.unwrap_or(0.0),
                    confidence: row.get::<_, Option<f64>>(8)?.unwrap_or(1.0),
                    bounding_box: BoundingBox::from_json(row.get(9)?),
                    updated_at: row.get(10)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    // ========================================================================
    // Recipes and steps
    // ========================================================================

    pub fn create_recipe(&self, recipe: &NewRecipe) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO receta (nombre, tiempo_preparacion, calorias, nivel_dificultad, emoji, imagen_url)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                recipe.name,
                recipe.prep_minutes,
                recipe.calories,
                recipe.difficulty,
                recipe.emoji,
                recipe.image_url
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn find_or_create_recipe(&self, recipe: &NewRecipe) -> Result<i64> {
        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM receta WHERE nombre = ? ORDER BY id LIMIT 1",
                [&recipe.name],
                |row| row.get(0),
            )
            .optional()?;
        match existing {
            Some(id) => Ok(id),
            None => self.create_recipe(recipe),
        }
    }

    pub fn get_recipe(&self, recipe_id: i64) -> Result<Option<Recipe>> {
        let recipe = self
            .conn
            .query_row(
                "SELECT id, nombre, tiempo_preparacion, calorias, nivel_dificultad, emoji, imagen_url
                 FROM receta WHERE id = ?",
                [recipe_id],
                row_to_recipe,
            )
            .optional()?;
        Ok(recipe)
    }

    pub fn list_recipes(&self) -> Result<Vec<Recipe>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, nombre, tiempo_preparacion, calorias, nivel_dificultad, emoji, imagen_url
             FROM receta ORDER BY id",
        )?;
        let recipes = stmt
            .query_map([], row_to_recipe)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(recipes)
    }

    pub fn delete_recipe(&self, recipe_id: i64) -> Result<bool> {
        let deleted = self.conn.execute("DELETE FROM receta WHERE id = ?", [recipe_id])?;
        Ok(deleted > 0)
    }

    pub fn recipe_steps(&self, recipe_id: i64) -> Result<Vec<RecipeStep>> {
        let mut stmt = self.conn.prepare(
            "SELECT numero_paso, instruccion, temporizador_segundos FROM paso_receta
             WHERE receta_id = ? ORDER BY numero_paso",
        )?;
        let steps = stmt
            .query_map([recipe_id], |row| {
                Ok(RecipeStep {
                    number: row.get(0)?,
                    instruction: row.get(1)?,
                    timer_seconds: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(steps)
    }

    pub fn replace_recipe_steps(&self, recipe_id: i64, steps: &[NewStep]) -> Result<Vec<RecipeStep>> {
        if !exists_in(&self.conn, "SELECT id FROM receta WHERE id = ?", recipe_id)? {
            return Err(StoreError::RecipeNotFound(recipe_id).into());
        }

        let numbered = number_steps(steps);
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM paso_receta WHERE receta_id = ?", [recipe_id])?;
        insert_steps_in(&tx, recipe_id, &numbered)?;
        tx.commit()?;

        debug!("Stored {} steps for recipe {}", numbered.len(), recipe_id);
        self.recipe_steps(recipe_id)
    }

    // ========================================================================
    // Suggestions
    // ========================================================================

    pub fn record_suggestion(&self, user_id: i64, recipe_id: i64, match_percentage: f64) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO sugerencia_receta (usuario_id, receta_id, porcentaje_coincidencia)
             VALUES (?, ?, ?)",
            params![user_id, recipe_id, match_percentage],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn suggestion_history(&self, user_id: i64, limit: usize) -> Result<Vec<Suggestion>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT s.id, s.usuario_id, s.receta_id, r.nombre, s.porcentaje_coincidencia, s.fecha
            FROM sugerencia_receta s
            JOIN receta r ON r.id = s.receta_id
            WHERE s.usuario_id = ?
            ORDER BY s.fecha DESC, s.id DESC
            LIMIT ?
            "#,
        )?;
        let suggestions = stmt
            .query_map(params![user_id, limit as i64], |row| {
                Ok(Suggestion {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    recipe_id: row.get(2)?,
                    recipe_name: row.get(3)?,
                    match_percentage: row.get::<_, Option<f64>>(4)?.unwrap_or(0.0),
                    created_at: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(suggestions)
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
        self.conn.execute(
            "INSERT INTO planificador (usuario_id, fecha, tipo_comida, receta_id, es_sugerida)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(usuario_id, fecha, tipo_comida) DO UPDATE SET
                receta_id = excluded.receta_id,
                es_sugerida = excluded.es_sugerida",
            params![user_id, date, meal.as_str(), recipe_id, suggested],
        )?;
        let id = self.conn.query_row(
            "SELECT id FROM planificador WHERE usuario_id = ? AND fecha = ? AND tipo_comida = ?",
            params![user_id, date, meal.as_str()],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn week_plan(&self, user_id: i64, start: NaiveDate) -> Result<WeekPlan> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT p.id, p.usuario_id, p.fecha, p.tipo_comida, p.receta_id, r.nombre, p.es_sugerida
            FROM planificador p
            LEFT JOIN receta r ON r.id = p.receta_id
            WHERE p.usuario_id = ? AND p.fecha BETWEEN ? AND ?
            ORDER BY p.fecha
            "#,
        )?;
        let rows = stmt
            .query_map(params![user_id, start, week_end(start)], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, NaiveDate>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<i64>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<bool>>(6)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let entries = rows
            .into_iter()
            .filter_map(|(id, user_id, date, meal, recipe_id, recipe_name, suggested)| {
                let Some(meal_type) = MealType::from_str(&meal) else {
                    warn!("Skipping planner row {} with unknown meal type {:?}", id, meal);
                    return None;
                };
                Some(PlanEntry {
                    id,
                    user_id,
                    date,
                    meal: meal_type,
                    recipe_id,
                    recipe_name,
                    suggested: suggested.unwrap_or(false),
                })
            })
            .collect();

        Ok(WeekPlan::from_entries(start, entries))
    }

    pub fn clear_week(&self, user_id: i64, start: NaiveDate) -> Result<usize> {
        let deleted = self.conn.execute(
            "DELETE FROM planificador WHERE usuario_id = ? AND fecha BETWEEN ? AND ?",
            params![user_id, start, week_end(start)],
        )?;
        Ok(deleted)
    }

    pub fn apply_week_plan(
        &self,
        user_id: i64,
        start: NaiveDate,
        suggestions: &WeekSuggestions,
    ) -> Result<usize> {
        self.require_user(user_id)?;

        let tx = self.conn.unchecked_transaction()?;
        let cleared = tx.execute(
            "DELETE FROM planificador WHERE usuario_id = ? AND fecha BETWEEN ? AND ?",
            params![user_id, start, week_end(start)],
        )?;

        let mut inserted = 0;
        for (date, meals) in suggestions {
            for (meal, recipe_id) in meals {
                let Some(recipe_id) = recipe_id else {
                    continue;
                };
                if !exists_in(&tx, "SELECT id FROM receta WHERE id = ?", *recipe_id)? {
                    debug!("Recipe {} no longer exists, skipping {} {}", recipe_id, date, meal.as_str());
                    continue;
                }
                tx.execute(
                    "INSERT INTO planificador (usuario_id, fecha, tipo_comida, receta_id, es_sugerida)
                     VALUES (?, ?, ?, ?, 1)
                     ON CONFLICT(usuario_id, fecha, tipo_comida) DO UPDATE SET
                        receta_id = excluded.receta_id,
                        es_sugerida = 1",
                    params![user_id, date, meal.as_str(), recipe_id],
                )?;
                inserted += 1;
            }
        }
        tx.commit()?;

        info!(
            "Week of {} for user {}: cleared {}, stored {} suggested meals",
            start, user_id, cleared, inserted
        );
        Ok(inserted)
    }

    // ========================================================================
    // Tokens
    // ========================================================================

    pub fn store_token(&self, user_id: i64, jwt: &str, expires_at: NaiveDateTime) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO token (usuario_id, jwt, fecha_expiracion) VALUES (?, ?, ?)",
            params![user_id, jwt, expires_at],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn tokens_for_user(&self, user_id: i64) -> Result<Vec<Token>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, usuario_id, jwt, fecha_expiracion FROM token
             WHERE usuario_id = ? ORDER BY fecha_expiracion",
        )?;
        let tokens = stmt
            .query_map([user_id], |row| {
                Ok(Token {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    jwt: row.get(2)?,
                    expires_at: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tokens)
    }

    pub fn purge_expired_tokens(&self, now: NaiveDateTime) -> Result<usize> {
        let deleted = self
            .conn
            .execute("DELETE FROM token WHERE fecha_expiracion < ?", [now])?;
        if deleted > 0 {
            info!("Purged {} expired tokens", deleted);
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};

    fn setup() -> SqliteDb {
        let db = SqliteDb::open_in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    fn add_user(db: &SqliteDb, email: &str) -> i64 {
        db.create_user(&NewUser::new("Ana Torres", email, "hash")).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_bootstrap_creates_every_table() {
        let db = setup();
        let counts = db.table_counts().unwrap();
        let names: Vec<&str> = counts.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(names, TABLE_ORDER.to_vec());
        assert!(counts.iter().all(|(_, c)| *c == 0));
    }

    #[test]
    fn test_migration_is_idempotent() {
        let db = SqliteDb::open_in_memory().unwrap();
        db.create_schema().unwrap();
        assert!(!db.has_column("usuario", "rol").unwrap());

        let admin = AdminAccount::default();
        let first = db.migrate(&admin).unwrap();
        assert!(first.rol_column_added);
        assert!(first.admin_created);

        let second = db.migrate(&admin).unwrap();
        assert!(!second.changed());

        let admins: i64 = db
            .conn
            .query_row(
                "SELECT COUNT(*) FROM usuario WHERE correo = 'admin@lazyfood.com'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(admins, 1);
        let admin_user = db.find_user_by_email("admin@lazyfood.com").unwrap().unwrap();
        assert_eq!(admin_user.role, Role::Admin);
    }

    #[test]
    fn test_migration_backfills_existing_users_with_default_role() {
        let db = SqliteDb::open_in_memory().unwrap();
        db.create_schema().unwrap();
        db.conn
            .execute(
                "INSERT INTO usuario (nombre, correo, password) VALUES ('Luis', 'luis@lazyfood.com', 'x')",
                [],
            )
            .unwrap();

        db.migrate(&AdminAccount::default()).unwrap();
        let luis = db.find_user_by_email("luis@lazyfood.com").unwrap().unwrap();
        assert_eq!(luis.role, Role::User);
        assert!(luis.active);
    }

    #[test]
    fn test_duplicate_email_rejected() {
        let db = setup();
        add_user(&db, "ana@lazyfood.com");
        let err = db
            .create_user(&NewUser::new("Ana Otra", "ana@lazyfood.com", "hash"))
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<StoreError>(),
            Some(&StoreError::DuplicateEmail("ana@lazyfood.com".to_string()))
        );

        // The constraint holds even when the pre-check is bypassed.
        let raw = db.conn.execute(
            "INSERT INTO usuario (nombre, correo, password) VALUES ('X', 'ana@lazyfood.com', 'y')",
            [],
        );
        assert!(raw.is_err());
    }

    #[test]
    fn test_create_user_validates_fields() {
        let db = setup();
        let err = db
            .create_user(&NewUser::new("Ana", "not-an-email", "hash"))
            .unwrap_err();
        assert!(err.downcast_ref::<ValidationError>().is_some());
        assert!(db.create_user(&NewUser::new("Ana", "ana@x.com", "")).is_err());
    }

    #[test]
    fn test_user_flags() {
        let db = setup();
        let id = add_user(&db, "ana@lazyfood.com");
        db.set_user_active(id, false).unwrap();
        db.set_user_role(id, Role::Admin).unwrap();
        let user = db.get_user(id).unwrap().unwrap();
        assert!(!user.active);
        assert_eq!(user.role, Role::Admin);
        assert_eq!(user.cooking_level, 1);

        let missing = db.set_user_active(999, true).unwrap_err();
        assert_eq!(missing.downcast_ref::<StoreError>(), Some(&StoreError::UserNotFound(999)));
    }

    #[test]
    fn test_reset_token_expiry() {
        let db = setup();
        let id = add_user(&db, "ana@lazyfood.com");
        let now = date(2025, 3, 1).and_hms_opt(10, 0, 0).unwrap();
        db.set_reset_token(id, "reset-abc", now + chrono::Duration::hours(1))
            .unwrap();

        assert_eq!(
            db.find_user_by_reset_token("reset-abc", now).unwrap().map(|u| u.id),
            Some(id)
        );
        assert!(db
            .find_user_by_reset_token("reset-abc", now + chrono::Duration::hours(2))
            .unwrap()
            .is_none());

        db.clear_reset_token(id).unwrap();
        assert!(db.find_user_by_reset_token("reset-abc", now).unwrap().is_none());
    }

    #[test]
    fn test_preference_is_one_per_user() {
        let db = setup();
        let id = add_user(&db, "ana@lazyfood.com");
        let mut pref = Preference {
            diet: Some("vegetariana".to_string()),
            allergies: ["maní".to_string()].into_iter().collect(),
            likes: BTreeSet::new(),
        };
        db.upsert_preference(id, &pref).unwrap();
        pref.diet = Some("vegana".to_string());
        pref.likes.insert("tofu".to_string());
        db.upsert_preference(id, &pref).unwrap();

        let rows: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM preferencia", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
        assert_eq!(db.get_preference(id).unwrap(), Some(pref));
    }

    #[test]
    fn test_record_detection_creates_then_updates() {
        let db = setup();
        let user = add_user(&db, "ana@lazyfood.com");

        let first = db
            .record_detection(
                user,
                &DetectedIngredient {
                    name: "aceite de oliva".to_string(),
                    quantity: Some(2.0),
                    confidence: Some(0.9),
                    bounding_box: Some(BoundingBox {
                        x: 0.2,
                        y: 0.2,
                        width: 0.1,
                        height: 0.1,
                    }),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(first.action, InventoryAction::Added);
        assert_eq!(first.ingredient_name, "Aceite De Oliva");

        let second = db
            .record_detection(
                user,
                &DetectedIngredient {
                    name: "ACEITE DE OLIVA".to_string(),
                    quantity: Some(5.0),
                    confidence: Some(3.0),
                    emoji: Some("🫒".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(second.action, InventoryAction::Updated);
        assert_eq!(second.ingredient_id, first.ingredient_id);
        assert_eq!(second.confidence, 1.0);
        assert_eq!(second.emoji.as_deref(), Some("🫒"));
        assert_eq!(second.bounding_box, first.bounding_box);

        let inventory = db.inventory_for_user(user).unwrap();
        assert_eq!(inventory.len(), 1);
        assert_eq!(inventory[0].quantity, 5.0);
        assert_eq!(inventory[0].category.as_deref(), Some("otros"));
    }

    #[test]
    fn test_inventory_pair_is_unique() {
        let db = setup();
        let user = add_user(&db, "ana@lazyfood.com");
        let ingredient = db
            .create_ingredient(&NewIngredient {
                name: "Ajo".to_string(),
                ..Default::default()
            })
            .unwrap();
        db.conn
            .execute(
                "INSERT INTO inventario (usuario_id, ingrediente_id, cantidad) VALUES (?, ?, 1)",
                params![user, ingredient],
            )
            .unwrap();
        let duplicate = db.conn.execute(
            "INSERT INTO inventario (usuario_id, ingrediente_id, cantidad) VALUES (?, ?, 2)",
            params![user, ingredient],
        );
        assert!(duplicate.is_err());

        assert!(db.update_inventory_quantity(user, ingredient, 7.5).unwrap());
        assert!(db.update_inventory_quantity(user, ingredient, -1.0).is_err());
        assert!(db.remove_inventory_item(user, ingredient).unwrap());
        assert!(!db.remove_inventory_item(user, ingredient).unwrap());
    }

    #[test]
    fn test_replace_steps_orders_and_numbers() {
        let db = setup();
        let recipe = db.create_recipe(&NewRecipe::new("Sopa")).unwrap();
        db.replace_recipe_steps(recipe, &[NewStep::new(1, "viejo", None)])
            .unwrap();

        let steps = db
            .replace_recipe_steps(
                recipe,
                &[
                    NewStep {
                        number: None,
                        instruction: "Hervir agua".to_string(),
                        timer_seconds: Some(300),
                    },
                    NewStep {
                        number: None,
                        instruction: "Añadir verduras".to_string(),
                        timer_seconds: None,
                    },
                ],
            )
            .unwrap();
        let numbers: Vec<i32> = steps.iter().map(|s| s.number).collect();
        assert_eq!(numbers, vec![1, 2]);
        assert_eq!(steps[0].timer_seconds, Some(300));

        let missing = db.replace_recipe_steps(404, &[]).unwrap_err();
        assert_eq!(missing.downcast_ref::<StoreError>(), Some(&StoreError::RecipeNotFound(404)));
    }

    #[test]
    fn test_duplicate_step_number_fails_atomically() {
        let db = setup();
        let recipe = db.create_recipe(&NewRecipe::new("Sopa")).unwrap();
        db.replace_recipe_steps(recipe, &[NewStep::new(1, "uno", None)])
            .unwrap();

        let result = db.replace_recipe_steps(
            recipe,
            &[NewStep::new(1, "a", None), NewStep::new(1, "b", None)],
        );
        assert!(result.is_err());
        assert_eq!(db.recipe_steps(recipe).unwrap()[0].instruction, "uno");
    }

    #[test]
    fn test_find_or_create_recipe_reuses_name() {
        let db = setup();
        let a = db.find_or_create_recipe(&NewRecipe::new("Ceviche")).unwrap();
        let b = db.find_or_create_recipe(&NewRecipe::new("Ceviche")).unwrap();
        assert_eq!(a, b);
        assert_eq!(db.list_recipes().unwrap().len(), 1);
    }

    #[test]
    fn test_suggestion_history_newest_first() {
        let db = setup();
        let user = add_user(&db, "ana@lazyfood.com");
        let r1 = db.create_recipe(&NewRecipe::new("Uno")).unwrap();
        let r2 = db.create_recipe(&NewRecipe::new("Dos")).unwrap();
        db.record_suggestion(user, r1, 50.0).unwrap();
        db.record_suggestion(user, r2, 75.5).unwrap();
        db.record_suggestion(user, r1, 10.0).unwrap();

        let history = db.suggestion_history(user, 2).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].match_percentage, 10.0);
        assert_eq!(history[1].recipe_name, "Dos");
    }

    #[test]
    fn test_plan_entry_upserts_on_slot() {
        let db = setup();
        let user = add_user(&db, "ana@lazyfood.com");
        let r1 = db.create_recipe(&NewRecipe::new("Uno")).unwrap();
        let r2 = db.create_recipe(&NewRecipe::new("Dos")).unwrap();
        let monday = date(2025, 6, 2);

        let a = db
            .set_plan_entry(user, monday, MealType::Lunch, Some(r1), false)
            .unwrap();
        let b = db
            .set_plan_entry(user, monday, MealType::Lunch, Some(r2), true)
            .unwrap();
        assert_eq!(a, b);

        db.set_plan_entry(user, date(2025, 6, 8), MealType::Dinner, Some(r1), false)
            .unwrap();
        db.set_plan_entry(user, date(2025, 6, 9), MealType::Dinner, Some(r1), false)
            .unwrap();

        let week = db.week_plan(user, monday).unwrap();
        assert_eq!(week.len(), 2);
        let lunch = week.get(monday, MealType::Lunch).unwrap();
        assert_eq!(lunch.recipe_name.as_deref(), Some("Dos"));
        assert!(lunch.suggested);

        assert_eq!(db.clear_week(user, monday).unwrap(), 2);
        assert!(db.week_plan(user, monday).unwrap().is_empty());
    }

    #[test]
    fn test_apply_week_plan_replaces_week() {
        let db = setup();
        let user = add_user(&db, "ana@lazyfood.com");
        let recipe = db.create_recipe(&NewRecipe::new("Uno")).unwrap();
        let monday = date(2025, 6, 2);
        db.set_plan_entry(user, date(2025, 6, 3), MealType::Breakfast, Some(recipe), false)
            .unwrap();

        let mut suggestions: WeekSuggestions = BTreeMap::new();
        suggestions.insert(
            monday,
            [
                (MealType::Breakfast, Some(recipe)),
                (MealType::Lunch, None),
                (MealType::Dinner, Some(9999)),
            ]
            .into_iter()
            .collect(),
        );

        let stored = db.apply_week_plan(user, monday, &suggestions).unwrap();
        assert_eq!(stored, 1);
        let week = db.week_plan(user, monday).unwrap();
        assert_eq!(week.len(), 1);
        assert!(week.get(monday, MealType::Breakfast).unwrap().suggested);
    }

    #[test]
    fn test_purge_expired_tokens() {
        let db = setup();
        let user = add_user(&db, "ana@lazyfood.com");
        let now = date(2025, 1, 1).and_hms_opt(12, 0, 0).unwrap();
        db.store_token(user, "old", now - chrono::Duration::minutes(5))
            .unwrap();
        db.store_token(user, "fresh", now + chrono::Duration::hours(1))
            .unwrap();

        assert_eq!(db.purge_expired_tokens(now).unwrap(), 1);
        let tokens = db.tokens_for_user(user).unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].jwt, "fresh");
        assert!(!tokens[0].is_expired(now));
    }

    #[test]
    fn test_delete_user_cascades() {
        let db = setup();
        db.seed(&SeedOptions { demo_data: true }).unwrap();
        let user = db.find_user_by_email(seed::DEMO_USER_EMAIL).unwrap().unwrap();
        let recipe = db.list_recipes().unwrap()[0].id;
        db.record_suggestion(user.id, recipe, 40.0).unwrap();
        db.store_token(user.id, "jwt", Utc::now().naive_utc()).unwrap();

        assert!(db.delete_user(user.id).unwrap());

        for table in ["preferencia", "inventario", "sugerencia_receta", "planificador", "token"] {
            let remaining: i64 = db
                .conn
                .query_row(
                    &format!("SELECT COUNT(*) FROM {} WHERE usuario_id = ?", table),
                    [user.id],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(remaining, 0, "{table}");
        }
        // Lookups survive.
        assert!(!db.list_ingredients().unwrap().is_empty());
    }

    #[test]
    fn test_delete_recipe_cascades_to_steps() {
        let db = setup();
        db.seed(&SeedOptions::default()).unwrap();
        let recipe = db.list_recipes().unwrap()[0].id;
        assert!(!db.recipe_steps(recipe).unwrap().is_empty());
        assert!(db.delete_recipe(recipe).unwrap());
        assert!(db.recipe_steps(recipe).unwrap().is_empty());
    }

    #[test]
    fn test_delete_recipe_cascades_to_suggestions_and_planner() {
        let db = setup();
        let user = add_user(&db, "ana@lazyfood.com");
        let recipe = db.create_recipe(&NewRecipe::new("Ceviche")).unwrap();
        let kept = db.create_recipe(&NewRecipe::new("Causa")).unwrap();
        db.record_suggestion(user, recipe, 80.0).unwrap();
        db.record_suggestion(user, kept, 20.0).unwrap();
        db.set_plan_entry(user, date(2025, 6, 2), MealType::Lunch, Some(recipe), true)
            .unwrap();

        assert!(db.delete_recipe(recipe).unwrap());

        let count = |sql: &str| -> i64 { db.conn.query_row(sql, [recipe], |row| row.get(0)).unwrap() };
        assert_eq!(count("SELECT COUNT(*) FROM sugerencia_receta WHERE receta_id = ?"), 0);
        assert_eq!(count("SELECT COUNT(*) FROM planificador WHERE receta_id = ?"), 0);
        assert_eq!(db.suggestion_history(user, 10).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_ingredient_cascades_to_inventory() {
        let db = setup();
        let user = add_user(&db, "ana@lazyfood.com");
        let update = db
            .record_detection(
                user,
                &DetectedIngredient {
                    name: "Ajo".to_string(),
                    quantity: Some(3.0),
                    ..Default::default()
                },
            )
            .unwrap();

        db.conn
            .execute("DELETE FROM ingrediente WHERE id = ?", [update.ingredient_id])
            .unwrap();
        assert!(db.inventory_for_user(user).unwrap().is_empty());
        let rows: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM inventario", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[test]
    fn test_preference_sets_stored_normalized() {
        let db = setup();
        let id = add_user(&db, "ana@lazyfood.com");
        let pref = Preference {
            diet: None,
            allergies: BTreeSet::new(),
            likes: ["tofu", " tofu", "  "].iter().map(|s| s.to_string()).collect(),
        };
        db.upsert_preference(id, &pref).unwrap();

        let stored: serde_json::Value = db
            .conn
            .query_row("SELECT gustos FROM preferencia WHERE usuario_id = ?", [id], |row| row.get(0))
            .unwrap();
        assert_eq!(stored, serde_json::json!(["tofu"]));
        let likes = db.get_preference(id).unwrap().unwrap().likes;
        assert_eq!(likes.into_iter().collect::<Vec<_>>(), vec!["tofu".to_string()]);
    }

    #[test]
    fn test_replace_steps_with_mixed_numbering() {
        let db = setup();
        let recipe = db.create_recipe(&NewRecipe::new("Sopa")).unwrap();
        let steps = db
            .replace_recipe_steps(
                recipe,
                &[
                    NewStep {
                        number: None,
                        instruction: "Hervir agua".to_string(),
                        timer_seconds: None,
                    },
                    NewStep::new(1, "Lavar verduras", None),
                ],
            )
            .unwrap();
        let numbers: Vec<i32> = steps.iter().map(|s| s.number).collect();
        assert_eq!(numbers, vec![1, 2]);
        assert_eq!(steps[0].instruction, "Lavar verduras");
    }

    #[test]
    fn test_name_lookup_folds_accented_case() {
        let db = setup();
        db.create_ingredient(&NewIngredient {
            name: "Brócoli".to_string(),
            ..Default::default()
        })
        .unwrap();
        let found = db.find_ingredient_by_name("  BRÓCOLI ").unwrap().unwrap();
        assert_eq!(found.name, "Brócoli");
        assert!(db.find_ingredient_by_name("coliflor").unwrap().is_none());

        db.create_recipe(&NewRecipe::new("Ñoquis")).unwrap();
        assert!(recipe_id_by_name_in(&db.conn, "ÑOQUIS").unwrap().is_some());
    }

    #[test]
    fn test_seed_is_repeatable() {
        let db = setup();
        let first = db.seed(&SeedOptions { demo_data: true }).unwrap();
        assert_eq!(first.ingredients_added, seed::SEED_INGREDIENTS.len());
        assert_eq!(first.recipes_added, seed::SEED_RECIPES.len());
        assert!(first.demo_user_created);

        let second = db.seed(&SeedOptions { demo_data: true }).unwrap();
        assert_eq!(second, SeedReport::default());

        let vegetables: Vec<String> = db
            .ingredients_by_category("verdura")
            .unwrap()
            .into_iter()
            .map(|i| i.name)
            .collect();
        for name in ["Tomate", "Cebolla", "Ajo"] {
            assert!(vegetables.iter().any(|v| v == name), "{name}");
        }

        let demo = db.find_user_by_email(seed::DEMO_USER_EMAIL).unwrap().unwrap();
        assert_eq!(
            db.inventory_for_user(demo.id).unwrap().len(),
            seed::DEMO_INVENTORY.len()
        );
        assert_eq!(db.get_preference(demo.id).unwrap().unwrap().likes.len(), 2);
    }
}
