//! PostgreSQL backend implementation.

use anyhow::Result;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use postgres::{GenericClient, NoTls};
use r2d2::Pool;
use r2d2_postgres::PostgresConnectionManager;
use tracing::{debug, info, warn};

use super::migrate::{AdminAccount, MigrationReport};
use super::models::{
    number_steps, BoundingBox, DetectedIngredient, Ingredient, InventoryAction, InventoryEntry,
    InventoryUpdate, MealType, NewIngredient, NewRecipe, NewStep, NewUser, PlanEntry, Preference,
    Recipe, RecipeStep, Role, Suggestion, Token, User, WeekPlan,
};
use super::postgres_schema::{POSTGRES_ADD_ROL_COLUMN, POSTGRES_SCHEMA};
use super::schema::TABLE_ORDER;
use super::seed::{self, SeedOptions, SeedReport};
use crate::error::{StoreError, ValidationError};
use crate::planner::{week_end, WeekSuggestions};
use crate::validation::{normalize_detection, title_case, validate_email, validate_name};

pub struct PgDb {
    pool: Pool<PostgresConnectionManager<NoTls>>,
}

const USER_COLUMNS: &str = "id, nombre, correo, password, rol, pais, fecha_creacion, \
                            nivel_cocina, metas_nutricionales, activo";

fn row_to_user(row: &postgres::Row) -> User {
    let role: String = row.get(4);
    let cooking_level: Option<i32> = row.get(7);
    User {
        id: row.get(0),
        name: row.get(1),
        email: row.get(2),
        password_hash: row.get(3),
        role: Role::from_str(&role).unwrap_or_default(),
        country: row.get(5),
        created_at: row.get(6),
        cooking_level: cooking_level.unwrap_or(1),
        nutrition_goals: row.get(8),
        active: row.get(9),
    }
}

fn row_to_ingredient(row: &postgres::Row) -> Ingredient {
    Ingredient {
        id: row.get(0),
        name: row.get(1),
        category: row.get(2),
        unit: row.get(3),
        emoji: row.get(4),
    }
}

fn row_to_recipe(row: &postgres::Row) -> Recipe {
    let difficulty: Option<i32> = row.get(4);
    Recipe {
        id: row.get(0),
        name: row.get(1),
        prep_minutes: row.get(2),
        calories: row.get(3),
        difficulty: difficulty.unwrap_or(1),
        emoji: row.get(5),
        image_url: row.get(6),
    }
}

fn find_ingredient_by_name_in<C: GenericClient>(client: &mut C, name: &str) -> Result<Option<Ingredient>> {
    let row = client.query_opt(
        "SELECT id, nombre, categoria, unidad, emoji FROM ingrediente
         WHERE LOWER(TRIM(nombre)) = LOWER(TRIM($1))
         ORDER BY id LIMIT 1",
        &[&name],
    )?;
    Ok(row.as_ref().map(row_to_ingredient))
}

fn recipe_id_by_name_in<C: GenericClient>(client: &mut C, name: &str) -> Result<Option<i64>> {
    let row = client.query_opt(
        "SELECT id FROM receta WHERE LOWER(TRIM(nombre)) = LOWER(TRIM($1)) ORDER BY id LIMIT 1",
        &[&name],
    )?;
    Ok(row.map(|r| r.get(0)))
}

fn insert_steps_in<C: GenericClient>(client: &mut C, recipe_id: i64, steps: &[RecipeStep]) -> Result<()> {
    for step in steps {
        client.execute(
            "INSERT INTO paso_receta (receta_id, numero_paso, instruccion, temporizador_segundos)
             VALUES ($1, $2, $3, $4)",
            &[&recipe_id, &step.number, &step.instruction, &step.timer_seconds],
        )?;
    }
    Ok(())
}

fn exists_in<C: GenericClient>(client: &mut C, sql: &str, id: i64) -> Result<bool> {
    Ok(client.query_opt(sql, &[&id])?.is_some())
}

impl PgDb {
    pub fn open(url: &str, pool_size: u32) -> Result<Self> {
        Self::open_with_config(url.parse()?, pool_size)
    }

    /// Open from already parsed connection settings.
    pub(crate) fn open_with_config(config: postgres::Config, pool_size: u32) -> Result<Self> {
        let manager = PostgresConnectionManager::new(config, NoTls);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)?;
        Ok(Self { pool })
    }

    // ========================================================================
    // Schema lifecycle
    // ========================================================================

    pub fn create_schema(&self) -> Result<()> {
        let mut client = self.pool.get()?;
        client.batch_execute(POSTGRES_SCHEMA)?;
        debug!("PostgreSQL schema applied ({} tables)", TABLE_ORDER.len());
        Ok(())
    }

    pub fn initialize(&self) -> Result<()> {
        self.create_schema()?;
        self.ensure_rol_column()?;
        Ok(())
    }

    pub fn has_column(&self, table: &str, column: &str) -> Result<bool> {
        let mut client = self.pool.get()?;
        let row = client.query_one(
            "SELECT EXISTS (
                SELECT 1 FROM information_schema.columns
                WHERE table_schema = current_schema()
                  AND table_name = $1::text AND column_name = $2::text
             )",
            &[&table, &column],
        )?;
        Ok(row.get(0))
    }

    fn ensure_rol_column(&self) -> Result<bool> {
        if self.has_column("usuario", "rol")? {
            debug!("usuario.rol already present");
            return Ok(false);
        }
        let mut client = self.pool.get()?;
        client.batch_execute(POSTGRES_ADD_ROL_COLUMN)?;
        info!("Added column usuario.rol");
        Ok(true)
    }

    pub fn migrate(&self, admin: &AdminAccount) -> Result<MigrationReport> {
        let rol_column_added = self.ensure_rol_column()?;

        let mut client = self.pool.get()?;
        let existing = client.query_opt("SELECT id FROM usuario WHERE correo = $1", &[&admin.email])?;
        let admin_created = match existing {
            Some(row) => {
                let id: i64 = row.get(0);
                debug!("Admin {} already exists (id {})", admin.email, id);
                false
            }
            None => {
                client.execute(
                    "INSERT INTO usuario (nombre, correo, password, rol, activo)
                     VALUES ($1, $2, $3, 'admin', TRUE)",
                    &[&admin.name, &admin.email, &admin.password_hash],
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
        let mut client = self.pool.get()?;
        let mut tx = client.transaction()?;
        let mut report = SeedReport::default();

        for item in seed::SEED_INGREDIENTS {
            if find_ingredient_by_name_in(&mut tx, item.name)?.is_some() {
                continue;
            }
            tx.execute(
                "INSERT INTO ingrediente (nombre, categoria, unidad, emoji) VALUES ($1, $2, $3, $4)",
                &[&item.name, &item.category, &item.unit, &item.emoji],
            )?;
            report.ingredients_added += 1;
        }

        for recipe in seed::SEED_RECIPES {
            if recipe_id_by_name_in(&mut tx, recipe.name)?.is_some() {
                continue;
            }
            let row = tx.query_one(
                "INSERT INTO receta (nombre, tiempo_preparacion, calorias, nivel_dificultad, emoji)
                 VALUES ($1, $2, $3, $4, $5) RETURNING id",
                &[
                    &recipe.name,
                    &recipe.prep_minutes,
                    &recipe.calories,
                    &recipe.difficulty,
                    &recipe.emoji,
                ],
            )?;
            let recipe_id: i64 = row.get(0);
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
            insert_steps_in(&mut tx, recipe_id, &numbered)?;
            report.recipes_added += 1;
            report.steps_added += numbered.len();
        }

        if options.demo_data {
            let existing = tx.query_opt(
                "SELECT id FROM usuario WHERE correo = $1",
                &[&seed::DEMO_USER_EMAIL],
            )?;

            if existing.is_none() {
                let row = tx.query_one(
                    "INSERT INTO usuario (nombre, correo, password, pais, nivel_cocina)
                     VALUES ($1, $2, $3, $4, 1) RETURNING id",
                    &[
                        &seed::DEMO_USER_NAME,
                        &seed::DEMO_USER_EMAIL,
                        &seed::DEMO_USER_PASSWORD_HASH,
                        &seed::DEMO_USER_COUNTRY,
                    ],
                )?;
                let user_id: i64 = row.get(0);

                let preference = Preference {
                    diet: Some(seed::DEMO_DIET.to_string()),
                    allergies: seed::DEMO_ALLERGIES.iter().map(|s| s.to_string()).collect(),
                    likes: seed::DEMO_LIKES.iter().map(|s| s.to_string()).collect(),
                };
                tx.execute(
                    "INSERT INTO preferencia (usuario_id, dieta, alergias, gustos) VALUES ($1, $2, $3, $4)",
                    &[
                        &user_id,
                        &preference.diet,
                        &preference.allergies_json(),
                        &preference.likes_json(),
                    ],
                )?;

                for (name, quantity) in seed::DEMO_INVENTORY {
                    if let Some(ingredient) = find_ingredient_by_name_in(&mut tx, name)? {
                        tx.execute(
                            "INSERT INTO inventario (usuario_id, ingrediente_id, cantidad, confianza)
                             VALUES ($1, $2, $3, 1.0)",
                            &[&user_id, &ingredient.id, quantity],
                        )?;
                    }
                }

                let (meal, recipe_name) = seed::DEMO_PLAN;
                if let Some(recipe_id) = recipe_id_by_name_in(&mut tx, recipe_name)? {
                    tx.execute(
                        "INSERT INTO planificador (usuario_id, fecha, tipo_comida, receta_id, es_sugerida)
                         VALUES ($1, $2, $3, $4, FALSE)",
                        &[&user_id, &Utc::now().date_naive(), &meal.as_str(), &recipe_id],
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
        let mut client = self.pool.get()?;
        let mut counts = Vec::with_capacity(TABLE_ORDER.len());
        for table in TABLE_ORDER {
            let row = client.query_one(&format!("SELECT COUNT(*) FROM {}", table), &[])?;
            counts.push((table.to_string(), row.get(0)));
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

        let mut client = self.pool.get()?;
        let row = client.query_one(
            "INSERT INTO usuario (nombre, correo, password, rol, pais, nivel_cocina, metas_nutricionales)
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id",
            &[
                &user.name,
                &user.email,
                &user.password_hash,
                &user.role.as_str(),
                &user.country,
                &user.cooking_level,
                &user.nutrition_goals,
            ],
        )?;
        let id: i64 = row.get(0);
        debug!("Created user {} ({})", id, user.email);
        Ok(id)
    }

    pub fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        let mut client = self.pool.get()?;
        let row = client.query_opt(
            &format!("SELECT {} FROM usuario WHERE id = $1", USER_COLUMNS),
            &[&user_id],
        )?;
        Ok(row.as_ref().map(row_to_user))
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let mut client = self.pool.get()?;
        let row = client.query_opt(
            &format!("SELECT {} FROM usuario WHERE correo = $1", USER_COLUMNS),
            &[&email],
        )?;
        Ok(row.as_ref().map(row_to_user))
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut client = self.pool.get()?;
        let rows = client.query(&format!("SELECT {} FROM usuario ORDER BY id", USER_COLUMNS), &[])?;
        Ok(rows.iter().map(row_to_user).collect())
    }

    pub fn set_user_active(&self, user_id: i64, active: bool) -> Result<()> {
        let mut client = self.pool.get()?;
        let changed = client.execute(
            "UPDATE usuario SET activo = $1 WHERE id = $2",
            &[&active, &user_id],
        )?;
        if changed == 0 {
            return Err(StoreError::UserNotFound(user_id).into());
        }
        Ok(())
    }

    pub fn set_user_role(&self, user_id: i64, role: Role) -> Result<()> {
        let mut client = self.pool.get()?;
        let changed = client.execute(
            "UPDATE usuario SET rol = $1 WHERE id = $2",
            &[&role.as_str(), &user_id],
        )?;
        if changed == 0 {
            return Err(StoreError::UserNotFound(user_id).into());
        }
        Ok(())
    }

    pub fn set_reset_token(&self, user_id: i64, token: &str, expires_at: NaiveDateTime) -> Result<()> {
        let mut client = self.pool.get()?;
        let changed = client.execute(
            "UPDATE usuario SET reset_token = $1, reset_token_expiration = $2 WHERE id = $3",
            &[&token, &expires_at, &user_id],
        )?;
        if changed == 0 {
            return Err(StoreError::UserNotFound(user_id).into());
        }
        Ok(())
    }

    pub fn find_user_by_reset_token(&self, token: &str, now: NaiveDateTime) -> Result<Option<User>> {
        let mut client = self.pool.get()?;
        let row = client.query_opt(
            &format!(
                "SELECT {} FROM usuario WHERE reset_token = $1 AND reset_token_expiration > $2",
                USER_COLUMNS
            ),
            &[&token, &now],
        )?;
        Ok(row.as_ref().map(row_to_user))
    }

    pub fn clear_reset_token(&self, user_id: i64) -> Result<()> {
        let mut client = self.pool.get()?;
        client.execute(
            "UPDATE usuario SET reset_token = NULL, reset_token_expiration = NULL WHERE id = $1",
            &[&user_id],
        )?;
        Ok(())
    }

    pub fn delete_user(&self, user_id: i64) -> Result<bool> {
        let mut client = self.pool.get()?;
        let deleted = client.execute("DELETE FROM usuario WHERE id = $1", &[&user_id])?;
        if deleted > 0 {
            info!("Deleted user {} and dependent rows", user_id);
        }
        Ok(deleted > 0)
    }

    fn require_user(&self, user_id: i64) -> Result<()> {
        let mut client = self.pool.get()?;
        if !exists_in(&mut *client, "SELECT id FROM usuario WHERE id = $1", user_id)? {
            return Err(StoreError::UserNotFound(user_id).into());
        }
        Ok(())
    }

    // ========================================================================
    // Preferences
    // ========================================================================

    pub fn upsert_preference(&self, user_id: i64, preference: &Preference) -> Result<()> {
        self.require_user(user_id)?;
        let mut client = self.pool.get()?;
        client.execute(
            "INSERT INTO preferencia (usuario_id, dieta, alergias, gustos) VALUES ($1, $2, $3, $4)
             ON CONFLICT (usuario_id) DO UPDATE SET
                dieta = EXCLUDED.dieta,
                alergias = EXCLUDED.alergias,
                gustos = EXCLUDED.gustos",
            &[
                &user_id,
                &preference.diet,
                &preference.allergies_json(),
                &preference.likes_json(),
            ],
        )?;
        Ok(())
    }

    pub fn get_preference(&self, user_id: i64) -> Result<Option<Preference>> {
        let mut client = self.pool.get()?;
        let row = client.query_opt(
            "SELECT dieta, alergias, gustos FROM preferencia WHERE usuario_id = $1",
            &[&user_id],
        )?;
        Ok(row.map(|row| Preference {
            diet: row.get(0),
            allergies: Preference::set_from_json(row.get(1)),
            likes: Preference::set_from_json(row.get(2)),
        }))
    }

    // ========================================================================
    // Ingredients and inventory
    // ========================================================================

    pub fn create_ingredient(&self, ingredient: &NewIngredient) -> Result<i64> {
        if ingredient.name.trim().is_empty() {
            return Err(ValidationError::EmptyIngredientName.into());
        }
        let mut client = self.pool.get()?;
        let row = client.query_one(
            "INSERT INTO ingrediente (nombre, categoria, unidad, emoji) VALUES ($1, $2, $3, $4) RETURNING id",
            &[
                &ingredient.name.trim(),
                &ingredient.category,
                &ingredient.unit,
                &ingredient.emoji,
            ],
        )?;
        Ok(row.get(0))
    }

    pub fn find_ingredient_by_name(&self, name: &str) -> Result<Option<Ingredient>> {
        let mut client = self.pool.get()?;
        find_ingredient_by_name_in(&mut *client, name)
    }

    pub fn ingredients_by_category(&self, category: &str) -> Result<Vec<Ingredient>> {
        let mut client = self.pool.get()?;
        let rows = client.query(
            "SELECT id, nombre, categoria, unidad, emoji FROM ingrediente
             WHERE categoria = $1 ORDER BY nombre",
            &[&category],
        )?;
        Ok(rows.iter().map(row_to_ingredient).collect())
    }

    pub fn list_ingredients(&self) -> Result<Vec<Ingredient>> {
        let mut client = self.pool.get()?;
        let rows = client.query(
            "SELECT id, nombre, categoria, unidad, emoji FROM ingrediente ORDER BY id",
            &[],
        )?;
        Ok(rows.iter().map(row_to_ingredient).collect())
    }

    pub fn record_detection(
        &self,
        user_id: i64,
        detected: &DetectedIngredient,
    ) -> Result<InventoryUpdate> {
        let detection = normalize_detection(detected)?;
        self.require_user(user_id)?;

        let mut client = self.pool.get()?;
        let mut tx = client.transaction()?;

        let ingredient = match find_ingredient_by_name_in(&mut tx, &detection.name)? {
            Some(mut existing) => {
                if existing.emoji.is_none() && detection.emoji.is_some() {
                    tx.execute(
                        "UPDATE ingrediente SET emoji = $1 WHERE id = $2",
                        &[&detection.emoji, &existing.id],
                    )?;
                    existing.emoji = detection.emoji.clone();
                }
                existing
            }
            None => {
                let name = title_case(&detection.name);
                let row = tx.query_one(
                    "INSERT INTO ingrediente (nombre, categoria, unidad, emoji)
                     VALUES ($1, $2, $3, $4) RETURNING id",
                    &[&name, &detection.category, &detection.unit, &detection.emoji],
                )?;
                let id: i64 = row.get(0);
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

        let existing = tx.query_opt(
            "SELECT id, bounding_box FROM inventario WHERE usuario_id = $1 AND ingrediente_id = $2",
            &[&user_id, &ingredient.id],
        )?;

        let (action, bounding_box) = match existing {
            Some(row) => {
                let row_id: i64 = row.get(0);
                let stored_box: Option<serde_json::Value> = row.get(1);
                // A detection without a box keeps the previous one.
                let bounding_box = detection
                    .bounding_box
                    .or_else(|| BoundingBox::from_json(stored_box));
                tx.execute(
                    "UPDATE inventario
                     SET cantidad = $1, confianza = $2, bounding_box = $3,
                         fecha_actualizacion = NOW() AT TIME ZONE 'utc'
                     WHERE id = $4",
                    &[
                        &detection.quantity,
                        &detection.confidence,
                        &bounding_box.map(|b| b.to_json()),
                        &row_id,
                    ],
                )?;
                (InventoryAction::Updated, bounding_box)
            }
            None => {
                tx.execute(
                    "INSERT INTO inventario (usuario_id, ingrediente_id, cantidad, confianza, bounding_box)
                     VALUES ($1, $2, $3, $4, $5)",
                    &[
                        &user_id,
                        &ingredient.id,
                        &detection.quantity,
                        &detection.confidence,
                        &detection.bounding_box.map(|b| b.to_json()),
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
        let mut client = self.pool.get()?;
        let changed = client.execute(
            "UPDATE inventario SET cantidad = $1, fecha_actualizacion = NOW() AT TIME ZONE 'utc'
             WHERE usuario_id = $2 AND ingrediente_id = $3",
            &[&quantity, &user_id, &ingredient_id],
        )?;
        Ok(changed > 0)
    }

    pub fn remove_inventory_item(&self, user_id: i64, ingredient_id: i64) -> Result<bool> {
        let mut client = self.pool.get()?;
        let deleted = client.execute(
            "DELETE FROM inventario WHERE usuario_id = $1 AND ingrediente_id = $2",
            &[&user_id, &ingredient_id],
        )?;
        Ok(deleted > 0)
    }

    pub fn inventory_for_user(&self, user_id: i64) -> Result<Vec<InventoryEntry>> {
        let mut client = self.pool.get()?;
        let rows = client.query(
            r#"
            SELECT inv.id, inv.usuario_id, inv.ingrediente_id, ing.nombre, ing.categoria,
                   ing.unidad, ing.emoji, inv.cantidad, inv.confianza, inv.bounding_box,
                   inv.fecha_actualizacion
            FROM inventario inv
            JOIN ingrediente ing ON ing.id = inv.ingrediente_id
            WHERE inv.usuario_id = $1
            ORDER BY ing.nombre
            "#,
            &[&user_id],
        )?;
        let entries = rows
            .iter()
            .map(|row| {
                let quantity: Option<f64> = row.get(7);
                let confidence: Option<f64> = row.get(8);
                InventoryEntry {
                    id: row.get(0),
                    user_id: row.get(1),
                    ingredient_id: row.get(2),
                    ingredient_name: row.get(3),
                    category: row.get(4),
                    unit: row.get(5),
                    emoji: row.get(6),
                    quantity: quantity.unwrap_or(0.0),
                    confidence: confidence.unwrap_or(1.0),
                    bounding_box: BoundingBox::from_json(row.get(9)),
                    updated_at: row.get(10),
                }
            })
            .collect();
        Ok(entries)
    }

    // ========================================================================
    // Recipes and steps
    // ========================================================================

    pub fn create_recipe(&self, recipe: &NewRecipe) -> Result<i64> {
        let mut client = self.pool.get()?;
        let row = client.query_one(
            "INSERT INTO receta (nombre, tiempo_preparacion, calorias, nivel_dificultad, emoji, imagen_url)
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
            &[
                &recipe.name,
                &recipe.prep_minutes,
                &recipe.calories,
                &recipe.difficulty,
                &recipe.emoji,
                &recipe.image_url,
            ],
        )?;
        Ok(row.get(0))
    }

    pub fn find_or_create_recipe(&self, recipe: &NewRecipe) -> Result<i64> {
        let existing = {
            let mut client = self.pool.get()?;
            client.query_opt(
                "SELECT id FROM receta WHERE nombre = $1 ORDER BY id LIMIT 1",
                &[&recipe.name],
            )?
        };
        match existing {
            Some(row) => Ok(row.get(0)),
            None => self.create_recipe(recipe),
        }
    }

    pub fn get_recipe(&self, recipe_id: i64) -> Result<Option<Recipe>> {
        let mut client = self.pool.get()?;
        let row = client.query_opt(
            "SELECT id, nombre, tiempo_preparacion, calorias, nivel_dificultad, emoji, imagen_url
             FROM receta WHERE id = $1",
            &[&recipe_id],
        )?;
        Ok(row.as_ref().map(row_to_recipe))
    }

    pub fn list_recipes(&self) -> Result<Vec<Recipe>> {
        let mut client = self.pool.get()?;
        let rows = client.query(
            "SELECT id, nombre, tiempo_preparacion, calorias, nivel_dificultad, emoji, imagen_url
             FROM receta ORDER BY id",
            &[],
        )?;
        Ok(rows.iter().map(row_to_recipe).collect())
    }

    pub fn delete_recipe(&self, recipe_id: i64) -> Result<bool> {
        let mut client = self.pool.get()?;
        let deleted = client.execute("DELETE FROM receta WHERE id = $1", &[&recipe_id])?;
        Ok(deleted > 0)
    }

    pub fn recipe_steps(&self, recipe_id: i64) -> Result<Vec<RecipeStep>> {
        let mut client = self.pool.get()?;
        let rows = client.query(
            "SELECT numero_paso, instruccion, temporizador_segundos FROM paso_receta
             WHERE receta_id = $1 ORDER BY numero_paso",
            &[&recipe_id],
        )?;
        let steps = rows
            .iter()
            .map(|row| RecipeStep {
                number: row.get(0),
                instruction: row.get(1),
                timer_seconds: row.get(2),
            })
            .collect();
        Ok(steps)
    }

    pub fn replace_recipe_steps(&self, recipe_id: i64, steps: &[NewStep]) -> Result<Vec<RecipeStep>> {
        let numbered = number_steps(steps);
        {
            let mut client = self.pool.get()?;
            if !exists_in(&mut *client, "SELECT id FROM receta WHERE id = $1", recipe_id)? {
                return Err(StoreError::RecipeNotFound(recipe_id).into());
            }
            let mut tx = client.transaction()?;
            tx.execute("DELETE FROM paso_receta WHERE receta_id = $1", &[&recipe_id])?;
            insert_steps_in(&mut tx, recipe_id, &numbered)?;
            tx.commit()?;
        }

        debug!("Stored {} steps for recipe {}", numbered.len(), recipe_id);
        self.recipe_steps(recipe_id)
    }

    // ========================================================================
    // Suggestions
    // ========================================================================

    pub fn record_suggestion(&self, user_id: i64, recipe_id: i64, match_percentage: f64) -> Result<i64> {
        let mut client = self.pool.get()?;
        let row = client.query_one(
            "INSERT INTO sugerencia_receta (usuario_id, receta_id, porcentaje_coincidencia)
             VALUES ($1, $2, $3) RETURNING id",
            &[&user_id, &recipe_id, &match_percentage],
        )?;
        Ok(row.get(0))
    }

    pub fn suggestion_history(&self, user_id: i64, limit: usize) -> Result<Vec<Suggestion>> {
        let mut client = self.pool.get()?;
        let rows = client.query(
            r#"
            SELECT s.id, s.usuario_id, s.receta_id, r.nombre, s.porcentaje_coincidencia, s.fecha
            FROM sugerencia_receta s
            JOIN receta r ON r.id = s.receta_id
            WHERE s.usuario_id = $1
            ORDER BY s.fecha DESC, s.id DESC
            LIMIT $2
            "#,
            &[&user_id, &(limit as i64)],
        )?;
        let suggestions = rows
            .iter()
            .map(|row| {
                let percentage: Option<f64> = row.get(4);
                Suggestion {
                    id: row.get(0),
                    user_id: row.get(1),
                    recipe_id: row.get(2),
                    recipe_name: row.get(3),
                    match_percentage: percentage.unwrap_or(0.0),
                    created_at: row.get(5),
                }
            })
            .collect();
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
        let mut client = self.pool.get()?;
        let row = client.query_one(
            "INSERT INTO planificador (usuario_id, fecha, tipo_comida, receta_id, es_sugerida)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (usuario_id, fecha, tipo_comida) DO UPDATE SET
                receta_id = EXCLUDED.receta_id,
                es_sugerida = EXCLUDED.es_sugerida
             RETURNING id",
            &[&user_id, &date, &meal.as_str(), &recipe_id, &suggested],
        )?;
        Ok(row.get(0))
    }

    pub fn week_plan(&self, user_id: i64, start: NaiveDate) -> Result<WeekPlan> {
        let mut client = self.pool.get()?;
        let rows = client.query(
            r#"
            SELECT p.id, p.usuario_id, p.fecha, p.tipo_comida, p.receta_id, r.nombre, p.es_sugerida
            FROM planificador p
            LEFT JOIN receta r ON r.id = p.receta_id
            WHERE p.usuario_id = $1 AND p.fecha BETWEEN $2 AND $3
            ORDER BY p.fecha
            "#,
            &[&user_id, &start, &week_end(start)],
        )?;

        let entries = rows
            .iter()
            .filter_map(|row| {
                let id: i64 = row.get(0);
                let meal: String = row.get(3);
                let Some(meal_type) = MealType::from_str(&meal) else {
                    warn!("Skipping planner row {} with unknown meal type {:?}", id, meal);
                    return None;
                };
                let suggested: Option<bool> = row.get(6);
                Some(PlanEntry {
                    id,
                    user_id: row.get(1),
                    date: row.get(2),
                    meal: meal_type,
                    recipe_id: row.get(4),
                    recipe_name: row.get(5),
                    suggested: suggested.unwrap_or(false),
                })
            })
            .collect();

        Ok(WeekPlan::from_entries(start, entries))
    }

    pub fn clear_week(&self, user_id: i64, start: NaiveDate) -> Result<usize> {
        let mut client = self.pool.get()?;
        let deleted = client.execute(
            "DELETE FROM planificador WHERE usuario_id = $1 AND fecha BETWEEN $2 AND $3",
            &[&user_id, &start, &week_end(start)],
        )?;
        Ok(deleted as usize)
    }

    pub fn apply_week_plan(
        &self,
        user_id: i64,
        start: NaiveDate,
        suggestions: &WeekSuggestions,
    ) -> Result<usize> {
        self.require_user(user_id)?;

        let mut client = self.pool.get()?;
        let mut tx = client.transaction()?;
        let cleared = tx.execute(
            "DELETE FROM planificador WHERE usuario_id = $1 AND fecha BETWEEN $2 AND $3",
            &[&user_id, &start, &week_end(start)],
        )?;

        let mut inserted = 0;
        for (date, meals) in suggestions {
            for (meal, recipe_id) in meals {
                let Some(recipe_id) = recipe_id else {
                    continue;
                };
                if !exists_in(&mut tx, "SELECT id FROM receta WHERE id = $1", *recipe_id)? {
                    debug!("Recipe {} no longer exists, skipping {} {}", recipe_id, date, meal.as_str());
                    continue;
                }
                tx.execute(
                    "INSERT INTO planificador (usuario_id, fecha, tipo_comida, receta_id, es_sugerida)
                     VALUES ($1, $2, $3, $4, TRUE)
                     ON CONFLICT (usuario_id, fecha, tipo_comida) DO UPDATE SET
                        receta_id = EXCLUDED.receta_id,
                        es_sugerida = TRUE",
                    &[&user_id, date, &meal.as_str(), recipe_id],
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
        let mut client = self.pool.get()?;
        let row = client.query_one(
            "INSERT INTO token (usuario_id, jwt, fecha_expiracion) VALUES ($1, $2, $3) RETURNING id",
            &[&user_id, &jwt, &expires_at],
        )?;
        Ok(row.get(0))
    }

    pub fn tokens_for_user(&self, user_id: i64) -> Result<Vec<Token>> {
        let mut client = self.pool.get()?;
        let rows = client.query(
            "SELECT id, usuario_id, jwt, fecha_expiracion FROM token
             WHERE usuario_id = $1 ORDER BY fecha_expiracion",
            &[&user_id],
        )?;
        let tokens = rows
            .iter()
            .map(|row| Token {
                id: row.get(0),
                user_id: row.get(1),
                jwt: row.get(2),
                expires_at: row.get(3),
            })
            .collect();
        Ok(tokens)
    }

    pub fn purge_expired_tokens(&self, now: NaiveDateTime) -> Result<usize> {
        let mut client = self.pool.get()?;
        let deleted = client.execute("DELETE FROM token WHERE fecha_expiracion < $1", &[&now])?;
        if deleted > 0 {
            info!("Purged {} expired tokens", deleted);
        }
        Ok(deleted as usize)
    }
}
