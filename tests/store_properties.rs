//! Store invariants checked through the public `Database` API on a file
//! database, the way the CLI uses it.

use chrono::{NaiveDate, Utc};
use tempfile::TempDir;

use lazyfood::config::{DatabaseConfig, DatabaseType};
use lazyfood::db::{
    AdminAccount, Database, DetectedIngredient, MealType, NewRecipe, NewStep, NewUser, Preference,
    Role, SeedOptions, DEFAULT_ADMIN_EMAIL, TABLE_ORDER,
};
use lazyfood::error::StoreError;
use lazyfood::planner::{default_week_plan, RecipeCatalog};
use lazyfood::recommend::match_percentage;

fn open(dir: &TempDir) -> Database {
    let config = DatabaseConfig {
        backend: DatabaseType::Sqlite,
        sqlite_path: dir.path().join("data").join("lazyfood.db"),
        postgresql_url: None,
        pool_size: None,
    };
    Database::open(&config).unwrap()
}

fn count(db: &Database, table: &str) -> i64 {
    db.table_counts()
        .unwrap()
        .into_iter()
        .find(|(t, _)| t == table)
        .map(|(_, c)| c)
        .unwrap()
}

#[test]
fn email_is_unique() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir);
    db.initialize().unwrap();

    db.create_user(&NewUser::new("Ana Torres", "ana@lazyfood.com", "hash"))
        .unwrap();
    let err = db
        .create_user(&NewUser::new("Ana Ruiz", "ana@lazyfood.com", "hash"))
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<StoreError>(),
        Some(StoreError::DuplicateEmail(_))
    ));
    assert_eq!(count(&db, "usuario"), 1);
}

#[test]
fn inventory_pair_is_unique() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir);
    db.initialize().unwrap();
    let user = db
        .create_user(&NewUser::new("Ana Torres", "ana@lazyfood.com", "hash"))
        .unwrap();

    for (name, quantity) in [("cebolla", 1.0), ("Cebolla", 2.0), ("CEBOLLA ", 4.0)] {
        db.record_detection(
            user,
            &DetectedIngredient {
                name: name.to_string(),
                quantity: Some(quantity),
                ..Default::default()
            },
        )
        .unwrap();
    }

    let inventory = db.inventory_for_user(user).unwrap();
    assert_eq!(inventory.len(), 1);
    assert_eq!(inventory[0].quantity, 4.0);
    assert_eq!(count(&db, "ingrediente"), 1);
}

#[test]
fn step_numbers_are_unique_per_recipe() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir);
    db.initialize().unwrap();
    let recipe = db.create_recipe(&NewRecipe::new("Ceviche")).unwrap();

    let result = db.replace_recipe_steps(
        recipe,
        &[NewStep::new(1, "Cortar el pescado", None), NewStep::new(1, "Exprimir limones", None)],
    );
    assert!(result.is_err());
    assert!(db.recipe_steps(recipe).unwrap().is_empty());

    // The same number on another recipe is fine.
    let other = db.create_recipe(&NewRecipe::new("Causa")).unwrap();
    db.replace_recipe_steps(recipe, &[NewStep::new(1, "Cortar el pescado", None)])
        .unwrap();
    db.replace_recipe_steps(other, &[NewStep::new(1, "Cocer papas", Some(1200))])
        .unwrap();
    assert_eq!(count(&db, "paso_receta"), 2);
}

#[test]
fn deleting_user_cascades() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir);
    db.initialize().unwrap();
    db.seed(&SeedOptions::default()).unwrap();

    let user = db
        .create_user(&NewUser::new("Ana Torres", "ana@lazyfood.com", "hash"))
        .unwrap();
    let recipe = db.list_recipes().unwrap()[0].id;
    let today = Utc::now().date_naive();

    db.upsert_preference(user, &Preference::default()).unwrap();
    db.record_detection(
        user,
        &DetectedIngredient {
            name: "Tomate".to_string(),
            quantity: Some(1.0),
            ..Default::default()
        },
    )
    .unwrap();
    db.record_suggestion(user, recipe, 50.0).unwrap();
    db.set_plan_entry(user, today, MealType::Dinner, Some(recipe), false)
        .unwrap();
    db.store_token(user, "jwt", Utc::now().naive_utc()).unwrap();

    assert!(db.delete_user(user).unwrap());

    for table in ["preferencia", "inventario", "sugerencia_receta", "planificador", "token"] {
        assert_eq!(count(&db, table), 0, "{table}");
    }
    assert!(count(&db, "ingrediente") > 0);
    assert!(count(&db, "receta") > 0);
}

#[test]
fn migration_twice_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir);
    db.create_schema().unwrap();
    assert!(!db.has_column("usuario", "rol").unwrap());

    let admin = AdminAccount::default();
    let first = db.migrate(&admin).unwrap();
    assert!(first.rol_column_added && first.admin_created);

    let second = db.migrate(&admin).unwrap();
    assert!(!second.changed());

    let admins: Vec<_> = db
        .list_users()
        .unwrap()
        .into_iter()
        .filter(|u| u.email == DEFAULT_ADMIN_EMAIL)
        .collect();
    assert_eq!(admins.len(), 1);
    assert_eq!(admins[0].role, Role::Admin);

    // Survives a reopen of the same file.
    drop(db);
    let reopened = open(&dir);
    assert!(!reopened.migrate(&admin).unwrap().changed());
}

#[test]
fn seed_includes_basic_vegetables() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir);
    db.create_schema().unwrap();
    db.seed(&SeedOptions { demo_data: true }).unwrap();
    db.migrate(&AdminAccount::default()).unwrap();

    let vegetables: Vec<String> = db
        .ingredients_by_category("verdura")
        .unwrap()
        .into_iter()
        .map(|i| i.name)
        .collect();
    for name in ["Tomate", "Cebolla", "Ajo"] {
        assert!(vegetables.iter().any(|v| v == name), "missing {name}");
    }

    // Seeded before the column existed, read back with the default role.
    let demo = db.find_user_by_email("demo@lazyfood.com").unwrap().unwrap();
    assert_eq!(demo.role, Role::User);
}

#[test]
fn suggested_week_round_trip() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir);
    db.initialize().unwrap();
    db.seed(&SeedOptions { demo_data: true }).unwrap();

    let demo = db.find_user_by_email("demo@lazyfood.com").unwrap().unwrap();
    let recipes = db.list_recipes().unwrap();
    let catalog = RecipeCatalog::from_recipes(&recipes);
    let start = NaiveDate::from_ymd_opt(2030, 3, 4).unwrap();

    let plan = default_week_plan(start, &catalog.ids());
    let stored = db.apply_week_plan(demo.id, start, &plan).unwrap();
    assert_eq!(stored, 21);

    let week = db.week_plan(demo.id, start).unwrap();
    assert_eq!(week.len(), 21);
    assert!(week.days.values().flat_map(|m| m.values()).all(|e| e.suggested));

    // Score the first planned recipe against the demo pantry.
    let pantry: Vec<String> = db
        .inventory_for_user(demo.id)
        .unwrap()
        .into_iter()
        .map(|e| e.ingredient_name)
        .collect();
    let score = match_percentage(&pantry, &["huevo", "leche", "sal"]);
    db.record_suggestion(demo.id, recipes[0].id, score).unwrap();
    assert_eq!(db.suggestion_history(demo.id, 10).unwrap()[0].match_percentage, score);

    assert_eq!(db.clear_week(demo.id, start).unwrap(), 21);
    assert_eq!(TABLE_ORDER.len(), db.table_counts().unwrap().len());
}

#[test]
fn deleting_recipe_cascades() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir);
    db.initialize().unwrap();

    let user = db
        .create_user(&NewUser::new("Ana Torres", "ana@lazyfood.com", "hash"))
        .unwrap();
    let recipe = db.create_recipe(&NewRecipe::new("Ceviche")).unwrap();
    db.replace_recipe_steps(recipe, &[NewStep::new(1, "Cortar el pescado", None)])
        .unwrap();
    db.record_suggestion(user, recipe, 75.0).unwrap();
    db.set_plan_entry(user, Utc::now().date_naive(), MealType::Lunch, Some(recipe), true)
        .unwrap();

    assert!(db.delete_recipe(recipe).unwrap());

    for table in ["paso_receta", "sugerencia_receta", "planificador"] {
        assert_eq!(count(&db, table), 0, "{table}");
    }
    assert_eq!(count(&db, "usuario"), 1);
}
