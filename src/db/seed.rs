//! Lookup and demo data for local and development databases.
//!
//! Lookup rows (ingredients, recipes and their steps) are inserted only when
//! no row with the same name exists, compared case-insensitively, so seeding
//! an already-seeded database is a no-op. Demo rows hang off a single demo
//! user and are skipped entirely once that user exists.

use serde::Serialize;

use super::models::MealType;

pub struct SeedIngredient {
    pub name: &'static str,
    pub category: &'static str,
    pub unit: &'static str,
    pub emoji: &'static str,
}

pub struct SeedRecipe {
    pub name: &'static str,
    pub prep_minutes: i32,
    pub calories: i32,
    pub difficulty: i32,
    pub emoji: &'static str,
    pub steps: &'static [(&'static str, Option<i32>)], // (instruction, timer seconds)
}

const fn ingredient(
    name: &'static str,
    category: &'static str,
    unit: &'static str,
    emoji: &'static str,
) -> SeedIngredient {
    SeedIngredient {
        name,
        category,
        unit,
        emoji,
    }
}

pub const SEED_INGREDIENTS: &[SeedIngredient] = &[
    ingredient("Tomate", "verdura", "unidades", "🍅"),
    ingredient("Cebolla", "verdura", "unidades", "🧅"),
    ingredient("Ajo", "verdura", "dientes", "🧄"),
    ingredient("Zanahoria", "verdura", "unidades", "🥕"),
    ingredient("Papa", "verdura", "unidades", "🥔"),
    ingredient("Pimiento", "verdura", "unidades", "🫑"),
    ingredient("Lechuga", "verdura", "unidades", "🥬"),
    ingredient("Brócoli", "verdura", "gramos", "🥦"),
    ingredient("Limón", "fruta", "unidades", "🍋"),
    ingredient("Manzana", "fruta", "unidades", "🍎"),
    ingredient("Plátano", "fruta", "unidades", "🍌"),
    ingredient("Pollo", "carne", "gramos", "🍗"),
    ingredient("Carne de res", "carne", "gramos", "🥩"),
    ingredient("Pescado", "pescado", "gramos", "🐟"),
    ingredient("Huevo", "proteina", "unidades", "🥚"),
    ingredient("Leche", "lacteo", "ml", "🥛"),
    ingredient("Queso", "lacteo", "gramos", "🧀"),
    ingredient("Arroz", "cereal", "gramos", "🍚"),
    ingredient("Pasta", "cereal", "gramos", "🍝"),
    ingredient("Pan", "cereal", "unidades", "🍞"),
    ingredient("Aceite de oliva", "condimento", "ml", "🫒"),
    ingredient("Sal", "condimento", "gramos", "🧂"),
];

pub const SEED_RECIPES: &[SeedRecipe] = &[
    SeedRecipe {
        name: "Tortilla de papas",
        prep_minutes: 35,
        calories: 420,
        difficulty: 2,
        emoji: "🥚",
        steps: &[
            ("Pelar y cortar las papas en láminas finas.", None),
            ("Freír las papas y la cebolla a fuego medio hasta que estén tiernas.", Some(900)),
            ("Batir los huevos con sal y mezclar con las papas escurridas.", None),
            ("Cuajar la tortilla en la sartén, darle la vuelta y terminar de cocinar.", Some(300)),
        ],
    },
    SeedRecipe {
        name: "Ensalada fresca",
        prep_minutes: 10,
        calories: 180,
        difficulty: 1,
        emoji: "🥗",
        steps: &[
            ("Lavar la lechuga, el tomate y la zanahoria.", None),
            ("Cortar las verduras en trozos pequeños.", None),
            ("Aliñar con aceite de oliva, limón y sal.", None),
        ],
    },
    SeedRecipe {
        name: "Arroz con pollo",
        prep_minutes: 45,
        calories: 550,
        difficulty: 2,
        emoji: "🍛",
        steps: &[
            ("Dorar el pollo troceado en una olla con aceite.", Some(480)),
            ("Añadir cebolla, ajo y pimiento picados y sofreír.", Some(300)),
            ("Incorporar el arroz y el agua, sazonar y llevar a hervor.", None),
            ("Cocinar tapado a fuego bajo hasta que el arroz esté listo.", Some(1200)),
        ],
    },
    SeedRecipe {
        name: "Pasta al pomodoro",
        prep_minutes: 25,
        calories: 480,
        difficulty: 1,
        emoji: "🍝",
        steps: &[
            ("Cocer la pasta en agua con sal.", Some(600)),
            ("Sofreír ajo en aceite de oliva y añadir el tomate picado.", Some(420)),
            ("Mezclar la pasta escurrida con la salsa y servir con queso.", None),
        ],
    },
    SeedRecipe {
        name: "Huevos revueltos",
        prep_minutes: 10,
        calories: 250,
        difficulty: 1,
        emoji: "🍳",
        steps: &[
            ("Batir los huevos con un poco de leche y sal.", None),
            ("Cocinar a fuego bajo removiendo sin parar.", Some(180)),
            ("Servir con pan tostado.", None),
        ],
    },
];

pub const DEMO_USER_NAME: &str = "Usuario Demo";
pub const DEMO_USER_EMAIL: &str = "demo@lazyfood.com";
/// Locked hash: no password verifies against it.
pub const DEMO_USER_PASSWORD_HASH: &str = "!";
pub const DEMO_USER_COUNTRY: &str = "Perú";
pub const DEMO_DIET: &str = "omnivora";
pub const DEMO_ALLERGIES: &[&str] = &["maní"];
pub const DEMO_LIKES: &[&str] = &["pasta", "pollo"];

/// (ingredient name, quantity) pairs placed in the demo user's inventory.
pub const DEMO_INVENTORY: &[(&str, f64)] = &[
    ("Tomate", 4.0),
    ("Cebolla", 2.0),
    ("Huevo", 6.0),
    ("Arroz", 500.0),
    ("Pasta", 250.0),
];

/// Planner slot for the demo user on the day the seed runs.
pub const DEMO_PLAN: (MealType, &str) = (MealType::Breakfast, "Huevos revueltos");

#[derive(Debug, Clone, Default)]
pub struct SeedOptions {
    pub demo_data: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub ingredients_added: usize,
    pub recipes_added: usize,
    pub steps_added: usize,
    pub demo_user_created: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_seed_names_are_unique() {
        let ingredients: HashSet<String> = SEED_INGREDIENTS
            .iter()
            .map(|i| i.name.to_lowercase())
            .collect();
        assert_eq!(ingredients.len(), SEED_INGREDIENTS.len());

        let recipes: HashSet<&str> = SEED_RECIPES.iter().map(|r| r.name).collect();
        assert_eq!(recipes.len(), SEED_RECIPES.len());
    }

    #[test]
    fn test_demo_data_references_seeded_rows() {
        for (name, _) in DEMO_INVENTORY {
            assert!(SEED_INGREDIENTS.iter().any(|i| i.name == *name), "{name}");
        }
        assert!(SEED_RECIPES.iter().any(|r| r.name == DEMO_PLAN.1));
    }

    #[test]
    fn test_vegetables_include_basics() {
        let vegetables: Vec<&str> = SEED_INGREDIENTS
            .iter()
            .filter(|i| i.category == "verdura")
            .map(|i| i.name)
            .collect();
        for name in ["Tomate", "Cebolla", "Ajo"] {
            assert!(vegetables.contains(&name));
        }
    }
}
