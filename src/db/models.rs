//! Row types for the LazyFood tables.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Account role. The column carries no constraint; anything unrecognized
/// reads back as `User`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// Meal slot in the planner. Declaration order is the order of a day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MealType {
    #[serde(rename = "desayuno")]
    Breakfast,
    #[serde(rename = "almuerzo")]
    Lunch,
    #[serde(rename = "cena")]
    Dinner,
}

impl MealType {
    pub const ALL: [MealType; 3] = [MealType::Breakfast, MealType::Lunch, MealType::Dinner];

    pub fn as_str(&self) -> &'static str {
        match self {
            MealType::Breakfast => "desayuno",
            MealType::Lunch => "almuerzo",
            MealType::Dinner => "cena",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "desayuno" => Some(MealType::Breakfast),
            "almuerzo" => Some(MealType::Lunch),
            "cena" => Some(MealType::Dinner),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub country: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub cooking_level: i32,
    pub nutrition_goals: Option<String>,
    pub active: bool,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    /// Already hashed by the caller; this crate never sees plaintext passwords.
    pub password_hash: String,
    pub role: Role,
    pub country: Option<String>,
    pub cooking_level: i32,
    pub nutrition_goals: Option<String>,
}

impl NewUser {
    pub fn new(name: &str, email: &str, password_hash: &str) -> Self {
        Self {
            name: name.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            role: Role::User,
            country: None,
            cooking_level: 1,
            nutrition_goals: None,
        }
    }
}

/// Dietary preferences. Allergies and likes behave as sets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preference {
    pub diet: Option<String>,
    #[serde(default)]
    pub allergies: BTreeSet<String>,
    #[serde(default)]
    pub likes: BTreeSet<String>,
}

/// Trimmed, non-empty, deduplicated entries of a preference set.
fn normalized_set(set: &BTreeSet<String>) -> BTreeSet<String> {
    set.iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Preference {
    pub fn allergies_json(&self) -> serde_json::Value {
        serde_json::json!(normalized_set(&self.allergies))
    }

    pub fn likes_json(&self) -> serde_json::Value {
        serde_json::json!(normalized_set(&self.likes))
    }

    /// Build a set from a stored JSON array, ignoring non-string members.
    pub fn set_from_json(value: Option<serde_json::Value>) -> BTreeSet<String> {
        match value {
            Some(serde_json::Value::Array(items)) => items
                .into_iter()
                .filter_map(|v| v.as_str().map(|s| s.trim().to_string()))
                .filter(|s| !s.is_empty())
                .collect(),
            _ => BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ingredient {
    pub id: i64,
    pub name: String,
    pub category: Option<String>,
    pub unit: Option<String>,
    pub emoji: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewIngredient {
    pub name: String,
    pub category: Option<String>,
    pub unit: Option<String>,
    pub emoji: Option<String>,
}

fn default_center() -> f64 {
    0.5
}

fn default_extent() -> f64 {
    0.1
}

/// Normalized detection box, all coordinates relative to the image (0-1).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    #[serde(default = "default_center")]
    pub x: f64,
    #[serde(default = "default_center")]
    pub y: f64,
    #[serde(default = "default_extent")]
    pub width: f64,
    #[serde(default = "default_extent")]
    pub height: f64,
}

impl BoundingBox {
    pub fn clamped(self) -> Self {
        let clamp = |v: f64, fallback: f64| if v.is_finite() { v.clamp(0.0, 1.0) } else { fallback };
        Self {
            x: clamp(self.x, default_center()),
            y: clamp(self.y, default_center()),
            width: clamp(self.width, default_extent()),
            height: clamp(self.height, default_extent()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "x": self.x,
            "y": self.y,
            "width": self.width,
            "height": self.height,
        })
    }

    pub fn from_json(value: Option<serde_json::Value>) -> Option<Self> {
        value.and_then(|v| serde_json::from_value(v).ok())
    }
}

/// One ingredient as reported by the recognition service.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DetectedIngredient {
    #[serde(alias = "nombre")]
    pub name: String,
    #[serde(default, alias = "categoria")]
    pub category: Option<String>,
    #[serde(default, alias = "unidad")]
    pub unit: Option<String>,
    #[serde(default)]
    pub emoji: Option<String>,
    #[serde(default, alias = "cantidad")]
    pub quantity: Option<f64>,
    #[serde(default, alias = "confianza")]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub bounding_box: Option<BoundingBox>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InventoryAction {
    Added,
    Updated,
}

/// Outcome of writing one detection into a user's inventory.
#[derive(Debug, Clone, Serialize)]
pub struct InventoryUpdate {
    pub ingredient_id: i64,
    pub ingredient_name: String,
    pub action: InventoryAction,
    pub quantity: f64,
    pub confidence: f64,
    pub emoji: Option<String>,
    pub bounding_box: Option<BoundingBox>,
}

/// Inventory row joined with its ingredient.
#[derive(Debug, Clone, Serialize)]
pub struct InventoryEntry {
    pub id: i64,
    pub user_id: i64,
    pub ingredient_id: i64,
    pub ingredient_name: String,
    pub category: Option<String>,
    pub unit: Option<String>,
    pub emoji: Option<String>,
    pub quantity: f64,
    pub confidence: f64,
    pub bounding_box: Option<BoundingBox>,
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recipe {
    pub id: i64,
    pub name: String,
    pub prep_minutes: Option<i32>,
    pub calories: Option<i32>,
    pub difficulty: i32,
    pub emoji: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewRecipe {
    pub name: String,
    pub prep_minutes: Option<i32>,
    pub calories: Option<i32>,
    pub difficulty: i32,
    pub emoji: Option<String>,
    pub image_url: Option<String>,
}

impl NewRecipe {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            prep_minutes: None,
            calories: None,
            difficulty: 1,
            emoji: None,
            image_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecipeStep {
    pub number: i32,
    pub instruction: String,
    pub timer_seconds: Option<i32>,
}

/// A step to store. Missing numbers are assigned consecutively from 1.
#[derive(Debug, Clone, Default)]
pub struct NewStep {
    pub number: Option<i32>,
    pub instruction: String,
    pub timer_seconds: Option<i32>,
}

impl NewStep {
    pub fn new(number: i32, instruction: &str, timer_seconds: Option<i32>) -> Self {
        Self {
            number: Some(number),
            instruction: instruction.to_string(),
            timer_seconds,
        }
    }
}

/// Resolve step numbers the way the recipe writer expects: explicit numbers
/// are kept, missing ones take the next value of a counter starting at 1
/// that no explicit step already uses.
pub fn number_steps(steps: &[NewStep]) -> Vec<RecipeStep> {
    let taken: BTreeSet<i32> = steps.iter().filter_map(|s| s.number).collect();
    let mut counter = 1;
    steps
        .iter()
        .map(|step| {
            let number = match step.number {
                Some(n) => n,
                None => {
                    while taken.contains(&counter) {
                        counter += 1;
                    }
                    let n = counter;
                    counter += 1;
                    n
                }
            };
            RecipeStep {
                number,
                instruction: step.instruction.clone(),
                timer_seconds: step.timer_seconds,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct Suggestion {
    pub id: i64,
    pub user_id: i64,
    pub recipe_id: i64,
    pub recipe_name: String,
    pub match_percentage: f64,
    pub created_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanEntry {
    pub id: i64,
    pub user_id: i64,
    pub date: NaiveDate,
    pub meal: MealType,
    pub recipe_id: Option<i64>,
    pub recipe_name: Option<String>,
    pub suggested: bool,
}

/// A week of planner entries grouped by day, then meal.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WeekPlan {
    pub start: Option<NaiveDate>,
    pub days: BTreeMap<NaiveDate, BTreeMap<MealType, PlanEntry>>,
}

impl WeekPlan {
    pub fn from_entries(start: NaiveDate, entries: Vec<PlanEntry>) -> Self {
        let mut days: BTreeMap<NaiveDate, BTreeMap<MealType, PlanEntry>> = BTreeMap::new();
        for entry in entries {
            days.entry(entry.date).or_default().insert(entry.meal, entry);
        }
        Self {
            start: Some(start),
            days,
        }
    }

    pub fn get(&self, date: NaiveDate, meal: MealType) -> Option<&PlanEntry> {
        self.days.get(&date).and_then(|meals| meals.get(&meal))
    }

    pub fn len(&self) -> usize {
        self.days.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub id: i64,
    pub user_id: i64,
    pub jwt: String,
    pub expires_at: NaiveDateTime,
}

impl Token {
    pub fn is_expired(&self, now: NaiveDateTime) -> bool {
        now > self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip_and_fallback() {
        assert_eq!(Role::from_str("admin"), Some(Role::Admin));
        assert_eq!(Role::from_str(Role::User.as_str()), Some(Role::User));
        assert_eq!(Role::from_str("superuser"), None);
    }

    #[test]
    fn test_meal_type_order() {
        let mut meals = vec![MealType::Dinner, MealType::Breakfast, MealType::Lunch];
        meals.sort();
        assert_eq!(meals, MealType::ALL.to_vec());
        assert_eq!(MealType::from_str("almuerzo"), Some(MealType::Lunch));
        assert_eq!(MealType::from_str("merienda"), None);
    }

    #[test]
    fn test_number_steps_fills_gaps() {
        let steps = vec![
            NewStep {
                number: None,
                instruction: "Lavar".to_string(),
                timer_seconds: None,
            },
            NewStep::new(5, "Servir", None),
            NewStep {
                number: None,
                instruction: "Cortar".to_string(),
                timer_seconds: Some(60),
            },
        ];
        let numbered: Vec<i32> = number_steps(&steps).iter().map(|s| s.number).collect();
        assert_eq!(numbered, vec![1, 5, 2]);
    }

    #[test]
    fn test_number_steps_skips_explicit_numbers() {
        let unnumbered = |text: &str| NewStep {
            number: None,
            instruction: text.to_string(),
            timer_seconds: None,
        };
        let steps = vec![
            unnumbered("Lavar"),
            NewStep::new(1, "Pelar", None),
            unnumbered("Cortar"),
            NewStep::new(3, "Servir", None),
        ];
        let numbered: Vec<i32> = number_steps(&steps).iter().map(|s| s.number).collect();
        assert_eq!(numbered, vec![2, 1, 4, 3]);
    }

    #[test]
    fn test_preference_json_is_normalized() {
        let pref = Preference {
            diet: None,
            allergies: ["maní", " maní ", ""].iter().map(|s| s.to_string()).collect(),
            likes: ["tofu", " tofu"].iter().map(|s| s.to_string()).collect(),
        };
        assert_eq!(pref.allergies_json(), serde_json::json!(["maní"]));
        assert_eq!(pref.likes_json(), serde_json::json!(["tofu"]));

        let likes = Preference::set_from_json(Some(pref.likes_json()));
        assert_eq!(likes.len(), 1);
    }

    #[test]
    fn test_preference_sets_from_json() {
        let value = serde_json::json!(["maní", " gluten ", "maní", 3, ""]);
        let set = Preference::set_from_json(Some(value));
        assert_eq!(set.len(), 2);
        assert!(set.contains("gluten"));
        assert!(Preference::set_from_json(None).is_empty());
    }

    #[test]
    fn test_bounding_box_defaults_from_partial_json() {
        let bbox = BoundingBox::from_json(Some(serde_json::json!({"x": 0.25}))).unwrap();
        assert_eq!(bbox.x, 0.25);
        assert_eq!(bbox.y, 0.5);
        assert_eq!(bbox.width, 0.1);
    }

    #[test]
    fn test_detected_ingredient_accepts_spanish_keys() {
        let detected: DetectedIngredient = serde_json::from_value(serde_json::json!({
            "nombre": "cebolla",
            "cantidad": 2,
            "confianza": 0.8,
            "categoria": "verdura"
        }))
        .unwrap();
        assert_eq!(detected.name, "cebolla");
        assert_eq!(detected.quantity, Some(2.0));
        assert_eq!(detected.category.as_deref(), Some("verdura"));
    }

    #[test]
    fn test_token_expiry() {
        let expires = NaiveDate::from_ymd_opt(2025, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let token = Token {
            id: 1,
            user_id: 1,
            jwt: "abc".to_string(),
            expires_at: expires,
        };
        assert!(!token.is_expired(expires));
        assert!(token.is_expired(expires + chrono::Duration::seconds(1)));
    }
}
