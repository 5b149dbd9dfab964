//! Weekly meal planning: week arithmetic, the cyclic default plan, and
//! turning loosely-shaped plan suggestions into concrete recipe ids.

use chrono::{Duration, NaiveDate};
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;
use tracing::debug;

use crate::db::models::{MealType, Recipe};
use crate::error::ValidationError;

static ISO_DATE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{4}-\d{2}-\d{2}").expect("Invalid date regex"));

static NUMBER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("Invalid number regex"));

pub const DAYS_PER_WEEK: i64 = 7;

/// Recipe ids per day and meal. `None` marks a slot left empty.
pub type WeekSuggestions = BTreeMap<NaiveDate, BTreeMap<MealType, Option<i64>>>;

/// Last day of the week starting at `start` (inclusive).
pub fn week_end(start: NaiveDate) -> NaiveDate {
    start + Duration::days(DAYS_PER_WEEK - 1)
}

pub fn week_dates(start: NaiveDate) -> Vec<NaiveDate> {
    (0..DAYS_PER_WEEK).map(|i| start + Duration::days(i)).collect()
}

/// Spread `recipe_ids` over the week in order, wrapping around: day `i`
/// gets ids `3i`, `3i+1` and `3i+2` modulo the list length. With no ids
/// every slot is empty.
pub fn default_week_plan(start: NaiveDate, recipe_ids: &[i64]) -> WeekSuggestions {
    let n = recipe_ids.len();
    week_dates(start)
        .into_iter()
        .enumerate()
        .map(|(day, date)| {
            let meals = MealType::ALL
                .iter()
                .enumerate()
                .map(|(slot, meal)| {
                    let id = (n > 0).then(|| recipe_ids[(day * 3 + slot) % n]);
                    (*meal, id)
                })
                .collect();
            (date, meals)
        })
        .collect()
}

/// Accept `YYYY-MM-DD`, or pull the first such date out of a longer string
/// ("lunes 2025-06-02").
pub fn normalize_plan_date(raw: &str) -> Result<NaiveDate, ValidationError> {
    let trimmed = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date);
    }
    ISO_DATE_REGEX
        .find(trimmed)
        .and_then(|m| NaiveDate::parse_from_str(m.as_str(), "%Y-%m-%d").ok())
        .ok_or_else(|| ValidationError::InvalidDate(raw.to_string()))
}

/// The recipes a plan may refer to, indexed by id and by normalized name.
#[derive(Debug, Clone, Default)]
pub struct RecipeCatalog {
    ids: BTreeSet<i64>,
    // (lower-cased trimmed name, id), in id order
    names: Vec<(String, i64)>,
}

impl RecipeCatalog {
    pub fn new<'a>(recipes: impl IntoIterator<Item = (i64, &'a str)>) -> Self {
        let mut catalog = Self::default();
        for (id, name) in recipes {
            catalog.ids.insert(id);
            catalog.names.push((name.trim().to_lowercase(), id));
        }
        catalog.names.sort_by_key(|(_, id)| *id);
        catalog
    }

    pub fn from_recipes(recipes: &[Recipe]) -> Self {
        Self::new(recipes.iter().map(|r| (r.id, r.name.as_str())))
    }

    pub fn contains(&self, id: i64) -> bool {
        self.ids.contains(&id)
    }

    pub fn ids(&self) -> Vec<i64> {
        self.ids.iter().copied().collect()
    }

    /// Exact name first, then either name containing the other.
    pub fn find_by_name(&self, name: &str) -> Option<i64> {
        let wanted = name.trim().to_lowercase();
        if wanted.is_empty() {
            return None;
        }
        self.names
            .iter()
            .find(|(n, _)| *n == wanted)
            .or_else(|| {
                self.names
                    .iter()
                    .find(|(n, _)| n.contains(&wanted) || wanted.contains(n.as_str()))
            })
            .map(|(_, id)| *id)
    }

    fn known(&self, id: i64) -> Option<i64> {
        self.contains(id).then_some(id)
    }
}

/// Resolve one plan slot value to a recipe id from `catalog`.
///
/// Understood shapes: an integer id, a numeric string, a string holding a
/// number (`"ID_RECETA_3"`), an object with `id`/`receta_id`/`recipe_id` or
/// `nombre`/`name`, and finally a recipe name. Ids not in the catalog never
/// resolve.
pub fn resolve_recipe_ref(value: &Value, catalog: &RecipeCatalog) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().and_then(|id| catalog.known(id)),
        Value::String(s) => resolve_str(s, catalog),
        Value::Object(map) => {
            for key in ["id", "receta_id", "recipe_id"] {
                let id = match map.get(key) {
                    Some(Value::Number(n)) => n.as_i64(),
                    Some(Value::String(s)) => s.trim().parse().ok(),
                    _ => None,
                };
                if let Some(id) = id.and_then(|id| catalog.known(id)) {
                    return Some(id);
                }
            }
            ["nombre", "name"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str))
                .and_then(|name| catalog.find_by_name(name))
        }
        _ => None,
    }
}

fn resolve_str(raw: &str, catalog: &RecipeCatalog) -> Option<i64> {
    let s = raw.trim();
    if let Ok(id) = s.parse::<i64>() {
        if let Some(id) = catalog.known(id) {
            return Some(id);
        }
    }
    if let Some(id) = NUMBER_REGEX
        .find(s)
        .and_then(|m| m.as_str().parse::<i64>().ok())
        .and_then(|id| catalog.known(id))
    {
        return Some(id);
    }
    catalog.find_by_name(s)
}

/// Clean a raw `{date: {meal: ref}}` suggestion object into concrete ids.
///
/// Keys that do not normalize to a date are dropped. A day whose value is
/// not an object gets three empty slots. Meals outside the three known
/// types are ignored.
pub fn resolve_week_suggestions(raw: &Value, catalog: &RecipeCatalog) -> WeekSuggestions {
    let mut cleaned = WeekSuggestions::new();
    let Some(days) = raw.as_object() else {
        return cleaned;
    };

    for (raw_date, meals) in days {
        let date = match normalize_plan_date(raw_date) {
            Ok(date) => date,
            Err(_) => {
                debug!("Ignoring plan day with unparseable date {:?}", raw_date);
                continue;
            }
        };
        let slots = MealType::ALL
            .iter()
            .map(|meal| {
                let id = meals
                    .as_object()
                    .and_then(|m| m.get(meal.as_str()))
                    .and_then(|v| resolve_recipe_ref(v, catalog));
                (*meal, id)
            })
            .collect();
        cleaned.insert(date, slots);
    }
    cleaned
}
