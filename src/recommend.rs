//! Pantry-to-recipe match scoring.

pub const DEFAULT_RECOMMENDATIONS: usize = 5;
pub const MAX_RECOMMENDATIONS: usize = 20;

/// Percentage (0-100, two decimals) of recipe ingredients the user has.
///
/// Names are compared lower-cased and trimmed; a recipe ingredient counts as
/// present when some pantry name contains it or is contained in it, so
/// "tomate" matches "tomate cherry". Blank pantry names never match.
pub fn match_percentage<U, R>(user_ingredients: &[U], recipe_ingredients: &[R]) -> f64
where
    U: AsRef<str>,
    R: AsRef<str>,
{
    if recipe_ingredients.is_empty() {
        return 0.0;
    }

    let pantry: Vec<String> = user_ingredients
        .iter()
        .map(|i| i.as_ref().trim().to_lowercase())
        .filter(|i| !i.is_empty())
        .collect();

    let matches = recipe_ingredients
        .iter()
        .map(|i| i.as_ref().trim().to_lowercase())
        .filter(|needed| {
            !needed.is_empty()
                && pantry
                    .iter()
                    .any(|have| have.contains(needed.as_str()) || needed.contains(have.as_str()))
        })
        .count();

    let percentage = matches as f64 / recipe_ingredients.len() as f64 * 100.0;
    (percentage * 100.0).round() / 100.0
}

/// How many recommendations to produce for a requested count.
pub fn clamp_recommendation_count(requested: Option<i64>) -> usize {
    match requested {
        None => DEFAULT_RECOMMENDATIONS,
        Some(n) => n.clamp(1, MAX_RECOMMENDATIONS as i64) as usize,
    }
}
