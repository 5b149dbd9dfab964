//! Field validation for user accounts and ingredient detections.

use regex::Regex;
use std::sync::LazyLock;

use crate::db::{BoundingBox, DetectedIngredient};
use crate::error::ValidationError;

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("Invalid email regex")
});

static NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-ZáéíóúÁÉÍÓÚñÑüÜ\s\-]+$").expect("Invalid name regex")
});

const PASSWORD_SPECIALS: &str = r#"!@#$%^&*(),.?":{}|<>_-+=[]\/;'`~"#;

pub const DEFAULT_CATEGORY: &str = "otros";
pub const DEFAULT_UNIT: &str = "unidades";

pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if email.is_empty() {
        return Err(ValidationError::EmailMissing);
    }
    if !EMAIL_REGEX.is_match(email) {
        return Err(ValidationError::EmailFormat(email.to_string()));
    }
    if email.len() > 255 {
        return Err(ValidationError::EmailTooLong(email.len()));
    }
    Ok(())
}

/// Password policy for new accounts: 8 to 128 characters with at least one
/// uppercase letter, lowercase letter, digit and special character.
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    let len = password.chars().count();
    if len == 0 {
        return Err(ValidationError::WeakPassword("required"));
    }
    if len < 8 {
        return Err(ValidationError::WeakPassword("must be at least 8 characters"));
    }
    if len > 128 {
        return Err(ValidationError::WeakPassword("must be at most 128 characters"));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(ValidationError::WeakPassword("needs an uppercase letter"));
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(ValidationError::WeakPassword("needs a lowercase letter"));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(ValidationError::WeakPassword("needs a digit"));
    }
    if !password.chars().any(|c| PASSWORD_SPECIALS.contains(c)) {
        return Err(ValidationError::WeakPassword("needs a special character"));
    }
    Ok(())
}

pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    let len = name.chars().count();
    if len == 0 {
        return Err(ValidationError::InvalidName("required"));
    }
    if len < 2 {
        return Err(ValidationError::InvalidName("must be at least 2 characters"));
    }
    if len > 100 {
        return Err(ValidationError::InvalidName("must be at most 100 characters"));
    }
    if !NAME_REGEX.is_match(name) {
        return Err(ValidationError::InvalidName(
            "may only contain letters, spaces and hyphens",
        ));
    }
    Ok(())
}

/// Clamp a confidence score into [0, 1]. Non-finite input counts as certain.
pub fn clamp_confidence(value: Option<f64>) -> f64 {
    match value {
        Some(v) if v.is_finite() => v.clamp(0.0, 1.0),
        _ => 1.0,
    }
}

/// Title-case each whitespace-separated word ("aceite de oliva" -> "Aceite De Oliva").
pub fn title_case(name: &str) -> String {
    name.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(|c| c.to_lowercase()))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// A detection after normalization, ready to be written to the inventory.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedDetection {
    pub name: String,
    pub category: String,
    pub unit: String,
    pub quantity: f64,
    pub confidence: f64,
    pub emoji: Option<String>,
    pub bounding_box: Option<BoundingBox>,
}

pub fn normalize_detection(
    detected: &DetectedIngredient,
) -> Result<NormalizedDetection, ValidationError> {
    let name = detected.name.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyIngredientName);
    }

    let quantity = detected.quantity.unwrap_or(0.0);
    if !quantity.is_finite() || quantity < 0.0 {
        return Err(ValidationError::InvalidQuantity {
            name: name.to_string(),
            value: quantity,
        });
    }

    let non_empty = |v: &Option<String>| {
        v.as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    Ok(NormalizedDetection {
        name: name.to_string(),
        category: non_empty(&detected.category).unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
        unit: non_empty(&detected.unit).unwrap_or_else(|| DEFAULT_UNIT.to_string()),
        quantity,
        confidence: clamp_confidence(detected.confidence),
        emoji: non_empty(&detected.emoji),
        bounding_box: detected.bounding_box.map(BoundingBox::clamped),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("ana@lazyfood.com").is_ok());
        assert_eq!(validate_email(""), Err(ValidationError::EmailMissing));
        assert!(matches!(
            validate_email("not-an-email"),
            Err(ValidationError::EmailFormat(_))
        ));
        let long = format!("{}@example.com", "a".repeat(250));
        assert!(matches!(
            validate_email(&long),
            Err(ValidationError::EmailTooLong(_))
        ));
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("Secreta#2024").is_ok());
        assert!(validate_password("Short1!").is_err());
        assert!(validate_password("nouppercase1!").is_err());
        assert!(validate_password("NOLOWERCASE1!").is_err());
        assert!(validate_password("NoDigitsHere!").is_err());
        assert!(validate_password("NoSpecial123").is_err());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("María José").is_ok());
        assert!(validate_name("Jean-Luc").is_ok());
        assert!(validate_name("A").is_err());
        assert!(validate_name("R2D2").is_err());
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("aceite de oliva"), "Aceite De Oliva");
        assert_eq!(title_case("  TOMATE "), "Tomate");
        assert_eq!(title_case("ñame"), "Ñame");
    }

    #[test]
    fn test_normalize_detection_defaults() {
        let detected = DetectedIngredient {
            name: "  tomate ".to_string(),
            quantity: Some(3.0),
            confidence: Some(1.7),
            bounding_box: Some(BoundingBox {
                x: -0.2,
                y: 0.3,
                width: 1.4,
                height: 0.25,
            }),
            ..Default::default()
        };

        let normalized = normalize_detection(&detected).unwrap();
        assert_eq!(normalized.name, "tomate");
        assert_eq!(normalized.category, DEFAULT_CATEGORY);
        assert_eq!(normalized.unit, DEFAULT_UNIT);
        assert_eq!(normalized.confidence, 1.0);
        let bbox = normalized.bounding_box.unwrap();
        assert_eq!(bbox.x, 0.0);
        assert_eq!(bbox.width, 1.0);
        assert_eq!(bbox.height, 0.25);
    }

    #[test]
    fn test_normalize_detection_rejects_bad_input() {
        let empty = DetectedIngredient {
            name: "   ".to_string(),
            ..Default::default()
        };
        assert_eq!(
            normalize_detection(&empty),
            Err(ValidationError::EmptyIngredientName)
        );

        let negative = DetectedIngredient {
            name: "ajo".to_string(),
            quantity: Some(-1.0),
            ..Default::default()
        };
        assert!(matches!(
            normalize_detection(&negative),
            Err(ValidationError::InvalidQuantity { .. })
        ));
    }
}
