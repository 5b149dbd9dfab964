//! Domain errors that callers may want to match on.
//!
//! Everything else (engine constraint violations, I/O, connection failures)
//! travels as `anyhow::Error`.

use thiserror::Error;

/// Input rejected before it reaches the database.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("email is required")]
    EmailMissing,

    #[error("email format is invalid: {0}")]
    EmailFormat(String),

    #[error("email is too long ({0} characters, max 255)")]
    EmailTooLong(usize),

    #[error("password: {0}")]
    WeakPassword(&'static str),

    #[error("name: {0}")]
    InvalidName(&'static str),

    #[error("ingredient name is empty")]
    EmptyIngredientName,

    #[error("invalid quantity for {name}: {value}")]
    InvalidQuantity { name: String, value: f64 },

    #[error("unknown meal type: {0}")]
    UnknownMealType(String),

    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("password hash is empty")]
    EmptyPasswordHash,
}

/// Lookup and uniqueness failures raised by the store itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("user {0} not found")]
    UserNotFound(i64),

    #[error("recipe {0} not found")]
    RecipeNotFound(i64),

    #[error("ingredient {0} not found")]
    IngredientNotFound(i64),

    #[error("a user with email {0} already exists")]
    DuplicateEmail(String),
}

/// Failure of the container rebuild.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RebuildError {
    #[error("compose command is empty")]
    EmptyComposeCommand,

    #[error("rebuild step `{step}` failed (exit code {code:?})")]
    StepFailed { step: &'static str, code: Option<i32> },
}
