//! The `rol` migration.
//!
//! Two steps, each guarded so the migration can run any number of times:
//! 1. add `usuario.rol` unless the schema catalog already lists it;
//! 2. insert the default administrator unless a row with its email exists.
//!
//! The catalog query and the statements themselves live in each backend;
//! this module holds what they share.

use serde::{Deserialize, Serialize};

pub const DEFAULT_ADMIN_EMAIL: &str = "admin@lazyfood.com";
pub const DEFAULT_ADMIN_NAME: &str = "Administrador";
/// Locked hash: the account exists but cannot log in until a real hash is set.
pub const LOCKED_PASSWORD_HASH: &str = "!";

/// The administrator row backfilled by the migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminAccount {
    #[serde(default = "default_admin_name")]
    pub name: String,

    #[serde(default = "default_admin_email")]
    pub email: String,

    /// Pre-hashed password stored verbatim in `usuario.password`.
    #[serde(default = "default_admin_password_hash")]
    pub password_hash: String,
}

fn default_admin_name() -> String {
    DEFAULT_ADMIN_NAME.to_string()
}

fn default_admin_email() -> String {
    DEFAULT_ADMIN_EMAIL.to_string()
}

fn default_admin_password_hash() -> String {
    LOCKED_PASSWORD_HASH.to_string()
}

impl Default for AdminAccount {
    fn default() -> Self {
        Self {
            name: default_admin_name(),
            email: default_admin_email(),
            password_hash: default_admin_password_hash(),
        }
    }
}

/// What a migration run actually changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub rol_column_added: bool,
    pub admin_created: bool,
}

impl MigrationReport {
    pub fn changed(&self) -> bool {
        self.rol_column_added || self.admin_created
    }
}
