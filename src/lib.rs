//! LazyFood storage layer: schema bootstrap, seed data, the `rol` migration,
//! typed data access over SQLite or PostgreSQL, and the container rebuild.

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod ops;
pub mod planner;
pub mod recommend;
pub mod validation;

pub use config::Config;
pub use db::Database;
