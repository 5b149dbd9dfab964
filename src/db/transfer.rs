//! SQLite-to-PostgreSQL copy tool.
//!
//! Reads every table from the SQLite database and inserts into PostgreSQL in
//! `TABLE_ORDER`, so parents always land before the rows referencing them.
//! Row ids are preserved and each id sequence is moved to `max(id)`
//! afterward so new rows continue from there.

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use postgres::{GenericClient, NoTls};
use rusqlite::Connection;
use std::path::Path;
use tracing::info;

use super::postgres::PgDb;
use super::schema::TABLE_ORDER;
use super::sqlite::SqliteDb;

/// Copy all LazyFood data from a SQLite file into a PostgreSQL database.
///
/// Both sides are initialized first (schema plus `rol` column), so a source
/// that predates the migration still copies cleanly. Returns rows copied per
/// table in copy order.
pub fn copy_sqlite_to_postgres(sqlite_path: &Path, postgres_url: &str) -> Result<Vec<(String, u64)>> {
    let source = SqliteDb::open(sqlite_path)?;
    let config: postgres::Config = postgres_url
        .parse()
        .with_context(|| "Invalid PostgreSQL URL")?;
    copy_database(&source, config)
}

/// Rows and sequence positions land in one transaction; a failure on any
/// table leaves the target as it was.
pub(crate) fn copy_database(source: &SqliteDb, config: postgres::Config) -> Result<Vec<(String, u64)>> {
    source.initialize()?;

    let target = PgDb::open_with_config(config.clone(), 1)?;
    target
        .initialize()
        .with_context(|| "Failed to create PostgreSQL schema")?;

    let mut pg = config
        .connect(NoTls)
        .with_context(|| "Failed to connect to PostgreSQL")?;
    let mut tx = pg.transaction()?;

    let sqlite = &source.conn;
    let mut copied = Vec::with_capacity(TABLE_ORDER.len());
    for table in TABLE_ORDER {
        let count = match *table {
            "ingrediente" => copy_ingredients(sqlite, &mut tx)?,
            "receta" => copy_recipes(sqlite, &mut tx)?,
            "usuario" => copy_users(sqlite, &mut tx)?,
            "preferencia" => copy_preferences(sqlite, &mut tx)?,
            "inventario" => copy_inventory(sqlite, &mut tx)?,
            "paso_receta" => copy_steps(sqlite, &mut tx)?,
            "sugerencia_receta" => copy_suggestions(sqlite, &mut tx)?,
            "planificador" => copy_planner(sqlite, &mut tx)?,
            "token" => copy_tokens(sqlite, &mut tx)?,
            other => anyhow::bail!("No copy routine for table {}", other),
        };
        info!("  {}: {} rows copied", table, count);
        copied.push((table.to_string(), count));
    }

    reset_sequences(&mut tx)?;
    tx.commit().with_context(|| "Failed to commit PostgreSQL copy")?;

    info!("Copy to PostgreSQL complete");
    Ok(copied)
}

fn copy_ingredients<C: GenericClient>(sqlite: &Connection, pg: &mut C) -> Result<u64> {
    let mut stmt = sqlite.prepare("SELECT id, nombre, categoria, unidad, emoji FROM ingrediente")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, Option<String>>(3)?,
            row.get::<_, Option<String>>(4)?,
        ))
    })?;

    let mut count = 0u64;
    for row in rows {
        let r = row?;
        count += pg.execute(
            "INSERT INTO ingrediente (id, nombre, categoria, unidad, emoji)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (id) DO NOTHING",
            &[&r.0, &r.1, &r.2, &r.3, &r.4],
        )?;
    }
    Ok(count)
}

fn copy_recipes<C: GenericClient>(sqlite: &Connection, pg: &mut C) -> Result<u64> {
    let mut stmt = sqlite.prepare(
        "SELECT id, nombre, tiempo_preparacion, calorias, nivel_dificultad, emoji, imagen_url
         FROM receta",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<i32>>(2)?,
            row.get::<_, Option<i32>>(3)?,
            row.get::<_, Option<i32>>(4)?,
            row.get::<_, Option<String>>(5)?,
            row.get::<_, Option<String>>(6)?,
        ))
    })?;

    let mut count = 0u64;
    for row in rows {
        let r = row?;
        count += pg.execute(
            "INSERT INTO receta (id, nombre, tiempo_preparacion, calorias, nivel_dificultad, emoji, imagen_url)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (id) DO NOTHING",
            &[&r.0, &r.1, &r.2, &r.3, &r.4, &r.5, &r.6],
        )?;
    }
    Ok(count)
}

fn copy_users<C: GenericClient>(sqlite: &Connection, pg: &mut C) -> Result<u64> {
    let mut stmt = sqlite.prepare(
        "SELECT id, nombre, correo, password, rol, pais, fecha_creacion, nivel_cocina,
                metas_nutricionales, activo, reset_token, reset_token_expiration
         FROM usuario",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, Option<String>>(5)?,
            row.get::<_, Option<NaiveDateTime>>(6)?,
            row.get::<_, Option<i32>>(7)?,
            row.get::<_, Option<String>>(8)?,
            row.get::<_, bool>(9)?,
            row.get::<_, Option<String>>(10)?,
            row.get::<_, Option<NaiveDateTime>>(11)?,
        ))
    })?;

    let mut count = 0u64;
    for row in rows {
        let r = row?;
        count += pg.execute(
            "INSERT INTO usuario (id, nombre, correo, password, rol, pais, fecha_creacion, nivel_cocina,
                metas_nutricionales, activo, reset_token, reset_token_expiration)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
             ON CONFLICT (id) DO NOTHING",
            &[
                &r.0, &r.1, &r.2, &r.3, &r.4, &r.5, &r.6, &r.7, &r.8, &r.9, &r.10, &r.11,
            ],
        )?;
    }
    Ok(count)
}

fn copy_preferences<C: GenericClient>(sqlite: &Connection, pg: &mut C) -> Result<u64> {
    let mut stmt = sqlite.prepare("SELECT id, usuario_id, dieta, alergias, gustos FROM preferencia")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, Option<serde_json::Value>>(3)?,
            row.get::<_, Option<serde_json::Value>>(4)?,
        ))
    })?;

    let mut count = 0u64;
    for row in rows {
        let r = row?;
        count += pg.execute(
            "INSERT INTO preferencia (id, usuario_id, dieta, alergias, gustos)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (id) DO NOTHING",
            &[&r.0, &r.1, &r.2, &r.3, &r.4],
        )?;
    }
    Ok(count)
}

fn copy_inventory<C: GenericClient>(sqlite: &Connection, pg: &mut C) -> Result<u64> {
    let mut stmt = sqlite.prepare(
        "SELECT id, usuario_id, ingrediente_id, cantidad, confianza, fecha_actualizacion, bounding_box
         FROM inventario",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, Option<f64>>(3)?,
            row.get::<_, Option<f64>>(4)?,
            row.get::<_, Option<NaiveDateTime>>(5)?,
            row.get::<_, Option<serde_json::Value>>(6)?,
        ))
    })?;

    let mut count = 0u64;
    for row in rows {
        let r = row?;
        count += pg.execute(
            "INSERT INTO inventario (id, usuario_id, ingrediente_id, cantidad, confianza,
                fecha_actualizacion, bounding_box)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (id) DO NOTHING",
            &[&r.0, &r.1, &r.2, &r.3, &r.4, &r.5, &r.6],
        )?;
    }
    Ok(count)
}

fn copy_steps<C: GenericClient>(sqlite: &Connection, pg: &mut C) -> Result<u64> {
    let mut stmt = sqlite.prepare(
        "SELECT id, receta_id, numero_paso, instruccion, temporizador_segundos FROM paso_receta",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, i32>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, Option<i32>>(4)?,
        ))
    })?;

    let mut count = 0u64;
    for row in rows {
        let r = row?;
        count += pg.execute(
            "INSERT INTO paso_receta (id, receta_id, numero_paso, instruccion, temporizador_segundos)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (id) DO NOTHING",
            &[&r.0, &r.1, &r.2, &r.3, &r.4],
        )?;
    }
    Ok(count)
}

fn copy_suggestions<C: GenericClient>(sqlite: &Connection, pg: &mut C) -> Result<u64> {
    let mut stmt = sqlite.prepare(
        "SELECT id, usuario_id, receta_id, porcentaje_coincidencia, fecha FROM sugerencia_receta",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, Option<f64>>(3)?,
            row.get::<_, Option<NaiveDateTime>>(4)?,
        ))
    })?;

    let mut count = 0u64;
    for row in rows {
        let r = row?;
        count += pg.execute(
            "INSERT INTO sugerencia_receta (id, usuario_id, receta_id, porcentaje_coincidencia, fecha)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (id) DO NOTHING",
            &[&r.0, &r.1, &r.2, &r.3, &r.4],
        )?;
    }
    Ok(count)
}

fn copy_planner<C: GenericClient>(sqlite: &Connection, pg: &mut C) -> Result<u64> {
    let mut stmt = sqlite.prepare(
        "SELECT id, usuario_id, fecha, tipo_comida, receta_id, es_sugerida FROM planificador",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, NaiveDate>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, Option<i64>>(4)?,
            row.get::<_, Option<bool>>(5)?,
        ))
    })?;

    let mut count = 0u64;
    for row in rows {
        let r = row?;
        count += pg.execute(
            "INSERT INTO planificador (id, usuario_id, fecha, tipo_comida, receta_id, es_sugerida)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (id) DO NOTHING",
            &[&r.0, &r.1, &r.2, &r.3, &r.4, &r.5.unwrap_or(false)],
        )?;
    }
    Ok(count)
}

fn copy_tokens<C: GenericClient>(sqlite: &Connection, pg: &mut C) -> Result<u64> {
    let mut stmt = sqlite.prepare("SELECT id, usuario_id, jwt, fecha_expiracion FROM token")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, NaiveDateTime>(3)?,
        ))
    })?;

    let mut count = 0u64;
    for row in rows {
        let r = row?;
        count += pg.execute(
            "INSERT INTO token (id, usuario_id, jwt, fecha_expiracion)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (id) DO NOTHING",
            &[&r.0, &r.1, &r.2, &r.3],
        )?;
    }
    Ok(count)
}

fn reset_sequences<C: GenericClient>(pg: &mut C) -> Result<()> {
    for table in TABLE_ORDER {
        let row = pg.query_one(&format!("SELECT COALESCE(MAX(id), 0) FROM {}", table), &[])?;
        let max_id: i64 = row.get(0);
        if max_id > 0 {
            pg.execute(
                &format!("SELECT setval(pg_get_serial_sequence('{}', 'id'), $1)", table),
                &[&max_id],
            )?;
        }
    }

    info!("  Sequences reset to current max ids");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::NewUser;
    use crate::db::postgres::testing::ScratchSchema;
    use crate::db::seed::SeedOptions;

    #[test]
    fn test_copy_preserves_rows_and_sequences() {
        let Some(scratch) = ScratchSchema::create() else { return };
        let source = SqliteDb::open_in_memory().unwrap();
        source.initialize().unwrap();
        source.seed(&SeedOptions { demo_data: true }).unwrap();

        let copied = copy_database(&source, scratch.config()).unwrap();
        let expected = source.table_counts().unwrap();
        assert_eq!(copied.len(), expected.len());
        for ((table, rows), (_, source_rows)) in copied.iter().zip(&expected) {
            assert_eq!(*rows as i64, *source_rows, "{table}");
        }

        // Existing ids are skipped on a second run.
        let again = copy_database(&source, scratch.config()).unwrap();
        assert!(again.iter().all(|(_, rows)| *rows == 0));

        let target = PgDb::open_with_config(scratch.config(), 1).unwrap();
        assert_eq!(target.table_counts().unwrap(), expected);
        let max_user: i64 = source
            .conn
            .query_row("SELECT MAX(id) FROM usuario", [], |row| row.get(0))
            .unwrap();
        let new_id = target
            .create_user(&NewUser::new("Luis Vega", "luis@lazyfood.com", "hash"))
            .unwrap();
        assert!(new_id > max_user);
    }
}
