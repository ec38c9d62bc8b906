//! SQL building and row decoding shared by the story and pin repositories.
//!
//! Column lists come from the capability probe, so statements only name
//! columns the connected database has. Only names from the fixed
//! [`TableSpec`] lists are ever interpolated; values always go through binds.

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{Postgres, Row};

use storymap_core::{Error, Result};

use crate::probe::TableSpec;

/// A bindable column value.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SqlValue {
    Text(Option<String>),
    TextArray(Vec<String>),
    Bool(bool),
    Float(f64),
    Time(DateTime<Utc>),
}

impl SqlValue {
    pub(crate) fn text(value: impl Into<String>) -> Self {
        SqlValue::Text(Some(value.into()))
    }

    pub(crate) fn bind<'q>(
        self,
        query: Query<'q, Postgres, PgArguments>,
    ) -> Query<'q, Postgres, PgArguments> {
        match self {
            SqlValue::Text(v) => query.bind(v),
            SqlValue::TextArray(v) => query.bind(v),
            SqlValue::Bool(v) => query.bind(v),
            SqlValue::Float(v) => query.bind(v),
            SqlValue::Time(v) => query.bind(v),
        }
    }
}

/// Select expression for a known column, normalising types older schemas
/// may store differently.
fn select_expr(column: &str) -> String {
    match column {
        "id" => "id::text AS id".to_string(),
        "lat" | "lng" => format!("{0}::float8 AS {0}", column),
        "submitted_at" | "updated_at" | "created_at" => format!("{0}::timestamptz AS {0}", column),
        other => other.to_string(),
    }
}

/// `SELECT <columns> FROM <table> [WHERE id::text = $1]`.
pub(crate) fn select_sql(spec: &TableSpec, columns: &[&str], by_id: bool) -> String {
    let list: Vec<String> = columns.iter().map(|c| select_expr(c)).collect();
    let mut sql = format!("SELECT {} FROM {}", list.join(", "), spec.name);
    if by_id {
        sql.push_str(" WHERE id::text = $1");
    }
    sql
}

/// `INSERT INTO <table> (<columns>) VALUES ($1, ...)`, optionally replacing
/// every non-id column on id conflict.
pub(crate) fn insert_sql(spec: &TableSpec, columns: &[&str], upsert: bool) -> String {
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${}", i)).collect();
    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        spec.name,
        columns.join(", "),
        placeholders.join(", ")
    );
    if upsert {
        let updates: Vec<String> = columns
            .iter()
            .filter(|c| **c != "id")
            .map(|c| format!("{0} = EXCLUDED.{0}", c))
            .collect();
        sql.push_str(" ON CONFLICT (id) DO UPDATE SET ");
        sql.push_str(&updates.join(", "));
    }
    sql
}

/// Decode `name` when the column was selected; `None` otherwise.
pub(crate) fn column<'r, T>(row: &'r PgRow, columns: &[&str], name: &str) -> Result<Option<T>>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    if !columns.contains(&name) {
        return Ok(None);
    }
    row.try_get::<Option<T>, _>(name).map_err(Error::Database)
}

/// True for PostgreSQL's `unique_violation` error.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{MAP_PINS, STORIES};

    #[test]
    fn test_select_sql_casts_known_columns() {
        let sql = select_sql(&MAP_PINS, &["id", "title", "lat", "created_at"], true);
        assert_eq!(
            sql,
            "SELECT id::text AS id, title, lat::float8 AS lat, \
             created_at::timestamptz AS created_at FROM map_pins WHERE id::text = $1"
        );
    }

    #[test]
    fn test_insert_sql_plain() {
        let sql = insert_sql(&STORIES, &["id", "title", "status"], false);
        assert_eq!(
            sql,
            "INSERT INTO stories (id, title, status) VALUES ($1, $2, $3)"
        );
    }

    #[test]
    fn test_insert_sql_upsert_skips_id() {
        let sql = insert_sql(&MAP_PINS, &["id", "title", "lat"], true);
        assert!(sql.ends_with("ON CONFLICT (id) DO UPDATE SET title = EXCLUDED.title, lat = EXCLUDED.lat"));
    }
}
