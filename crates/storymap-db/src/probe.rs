//! Capability probe: which tables and columns the connected database has.
//!
//! Run once at startup and again whenever a query hits an undefined column.
//! The result picks the schema shape and the column lists used for reads and
//! writes, so a database created by an older release keeps working without
//! per-query fallbacks.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use sqlx::{PgPool, Row};
use tracing::{debug, info, warn};

use storymap_core::{Error, Result, SourceShape};

/// Column layout the current release knows about for one table.
#[derive(Debug)]
pub struct TableSpec {
    pub name: &'static str,
    /// Columns every supported release has.
    pub required: &'static [&'static str],
    /// Columns whose absence means the legacy shape.
    pub shape_columns: &'static [&'static str],
    /// Columns read and written when present; absence is harmless.
    pub extra_columns: &'static [&'static str],
}

impl TableSpec {
    fn optional(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.shape_columns
            .iter()
            .chain(self.extra_columns.iter())
            .copied()
    }
}

pub const STORIES: TableSpec = TableSpec {
    name: "stories",
    required: &["id", "title", "story", "country", "status", "submitted_at"],
    shape_columns: &[
        "type",
        "organization_name",
        "organization_description",
        "website",
        "focus_areas",
    ],
    extra_columns: &["city", "email", "anonymous", "updated_at"],
};

pub const MAP_PINS: TableSpec = TableSpec {
    name: "map_pins",
    required: &["id", "title", "lat", "lng", "type", "created_at"],
    shape_columns: &["story"],
    extra_columns: &["category", "country", "city", "source"],
};

/// Columns present per table, as seen by the last probe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    tables: HashMap<String, HashSet<String>>,
}

impl Capabilities {
    /// Build from `(table, column)` pairs.
    pub fn from_columns<I, T, C>(columns: I) -> Self
    where
        I: IntoIterator<Item = (T, C)>,
        T: Into<String>,
        C: Into<String>,
    {
        let mut tables: HashMap<String, HashSet<String>> = HashMap::new();
        for (table, column) in columns {
            tables.entry(table.into()).or_default().insert(column.into());
        }
        Self { tables }
    }

    /// Read `information_schema.columns` for the tables on the search path.
    pub async fn probe(pool: &PgPool) -> Result<Self> {
        let rows = sqlx::query(
            r#"
            SELECT table_name::text AS table_name, column_name::text AS column_name
            FROM information_schema.columns
            WHERE table_schema::text = ANY (current_schemas(false)::text[])
              AND table_name::text = ANY ($1)
            "#,
        )
        .bind(vec![STORIES.name, MAP_PINS.name])
        .fetch_all(pool)
        .await
        .map_err(Error::Database)?;

        let mut pairs = Vec::with_capacity(rows.len());
        for row in rows {
            let table: String = row.try_get("table_name").map_err(Error::Database)?;
            let column: String = row.try_get("column_name").map_err(Error::Database)?;
            pairs.push((table, column));
        }
        let caps = Self::from_columns(pairs);

        debug!(
            subsystem = "db",
            component = "probe",
            stories = %caps.shape_of(&STORIES),
            map_pins = %caps.shape_of(&MAP_PINS),
            missing = ?caps.missing_columns(),
            "Schema capabilities probed"
        );
        Ok(caps)
    }

    pub fn has_table(&self, spec: &TableSpec) -> bool {
        self.tables.contains_key(spec.name)
    }

    pub fn has_column(&self, spec: &TableSpec, column: &str) -> bool {
        self.tables
            .get(spec.name)
            .is_some_and(|cols| cols.contains(column))
    }

    /// `SchemaUnavailable` unless the table and its required columns exist.
    pub fn require(&self, spec: &TableSpec) -> Result<()> {
        if !self.has_table(spec) {
            return Err(Error::SchemaUnavailable(format!(
                "table {} does not exist",
                spec.name
            )));
        }
        let missing: Vec<_> = spec
            .required
            .iter()
            .filter(|c| !self.has_column(spec, c))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(Error::SchemaUnavailable(format!(
                "table {} lacks required columns: {}",
                spec.name,
                missing.join(", ")
            )));
        }
        Ok(())
    }

    /// Shape of one table: `Full` when all of its shape columns exist.
    pub fn shape_of(&self, spec: &TableSpec) -> SourceShape {
        if spec.shape_columns.iter().all(|c| self.has_column(spec, c)) {
            SourceShape::Full
        } else {
            SourceShape::Legacy
        }
    }

    /// Overall shape: `Full` only when both tables are.
    pub fn shape(&self) -> SourceShape {
        if [&STORIES, &MAP_PINS]
            .iter()
            .all(|spec| self.shape_of(spec) == SourceShape::Full)
        {
            SourceShape::Full
        } else {
            SourceShape::Legacy
        }
    }

    /// Known columns of `spec` that exist, required ones first.
    pub fn columns(&self, spec: &TableSpec) -> Vec<&'static str> {
        spec.required
            .iter()
            .copied()
            .chain(spec.optional())
            .filter(|c| self.has_column(spec, c))
            .collect()
    }

    /// Optional columns the database lacks, as `table.column`.
    pub fn missing_columns(&self) -> Vec<String> {
        [&STORIES, &MAP_PINS]
            .iter()
            .flat_map(|spec| {
                spec.optional()
                    .filter(move |c| !self.has_column(spec, c))
                    .map(move |c| format!("{}.{}", spec.name, c))
            })
            .collect()
    }
}

/// Shared, re-probeable capabilities.
#[derive(Debug)]
pub struct CapabilityCache {
    pool: PgPool,
    current: RwLock<Arc<Capabilities>>,
}

impl CapabilityCache {
    pub async fn probe(pool: PgPool) -> Result<Self> {
        let caps = Capabilities::probe(&pool).await?;
        info!(
            subsystem = "db",
            component = "probe",
            shape = %caps.shape(),
            "Storage shape selected"
        );
        Ok(Self::with_capabilities(pool, caps))
    }

    pub fn with_capabilities(pool: PgPool, caps: Capabilities) -> Self {
        Self {
            pool,
            current: RwLock::new(Arc::new(caps)),
        }
    }

    pub fn get(&self) -> Arc<Capabilities> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn shape(&self) -> SourceShape {
        self.get().shape()
    }

    /// Probe again after a query hit a column that no longer exists.
    pub async fn refresh(&self) -> Result<Arc<Capabilities>> {
        let before = self.shape();
        let caps = Arc::new(Capabilities::probe(&self.pool).await?);
        if caps.shape() != before {
            warn!(
                subsystem = "db",
                component = "probe",
                from = %before,
                to = %caps.shape(),
                "Storage shape changed after schema error"
            );
        }
        match self.current.write() {
            Ok(mut guard) => *guard = caps.clone(),
            Err(poisoned) => *poisoned.into_inner() = caps.clone(),
        }
        Ok(caps)
    }
}

/// True for PostgreSQL's `undefined_column` error.
pub fn is_undefined_column(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("42703"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full() -> Capabilities {
        let mut pairs = Vec::new();
        for spec in [&STORIES, &MAP_PINS] {
            for c in spec.required.iter().copied().chain(spec.optional()) {
                pairs.push((spec.name, c));
            }
        }
        Capabilities::from_columns(pairs)
    }

    fn legacy() -> Capabilities {
        Capabilities::from_columns(
            [
                "id",
                "title",
                "story",
                "country",
                "city",
                "email",
                "anonymous",
                "status",
                "submitted_at",
                "updated_at",
            ]
            .into_iter()
            .map(|c| ("stories", c))
            .chain(
                [
                    "id",
                    "title",
                    "lat",
                    "lng",
                    "type",
                    "category",
                    "country",
                    "city",
                    "created_at",
                ]
                .into_iter()
                .map(|c| ("map_pins", c)),
            ),
        )
    }

    #[test]
    fn test_full_shape() {
        let caps = full();
        assert_eq!(caps.shape(), SourceShape::Full);
        assert!(caps.missing_columns().is_empty());
        assert!(caps.require(&STORIES).is_ok());
    }

    #[test]
    fn test_legacy_shape_and_missing_columns() {
        let caps = legacy();
        assert_eq!(caps.shape(), SourceShape::Legacy);
        let missing = caps.missing_columns();
        assert!(missing.contains(&"stories.organization_name".to_string()));
        assert!(missing.contains(&"stories.type".to_string()));
        assert!(missing.contains(&"map_pins.story".to_string()));
        assert!(missing.contains(&"map_pins.source".to_string()));
        assert!(!missing.contains(&"stories.email".to_string()));
    }

    #[test]
    fn test_columns_follow_capabilities() {
        let caps = legacy();
        let cols = caps.columns(&MAP_PINS);
        assert_eq!(&cols[..6], &["id", "title", "lat", "lng", "type", "created_at"]);
        assert!(!cols.contains(&"story"));
        assert!(!cols.contains(&"source"));
        assert!(cols.contains(&"category"));
    }

    #[test]
    fn test_shape_is_decided_per_table() {
        let mut pairs = Vec::new();
        for c in STORIES.required.iter().copied().chain(STORIES.optional()) {
            pairs.push((STORIES.name, c));
        }
        for c in MAP_PINS.required.iter().copied().chain(MAP_PINS.extra_columns.iter().copied()) {
            pairs.push((MAP_PINS.name, c));
        }
        let caps = Capabilities::from_columns(pairs);

        assert_eq!(caps.shape_of(&STORIES), SourceShape::Full);
        assert_eq!(caps.shape_of(&MAP_PINS), SourceShape::Legacy);
        assert_eq!(caps.shape(), SourceShape::Legacy);
        assert_eq!(caps.missing_columns(), vec!["map_pins.story".to_string()]);
    }

    #[test]
    fn test_one_missing_organization_column_makes_stories_legacy() {
        let caps = Capabilities::from_columns(
            STORIES
                .required
                .iter()
                .copied()
                .chain(STORIES.optional())
                .filter(|c| *c != "website")
                .map(|c| (STORIES.name, c)),
        );
        assert_eq!(caps.shape_of(&STORIES), SourceShape::Legacy);
        assert!(caps.columns(&STORIES).contains(&"organization_description"));
    }

    #[test]
    fn test_missing_table_is_schema_unavailable() {
        let caps = Capabilities::default();
        assert!(matches!(
            caps.require(&STORIES),
            Err(Error::SchemaUnavailable(_))
        ));
        assert_eq!(caps.shape(), SourceShape::Legacy);
    }

    #[test]
    fn test_missing_required_column() {
        let caps = Capabilities::from_columns([("stories", "id")]);
        let err = caps.require(&STORIES).unwrap_err();
        assert!(err.to_string().contains("title"));
    }
}
