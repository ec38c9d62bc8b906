//! Map pin repository implementation.

use std::sync::Arc;

use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;

use storymap_core::{Error, MapPin, RawRow, Result, RowSet};

use crate::probe::{is_undefined_column, CapabilityCache, Capabilities, MAP_PINS};
use crate::rows::{column, insert_sql, select_sql, SqlValue};

/// Value written to `column` for `pin`, `None` for a column this release
/// does not write.
fn pin_value(pin: &MapPin, column: &str) -> Option<SqlValue> {
    let value = match column {
        "id" => SqlValue::text(&pin.id),
        "title" => SqlValue::text(&pin.title),
        "story" => SqlValue::text(&pin.story),
        "lat" => SqlValue::Float(pin.lat),
        "lng" => SqlValue::Float(pin.lng),
        "type" => SqlValue::text(pin.pin_type.as_str()),
        "category" => SqlValue::Text(pin.category.clone()),
        "country" => SqlValue::text(&pin.country),
        "city" => SqlValue::text(&pin.city),
        "source" => SqlValue::text(pin.source.as_str()),
        "created_at" => SqlValue::Time(pin.created_at),
        _ => return None,
    };
    Some(value)
}

fn decode(row: &sqlx::postgres::PgRow, cols: &[&str]) -> Result<RawRow> {
    Ok(RawRow {
        id: column(row, cols, "id")?,
        kind: column(row, cols, "type")?,
        title: column(row, cols, "title")?,
        story: column(row, cols, "story")?,
        category: column(row, cols, "category")?,
        country: column(row, cols, "country")?,
        city: column(row, cols, "city")?,
        lat: column(row, cols, "lat")?,
        lng: column(row, cols, "lng")?,
        source: column(row, cols, "source")?,
        created_at: column(row, cols, "created_at")?,
        ..RawRow::default()
    })
}

/// PostgreSQL implementation of pin reads and transactional writes.
#[derive(Clone)]
pub struct PgPinRepository {
    pool: PgPool,
    caps: Arc<CapabilityCache>,
}

impl PgPinRepository {
    pub fn new(pool: PgPool, caps: Arc<CapabilityCache>) -> Self {
        Self { pool, caps }
    }

    async fn fetch(&self, id: Option<&str>) -> Result<RowSet> {
        let caps = self.caps.get();
        caps.require(&MAP_PINS)?;
        let cols = caps.columns(&MAP_PINS);
        let sql = select_sql(&MAP_PINS, &cols, id.is_some());

        let mut query = sqlx::query(&sql);
        if let Some(id) = id {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(Error::Database)?;
        let raw = rows
            .iter()
            .map(|r| decode(r, &cols))
            .collect::<Result<Vec<_>>>()?;
        Ok(RowSet::new(caps.shape_of(&MAP_PINS), raw))
    }

    async fn fetch_with_retry(&self, id: Option<&str>) -> Result<RowSet> {
        match self.fetch(id).await {
            Err(Error::Database(e)) if is_undefined_column(&e) => {
                self.caps.refresh().await?;
                self.fetch(id).await
            }
            other => other,
        }
    }

    pub async fn load_all(&self) -> Result<RowSet> {
        self.fetch_with_retry(None).await
    }

    pub async fn load_one(&self, id: &str) -> Result<RowSet> {
        self.fetch_with_retry(Some(id)).await
    }

    pub async fn count(&self) -> Result<usize> {
        if !self.caps.get().has_table(&MAP_PINS) {
            return Ok(0);
        }
        let n: i64 = sqlx::query_scalar("SELECT count(*) FROM map_pins")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(n.max(0) as usize)
    }

    // ==========================================================================
    // TRANSACTION METHODS
    // ==========================================================================

    /// Insert or replace a pin by id.
    pub async fn upsert_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        caps: &Capabilities,
        pin: &MapPin,
    ) -> Result<()> {
        let cols = caps.columns(&MAP_PINS);
        let sql = insert_sql(&MAP_PINS, &cols, true);
        let mut query = sqlx::query(&sql);
        for c in &cols {
            let value = pin_value(pin, c).ok_or_else(|| {
                Error::Storage(format!("no value for column {}.{}", MAP_PINS.name, c))
            })?;
            query = value.bind(query);
        }
        query.execute(&mut **tx).await.map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "pins",
            op = "upsert",
            pin_id = %pin.id,
            pin_type = pin.pin_type.as_str(),
            "Pin stored"
        );
        Ok(())
    }

    /// Delete a pin. A missing row is `NotFound` only when `must_exist`.
    pub async fn delete_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: &str,
        must_exist: bool,
    ) -> Result<()> {
        let result = sqlx::query("DELETE FROM map_pins WHERE id::text = $1")
            .bind(id)
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;
        if must_exist && result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("pin {}", id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use storymap_core::{PinCategory, PinSource};

    #[test]
    fn test_every_known_column_has_a_value() {
        let pin = MapPin {
            id: "manual_1".to_string(),
            title: "Hotline".to_string(),
            story: String::new(),
            lat: -1.29,
            lng: 36.82,
            pin_type: PinCategory::Resource,
            category: None,
            country: "Kenya".to_string(),
            city: "Nairobi".to_string(),
            created_at: Utc::now(),
            source: PinSource::Manual,
        };
        for column in MAP_PINS
            .required
            .iter()
            .chain(MAP_PINS.shape_columns)
            .chain(MAP_PINS.extra_columns)
        {
            assert!(pin_value(&pin, column).is_some(), "no value for {}", column);
        }
        assert!(matches!(
            pin_value(&pin, "created_at"),
            Some(SqlValue::Time(t)) if t == pin.created_at
        ));
        assert!(pin_value(&pin, "updated_at").is_none());
    }
}
