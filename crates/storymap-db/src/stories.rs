//! Story repository implementation.

use std::sync::Arc;

use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::debug;

use storymap_core::{
    encode_org_narrative, Error, RawRow, Result, RowSet, SourceShape, StatusWrite, StoryRecord,
    StoryStatus, TransitionRejection,
};

use crate::probe::{is_undefined_column, CapabilityCache, Capabilities, STORIES};
use crate::rows::{column, insert_sql, is_unique_violation, select_sql, SqlValue};

/// Stored spellings of a status; older rows may use `on_map` or `onmap`.
fn spellings(status: StoryStatus) -> Vec<&'static str> {
    match status {
        StoryStatus::OnMap => vec!["on-map", "on_map", "onmap"],
        other => vec![other.as_str()],
    }
}

/// Value written to `column` for `story`, `None` for a column this release
/// does not write.
fn story_value(story: &StoryRecord, narrative: &str, column: &str) -> Option<SqlValue> {
    let value = match column {
        "id" => SqlValue::text(&story.id),
        "type" => SqlValue::text(story.kind.as_str()),
        "title" => SqlValue::text(&story.title),
        "story" => SqlValue::text(narrative),
        "organization_name" => SqlValue::Text(story.organization_name.clone()),
        "organization_description" => SqlValue::Text(story.organization_description.clone()),
        "website" => SqlValue::Text(story.website.clone()),
        "focus_areas" => SqlValue::TextArray(story.focus_areas.clone()),
        "country" => SqlValue::text(&story.country),
        "city" => SqlValue::text(&story.city),
        "email" => SqlValue::Text(story.contact.email.clone()),
        "anonymous" => SqlValue::Bool(story.contact.anonymous),
        "status" => SqlValue::text(story.status.as_str()),
        "submitted_at" => SqlValue::Time(story.submitted_at),
        "updated_at" => SqlValue::Time(story.updated_at),
        _ => return None,
    };
    Some(value)
}

fn folds_organization(caps: &Capabilities, story: &StoryRecord) -> bool {
    story.is_organization() && caps.shape_of(&STORIES) == SourceShape::Legacy
}

fn decode(row: &sqlx::postgres::PgRow, cols: &[&str]) -> Result<RawRow> {
    Ok(RawRow {
        id: column(row, cols, "id")?,
        kind: column(row, cols, "type")?,
        title: column(row, cols, "title")?,
        story: column(row, cols, "story")?,
        organization_name: column(row, cols, "organization_name")?,
        organization_description: column(row, cols, "organization_description")?,
        website: column(row, cols, "website")?,
        focus_areas: column(row, cols, "focus_areas")?,
        country: column(row, cols, "country")?,
        city: column(row, cols, "city")?,
        email: column(row, cols, "email")?,
        anonymous: column(row, cols, "anonymous")?,
        status: column(row, cols, "status")?,
        submitted_at: column(row, cols, "submitted_at")?,
        updated_at: column(row, cols, "updated_at")?,
        ..RawRow::default()
    })
}

/// PostgreSQL implementation of story reads and transactional writes.
#[derive(Clone)]
pub struct PgStoryRepository {
    pool: PgPool,
    caps: Arc<CapabilityCache>,
}

impl PgStoryRepository {
    pub fn new(pool: PgPool, caps: Arc<CapabilityCache>) -> Self {
        Self { pool, caps }
    }

    async fn fetch(&self, id: Option<&str>) -> Result<RowSet> {
        let caps = self.caps.get();
        caps.require(&STORIES)?;
        let cols = caps.columns(&STORIES);
        let sql = select_sql(&STORIES, &cols, id.is_some());

        let mut query = sqlx::query(&sql);
        if let Some(id) = id {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(Error::Database)?;
        let raw = rows
            .iter()
            .map(|r| decode(r, &cols))
            .collect::<Result<Vec<_>>>()?;
        Ok(RowSet::new(caps.shape_of(&STORIES), raw))
    }

    /// Read, re-probing and retrying once if a column has disappeared.
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
        let caps = self.caps.get();
        if !caps.has_table(&STORIES) {
            return Ok(0);
        }
        let n: i64 = sqlx::query_scalar("SELECT count(*) FROM stories")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(n.max(0) as usize)
    }

    // ==========================================================================
    // TRANSACTION METHODS
    // ==========================================================================

    /// Insert a story. Unless the table has every organization column the
    /// organization fields are folded into the narrative, which is what the
    /// legacy shape reads them back from.
    pub async fn insert_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        caps: &Capabilities,
        story: &StoryRecord,
    ) -> Result<()> {
        let folds = folds_organization(caps, story);
        let narrative = if folds {
            encode_org_narrative(
                story.map_narrative(),
                story.website.as_deref(),
                &story.focus_areas,
            )
        } else {
            story.narrative.clone()
        };

        let cols = caps.columns(&STORIES);
        let values = cols
            .iter()
            .map(|c| {
                story_value(story, &narrative, c).ok_or_else(|| {
                    Error::Storage(format!("no value for column {}.{}", STORIES.name, c))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let sql = insert_sql(&STORIES, &cols, false);
        let mut query = sqlx::query(&sql);
        for value in values {
            query = value.bind(query);
        }
        query.execute(&mut **tx).await.map_err(|e| {
            if is_unique_violation(&e) {
                Error::Validation(format!("identifier {} already in use", story.id))
            } else {
                Error::Database(e)
            }
        })?;

        debug!(
            subsystem = "db",
            component = "stories",
            op = "insert",
            story_id = %story.id,
            folded = folds,
            "Story inserted"
        );
        Ok(())
    }

    /// Compare-and-set status change.
    pub async fn set_status_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        caps: &Capabilities,
        write: &StatusWrite,
    ) -> Result<()> {
        let sql = if caps.has_column(&STORIES, "updated_at") {
            "UPDATE stories SET status = $1, updated_at = $4 \
             WHERE id::text = $2 AND lower(coalesce(status, 'pending')) = ANY ($3)"
        } else {
            "UPDATE stories SET status = $1 \
             WHERE id::text = $2 AND lower(coalesce(status, 'pending')) = ANY ($3)"
        };
        let mut query = sqlx::query(sql)
            .bind(write.to.as_str())
            .bind(&write.id)
            .bind(spellings(write.from));
        if caps.has_column(&STORIES, "updated_at") {
            query = query.bind(write.at);
        }
        let result = query.execute(&mut **tx).await.map_err(Error::Database)?;
        if result.rows_affected() > 0 {
            return Ok(());
        }

        let found = sqlx::query("SELECT status FROM stories WHERE id::text = $1")
            .bind(&write.id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(Error::Database)?;
        let Some(row) = found else {
            return Err(Error::NotFound(format!("story {}", write.id)));
        };
        let raw: Option<String> = row.try_get("status").map_err(Error::Database)?;
        let raw = raw.unwrap_or_else(|| StoryStatus::Pending.as_str().to_string());
        match StoryStatus::parse(&raw) {
            Some(from) => Err(TransitionRejection {
                id: write.id.clone(),
                from,
                action: write.action,
            }
            .into()),
            None => Err(Error::Validation(format!(
                "story {} has unrecognised status '{}'",
                write.id, raw
            ))),
        }
    }

    pub async fn delete_tx(&self, tx: &mut Transaction<'_, Postgres>, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM stories WHERE id::text = $1")
            .bind(id)
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("story {}", id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;
    use storymap_core::{Contact, StoryKind};

    fn organization() -> StoryRecord {
        StoryRecord {
            id: "org-1".to_string(),
            kind: StoryKind::Organization,
            title: "Legal Aid Collective".to_string(),
            narrative: String::new(),
            organization_name: Some("Legal Aid Collective".to_string()),
            organization_description: Some("Free legal help".to_string()),
            website: Some("https://legalaid.example.org".to_string()),
            focus_areas: vec!["legal aid".to_string()],
            country: "Kenya".to_string(),
            city: "Nairobi".to_string(),
            contact: Contact::default(),
            status: StoryStatus::Pending,
            submitted_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn all_story_columns() -> Vec<&'static str> {
        STORIES
            .required
            .iter()
            .chain(STORIES.shape_columns)
            .chain(STORIES.extra_columns)
            .copied()
            .collect()
    }

    #[test]
    fn test_every_known_column_has_a_value() {
        let story = organization();
        for column in all_story_columns() {
            assert!(
                story_value(&story, "", column).is_some(),
                "no value for {}",
                column
            );
        }
        assert!(matches!(
            story_value(&story, "", "updated_at"),
            Some(SqlValue::Time(t)) if t == story.updated_at
        ));
        assert!(story_value(&story, "", "created_at").is_none());
        assert!(story_value(&story, "", "rating").is_none());
    }

    #[test]
    fn test_folding_follows_story_table_shape() {
        let story = organization();
        let full = Capabilities::from_columns(
            all_story_columns().into_iter().map(|c| (STORIES.name, c)),
        );
        assert!(!folds_organization(&full, &story));

        let without_website = Capabilities::from_columns(
            all_story_columns()
                .into_iter()
                .filter(|c| *c != "website")
                .map(|c| (STORIES.name, c)),
        );
        assert!(folds_organization(&without_website, &story));

        let personal = StoryRecord {
            kind: StoryKind::Personal,
            organization_name: None,
            organization_description: None,
            website: None,
            focus_areas: Vec::new(),
            ..story
        };
        assert!(!folds_organization(&without_website, &personal));
    }

    #[test]
    fn test_on_map_spellings() {
        assert_eq!(spellings(StoryStatus::OnMap), vec!["on-map", "on_map", "onmap"]);
        assert_eq!(spellings(StoryStatus::Rejected), vec!["rejected"]);
    }
}
