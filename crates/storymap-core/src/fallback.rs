//! In-memory store used when no database is configured or reachable.
//!
//! Seeded from a JSON file or the built-in demo pins. Writes live for the
//! lifetime of the process. A batch is applied to a staged copy under the
//! write lock and committed only if every op succeeds.

use std::path::Path;

use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::lifecycle::TransitionRejection;
use crate::models::StoryStatus;
use crate::schema::{RawRow, SourceShape};
use crate::traits::{
    MapStore, PinRepository, RowSet, StatusWrite, StorageReport, StoryRepository, WriteBatch,
    WriteOp,
};

/// Seed file layout: a bare pin array, or stories and pins.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SeedFile {
    Pins(Vec<RawRow>),
    Tables {
        #[serde(default)]
        stories: Vec<RawRow>,
        #[serde(default)]
        pins: Vec<RawRow>,
    },
}

#[derive(Debug, Clone, Default)]
struct Tables {
    stories: Vec<RawRow>,
    pins: Vec<RawRow>,
}

fn position(rows: &[RawRow], id: &str) -> Option<usize> {
    rows.iter().position(|r| r.id.as_deref() == Some(id))
}

impl Tables {
    fn apply(&mut self, op: WriteOp) -> Result<()> {
        match op {
            WriteOp::InsertStory(story) => {
                if position(&self.stories, &story.id).is_some() {
                    return Err(Error::Validation(format!(
                        "identifier {} already in use",
                        story.id
                    )));
                }
                self.stories.push(RawRow::from(&story));
            }
            WriteOp::SetStatus(write) => self.set_status(write)?,
            WriteOp::DeleteStory { id } => {
                let idx = position(&self.stories, &id)
                    .ok_or_else(|| Error::NotFound(format!("story {}", id)))?;
                self.stories.remove(idx);
            }
            WriteOp::UpsertPin(pin) => {
                let row = RawRow::from(&pin);
                match position(&self.pins, &pin.id) {
                    Some(idx) => self.pins[idx] = row,
                    None => self.pins.push(row),
                }
            }
            WriteOp::DeletePin { id, must_exist } => match position(&self.pins, &id) {
                Some(idx) => {
                    self.pins.remove(idx);
                }
                None if must_exist => return Err(Error::NotFound(format!("pin {}", id))),
                None => {}
            },
        }
        Ok(())
    }

    fn set_status(&mut self, write: StatusWrite) -> Result<()> {
        let idx = position(&self.stories, &write.id)
            .ok_or_else(|| Error::NotFound(format!("story {}", write.id)))?;
        let row = &mut self.stories[idx];
        let current = match row.status.as_deref() {
            None => StoryStatus::Pending,
            Some(raw) => StoryStatus::parse(raw).ok_or_else(|| {
                Error::Validation(format!("story {} has unrecognised status '{}'", write.id, raw))
            })?,
        };
        if current != write.from {
            return Err(TransitionRejection {
                id: write.id,
                from: current,
                action: write.action,
            }
            .into());
        }
        row.status = Some(write.to.as_str().to_string());
        row.updated_at = Some(write.at);
        Ok(())
    }
}

/// Built-in demo pins shown when nothing else is configured.
fn builtin_pins() -> Vec<RawRow> {
    let pin = |id: &str,
               title: &str,
               story: &str,
               (lat, lng): (f64, f64),
               kind: &str,
               category: &str,
               (country, city): (&str, &str),
               created: i64| RawRow {
        id: Some(id.to_string()),
        kind: Some(kind.to_string()),
        title: Some(title.to_string()),
        story: Some(story.to_string()),
        category: Some(category.to_string()),
        country: Some(country.to_string()),
        city: Some(city.to_string()),
        lat: Some(lat),
        lng: Some(lng),
        source: Some("manual".to_string()),
        created_at: DateTime::from_timestamp(created, 0),
        ..RawRow::default()
    };
    vec![
        pin(
            "seed-nyc-healthcare",
            "NYC Healthcare Story",
            "A healthcare access story from New York City",
            (40.7128, -74.0060),
            "story",
            "healthcare",
            ("United States", "New York"),
            1_704_240_000,
        ),
        pin(
            "seed-la-support",
            "LA Support Center",
            "A local support resource for women and families",
            (34.0522, -118.2437),
            "resource",
            "support",
            ("United States", "Los Angeles"),
            1_704_153_600,
        ),
        pin(
            "seed-london-workshop",
            "London Workplace Rights Workshop",
            "TYPE:protection\nCommunity workshop on workplace equality rights and advocacy",
            (51.5074, -0.1278),
            "protection",
            "workplace",
            ("United Kingdom", "London"),
            1_704_067_200,
        ),
    ]
}

/// Process-local [`MapStore`] in the fallback shape.
#[derive(Debug, Default)]
pub struct StaticStore {
    tables: RwLock<Tables>,
    origin: String,
}

impl StaticStore {
    /// Empty store.
    pub fn empty() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            origin: "empty".to_string(),
        }
    }

    /// Store holding the built-in demo pins.
    pub fn builtin() -> Self {
        Self::with_rows(Vec::new(), builtin_pins(), "builtin")
    }

    pub fn with_rows(stories: Vec<RawRow>, pins: Vec<RawRow>, origin: &str) -> Self {
        Self {
            tables: RwLock::new(Tables { stories, pins }),
            origin: origin.to_string(),
        }
    }

    pub fn from_json_str(json: &str, origin: &str) -> Result<Self> {
        let (stories, pins) = match serde_json::from_str::<SeedFile>(json)? {
            SeedFile::Pins(pins) => (Vec::new(), pins),
            SeedFile::Tables { stories, pins } => (stories, pins),
        };
        Ok(Self::with_rows(stories, pins, origin))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let store = Self::from_json_str(&json, &path.display().to_string())?;
        info!(
            subsystem = "static",
            component = "seed",
            path = %path.display(),
            "Loaded fallback seed"
        );
        Ok(store)
    }

    /// Where the seed came from ("builtin", "empty", or a file path).
    pub fn origin(&self) -> &str {
        &self.origin
    }
}

fn select(rows: &[RawRow], id: &str) -> RowSet {
    RowSet::new(
        SourceShape::Fallback,
        position(rows, id).map(|i| vec![rows[i].clone()]).unwrap_or_default(),
    )
}

#[async_trait]
impl StoryRepository for StaticStore {
    async fn load_stories(&self) -> Result<RowSet> {
        let tables = self.tables.read().await;
        Ok(RowSet::new(SourceShape::Fallback, tables.stories.clone()))
    }

    async fn load_story(&self, id: &str) -> Result<RowSet> {
        Ok(select(&self.tables.read().await.stories, id))
    }
}

#[async_trait]
impl PinRepository for StaticStore {
    async fn load_pins(&self) -> Result<RowSet> {
        let tables = self.tables.read().await;
        Ok(RowSet::new(SourceShape::Fallback, tables.pins.clone()))
    }

    async fn load_pin(&self, id: &str) -> Result<RowSet> {
        Ok(select(&self.tables.read().await.pins, id))
    }
}

#[async_trait]
impl MapStore for StaticStore {
    fn shape(&self) -> SourceShape {
        SourceShape::Fallback
    }

    async fn id_in_use(&self, id: &str) -> Result<bool> {
        let tables = self.tables.read().await;
        Ok(position(&tables.stories, id).is_some() || position(&tables.pins, id).is_some())
    }

    async fn apply(&self, batch: WriteBatch) -> Result<()> {
        let op_count = batch.len();
        let mut tables = self.tables.write().await;
        let mut staged = tables.clone();
        for op in batch.into_ops() {
            staged.apply(op)?;
        }
        *tables = staged;
        debug!(subsystem = "static", op = "apply", op_count, "Batch committed");
        Ok(())
    }

    async fn describe(&self) -> Result<StorageReport> {
        let tables = self.tables.read().await;
        Ok(StorageReport {
            backend: format!("static ({})", self.origin),
            shape: SourceShape::Fallback,
            missing_columns: Vec::new(),
            story_count: tables.stories.len(),
            pin_count: tables.pins.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::LifecycleAction;
    use chrono::Utc;
    use std::io::Write;

    fn story_row(id: &str, status: &str) -> RawRow {
        RawRow {
            id: Some(id.to_string()),
            title: Some("t".to_string()),
            status: Some(status.to_string()),
            ..RawRow::default()
        }
    }

    fn status_write(id: &str, from: StoryStatus, to: StoryStatus) -> WriteOp {
        WriteOp::SetStatus(StatusWrite {
            id: id.to_string(),
            from,
            to,
            action: LifecycleAction::Approve,
            at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn test_builtin_seed_has_three_pins() {
        let store = StaticStore::builtin();
        let pins = store.load_pins().await.unwrap();
        assert_eq!(pins.shape, SourceShape::Fallback);
        assert_eq!(pins.len(), 3);
        assert!(store.id_in_use("seed-la-support").await.unwrap());
        assert!(!store.id_in_use("nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_batch_leaves_state_untouched() {
        let store = StaticStore::with_rows(vec![story_row("s1", "pending")], Vec::new(), "test");
        let batch = WriteBatch::new()
            .with(status_write("s1", StoryStatus::Pending, StoryStatus::Approved))
            .with(WriteOp::DeletePin {
                id: "missing".to_string(),
                must_exist: true,
            });

        let err = store.apply(batch).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let rows = store.load_story("s1").await.unwrap();
        assert_eq!(rows.rows[0].status.as_deref(), Some("pending"));
    }

    #[tokio::test]
    async fn test_status_write_is_compare_and_set() {
        let store = StaticStore::with_rows(vec![story_row("s1", "approved")], Vec::new(), "test");
        let err = store
            .apply(status_write("s1", StoryStatus::Pending, StoryStatus::Approved).into())
            .await
            .unwrap_err();
        match err {
            Error::InvalidTransition(r) => assert_eq!(r.from, StoryStatus::Approved),
            other => panic!("expected InvalidTransition, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_status_counts_as_pending() {
        let mut row = story_row("s1", "");
        row.status = None;
        let store = StaticStore::with_rows(vec![row], Vec::new(), "test");
        store
            .apply(status_write("s1", StoryStatus::Pending, StoryStatus::Approved).into())
            .await
            .unwrap();
        let rows = store.load_story("s1").await.unwrap();
        assert_eq!(rows.rows[0].status.as_deref(), Some("approved"));
    }

    #[tokio::test]
    async fn test_delete_pin_tolerates_absence_unless_required() {
        let store = StaticStore::empty();
        store
            .apply(
                WriteOp::DeletePin {
                    id: "p1".to_string(),
                    must_exist: false,
                }
                .into(),
            )
            .await
            .unwrap();
        assert!(store
            .apply(WriteOp::DeleteStory { id: "s1".to_string() }.into())
            .await
            .is_err());
    }

    #[test]
    fn test_seed_file_layouts() {
        let bare = StaticStore::from_json_str(r#"[{"id":"p1","title":"Pin","lat":1,"lng":2}]"#, "t")
            .unwrap();
        assert_eq!(bare.tables.try_read().unwrap().pins.len(), 1);

        let tables = StaticStore::from_json_str(
            r#"{"stories":[{"id":"s1","title":"Story","status":"approved"}]}"#,
            "t",
        )
        .unwrap();
        let t = tables.tables.try_read().unwrap();
        assert_eq!(t.stories.len(), 1);
        assert!(t.pins.is_empty());

        assert!(StaticStore::from_json_str("{\"pins\": 5}", "t").is_err());
    }

    #[tokio::test]
    async fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"[{"id":"p1","title":"Pin","lat":1.0,"lng":2.0}]"#)
            .unwrap();
        let store = StaticStore::from_json_file(file.path()).unwrap();
        let report = store.describe().await.unwrap();
        assert_eq!(report.pin_count, 1);
        assert!(report.backend.starts_with("static ("));
    }
}
