//! [`MapStore`] implementation for PostgreSQL.

use async_trait::async_trait;
use tracing::{debug, warn};

use storymap_core::{
    Error, MapStore, PinRepository, Result, RowSet, SourceShape, StorageReport, StoryRepository,
    WriteBatch, WriteOp,
};

use crate::pool::log_pool_metrics;
use crate::probe::{is_undefined_column, MAP_PINS, STORIES};
use crate::Database;

#[async_trait]
impl StoryRepository for Database {
    async fn load_stories(&self) -> Result<RowSet> {
        self.stories.load_all().await
    }

    async fn load_story(&self, id: &str) -> Result<RowSet> {
        self.stories.load_one(id).await
    }
}

#[async_trait]
impl PinRepository for Database {
    async fn load_pins(&self) -> Result<RowSet> {
        self.pins.load_all().await
    }

    async fn load_pin(&self, id: &str) -> Result<RowSet> {
        self.pins.load_one(id).await
    }
}

#[async_trait]
impl MapStore for Database {
    fn shape(&self) -> SourceShape {
        self.capabilities.shape()
    }

    fn story_shape(&self) -> SourceShape {
        self.capabilities.get().shape_of(&STORIES)
    }

    async fn id_in_use(&self, id: &str) -> Result<bool> {
        let caps = self.capabilities.get();
        let mut exists = false;
        for spec in [&STORIES, &MAP_PINS] {
            if !caps.has_table(spec) {
                continue;
            }
            let sql = format!(
                "SELECT EXISTS (SELECT 1 FROM {} WHERE id::text = $1)",
                spec.name
            );
            exists = sqlx::query_scalar::<_, bool>(&sql)
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .map_err(Error::Database)?;
            if exists {
                break;
            }
        }
        Ok(exists)
    }

    async fn apply(&self, batch: WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let caps = self.capabilities.get();
        let ops = batch.len();

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        for op in batch.ops() {
            let result = match op {
                WriteOp::InsertStory(story) => self.stories.insert_tx(&mut tx, &caps, story).await,
                WriteOp::SetStatus(write) => {
                    self.stories.set_status_tx(&mut tx, &caps, write).await
                }
                WriteOp::DeleteStory { id } => self.stories.delete_tx(&mut tx, id).await,
                WriteOp::UpsertPin(pin) => self.pins.upsert_tx(&mut tx, &caps, pin).await,
                WriteOp::DeletePin { id, must_exist } => {
                    self.pins.delete_tx(&mut tx, id, *must_exist).await
                }
            };
            if let Err(e) = result {
                // Dropping the transaction rolls it back.
                drop(tx);
                if let Error::Database(db_err) = &e {
                    if is_undefined_column(db_err) {
                        warn!(
                            subsystem = "db",
                            component = "store",
                            op = op.kind(),
                            error = %db_err,
                            "Write hit a missing column; re-probing schema"
                        );
                        if let Err(probe_err) = self.capabilities.refresh().await {
                            warn!(
                                subsystem = "db",
                                component = "store",
                                error = %probe_err,
                                "Schema re-probe failed"
                            );
                        }
                    }
                }
                return Err(e);
            }
        }
        tx.commit().await.map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "store",
            op = "apply",
            ops,
            "Write batch committed"
        );
        Ok(())
    }

    async fn describe(&self) -> Result<StorageReport> {
        log_pool_metrics(&self.pool);
        let caps = self.capabilities.get();
        Ok(StorageReport {
            backend: "postgres".to_string(),
            shape: caps.shape(),
            missing_columns: caps.missing_columns(),
            story_count: self.stories.count().await?,
            pin_count: self.pins.count().await?,
        })
    }
}
