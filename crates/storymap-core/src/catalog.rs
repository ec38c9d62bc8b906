//! Read side: loads rows from the store, normalizes them, classifies pins.
//!
//! Ineligible rows are skipped with a warning; a listing never fails because
//! of one bad row.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::classify::Classifier;
use crate::defaults::{ANONYMOUS_AUTHOR, NO_STORY_CONTENT};
use crate::error::{Error, Result};
use crate::models::{MapPin, StoryDetail, StoryRecord, StoryStatus};
use crate::schema::{normalize, IneligibleRow, Normalized};
use crate::traits::{MapStore, RowSet};

/// Normalized, classified view over a [`MapStore`].
#[derive(Clone)]
pub struct Catalog {
    store: Arc<dyn MapStore>,
    classifier: Arc<Classifier>,
}

fn skip(kind: &str, row: &IneligibleRow) {
    warn!(
        subsystem = "catalog",
        component = "schema_adapter",
        id = row.id.as_deref().unwrap_or(""),
        missing = row.missing,
        "Skipping ineligible {} row",
        kind
    );
}

impl Catalog {
    pub fn new(store: Arc<dyn MapStore>, classifier: Arc<Classifier>) -> Self {
        Self { store, classifier }
    }

    pub fn store(&self) -> &Arc<dyn MapStore> {
        &self.store
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    fn stories_from(&self, set: RowSet) -> Vec<StoryRecord> {
        let mut out = Vec::with_capacity(set.len());
        for raw in set.rows {
            let story = match normalize(raw, set.shape) {
                Normalized::Eligible(record) => record.into_story(),
                Normalized::Ineligible(row) => Err(row),
            };
            match story {
                Ok(story) => out.push(story),
                Err(row) => skip("story", &row),
            }
        }
        out
    }

    fn pins_from(&self, set: RowSet) -> Vec<MapPin> {
        let mut out = Vec::with_capacity(set.len());
        for raw in set.rows {
            let pin = match normalize(raw, set.shape) {
                Normalized::Eligible(record) => {
                    let category = self.classifier.classify(&record);
                    record.into_pin(category)
                }
                Normalized::Ineligible(row) => Err(row),
            };
            match pin {
                Ok(pin) => out.push(pin),
                Err(row) => skip("pin", &row),
            }
        }
        out
    }

    /// All eligible stories, newest submission first.
    pub async fn list_stories(&self) -> Result<Vec<StoryRecord>> {
        let start = Instant::now();
        let set = self.store.load_stories().await?;
        let (shape, total) = (set.shape, set.len());
        let mut stories = self.stories_from(set);
        stories.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at).then(a.id.cmp(&b.id)));
        debug!(
            subsystem = "catalog",
            op = "list_stories",
            shape = %shape,
            result_count = stories.len(),
            skipped = total - stories.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Stories listed"
        );
        Ok(stories)
    }

    /// All eligible pins with their canonical type, newest first.
    pub async fn list_pins(&self) -> Result<Vec<MapPin>> {
        let start = Instant::now();
        let set = self.store.load_pins().await?;
        let (shape, total) = (set.shape, set.len());
        let mut pins = self.pins_from(set);
        pins.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        debug!(
            subsystem = "catalog",
            op = "list_pins",
            shape = %shape,
            result_count = pins.len(),
            skipped = total - pins.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Pins listed"
        );
        Ok(pins)
    }

    pub async fn find_story(&self, id: &str) -> Result<Option<StoryRecord>> {
        let set = self.store.load_story(id).await?;
        Ok(self.stories_from(set).into_iter().next())
    }

    pub async fn find_pin(&self, id: &str) -> Result<Option<MapPin>> {
        let set = self.store.load_pin(id).await?;
        Ok(self.pins_from(set).into_iter().next())
    }

    /// Story by id; `NotFound` when absent or ineligible.
    pub async fn story(&self, id: &str) -> Result<StoryRecord> {
        self.find_story(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("story {}", id)))
    }

    /// Pin by id; `NotFound` when absent or ineligible.
    pub async fn pin(&self, id: &str) -> Result<MapPin> {
        self.find_pin(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("pin {}", id)))
    }

    /// Public view of an entry: the pin when one exists, otherwise an
    /// approved or on-map story. Pending and rejected stories stay private.
    pub async fn story_detail(&self, id: &str) -> Result<StoryDetail> {
        if let Some(pin) = self.find_pin(id).await? {
            let story = self.find_story(id).await?;
            let author = story
                .as_ref()
                .map(|s| s.author_label().to_string())
                .unwrap_or_else(|| ANONYMOUS_AUTHOR.to_string());
            let text = if pin.story.trim().is_empty() {
                story
                    .as_ref()
                    .map(|s| s.map_narrative().trim().to_string())
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| NO_STORY_CONTENT.to_string())
            } else {
                pin.story.clone()
            };
            return Ok(StoryDetail {
                id: pin.id,
                title: pin.title,
                author,
                country: pin.country,
                city: pin.city,
                story: text,
                on_map: true,
            });
        }

        match self.find_story(id).await? {
            Some(story) if matches!(story.status, StoryStatus::Approved | StoryStatus::OnMap) => {
                let text = match story.narrative.trim() {
                    "" => NO_STORY_CONTENT.to_string(),
                    t => t.to_string(),
                };
                Ok(StoryDetail {
                    author: story.author_label().to_string(),
                    on_map: story.status == StoryStatus::OnMap,
                    id: story.id,
                    title: story.title,
                    country: story.country,
                    city: story.city,
                    story: text,
                })
            }
            _ => Err(Error::NotFound(format!("story {}", id))),
        }
    }
}
