//! `StoryMap`: the facade callers use for every read and mutation.

use std::sync::Arc;

use serde::Serialize;

use crate::catalog::Catalog;
use crate::classify::Classifier;
use crate::error::Result;
use crate::geocode::{Gazetteer, Geocoder};
use crate::lifecycle::LifecycleManager;
use crate::models::{Actor, MapPin, NewPin, NewStory, Placement, StoryDetail, StoryRecord};
use crate::reconcile::PinReconciler;
use crate::schema::SourceShape;
use crate::traits::{MapStore, StorageReport};

/// Result of an administrator action: the story and pin as they stand
/// afterwards (or as they were, for removals).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionOutcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub story: Option<StoryRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pin: Option<MapPin>,
}

impl ActionOutcome {
    fn story(story: StoryRecord) -> Self {
        Self {
            story: Some(story),
            pin: None,
        }
    }

    fn both(story: StoryRecord, pin: Option<MapPin>) -> Self {
        Self {
            story: Some(story),
            pin,
        }
    }
}

/// Story map engine over one store.
pub struct StoryMap {
    store: Arc<dyn MapStore>,
    classifier: Arc<Classifier>,
    geocoder: Arc<dyn Geocoder>,
    catalog: Catalog,
    lifecycle: LifecycleManager,
}

impl StoryMap {
    /// Engine with the default keyword table and the bundled gazetteer.
    pub fn new(store: Arc<dyn MapStore>) -> Self {
        Self::assemble(store, Arc::new(Classifier::default()), Arc::new(Gazetteer::new()))
    }

    fn assemble(
        store: Arc<dyn MapStore>,
        classifier: Arc<Classifier>,
        geocoder: Arc<dyn Geocoder>,
    ) -> Self {
        let catalog = Catalog::new(store.clone(), classifier.clone());
        let reconciler = PinReconciler::new(catalog.clone(), geocoder.clone());
        let lifecycle = LifecycleManager::new(catalog.clone(), reconciler);
        Self {
            store,
            classifier,
            geocoder,
            catalog,
            lifecycle,
        }
    }

    pub fn with_classifier(self, classifier: Classifier) -> Self {
        Self::assemble(self.store, Arc::new(classifier), self.geocoder)
    }

    pub fn with_geocoder(self, geocoder: Arc<dyn Geocoder>) -> Self {
        Self::assemble(self.store, self.classifier, geocoder)
    }

    pub fn shape(&self) -> SourceShape {
        self.store.shape()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    // -- reads ----------------------------------------------------------------

    pub async fn list_stories(&self) -> Result<Vec<StoryRecord>> {
        self.catalog.list_stories().await
    }

    pub async fn list_pins(&self) -> Result<Vec<MapPin>> {
        self.catalog.list_pins().await
    }

    pub async fn story_detail(&self, id: &str) -> Result<StoryDetail> {
        self.catalog.story_detail(id).await
    }

    pub async fn storage_report(&self) -> Result<StorageReport> {
        self.store.describe().await
    }

    // -- mutations ------------------------------------------------------------

    pub async fn submit_story(&self, req: NewStory) -> Result<StoryRecord> {
        self.lifecycle.submit(req).await
    }

    pub async fn approve_story(&self, actor: &Actor, id: &str) -> Result<ActionOutcome> {
        Ok(ActionOutcome::story(self.lifecycle.approve(actor, id).await?))
    }

    pub async fn reject_story(&self, actor: &Actor, id: &str) -> Result<ActionOutcome> {
        Ok(ActionOutcome::story(self.lifecycle.reject(actor, id).await?))
    }

    pub async fn publish_story(&self, actor: &Actor, id: &str) -> Result<ActionOutcome> {
        self.publish_story_at(actor, id, Placement::default()).await
    }

    /// Publish with explicit coordinates, for places the geocoder does not
    /// know.
    pub async fn publish_story_at(
        &self,
        actor: &Actor,
        id: &str,
        placement: Placement,
    ) -> Result<ActionOutcome> {
        let (story, pin) = self.lifecycle.publish(actor, id, placement).await?;
        Ok(ActionOutcome::both(story, Some(pin)))
    }

    pub async fn approve_and_publish(&self, actor: &Actor, id: &str) -> Result<ActionOutcome> {
        self.approve_and_publish_at(actor, id, Placement::default())
            .await
    }

    pub async fn approve_and_publish_at(
        &self,
        actor: &Actor,
        id: &str,
        placement: Placement,
    ) -> Result<ActionOutcome> {
        let (story, pin) = self
            .lifecycle
            .approve_and_publish(actor, id, placement)
            .await?;
        Ok(ActionOutcome::both(story, Some(pin)))
    }

    pub async fn unpublish_story(&self, actor: &Actor, id: &str) -> Result<ActionOutcome> {
        let (story, pin) = self.lifecycle.unpublish(actor, id).await?;
        Ok(ActionOutcome::both(story, pin))
    }

    pub async fn delete_story(&self, actor: &Actor, id: &str) -> Result<ActionOutcome> {
        Ok(ActionOutcome::story(self.lifecycle.delete(actor, id).await?))
    }

    pub async fn create_pin(&self, actor: &Actor, req: NewPin) -> Result<ActionOutcome> {
        let pin = self.lifecycle.reconciler().create_standalone_pin(req).await?;
        tracing::info!(
            subsystem = "lifecycle",
            op = "create_pin",
            actor = %actor,
            pin_id = %pin.id,
            "Pin created by administrator"
        );
        Ok(ActionOutcome {
            story: None,
            pin: Some(pin),
        })
    }

    pub async fn remove_pin(&self, actor: &Actor, id: &str) -> Result<ActionOutcome> {
        let (pin, story) = self.lifecycle.remove_pin(actor, id).await?;
        Ok(ActionOutcome {
            story,
            pin: Some(pin),
        })
    }
}
