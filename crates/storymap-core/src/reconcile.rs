//! Pin reconciliation: the only place pins are created or destroyed.
//!
//! Every pin write is applied together with the caller's follow-up writes
//! (usually a status change) in one batch, pin op first, so the store never
//! shows an `on-map` story without its pin.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::catalog::Catalog;
use crate::defaults::ID_GENERATION_ATTEMPTS;
use crate::error::{Error, Result};
use crate::geocode::Geocoder;
use crate::ids::new_manual_pin_id;
use crate::models::{
    optional, required, Coordinates, MapPin, NewPin, PinSource, Placement, StoryRecord,
};
use crate::traits::{WriteBatch, WriteOp};

pub struct PinReconciler {
    catalog: Catalog,
    geocoder: Arc<dyn Geocoder>,
}

impl PinReconciler {
    pub fn new(catalog: Catalog, geocoder: Arc<dyn Geocoder>) -> Self {
        Self { catalog, geocoder }
    }

    /// Explicit coordinates when given, else a geocoder lookup.
    async fn resolve(
        &self,
        country: &str,
        city: &str,
        explicit: Option<Coordinates>,
    ) -> Result<Coordinates> {
        if let Some(point) = explicit {
            return Ok(point);
        }
        self.geocoder
            .locate(country, city)
            .await?
            .ok_or_else(|| {
                Error::Validation(format!(
                    "no coordinates known for '{}'{}; supply lat and lng",
                    country,
                    if city.is_empty() {
                        String::new()
                    } else {
                        format!(", '{}'", city)
                    }
                ))
            })
    }

    /// Create or replace the pin for `story` at `placement`, then apply
    /// `then`.
    ///
    /// Organizations show their description on the map, falling back to the
    /// narrative.
    pub async fn publish_to_map(
        &self,
        story: &StoryRecord,
        placement: Placement,
        then: WriteBatch,
    ) -> Result<MapPin> {
        let point = self
            .resolve(&story.country, &story.city, placement.coordinates()?)
            .await?;
        let pin_type = self.catalog.classifier().classify(story);
        let pin = MapPin {
            id: story.id.clone(),
            title: story.title.clone(),
            story: story.map_narrative().to_string(),
            lat: point.lat,
            lng: point.lng,
            pin_type,
            category: Some(pin_type.as_str().to_string()),
            country: story.country.clone(),
            city: story.city.clone(),
            created_at: Utc::now(),
            source: PinSource::Story,
        };

        let batch = WriteBatch::single(WriteOp::UpsertPin(pin.clone())).then(then);
        self.catalog.store().apply(batch).await?;

        info!(
            subsystem = "reconcile",
            op = "publish_to_map",
            story_id = %story.id,
            pin_type = %pin_type,
            "Pin published"
        );
        Ok(pin)
    }

    /// Delete an existing pin, then apply `then`. `NotFound` if absent.
    pub async fn remove_from_map(&self, pin_id: &str, then: WriteBatch) -> Result<MapPin> {
        let pin = self.catalog.pin(pin_id).await?;
        let batch = WriteBatch::single(WriteOp::DeletePin {
            id: pin.id.clone(),
            must_exist: true,
        })
        .then(then);
        self.catalog.store().apply(batch).await?;

        info!(
            subsystem = "reconcile",
            op = "remove_from_map",
            pin_id = %pin.id,
            manual = pin.is_manual(),
            "Pin removed"
        );
        Ok(pin)
    }

    /// Delete the pin paired with a story if there is one, then apply `then`.
    pub async fn retract(&self, story_id: &str, then: WriteBatch) -> Result<Option<MapPin>> {
        let pin = self.catalog.find_pin(story_id).await?;
        let batch = WriteBatch::single(WriteOp::DeletePin {
            id: story_id.to_string(),
            must_exist: false,
        })
        .then(then);
        self.catalog.store().apply(batch).await?;
        Ok(pin)
    }

    /// Create an admin-authored pin with no backing story.
    pub async fn create_standalone_pin(&self, req: NewPin) -> Result<MapPin> {
        let title = required(req.title.as_deref(), "title")?;
        let country = required(req.country.as_deref(), "country")?;
        let city = optional(req.city.as_deref()).unwrap_or_default();
        let explicit = Placement {
            lat: req.lat,
            lng: req.lng,
        }
        .coordinates()?;
        let point = self.resolve(&country, &city, explicit).await?;

        let pin_type = self.catalog.classifier().classify(&req);
        let category = optional(req.category.as_deref())
            .or_else(|| optional(req.pin_type.as_deref()))
            .or_else(|| Some(pin_type.as_str().to_string()));

        let id = self.unused_pin_id().await?;
        let pin = MapPin {
            id,
            title,
            story: optional(req.story.as_deref()).unwrap_or_default(),
            lat: point.lat,
            lng: point.lng,
            pin_type,
            category,
            country,
            city,
            created_at: Utc::now(),
            source: PinSource::Manual,
        };

        self.catalog
            .store()
            .apply(WriteBatch::single(WriteOp::UpsertPin(pin.clone())))
            .await?;

        info!(
            subsystem = "reconcile",
            op = "create_standalone_pin",
            pin_id = %pin.id,
            pin_type = %pin.pin_type,
            "Standalone pin created"
        );
        Ok(pin)
    }

    async fn unused_pin_id(&self) -> Result<String> {
        for _ in 0..ID_GENERATION_ATTEMPTS {
            let id = new_manual_pin_id();
            if !self.catalog.store().id_in_use(&id).await? {
                return Ok(id);
            }
        }
        Err(Error::Storage(format!(
            "no unused pin id after {} attempts",
            ID_GENERATION_ATTEMPTS
        )))
    }
}
