//! Story lifecycle: the only place story statuses change.
//!
//! ```text
//!   submit ──> pending ──approve──> approved ──publish──> on-map
//!                 │  ▲                  ▲                   │
//!              reject└──approve──┐      └────unpublish──────┘
//!                 ▼              │
//!              rejected ─────────┘        delete: any status
//! ```
//!
//! Status writes are compare-and-set, so two administrators acting on the
//! same story cannot both win.

use std::fmt;

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use crate::catalog::Catalog;
use crate::error::{Error, Result};
use crate::ids::{new_organization_story_id, new_story_id, validate_supplied_id};
use crate::models::{
    optional, required, Actor, Contact, MapPin, NewStory, Placement, StoryKind, StoryRecord,
    StoryStatus,
};
use crate::reconcile::PinReconciler;
use crate::schema::SourceShape;
use crate::traits::{StatusWrite, WriteBatch, WriteOp};

// =============================================================================
// STATE MACHINE
// =============================================================================

/// Administrator actions on a story.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LifecycleAction {
    Approve,
    Reject,
    Publish,
    Unpublish,
    Delete,
}

impl LifecycleAction {
    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleAction::Approve => "approve",
            LifecycleAction::Reject => "reject",
            LifecycleAction::Publish => "publish",
            LifecycleAction::Unpublish => "unpublish",
            LifecycleAction::Delete => "delete",
        }
    }
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl StoryStatus {
    /// Status after `action`, or `Err(self)` when `action` is not allowed
    /// from this status. `Delete` leaves the status as is; the record goes.
    pub fn apply(self, action: LifecycleAction) -> std::result::Result<StoryStatus, StoryStatus> {
        use LifecycleAction::*;
        use StoryStatus::*;
        match (self, action) {
            (Pending | Rejected, Approve) => Ok(Approved),
            (Pending, Reject) => Ok(Rejected),
            (Approved, Publish) => Ok(OnMap),
            (OnMap, Unpublish) => Ok(Approved),
            (status, Delete) => Ok(status),
            (status, _) => Err(status),
        }
    }
}

/// A lifecycle action refused because of the story's current status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionRejection {
    pub id: String,
    pub from: StoryStatus,
    pub action: LifecycleAction,
}

impl TransitionRejection {
    /// Publishing a story that has not been approved.
    pub fn is_not_approved(&self) -> bool {
        self.action == LifecycleAction::Publish
            && matches!(self.from, StoryStatus::Pending | StoryStatus::Rejected)
    }
}

impl fmt::Display for TransitionRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "story {} cannot {} from status {}",
            self.id, self.action, self.from
        )?;
        if self.is_not_approved() {
            f.write_str(" (not approved)")?;
        }
        Ok(())
    }
}

// =============================================================================
// MANAGER
// =============================================================================

/// Applies lifecycle actions to stored stories.
pub struct LifecycleManager {
    catalog: Catalog,
    reconciler: PinReconciler,
}

impl LifecycleManager {
    pub fn new(catalog: Catalog, reconciler: PinReconciler) -> Self {
        Self {
            catalog,
            reconciler,
        }
    }

    pub fn reconciler(&self) -> &PinReconciler {
        &self.reconciler
    }

    /// Guarded status write for `action` on `story`.
    pub fn transition(&self, story: &StoryRecord, action: LifecycleAction) -> Result<StatusWrite> {
        let to = story.status.apply(action).map_err(|from| TransitionRejection {
            id: story.id.clone(),
            from,
            action,
        })?;
        Ok(StatusWrite {
            id: story.id.clone(),
            from: story.status,
            to,
            action,
            at: Utc::now(),
        })
    }

    fn log_transition(actor: &Actor, write: &StatusWrite) {
        info!(
            subsystem = "lifecycle",
            op = write.action.as_str(),
            actor = %actor,
            story_id = %write.id,
            from = %write.from,
            to = %write.to,
            "Story status changed"
        );
    }

    fn updated(mut story: StoryRecord, write: &StatusWrite) -> StoryRecord {
        story.status = write.to;
        story.updated_at = write.at;
        story
    }

    /// Store a new `pending` story.
    pub async fn submit(&self, req: NewStory) -> Result<StoryRecord> {
        let title = required(req.title.as_deref(), "title")?;
        let country = required(req.country.as_deref(), "country")?;

        let organization_name = optional(req.organization_name.as_deref());
        let organization_description = optional(req.organization_description.as_deref());
        let website = optional(req.website.as_deref());
        let focus_areas: Vec<String> = req
            .focus_areas
            .iter()
            .filter_map(|a| optional(Some(a)))
            .collect();
        let kind = if req.kind == StoryKind::Organization
            || organization_name.is_some()
            || organization_description.is_some()
        {
            StoryKind::Organization
        } else {
            StoryKind::Personal
        };

        let store = self.catalog.store();
        let id = match optional(req.id.as_deref()) {
            Some(id) => {
                validate_supplied_id(&id)?;
                if store.id_in_use(&id).await? {
                    return Err(Error::Validation(format!("identifier {} already in use", id)));
                }
                id
            }
            // A legacy story table has no kind column; the id prefix keeps
            // the organization signal.
            None if kind == StoryKind::Organization
                && store.story_shape() == SourceShape::Legacy =>
            {
                new_organization_story_id()
            }
            None => new_story_id(),
        };

        let now = Utc::now();
        let story = StoryRecord {
            id,
            kind,
            title,
            narrative: req.story.trim().to_string(),
            organization_name,
            organization_description,
            website,
            focus_areas,
            country,
            city: optional(req.city.as_deref()).unwrap_or_default(),
            contact: Contact {
                email: optional(req.email.as_deref()),
                anonymous: req.anonymous,
            },
            status: StoryStatus::Pending,
            submitted_at: now,
            updated_at: now,
        };

        self.catalog
            .store()
            .apply(WriteBatch::single(WriteOp::InsertStory(story.clone())))
            .await?;
        info!(
            subsystem = "lifecycle",
            op = "submit",
            story_id = %story.id,
            kind = %story.kind,
            "Story submitted"
        );
        Ok(story)
    }

    async fn set_status(
        &self,
        actor: &Actor,
        story: StoryRecord,
        action: LifecycleAction,
    ) -> Result<StoryRecord> {
        let write = self.transition(&story, action)?;
        self.catalog
            .store()
            .apply(WriteBatch::single(WriteOp::SetStatus(write.clone())))
            .await?;
        Self::log_transition(actor, &write);
        Ok(Self::updated(story, &write))
    }

    /// `pending` or `rejected` to `approved`.
    pub async fn approve(&self, actor: &Actor, id: &str) -> Result<StoryRecord> {
        let story = self.catalog.story(id).await?;
        self.set_status(actor, story, LifecycleAction::Approve).await
    }

    /// `pending` to `rejected`.
    pub async fn reject(&self, actor: &Actor, id: &str) -> Result<StoryRecord> {
        let story = self.catalog.story(id).await?;
        self.set_status(actor, story, LifecycleAction::Reject).await
    }

    async fn publish_story(
        &self,
        actor: &Actor,
        story: StoryRecord,
        placement: Placement,
    ) -> Result<(StoryRecord, MapPin)> {
        let write = self.transition(&story, LifecycleAction::Publish)?;
        let pin = self
            .reconciler
            .publish_to_map(
                &story,
                placement,
                WriteBatch::single(WriteOp::SetStatus(write.clone())),
            )
            .await?;
        Self::log_transition(actor, &write);
        Ok((Self::updated(story, &write), pin))
    }

    /// `approved` to `on-map`, creating the story's pin at `placement` or
    /// at the geocoded location.
    pub async fn publish(
        &self,
        actor: &Actor,
        id: &str,
        placement: Placement,
    ) -> Result<(StoryRecord, MapPin)> {
        let story = self.catalog.story(id).await?;
        self.publish_story(actor, story, placement).await
    }

    /// Approve if needed, then publish. A failed publish leaves the story
    /// approved; a malformed placement is refused before anything changes.
    pub async fn approve_and_publish(
        &self,
        actor: &Actor,
        id: &str,
        placement: Placement,
    ) -> Result<(StoryRecord, MapPin)> {
        placement.coordinates()?;
        let mut story = self.catalog.story(id).await?;
        if story.status != StoryStatus::Approved {
            story = self
                .set_status(actor, story, LifecycleAction::Approve)
                .await?;
        }
        self.publish_story(actor, story, placement).await
    }

    /// `on-map` to `approved`, removing the story's pin.
    pub async fn unpublish(
        &self,
        actor: &Actor,
        id: &str,
    ) -> Result<(StoryRecord, Option<MapPin>)> {
        let story = self.catalog.story(id).await?;
        let write = self.transition(&story, LifecycleAction::Unpublish)?;
        let pin = self
            .reconciler
            .retract(&story.id, WriteBatch::single(WriteOp::SetStatus(write.clone())))
            .await?;
        Self::log_transition(actor, &write);
        Ok((Self::updated(story, &write), pin))
    }

    /// Remove a pin. A story-derived pin whose story is `on-map` takes the
    /// story back to `approved` in the same batch; manual pins never touch
    /// stories.
    pub async fn remove_pin(
        &self,
        actor: &Actor,
        pin_id: &str,
    ) -> Result<(MapPin, Option<StoryRecord>)> {
        let pin = self.catalog.pin(pin_id).await?;
        let paired = if pin.is_manual() {
            None
        } else {
            self.catalog
                .find_story(&pin.id)
                .await?
                .filter(|s| s.status == StoryStatus::OnMap)
        };

        let Some(story) = paired else {
            let pin = self
                .reconciler
                .remove_from_map(&pin.id, WriteBatch::new())
                .await?;
            info!(
                subsystem = "lifecycle",
                op = "remove_pin",
                actor = %actor,
                pin_id = %pin.id,
                "Unpaired pin removed"
            );
            return Ok((pin, None));
        };

        let write = self.transition(&story, LifecycleAction::Unpublish)?;
        let pin = self
            .reconciler
            .remove_from_map(&pin.id, WriteBatch::single(WriteOp::SetStatus(write.clone())))
            .await?;
        Self::log_transition(actor, &write);
        Ok((pin, Some(Self::updated(story, &write))))
    }

    /// Remove a story in any status, along with any pin sharing its id.
    pub async fn delete(&self, actor: &Actor, id: &str) -> Result<StoryRecord> {
        let story = self.catalog.story(id).await?;
        let then = WriteBatch::single(WriteOp::DeleteStory {
            id: story.id.clone(),
        });
        let pin = self.reconciler.retract(&story.id, then).await?;
        info!(
            subsystem = "lifecycle",
            op = "delete",
            actor = %actor,
            story_id = %story.id,
            from = %story.status,
            pin_removed = pin.is_some(),
            "Story deleted"
        );
        Ok(story)
    }
}
