//! HTTP handlers for storymap-api.

pub mod pins;
pub mod stories;
pub mod system;

use serde::Serialize;

use storymap_core::{ActionOutcome, MapPin, StoryRecord};

/// Body of every administrator action response.
#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub story: Option<StoryRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pin: Option<MapPin>,
}

impl From<ActionOutcome> for ActionResponse {
    fn from(outcome: ActionOutcome) -> Self {
        Self {
            success: true,
            story: outcome.story,
            pin: outcome.pin,
        }
    }
}
