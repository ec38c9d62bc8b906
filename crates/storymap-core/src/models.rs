//! Domain models for stories, map pins, and the requests that create them.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

use crate::defaults;
use crate::error::{Error, Result};

// =============================================================================
// PIN CATEGORY
// =============================================================================

/// Semantic category of a map pin. Closed set; `Story` is the default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinCategory {
    #[default]
    Story,
    Organization,
    Protection,
    Resource,
    Violation,
}

impl PinCategory {
    /// Every category, in declaration order.
    pub const ALL: [PinCategory; 5] = [
        PinCategory::Story,
        PinCategory::Organization,
        PinCategory::Protection,
        PinCategory::Resource,
        PinCategory::Violation,
    ];

    /// Stable lowercase name used in storage and JSON.
    pub fn as_str(self) -> &'static str {
        match self {
            PinCategory::Story => "story",
            PinCategory::Organization => "organization",
            PinCategory::Protection => "protection",
            PinCategory::Resource => "resource",
            PinCategory::Violation => "violation",
        }
    }

    /// Lenient parse: trimmed, case-insensitive. `None` for anything outside
    /// the closed set.
    pub fn parse(raw: &str) -> Option<Self> {
        let wanted = raw.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(wanted))
    }
}

impl fmt::Display for PinCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PinCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| Error::Validation(format!("unknown pin category '{}'", s)))
    }
}

// =============================================================================
// STORY KIND / STATUS
// =============================================================================

/// Whether a submission came from an individual or an organization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoryKind {
    #[default]
    Personal,
    Organization,
}

impl StoryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StoryKind::Personal => "personal",
            StoryKind::Organization => "organization",
        }
    }
}

impl fmt::Display for StoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Review status of a story.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoryStatus {
    #[default]
    Pending,
    Approved,
    #[serde(rename = "on-map", alias = "on_map")]
    OnMap,
    Rejected,
}

impl StoryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StoryStatus::Pending => "pending",
            StoryStatus::Approved => "approved",
            StoryStatus::OnMap => "on-map",
            StoryStatus::Rejected => "rejected",
        }
    }

    /// Lenient parse accepting `on-map`, `on_map` and `onmap`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(StoryStatus::Pending),
            "approved" => Some(StoryStatus::Approved),
            "on-map" | "on_map" | "onmap" => Some(StoryStatus::OnMap),
            "rejected" => Some(StoryStatus::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for StoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a pin came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinSource {
    /// Published from a story with the same identifier.
    #[default]
    Story,
    /// Authored directly by an administrator; no backing story.
    Manual,
}

impl PinSource {
    pub fn as_str(self) -> &'static str {
        match self {
            PinSource::Story => "story",
            PinSource::Manual => "manual",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "story" => Some(PinSource::Story),
            "manual" => Some(PinSource::Manual),
            _ => None,
        }
    }
}

// =============================================================================
// STORY RECORD
// =============================================================================

/// Submitter contact details.
///
/// Serializes without `email` when `anonymous` is set, whatever the stored
/// value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Contact {
    pub email: Option<String>,
    pub anonymous: bool,
}

impl Contact {
    /// Email safe to show outside the store.
    pub fn public_email(&self) -> Option<&str> {
        if self.anonymous {
            return None;
        }
        self.email.as_deref().filter(|e| !e.trim().is_empty())
    }
}

impl Serialize for Contact {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Contact", 2)?;
        match self.public_email() {
            Some(email) => state.serialize_field("email", email)?,
            None => state.skip_field("email")?,
        }
        state.serialize_field("anonymous", &self.anonymous)?;
        state.end()
    }
}

/// A submitted story in canonical form, independent of the backend that
/// produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoryRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: StoryKind,
    pub title: String,
    #[serde(rename = "story")]
    pub narrative: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    pub focus_areas: Vec<String>,
    pub country: String,
    pub city: String,
    #[serde(flatten)]
    pub contact: Contact,
    pub status: StoryStatus,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoryRecord {
    pub fn is_organization(&self) -> bool {
        self.kind == StoryKind::Organization
    }

    /// Text shown on the map: the organization description for
    /// organizations (falling back to the narrative), else the narrative.
    pub fn map_narrative(&self) -> &str {
        if self.is_organization() {
            if let Some(desc) = self
                .organization_description
                .as_deref()
                .filter(|d| !d.trim().is_empty())
            {
                return desc;
            }
        }
        &self.narrative
    }

    /// Byline for public display.
    pub fn author_label(&self) -> &str {
        self.contact
            .public_email()
            .unwrap_or(defaults::ANONYMOUS_AUTHOR)
    }
}

// =============================================================================
// MAP PIN
// =============================================================================

/// Validated latitude/longitude pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    /// Build a coordinate pair, rejecting non-finite or out-of-range values.
    pub fn new(lat: f64, lng: f64) -> Result<Self> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(Error::Validation(format!(
                "latitude {} outside [-90, 90]",
                lat
            )));
        }
        if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
            return Err(Error::Validation(format!(
                "longitude {} outside [-180, 180]",
                lng
            )));
        }
        Ok(Self { lat, lng })
    }
}

/// Optional explicit position for a pin. Without one the geocoder decides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Placement {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

impl Placement {
    pub fn at(lat: f64, lng: f64) -> Self {
        Self {
            lat: Some(lat),
            lng: Some(lng),
        }
    }

    /// Range-checked coordinates, or `None` to fall back to a lookup.
    pub fn coordinates(&self) -> Result<Option<Coordinates>> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Coordinates::new(lat, lng).map(Some),
            (None, None) => Ok(None),
            _ => Err(Error::Validation(
                "lat and lng must be given together".to_string(),
            )),
        }
    }
}

/// A geolocated, categorized marker on the public map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapPin {
    pub id: String,
    pub title: String,
    pub story: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(rename = "type")]
    pub pin_type: PinCategory,
    pub category: Option<String>,
    pub country: String,
    pub city: String,
    pub created_at: DateTime<Utc>,
    pub source: PinSource,
}

impl MapPin {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            lat: self.lat,
            lng: self.lng,
        }
    }

    pub fn is_manual(&self) -> bool {
        self.source == PinSource::Manual
    }

    /// Short popup text: the first [`defaults::PREVIEW_LENGTH`] characters of
    /// the story followed by `...`, or a prompt when there is no text.
    pub fn preview(&self) -> String {
        let text = self.story.trim();
        if text.is_empty() {
            return defaults::EMPTY_PREVIEW.to_string();
        }
        if text.chars().count() <= defaults::PREVIEW_LENGTH {
            return text.to_string();
        }
        let mut cut: String = text.chars().take(defaults::PREVIEW_LENGTH).collect();
        cut.push_str("...");
        cut
    }
}

// =============================================================================
// REQUESTS
// =============================================================================

/// Story submission.
///
/// Required fields are optional here so that a missing one is reported as a
/// validation error naming the field rather than a JSON parse failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewStory {
    /// Caller-supplied identifier; generated when absent.
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: StoryKind,
    pub title: Option<String>,
    #[serde(default, alias = "narrative")]
    pub story: String,
    #[serde(alias = "organizationName")]
    pub organization_name: Option<String>,
    #[serde(alias = "organizationDescription")]
    pub organization_description: Option<String>,
    pub website: Option<String>,
    #[serde(default, alias = "focusAreas")]
    pub focus_areas: Vec<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub anonymous: bool,
}

/// Admin-authored standalone pin.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewPin {
    pub title: Option<String>,
    #[serde(alias = "narrative")]
    pub story: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    /// Declared category; unknown values are left to the classifier.
    #[serde(rename = "type")]
    pub pin_type: Option<String>,
    /// Free label; defaults to the declared type.
    pub category: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

/// Trim a required field, reporting it by name when blank.
pub(crate) fn required(value: Option<&str>, field: &'static str) -> Result<String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(Error::MissingField(field)),
    }
}

/// Trim an optional field, mapping blanks to `None`.
pub(crate) fn optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

// =============================================================================
// VIEWS
// =============================================================================

/// Public read-only view of a single entry, resolved pin-first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoryDetail {
    pub id: String,
    pub title: String,
    pub author: String,
    pub country: String,
    pub city: String,
    pub story: String,
    pub on_map: bool,
}

/// The authenticated administrator performing an operation.
///
/// Passed in by the caller; the core never looks up session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
}

impl Actor {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_story() -> StoryRecord {
        let now = Utc::now();
        StoryRecord {
            id: "s1".to_string(),
            kind: StoryKind::Personal,
            title: "Healthcare Access in Lagos".to_string(),
            narrative: "I waited three days for care.".to_string(),
            organization_name: None,
            organization_description: None,
            website: None,
            focus_areas: Vec::new(),
            country: "Nigeria".to_string(),
            city: "Lagos".to_string(),
            contact: Contact {
                email: Some("ada@example.org".to_string()),
                anonymous: false,
            },
            status: StoryStatus::Pending,
            submitted_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_pin_category_parse_is_lenient() {
        assert_eq!(PinCategory::parse(" Resource "), Some(PinCategory::Resource));
        assert_eq!(PinCategory::parse("VIOLATION"), Some(PinCategory::Violation));
        assert_eq!(PinCategory::parse("healthcare"), None);
        assert!("workshop".parse::<PinCategory>().is_err());
    }

    #[test]
    fn test_status_serde_uses_on_map() {
        let json = serde_json::to_string(&StoryStatus::OnMap).unwrap();
        assert_eq!(json, "\"on-map\"");
        let parsed: StoryStatus = serde_json::from_str("\"on_map\"").unwrap();
        assert_eq!(parsed, StoryStatus::OnMap);
        assert_eq!(StoryStatus::parse("ONMAP"), Some(StoryStatus::OnMap));
        assert_eq!(StoryStatus::parse("archived"), None);
    }

    #[test]
    fn test_anonymous_story_never_serializes_email() {
        let mut story = sample_story();
        story.contact.anonymous = true;

        let value = serde_json::to_value(&story).unwrap();
        assert!(value.get("email").is_none());
        assert_eq!(value["anonymous"], true);
        assert_eq!(story.author_label(), "Anonymous");
    }

    #[test]
    fn test_named_story_serializes_email_and_wire_names() {
        let story = sample_story();
        let value = serde_json::to_value(&story).unwrap();
        assert_eq!(value["email"], "ada@example.org");
        assert_eq!(value["type"], "personal");
        assert_eq!(value["story"], "I waited three days for care.");
        assert_eq!(value["status"], "pending");
        assert_eq!(story.author_label(), "ada@example.org");
    }

    #[test]
    fn test_organization_map_narrative_prefers_description() {
        let mut story = sample_story();
        story.kind = StoryKind::Organization;
        story.organization_description = Some("Free legal clinics".to_string());
        assert_eq!(story.map_narrative(), "Free legal clinics");

        story.organization_description = Some("   ".to_string());
        assert_eq!(story.map_narrative(), "I waited three days for care.");
    }

    #[test]
    fn test_coordinates_range_checks() {
        assert!(Coordinates::new(6.5244, 3.3792).is_ok());
        assert!(Coordinates::new(90.0, -180.0).is_ok());
        assert!(Coordinates::new(90.5, 0.0).is_err());
        assert!(Coordinates::new(0.0, 181.0).is_err());
        assert!(Coordinates::new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn test_placement_coordinates() {
        assert_eq!(Placement::default().coordinates().unwrap(), None);
        assert_eq!(
            Placement::at(-12.0464, -77.0428).coordinates().unwrap(),
            Some(Coordinates {
                lat: -12.0464,
                lng: -77.0428
            })
        );
        let half = Placement {
            lat: Some(1.0),
            lng: None,
        };
        assert!(half.coordinates().unwrap_err().is_validation());
        assert!(Placement::at(95.0, 0.0).coordinates().is_err());

        let parsed: Placement = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, Placement::default());
    }

    #[test]
    fn test_pin_preview_truncates_at_150_chars() {
        let mut pin = MapPin {
            id: "p1".to_string(),
            title: "t".to_string(),
            story: "x".repeat(200),
            lat: 0.0,
            lng: 0.0,
            pin_type: PinCategory::Story,
            category: None,
            country: "Kenya".to_string(),
            city: String::new(),
            created_at: Utc::now(),
            source: PinSource::Story,
        };
        let preview = pin.preview();
        assert_eq!(preview.chars().count(), 153);
        assert!(preview.ends_with("..."));

        pin.story = "  ".to_string();
        assert_eq!(pin.preview(), "Click to read this story");
    }

    #[test]
    fn test_pin_serializes_type_key() {
        let pin = MapPin {
            id: "manual_1".to_string(),
            title: "Hotline".to_string(),
            story: String::new(),
            lat: -1.29,
            lng: 36.82,
            pin_type: PinCategory::Resource,
            category: Some("resource".to_string()),
            country: "Kenya".to_string(),
            city: String::new(),
            created_at: Utc::now(),
            source: PinSource::Manual,
        };
        let value = serde_json::to_value(&pin).unwrap();
        assert_eq!(value["type"], "resource");
        assert_eq!(value["source"], "manual");
    }

    #[test]
    fn test_required_and_optional_helpers() {
        assert_eq!(required(Some("  Kenya "), "country").unwrap(), "Kenya");
        assert!(matches!(
            required(Some("   "), "title"),
            Err(Error::MissingField("title"))
        ));
        assert!(matches!(
            required(None, "country"),
            Err(Error::MissingField("country"))
        ));
        assert_eq!(optional(Some("  ")), None);
        assert_eq!(optional(Some(" Nairobi ")), Some("Nairobi".to_string()));
    }

    #[test]
    fn test_new_pin_accepts_type_key() {
        let req: NewPin = serde_json::from_str(
            r#"{"title":"Women's Legal Aid Hotline","country":"Kenya","type":"resource"}"#,
        )
        .unwrap();
        assert_eq!(req.pin_type.as_deref(), Some("resource"));
        assert!(req.category.is_none());
    }
}
