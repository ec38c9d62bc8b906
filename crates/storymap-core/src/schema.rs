//! Schema adapter: one canonical record shape over three storage shapes.
//!
//! Stores hand back [`RawRow`]s, loose bags of optional columns. The adapter
//! for the store's [`SourceShape`] turns each row into a [`CanonicalRecord`]
//! or an [`IneligibleRow`] sentinel; callers skip the latter and carry on.
//!
//! | Shape | Organization columns | Pin narrative column | Markers imply organization |
//! |-------|----------------------|----------------------|----------------------------|
//! | `full` | all present | present | no |
//! | `legacy` | some or all absent | may be absent | yes |
//! | `fallback` | when the seed has them | present | yes |
//!
//! Markers only count when the row carries no explicit type, either as a
//! column value or a `TYPE:` line.
//!
//! When an organization row has no dedicated description, website or focus
//! area values, they are reconstructed from the narrative, which carries them
//! as `\nWebsite:` and `\nFocus Areas:` lines.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::defaults::{FOCUS_AREAS_MARKER, TYPE_MARKER, WEBSITE_MARKER};
use crate::ids::{has_organization_prefix, is_manual_pin_id};
use crate::models::{
    Contact, MapPin, PinCategory, PinSource, StoryKind, StoryRecord, StoryStatus,
};

// =============================================================================
// SHAPES AND ROWS
// =============================================================================

/// Storage shape a row was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceShape {
    /// Current schema with every optional column.
    Full,
    /// Older schema without organization columns or the pin narrative column.
    Legacy,
    /// Static seed list.
    Fallback,
}

impl SourceShape {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceShape::Full => "full",
            SourceShape::Legacy => "legacy",
            SourceShape::Fallback => "fallback",
        }
    }
}

impl fmt::Display for SourceShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A story or pin row exactly as a backend returned it.
///
/// Every field is optional. JSON seeds may use snake_case or camelCase keys.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RawRow {
    pub id: Option<String>,
    /// Story kind for story rows, pin category for pin rows.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub title: Option<String>,
    #[serde(alias = "narrative")]
    pub story: Option<String>,
    #[serde(alias = "organizationName")]
    pub organization_name: Option<String>,
    #[serde(alias = "organizationDescription")]
    pub organization_description: Option<String>,
    pub website: Option<String>,
    #[serde(alias = "focusAreas")]
    pub focus_areas: Option<Vec<String>>,
    pub category: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub email: Option<String>,
    pub anonymous: Option<bool>,
    pub status: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub source: Option<String>,
    #[serde(alias = "submittedAt")]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(alias = "updatedAt")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(alias = "createdAt")]
    pub created_at: Option<DateTime<Utc>>,
}

impl From<&StoryRecord> for RawRow {
    fn from(story: &StoryRecord) -> Self {
        RawRow {
            id: Some(story.id.clone()),
            kind: Some(story.kind.as_str().to_string()),
            title: Some(story.title.clone()),
            story: Some(story.narrative.clone()),
            organization_name: story.organization_name.clone(),
            organization_description: story.organization_description.clone(),
            website: story.website.clone(),
            focus_areas: Some(story.focus_areas.clone()),
            category: None,
            country: Some(story.country.clone()),
            city: Some(story.city.clone()),
            email: story.contact.email.clone(),
            anonymous: Some(story.contact.anonymous),
            status: Some(story.status.as_str().to_string()),
            lat: None,
            lng: None,
            source: None,
            submitted_at: Some(story.submitted_at),
            updated_at: Some(story.updated_at),
            created_at: None,
        }
    }
}

impl From<&MapPin> for RawRow {
    fn from(pin: &MapPin) -> Self {
        RawRow {
            id: Some(pin.id.clone()),
            kind: Some(pin.pin_type.as_str().to_string()),
            title: Some(pin.title.clone()),
            story: Some(pin.story.clone()),
            category: pin.category.clone(),
            country: Some(pin.country.clone()),
            city: Some(pin.city.clone()),
            lat: Some(pin.lat),
            lng: Some(pin.lng),
            source: Some(pin.source.as_str().to_string()),
            created_at: Some(pin.created_at),
            ..RawRow::default()
        }
    }
}

// =============================================================================
// CANONICAL RECORD
// =============================================================================

/// Storage-shape-independent representation of a story or pin row.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRecord {
    pub id: String,
    pub kind: StoryKind,
    /// Lower-cased explicit type tag (column value or `TYPE:` marker).
    pub declared_type: Option<String>,
    /// Free category label as stored.
    pub category: Option<String>,
    pub title: String,
    pub narrative: String,
    pub organization_name: Option<String>,
    pub organization_description: Option<String>,
    pub website: Option<String>,
    pub focus_areas: Vec<String>,
    pub country: String,
    pub city: String,
    pub email: Option<String>,
    pub anonymous: bool,
    pub status: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    /// Explicit provenance column, when the shape has one.
    pub source: Option<PinSource>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Row that cannot take part in classification or listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IneligibleRow {
    pub id: Option<String>,
    /// Name of the field that made the row unusable.
    pub missing: &'static str,
}

impl fmt::Display for IneligibleRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "row {} unusable: {}", id, self.missing),
            None => write!(f, "row without id unusable: {}", self.missing),
        }
    }
}

/// Outcome of normalizing one row.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Eligible(CanonicalRecord),
    Ineligible(IneligibleRow),
}

impl Normalized {
    pub fn into_eligible(self) -> Option<CanonicalRecord> {
        match self {
            Normalized::Eligible(record) => Some(record),
            Normalized::Ineligible(_) => None,
        }
    }

    pub fn is_eligible(&self) -> bool {
        matches!(self, Normalized::Eligible(_))
    }
}

impl CanonicalRecord {
    /// Oldest timestamp the row carries, used when a specific one is absent.
    fn any_timestamp(&self) -> DateTime<Utc> {
        self.submitted_at
            .or(self.created_at)
            .or(self.updated_at)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    /// Provenance from the explicit column, else from the id prefix.
    pub fn pin_source(&self) -> PinSource {
        self.source.unwrap_or(if is_manual_pin_id(&self.id) {
            PinSource::Manual
        } else {
            PinSource::Story
        })
    }

    /// Convert to a story. A missing status is the initial `pending`; an
    /// unrecognised one makes the row ineligible.
    pub fn into_story(self) -> Result<StoryRecord, IneligibleRow> {
        let status = match self.status.as_deref() {
            None => StoryStatus::Pending,
            Some(raw) => StoryStatus::parse(raw).ok_or_else(|| IneligibleRow {
                id: Some(self.id.clone()),
                missing: "status",
            })?,
        };
        let submitted_at = self.any_timestamp();
        let updated_at = self.updated_at.unwrap_or(submitted_at);

        Ok(StoryRecord {
            id: self.id,
            kind: self.kind,
            title: self.title,
            narrative: self.narrative,
            organization_name: self.organization_name,
            organization_description: self.organization_description,
            website: self.website,
            focus_areas: self.focus_areas,
            country: self.country,
            city: self.city,
            contact: Contact {
                email: self.email,
                anonymous: self.anonymous,
            },
            status,
            submitted_at,
            updated_at,
        })
    }

    /// Convert to a pin carrying `category`. Pins need in-range coordinates.
    pub fn into_pin(self, category: PinCategory) -> Result<MapPin, IneligibleRow> {
        let (lat, lng) = match (self.lat, self.lng) {
            (Some(lat), Some(lng))
                if lat.is_finite()
                    && lng.is_finite()
                    && (-90.0..=90.0).contains(&lat)
                    && (-180.0..=180.0).contains(&lng) =>
            {
                (lat, lng)
            }
            _ => {
                return Err(IneligibleRow {
                    id: Some(self.id),
                    missing: "coordinates",
                })
            }
        };
        let source = self.pin_source();
        let created_at = self.created_at.unwrap_or_else(|| self.any_timestamp());

        Ok(MapPin {
            id: self.id,
            title: self.title,
            story: self.narrative,
            lat,
            lng,
            pin_type: category,
            category: self.category,
            country: self.country,
            city: self.city,
            created_at,
            source,
        })
    }
}

// =============================================================================
// ADAPTERS
// =============================================================================

/// Normalizes rows of one storage shape.
pub trait SchemaAdapter: Send + Sync {
    fn shape(&self) -> SourceShape;

    /// Whether narrative markers alone make a row an organization.
    fn markers_imply_organization(&self) -> bool;

    /// Turn a raw row into a canonical record. Never panics.
    fn normalize(&self, raw: RawRow) -> Normalized {
        normalize_with(self, raw)
    }
}

/// Current schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct FullSchema;

/// Schema lacking some organization columns or the pin narrative column.
/// Whatever organization values exist are used; the rest come from the
/// narrative.
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacySchema;

/// Static seed list.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticFallback;

impl SchemaAdapter for FullSchema {
    fn shape(&self) -> SourceShape {
        SourceShape::Full
    }

    fn markers_imply_organization(&self) -> bool {
        false
    }
}

impl SchemaAdapter for LegacySchema {
    fn shape(&self) -> SourceShape {
        SourceShape::Legacy
    }

    fn markers_imply_organization(&self) -> bool {
        true
    }
}

impl SchemaAdapter for StaticFallback {
    fn shape(&self) -> SourceShape {
        SourceShape::Fallback
    }

    fn markers_imply_organization(&self) -> bool {
        true
    }
}

/// Adapter for a shape.
pub fn adapter_for(shape: SourceShape) -> &'static dyn SchemaAdapter {
    match shape {
        SourceShape::Full => &FullSchema,
        SourceShape::Legacy => &LegacySchema,
        SourceShape::Fallback => &StaticFallback,
    }
}

/// Normalize one row read from `shape`.
pub fn normalize(raw: RawRow, shape: SourceShape) -> Normalized {
    adapter_for(shape).normalize(raw)
}

fn normalize_with<A: SchemaAdapter + ?Sized>(adapter: &A, raw: RawRow) -> Normalized {
    let Some(id) = non_blank(raw.id) else {
        return Normalized::Ineligible(IneligibleRow {
            id: None,
            missing: "id",
        });
    };
    let Some(title) = non_blank(raw.title) else {
        return Normalized::Ineligible(IneligibleRow {
            id: Some(id),
            missing: "title",
        });
    };

    let (marker_type, narrative) = split_type_marker(raw.story.unwrap_or_default());
    let declared_type = non_blank(raw.kind)
        .map(|t| t.to_ascii_lowercase())
        .or(marker_type);
    // An explicit type outranks the markers, so a personal story that quotes
    // a website stays personal in every shape.
    let markers_count = adapter.markers_imply_organization() && declared_type.is_none();

    let org_name = non_blank(raw.organization_name);
    let org_description = non_blank(raw.organization_description);
    let org_website = non_blank(raw.website);
    let org_focus = raw
        .focus_areas
        .map(clean_list)
        .filter(|areas| !areas.is_empty());

    let has_markers =
        narrative.contains(WEBSITE_MARKER) || narrative.contains(FOCUS_AREAS_MARKER);
    let is_organization = has_organization_prefix(&id)
        || declared_type.as_deref() == Some(StoryKind::Organization.as_str())
        || org_name.is_some()
        || org_description.is_some()
        || org_website.is_some()
        || org_focus.is_some()
        || (markers_count && has_markers);

    let (organization_name, organization_description, website, focus_areas) = if is_organization
    {
        (
            org_name.or_else(|| Some(title.clone())),
            org_description.or_else(|| narrative_description(&narrative)),
            org_website.or_else(|| narrative_website(&narrative)),
            org_focus.unwrap_or_else(|| narrative_focus_areas(&narrative)),
        )
    } else {
        (None, None, None, Vec::new())
    };

    tracing::trace!(
        subsystem = "catalog",
        component = "schema_adapter",
        shape = %adapter.shape(),
        id = %id,
        is_organization,
        "Row normalized"
    );

    Normalized::Eligible(CanonicalRecord {
        id,
        kind: if is_organization {
            StoryKind::Organization
        } else {
            StoryKind::Personal
        },
        declared_type,
        category: non_blank(raw.category),
        title,
        narrative,
        organization_name,
        organization_description,
        website,
        focus_areas,
        country: non_blank(raw.country).unwrap_or_default(),
        city: non_blank(raw.city).unwrap_or_default(),
        email: non_blank(raw.email),
        anonymous: raw.anonymous.unwrap_or(false),
        status: non_blank(raw.status),
        lat: raw.lat,
        lng: raw.lng,
        source: raw.source.as_deref().and_then(PinSource::parse),
        submitted_at: raw.submitted_at,
        updated_at: raw.updated_at,
        created_at: raw.created_at,
    })
}

// =============================================================================
// NARRATIVE MARKERS
// =============================================================================

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|i| i.trim().to_string())
        .filter(|i| !i.is_empty())
        .collect()
}

/// Strip a leading `TYPE:<category>` line, returning the declared type.
fn split_type_marker(narrative: String) -> (Option<String>, String) {
    let Some(rest) = narrative.strip_prefix(TYPE_MARKER) else {
        return (None, narrative);
    };
    let (line, body) = rest.split_once('\n').unwrap_or((rest, ""));
    let declared = line.trim().to_ascii_lowercase();
    if declared.is_empty() {
        return (None, narrative);
    }
    (Some(declared), body.to_string())
}

/// Remainder of the line following `marker`, trimmed.
fn marker_line<'a>(narrative: &'a str, marker: &str) -> Option<&'a str> {
    let start = narrative.find(marker)? + marker.len();
    let rest = &narrative[start..];
    let line = rest.split('\n').next().unwrap_or(rest).trim();
    (!line.is_empty()).then_some(line)
}

/// Narrative text before the first organization marker.
pub fn narrative_description(narrative: &str) -> Option<String> {
    let cut = [WEBSITE_MARKER, FOCUS_AREAS_MARKER]
        .iter()
        .filter_map(|m| narrative.find(m))
        .min()
        .unwrap_or(narrative.len());
    let description = narrative[..cut].trim();
    (!description.is_empty()).then(|| description.to_string())
}

/// Website carried on a `\nWebsite:` line.
pub fn narrative_website(narrative: &str) -> Option<String> {
    marker_line(narrative, WEBSITE_MARKER).map(str::to_string)
}

/// Focus areas carried on a `\nFocus Areas:` line.
pub fn narrative_focus_areas(narrative: &str) -> Vec<String> {
    marker_line(narrative, FOCUS_AREAS_MARKER)
        .map(|line| {
            line.split(',')
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Fold organization fields into a narrative for stores without the
/// organization columns. Inverse of the marker reconstruction above.
pub fn encode_org_narrative(
    description: &str,
    website: Option<&str>,
    focus_areas: &[String],
) -> String {
    let mut out = description.trim().to_string();
    if let Some(site) = website.map(str::trim).filter(|s| !s.is_empty()) {
        out.push_str(WEBSITE_MARKER);
        out.push(' ');
        out.push_str(site);
    }
    if !focus_areas.is_empty() {
        out.push_str(FOCUS_AREAS_MARKER);
        out.push(' ');
        out.push_str(&focus_areas.join(", "));
    }
    out
}
