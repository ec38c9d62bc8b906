//! Pin type classification.
//!
//! Every record maps to exactly one [`PinCategory`]. Precedence:
//!
//! 1. organization signals (kind, declared type, `organization_` id prefix,
//!    any organization detail)
//! 2. an explicit recognised `category`, else an explicit recognised `type`
//! 3. the first [`KeywordTable`] rule with a keyword in the lower-cased title
//!    or id
//! 4. `story`
//!
//! Classification never fails and is idempotent: a pin classified as `c`
//! classifies as `c` again.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ids::has_organization_prefix;
use crate::models::{MapPin, NewPin, PinCategory, StoryKind, StoryRecord};
use crate::schema::CanonicalRecord;

// =============================================================================
// KEYWORD TABLE
// =============================================================================

/// Keywords that file a record under `category`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordRule {
    pub category: PinCategory,
    pub keywords: Vec<String>,
}

impl KeywordRule {
    pub fn new(category: PinCategory, keywords: &[&str]) -> Self {
        Self {
            category,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    fn matches(&self, haystacks: &[&str]) -> Option<&str> {
        self.keywords
            .iter()
            .find(|k| haystacks.iter().any(|h| h.contains(k.as_str())))
            .map(String::as_str)
    }
}

/// Ordered keyword rules. The first rule with a match wins.
///
/// Serialized as a JSON array of `{"category": ..., "keywords": [...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeywordTable {
    rules: Vec<KeywordRule>,
}

impl Default for KeywordTable {
    fn default() -> Self {
        Self {
            rules: vec![
                KeywordRule::new(
                    PinCategory::Organization,
                    &["organization", "foundation", "center", "institute"],
                ),
                KeywordRule::new(
                    PinCategory::Protection,
                    &[
                        "protection",
                        "rights",
                        "advocacy",
                        "activism",
                        "campaign",
                        "movement",
                    ],
                ),
                KeywordRule::new(
                    PinCategory::Resource,
                    &["resource", "hotline", "shelter", "clinic", "guide", "support"],
                ),
                KeywordRule::new(
                    PinCategory::Violation,
                    &[
                        "violation",
                        "abuse",
                        "discrimination",
                        "assault",
                        "harassment",
                    ],
                ),
            ],
        }
    }
}

impl KeywordTable {
    /// Build a table, lower-casing keywords and dropping blank ones.
    pub fn new(rules: Vec<KeywordRule>) -> Self {
        let rules = rules
            .into_iter()
            .map(|rule| KeywordRule {
                category: rule.category,
                keywords: rule
                    .keywords
                    .into_iter()
                    .map(|k| k.trim().to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect(),
            })
            .collect();
        Self { rules }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let rules: Vec<KeywordRule> = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("invalid keyword table: {}", e)))?;
        if rules.is_empty() {
            return Err(Error::Config("keyword table has no rules".to_string()));
        }
        Ok(Self::new(rules))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&json)
    }

    pub fn rules(&self) -> &[KeywordRule] {
        &self.rules
    }

    /// First rule matching any haystack, with the keyword that hit.
    fn lookup(&self, haystacks: &[&str]) -> Option<(PinCategory, &str)> {
        self.rules
            .iter()
            .find_map(|rule| rule.matches(haystacks).map(|kw| (rule.category, kw)))
    }
}

// =============================================================================
// INPUT
// =============================================================================

/// Fields the classifier looks at, borrowed from any record shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassificationInput<'a> {
    pub id: &'a str,
    pub title: &'a str,
    pub kind: StoryKind,
    pub declared_type: Option<&'a str>,
    pub category: Option<&'a str>,
    /// Any organization name, description, website or focus area is set.
    pub has_organization_details: bool,
}

fn filled(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

impl<'a> From<&'a CanonicalRecord> for ClassificationInput<'a> {
    fn from(r: &'a CanonicalRecord) -> Self {
        Self {
            id: &r.id,
            title: &r.title,
            kind: r.kind,
            declared_type: r.declared_type.as_deref(),
            category: r.category.as_deref(),
            has_organization_details: filled(&r.organization_name)
                || filled(&r.organization_description)
                || filled(&r.website)
                || !r.focus_areas.is_empty(),
        }
    }
}

impl<'a> From<&'a StoryRecord> for ClassificationInput<'a> {
    fn from(s: &'a StoryRecord) -> Self {
        Self {
            id: &s.id,
            title: &s.title,
            kind: s.kind,
            declared_type: None,
            category: None,
            has_organization_details: filled(&s.organization_name)
                || filled(&s.organization_description)
                || filled(&s.website)
                || !s.focus_areas.is_empty(),
        }
    }
}

/// A classified pin's own type is authoritative; the free category label is
/// not consulted again.
impl<'a> From<&'a MapPin> for ClassificationInput<'a> {
    fn from(p: &'a MapPin) -> Self {
        Self {
            id: &p.id,
            title: &p.title,
            kind: StoryKind::Personal,
            declared_type: Some(p.pin_type.as_str()),
            category: None,
            has_organization_details: false,
        }
    }
}

impl<'a> From<&'a NewPin> for ClassificationInput<'a> {
    fn from(p: &'a NewPin) -> Self {
        Self {
            id: "",
            title: p.title.as_deref().unwrap_or_default(),
            kind: StoryKind::Personal,
            declared_type: p.pin_type.as_deref(),
            category: p.category.as_deref(),
            has_organization_details: false,
        }
    }
}

// =============================================================================
// CLASSIFIER
// =============================================================================

/// Which precedence rule decided a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Basis {
    OrganizationSignal,
    ExplicitCategory,
    ExplicitType,
    Keyword,
    Default,
}

impl fmt::Display for Basis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Basis::OrganizationSignal => "organization_signal",
            Basis::ExplicitCategory => "explicit_category",
            Basis::ExplicitType => "explicit_type",
            Basis::Keyword => "keyword",
            Basis::Default => "default",
        })
    }
}

/// Assigns pin categories.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    table: KeywordTable,
}

impl Classifier {
    pub fn new(table: KeywordTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &KeywordTable {
        &self.table
    }

    pub fn classify<'a>(&self, input: impl Into<ClassificationInput<'a>>) -> PinCategory {
        self.classify_with_basis(input).0
    }

    /// Category plus the rule that produced it.
    pub fn classify_with_basis<'a>(
        &self,
        input: impl Into<ClassificationInput<'a>>,
    ) -> (PinCategory, Basis) {
        let input = input.into();
        let (category, basis) = self.decide(&input);
        tracing::debug!(
            subsystem = "catalog",
            component = "classifier",
            id = input.id,
            pin_type = %category,
            basis = %basis,
            "Classified record"
        );
        (category, basis)
    }

    fn decide(&self, input: &ClassificationInput<'_>) -> (PinCategory, Basis) {
        let declared = input.declared_type.and_then(PinCategory::parse);

        if input.kind == StoryKind::Organization
            || declared == Some(PinCategory::Organization)
            || has_organization_prefix(input.id)
            || input.has_organization_details
        {
            return (PinCategory::Organization, Basis::OrganizationSignal);
        }

        if let Some(category) = input.category.and_then(PinCategory::parse) {
            return (category, Basis::ExplicitCategory);
        }
        if let Some(category) = declared {
            return (category, Basis::ExplicitType);
        }

        let title = input.title.to_lowercase();
        let id = input.id.to_lowercase();
        if let Some((category, _keyword)) = self.table.lookup(&[&title, &id]) {
            return (category, Basis::Keyword);
        }

        (PinCategory::Story, Basis::Default)
    }
}
