//! Centralized default constants for storymap.
//!
//! Crates reference these instead of defining their own literals.

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Prefix of admin-authored pin identifiers.
pub const MANUAL_PIN_PREFIX: &str = "manual_";

/// Legacy prefix marking organization submissions.
pub const ORGANIZATION_ID_PREFIX: &str = "organization_";

/// Attempts at generating a standalone pin id before giving up.
pub const ID_GENERATION_ATTEMPTS: usize = 3;

/// Longest accepted caller-supplied identifier.
pub const MAX_ID_LENGTH: usize = 128;

// =============================================================================
// NARRATIVE MARKERS
// =============================================================================

/// Introduces the website line in a folded organization narrative.
pub const WEBSITE_MARKER: &str = "\nWebsite:";

/// Introduces the comma-separated focus area list in a folded narrative.
pub const FOCUS_AREAS_MARKER: &str = "\nFocus Areas:";

/// First-line declared type in static seed narratives (`TYPE:resource`).
pub const TYPE_MARKER: &str = "TYPE:";

// =============================================================================
// DISPLAY
// =============================================================================

/// Byline for anonymous submissions and pin-only entries.
pub const ANONYMOUS_AUTHOR: &str = "Anonymous";

/// Preview length in characters for map popups.
pub const PREVIEW_LENGTH: usize = 150;

/// Popup text for pins without a story.
pub const EMPTY_PREVIEW: &str = "Click to read this story";

/// Detail text when neither the pin nor the story carries any.
pub const NO_STORY_CONTENT: &str = "No story content available";

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP server port.
pub const SERVER_PORT: u16 = 3000;

/// Default bind address.
pub const SERVER_HOST: &str = "0.0.0.0";

/// Maximum request body size in bytes.
pub const MAX_BODY_SIZE_BYTES: usize = 1024 * 1024;

/// Default CORS max-age in seconds (1 hour).
pub const CORS_MAX_AGE_SECS: u64 = 3600;
