//! Structured logging field names for storymap.
//!
//! All crates use these names so log queries work across subsystems.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Storage failure surfaced to the caller |
//! | WARN  | Recoverable issue, fallback applied (skipped row, legacy downgrade) |
//! | INFO  | Startup, lifecycle mutations, pin creation/removal |
//! | DEBUG | Classification decisions, probe results, config choices |
//! | TRACE | Per-row normalization |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Correlation ID propagated from the HTTP request.
pub const REQUEST_ID: &str = "request_id";

/// Subsystem originating the log event.
/// Values: "api", "lifecycle", "reconcile", "catalog", "db", "static"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "pool", "probe", "classifier", "schema_adapter"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "approve", "publish", "list_pins", "apply"
pub const OPERATION: &str = "op";

/// Administrator performing a mutation.
pub const ACTOR: &str = "actor";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Story identifier being operated on.
pub const STORY_ID: &str = "story_id";

/// Pin identifier being operated on.
pub const PIN_ID: &str = "pin_id";

/// Pin category assigned by the classifier.
pub const PIN_TYPE: &str = "pin_type";

/// Storage shape in effect ("full", "legacy", "fallback").
pub const SHAPE: &str = "shape";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of records returned by a listing.
pub const RESULT_COUNT: &str = "result_count";

/// Number of rows skipped as ineligible.
pub const SKIPPED: &str = "skipped";

/// Number of writes in a batch.
pub const OP_COUNT: &str = "op_count";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
