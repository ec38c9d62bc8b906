//! Storage traits for storymap backends.
//!
//! Backends return raw rows tagged with the shape they were read in; the
//! schema adapter turns those into canonical records. Every mutation goes
//! through [`MapStore::apply`] as one ordered [`WriteBatch`], which the
//! backend must apply all-or-nothing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::lifecycle::LifecycleAction;
use crate::models::{MapPin, StoryRecord, StoryStatus};
use crate::schema::{RawRow, SourceShape};

// =============================================================================
// READS
// =============================================================================

/// Rows read from a backend, with the shape they were read in.
#[derive(Debug, Clone, PartialEq)]
pub struct RowSet {
    pub shape: SourceShape,
    pub rows: Vec<RawRow>,
}

impl RowSet {
    pub fn new(shape: SourceShape, rows: Vec<RawRow>) -> Self {
        Self { shape, rows }
    }

    pub fn empty(shape: SourceShape) -> Self {
        Self::new(shape, Vec::new())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Read access to stored stories.
#[async_trait]
pub trait StoryRepository: Send + Sync {
    /// All story rows, unordered.
    async fn load_stories(&self) -> Result<RowSet>;

    /// Story row by id; an empty set when absent.
    async fn load_story(&self, id: &str) -> Result<RowSet>;
}

/// Read access to stored map pins.
#[async_trait]
pub trait PinRepository: Send + Sync {
    /// All pin rows, unordered.
    async fn load_pins(&self) -> Result<RowSet>;

    /// Pin row by id; an empty set when absent.
    async fn load_pin(&self, id: &str) -> Result<RowSet>;
}

// =============================================================================
// WRITES
// =============================================================================

/// Compare-and-set status change.
///
/// Applies only while the stored status still equals `from`; otherwise the
/// backend fails the batch with `InvalidTransition` carrying the status it
/// found.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusWrite {
    pub id: String,
    pub from: StoryStatus,
    pub to: StoryStatus,
    pub action: LifecycleAction,
    pub at: DateTime<Utc>,
}

/// One step of a write batch.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Insert a new story. Fails if the id is taken.
    InsertStory(StoryRecord),
    SetStatus(StatusWrite),
    /// Remove a story. Fails with `NotFound` if absent.
    DeleteStory { id: String },
    /// Insert or replace a pin; last writer wins on id.
    UpsertPin(MapPin),
    /// Remove a pin. Absence is an error only when `must_exist` is set.
    DeletePin { id: String, must_exist: bool },
}

impl WriteOp {
    pub fn kind(&self) -> &'static str {
        match self {
            WriteOp::InsertStory(_) => "insert_story",
            WriteOp::SetStatus(_) => "set_status",
            WriteOp::DeleteStory { .. } => "delete_story",
            WriteOp::UpsertPin(_) => "upsert_pin",
            WriteOp::DeletePin { .. } => "delete_pin",
        }
    }
}

/// Ordered list of writes applied atomically.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(op: WriteOp) -> Self {
        Self { ops: vec![op] }
    }

    pub fn push(&mut self, op: WriteOp) {
        self.ops.push(op);
    }

    /// Builder form of [`push`](Self::push).
    pub fn with(mut self, op: WriteOp) -> Self {
        self.ops.push(op);
        self
    }

    /// `self` followed by every op of `then`.
    pub fn then(mut self, then: WriteBatch) -> Self {
        self.ops.extend(then.ops);
        self
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl From<WriteOp> for WriteBatch {
    fn from(op: WriteOp) -> Self {
        Self::single(op)
    }
}

// =============================================================================
// STORE
// =============================================================================

/// Backend diagnostics for the storage report endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageReport {
    /// Backend name, e.g. "postgres" or "static".
    pub backend: String,
    pub shape: SourceShape,
    /// Optional columns the backend lacks, as `table.column`.
    pub missing_columns: Vec<String>,
    pub story_count: usize,
    pub pin_count: usize,
}

/// A storage backend for stories and pins.
#[async_trait]
pub trait MapStore: StoryRepository + PinRepository {
    /// Shape currently in effect for reads.
    fn shape(&self) -> SourceShape;

    /// Shape of the story table alone. Differs from [`MapStore::shape`] when
    /// only the pin table predates the current schema.
    fn story_shape(&self) -> SourceShape {
        self.shape()
    }

    /// Whether `id` names an existing story or pin.
    async fn id_in_use(&self, id: &str) -> Result<bool>;

    /// Apply every op of `batch` in order, or none of them.
    async fn apply(&self, batch: WriteBatch) -> Result<()>;

    async fn describe(&self) -> Result<StorageReport>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_then_preserves_order() {
        let batch = WriteBatch::single(WriteOp::DeletePin {
            id: "p1".to_string(),
            must_exist: true,
        })
        .then(WriteBatch::new().with(WriteOp::DeleteStory {
            id: "s1".to_string(),
        }));

        let kinds: Vec<_> = batch.ops().iter().map(WriteOp::kind).collect();
        assert_eq!(kinds, vec!["delete_pin", "delete_story"]);
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_empty_batch() {
        let batch = WriteBatch::new();
        assert!(batch.is_empty());
        assert!(batch.then(WriteBatch::new()).is_empty());
    }

    #[test]
    fn test_storage_report_serializes_shape() {
        let report = StorageReport {
            backend: "static".to_string(),
            shape: SourceShape::Fallback,
            missing_columns: Vec::new(),
            story_count: 0,
            pin_count: 3,
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["shape"], "fallback");
        assert_eq!(value["pin_count"], 3);
    }
}
