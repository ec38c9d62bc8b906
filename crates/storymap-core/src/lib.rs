//! # storymap-core
//!
//! Core types, pin classification, and story/pin reconciliation for storymap.
//!
//! Stories are submitted, reviewed by an administrator, and published to a
//! world map as categorized pins. This crate holds everything that does not
//! depend on a particular backend: the domain model, the schema adapter that
//! normalizes rows from full, legacy and fallback storage shapes, the type
//! classifier, the lifecycle state machine, pin reconciliation, and an
//! in-memory fallback store.

pub mod catalog;
pub mod classify;
pub mod defaults;
pub mod error;
pub mod fallback;
pub mod geocode;
pub mod ids;
pub mod lifecycle;
pub mod logging;
pub mod models;
pub mod reconcile;
pub mod schema;
pub mod service;
pub mod traits;

// Re-export commonly used types at crate root
pub use catalog::Catalog;
pub use classify::{Basis, ClassificationInput, Classifier, KeywordRule, KeywordTable};
pub use error::{Error, Result};
pub use fallback::StaticStore;
pub use geocode::{Gazetteer, Geocoder};
pub use lifecycle::{LifecycleAction, LifecycleManager, TransitionRejection};
pub use models::*;
pub use reconcile::PinReconciler;
pub use schema::{
    adapter_for, encode_org_narrative, normalize, CanonicalRecord, FullSchema, IneligibleRow,
    LegacySchema, Normalized, RawRow, SchemaAdapter, SourceShape, StaticFallback,
};
pub use service::{ActionOutcome, StoryMap};
pub use traits::*;
