//! Catalog Core - Shared Types
//!
//! Domain events, coherence actions, cache region names, read-model
//! documents, configuration and the error taxonomy shared by every other
//! catalog crate. No I/O happens here.

pub mod action;
pub mod clock;
pub mod config;
pub mod constants;
pub mod document;
pub mod error;
pub mod event;
pub mod identity;
pub mod region;

pub use action::Action;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CoherenceConfig;
pub use document::{
    ChangedRow, EntityDetail, IndexDocument, RatingBlock, RelatedReview, ReviewStatus,
    StatisticsBlock,
};
pub use error::{CatalogError, CatalogResult, ConfigError, StorageError, ValidationError};
pub use event::{AggregateChange, DomainEvent, EventEnvelope, EventKind, UpdateKind};
pub use identity::{new_event_id, EntityId, Timestamp};
pub use region::Region;
