//! Domain events published after a write transaction commits.
//!
//! Events are a closed tagged union; subscribers match on the variant
//! instead of registering for string topics.

use crate::identity::{new_event_id, EntityId, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// What changed in an `Updated` event.
///
/// Prices are carried in minor currency units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(tag = "subtype", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateKind {
    Price { old: i64, new: i64 },
    Visibility { old: bool, new: bool },
    BasicInfo,
    RelatedFiles,
}

/// Kind of change to an aggregate owned by the entity (reviews).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum AggregateChange {
    ReviewAdded,
    ReviewUpdated,
    ReviewRemoved,
}

/// A committed change to a catalog entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    Created {
        entity_id: EntityId,
        visible: bool,
        admin_owned: bool,
    },
    Updated {
        entity_id: EntityId,
        change: UpdateKind,
    },
    Deleted {
        entity_id: EntityId,
    },
    RelatedAggregateChanged {
        entity_id: EntityId,
        change: AggregateChange,
    },
}

/// Discriminator used to register subscribers per event variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Created,
    Updated,
    Deleted,
    RelatedAggregateChanged,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::Created,
        EventKind::Updated,
        EventKind::Deleted,
        EventKind::RelatedAggregateChanged,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Created => "created",
            EventKind::Updated => "updated",
            EventKind::Deleted => "deleted",
            EventKind::RelatedAggregateChanged => "related_aggregate_changed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl DomainEvent {
    pub fn entity_id(&self) -> EntityId {
        match self {
            DomainEvent::Created { entity_id, .. }
            | DomainEvent::Updated { entity_id, .. }
            | DomainEvent::Deleted { entity_id }
            | DomainEvent::RelatedAggregateChanged { entity_id, .. } => *entity_id,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            DomainEvent::Created { .. } => EventKind::Created,
            DomainEvent::Updated { .. } => EventKind::Updated,
            DomainEvent::Deleted { .. } => EventKind::Deleted,
            DomainEvent::RelatedAggregateChanged { .. } => EventKind::RelatedAggregateChanged,
        }
    }

    pub fn price_changed(entity_id: EntityId, old: i64, new: i64) -> Self {
        DomainEvent::Updated {
            entity_id,
            change: UpdateKind::Price { old, new },
        }
    }

    pub fn visibility_changed(entity_id: EntityId, old: bool, new: bool) -> Self {
        DomainEvent::Updated {
            entity_id,
            change: UpdateKind::Visibility { old, new },
        }
    }

    pub fn deleted(entity_id: EntityId) -> Self {
        DomainEvent::Deleted { entity_id }
    }
}

/// An event as delivered to subscribers, stamped at publication time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: Uuid,
    pub published_at: Timestamp,
    pub event: DomainEvent,
}

impl EventEnvelope {
    pub fn new(event: DomainEvent, published_at: Timestamp) -> Self {
        Self {
            event_id: new_event_id(),
            published_at,
            event,
        }
    }
}
