//! Read-model documents and the rows they are built from.

use crate::identity::{EntityId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Usage counters joined into every index document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct StatisticsBlock {
    pub usage_count: u64,
    pub view_count: u64,
}

/// Aggregate rating over active reviews.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RatingBlock {
    pub average: f64,
    pub count: u64,
}

/// Moderation status of a related review row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewStatus {
    Active,
    Hidden,
    Deleted,
}

/// A review row joined to a changed entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedReview {
    pub rating: i32,
    pub status: ReviewStatus,
}

/// A row returned by the primary store's change query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangedRow {
    pub entity_id: EntityId,
    pub last_modified: Timestamp,
    /// Static attributes copied verbatim into the document.
    pub attributes: Map<String, Value>,
    /// Absent when the entity has no statistics row yet.
    pub statistics: Option<StatisticsBlock>,
    pub reviews: Vec<RelatedReview>,
}

/// Denormalized search document, always written as a full overwrite.
///
/// `attributes` is a `serde_json::Map` (ordered), so serializing the same
/// document twice yields identical bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct IndexDocument {
    pub entity_id: EntityId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = DateTime))]
    pub last_modified: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub attributes: Map<String, Value>,
    pub statistics: StatisticsBlock,
    pub rating: RatingBlock,
    pub suggestions: Vec<String>,
}

/// Authoritative detail payload for a single entity, as cached in the
/// `entity-detail` region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDetail {
    pub entity_id: EntityId,
    pub updated_at: Timestamp,
    pub payload: Value,
}
