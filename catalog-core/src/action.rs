//! Cache coherence actions produced by the policy table.

use crate::identity::EntityId;
use crate::region::Region;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One step the coherence layer must take in response to an event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Clear a whole region immediately.
    EvictRegionNow { region: Region },
    /// Remove a single key from a region immediately.
    EvictKeyNow { region: Region, key: String },
    /// Record a lazy mark so the next sweep clears the region.
    MarkDirty { region: Region },
}

impl Action {
    pub fn evict_region(region: Region) -> Self {
        Action::EvictRegionNow { region }
    }

    pub fn evict_detail(entity_id: EntityId) -> Self {
        Action::EvictKeyNow {
            region: Region::ENTITY_DETAIL,
            key: entity_id.cache_key(),
        }
    }

    pub fn mark_dirty(region: Region) -> Self {
        Action::MarkDirty { region }
    }

    /// Whether the action touches the cache store before the handler returns.
    pub fn is_immediate(&self) -> bool {
        !matches!(self, Action::MarkDirty { .. })
    }

    pub fn region(&self) -> &Region {
        match self {
            Action::EvictRegionNow { region }
            | Action::EvictKeyNow { region, .. }
            | Action::MarkDirty { region } => region,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::EvictRegionNow { region } => write!(f, "EvictRegionNow({region})"),
            Action::EvictKeyNow { region, key } => write!(f, "EvictKeyNow({region}, {key})"),
            Action::MarkDirty { region } => write!(f, "MarkDirty({region})"),
        }
    }
}
