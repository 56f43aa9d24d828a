//! Named cache regions.
//!
//! The coherence core never looks inside a region. It only clears whole
//! regions, evicts single keys, or marks a region dirty for the next sweep.

use crate::constants::{
    ADMIN_LISTING_TTL_SECS, DEFAULT_REGION_TTL_SECS, ENTITY_DETAIL_TTL_SECS,
    SEARCH_RESULTS_TTL_SECS,
};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::time::Duration;

/// Name of a cache region such as `"entity-detail"` or `"search-results"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Region(Cow<'static, str>);

impl Region {
    /// Per-entity detail payloads, keyed by entity id.
    pub const ENTITY_DETAIL: Region = Region(Cow::Borrowed("entity-detail"));
    /// Public search/listing result pages.
    pub const SEARCH_RESULTS: Region = Region(Cow::Borrowed("search-results"));
    /// Administrative listing pages.
    pub const ADMIN_LISTING: Region = Region(Cow::Borrowed("admin-listing"));

    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// How long an entry written into this region stays readable.
    pub fn entry_ttl(&self) -> Duration {
        let secs = match self.as_str() {
            "entity-detail" => ENTITY_DETAIL_TTL_SECS,
            "search-results" => SEARCH_RESULTS_TTL_SECS,
            "admin-listing" => ADMIN_LISTING_TTL_SECS,
            _ => DEFAULT_REGION_TTL_SECS,
        };
        Duration::from_secs(secs)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Region {
    fn from(name: &str) -> Self {
        match name {
            "entity-detail" => Region::ENTITY_DETAIL,
            "search-results" => Region::SEARCH_RESULTS,
            "admin-listing" => Region::ADMIN_LISTING,
            other => Region::new(other),
        }
    }
}

impl From<String> for Region {
    fn from(name: String) -> Self {
        Region::from(name.as_str())
    }
}
