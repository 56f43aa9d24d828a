//! Catalog Test Utilities
//!
//! Shared test infrastructure for the catalog workspace:
//! - In-memory store fixtures driven by a manual clock
//! - Proptest generators for events and changed rows
//! - A tracing layer that captures log records for assertions

use catalog_core::{
    ChangedRow, DomainEvent, EntityId, ManualClock, RelatedReview, ReviewStatus,
    StatisticsBlock, Timestamp,
};
use catalog_storage::{
    InMemoryCacheStore, InMemoryDetailSource, InMemoryKeyValueStore, InMemoryPrimaryStore,
    InMemorySearchStore, InMemoryViewCounter,
};
use chrono::{TimeZone, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built stores and rows for common scenarios.

    use super::*;

    /// Fixed start time so dates in assertions are stable.
    pub fn epoch() -> Timestamp {
        Utc.with_ymd_and_hms(2026, 1, 15, 9, 0, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }

    /// Every in-memory store sharing one manual clock.
    pub struct MemoryStores {
        pub clock: Arc<ManualClock>,
        pub cache: Arc<InMemoryCacheStore>,
        pub kv: Arc<InMemoryKeyValueStore>,
        pub search: Arc<InMemorySearchStore>,
        pub primary: Arc<InMemoryPrimaryStore>,
        pub details: Arc<InMemoryDetailSource>,
        pub views: Arc<InMemoryViewCounter>,
    }

    impl MemoryStores {
        pub fn new() -> Self {
            Self::starting_at(epoch())
        }

        pub fn starting_at(start: Timestamp) -> Self {
            let clock = Arc::new(ManualClock::new(start));
            Self {
                cache: Arc::new(InMemoryCacheStore::new(clock.clone())),
                kv: Arc::new(InMemoryKeyValueStore::new(clock.clone())),
                search: Arc::new(InMemorySearchStore::new()),
                primary: Arc::new(InMemoryPrimaryStore::new()),
                details: Arc::new(InMemoryDetailSource::new()),
                views: Arc::new(InMemoryViewCounter::new()),
                clock,
            }
        }
    }

    impl Default for MemoryStores {
        fn default() -> Self {
            Self::new()
        }
    }

    /// A well-formed changed row with a name and two active reviews.
    pub fn changed_row(id: i64, last_modified: Timestamp) -> ChangedRow {
        let mut attributes = Map::new();
        attributes.insert("name".to_string(), Value::String(format!("Catalog item {id}")));
        attributes.insert("price".to_string(), Value::from(1000 + id));
        ChangedRow {
            entity_id: EntityId::new(id),
            last_modified,
            attributes,
            statistics: Some(StatisticsBlock {
                usage_count: id as u64,
                view_count: (id as u64) * 3,
            }),
            reviews: vec![
                RelatedReview {
                    rating: 4,
                    status: ReviewStatus::Active,
                },
                RelatedReview {
                    rating: 5,
                    status: ReviewStatus::Active,
                },
            ],
        }
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for catalog types.

    use super::*;
    use catalog_core::{AggregateChange, UpdateKind};
    use proptest::prelude::*;

    pub fn arb_entity_id() -> impl Strategy<Value = EntityId> {
        (1i64..1_000_000).prop_map(EntityId::new)
    }

    /// Timestamps between 2020 and 2030.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
        })
    }

    pub fn arb_update_kind() -> impl Strategy<Value = UpdateKind> {
        prop_oneof![
            (any::<i64>(), any::<i64>()).prop_map(|(old, new)| UpdateKind::Price { old, new }),
            (any::<bool>(), any::<bool>())
                .prop_map(|(old, new)| UpdateKind::Visibility { old, new }),
            Just(UpdateKind::BasicInfo),
            Just(UpdateKind::RelatedFiles),
        ]
    }

    pub fn arb_aggregate_change() -> impl Strategy<Value = AggregateChange> {
        prop_oneof![
            Just(AggregateChange::ReviewAdded),
            Just(AggregateChange::ReviewUpdated),
            Just(AggregateChange::ReviewRemoved),
        ]
    }

    pub fn arb_domain_event() -> impl Strategy<Value = DomainEvent> {
        prop_oneof![
            (arb_entity_id(), any::<bool>(), any::<bool>()).prop_map(
                |(entity_id, visible, admin_owned)| DomainEvent::Created {
                    entity_id,
                    visible,
                    admin_owned,
                }
            ),
            (arb_entity_id(), arb_update_kind())
                .prop_map(|(entity_id, change)| DomainEvent::Updated { entity_id, change }),
            arb_entity_id().prop_map(|entity_id| DomainEvent::Deleted { entity_id }),
            (arb_entity_id(), arb_aggregate_change()).prop_map(|(entity_id, change)| {
                DomainEvent::RelatedAggregateChanged { entity_id, change }
            }),
        ]
    }

    pub fn arb_review_status() -> impl Strategy<Value = ReviewStatus> {
        prop_oneof![
            Just(ReviewStatus::Active),
            Just(ReviewStatus::Hidden),
            Just(ReviewStatus::Deleted),
        ]
    }

    /// Reviews with ratings always inside 1..=5.
    pub fn arb_review() -> impl Strategy<Value = RelatedReview> {
        (1i32..=5, arb_review_status()).prop_map(|(rating, status)| RelatedReview { rating, status })
    }

    /// A row that always transforms successfully.
    pub fn arb_changed_row(entity_id: EntityId) -> impl Strategy<Value = ChangedRow> {
        (
            arb_timestamp(),
            "[A-Za-z][A-Za-z0-9 ._-]{0,30}",
            proptest::option::of((0u64..10_000, 0u64..10_000)),
            prop::collection::vec(arb_review(), 0..8),
        )
            .prop_map(move |(last_modified, name, stats, reviews)| {
                let mut attributes = Map::new();
                attributes.insert("name".to_string(), Value::String(name));
                ChangedRow {
                    entity_id,
                    last_modified,
                    attributes,
                    statistics: stats.map(|(usage_count, view_count)| StatisticsBlock {
                        usage_count,
                        view_count,
                    }),
                    reviews,
                }
            })
    }

    /// Rows with distinct entity ids `1..=n` for some `n` below `max`.
    pub fn arb_changed_rows(max: usize) -> impl Strategy<Value = Vec<ChangedRow>> {
        (1..max.max(2)).prop_flat_map(|n| {
            (1..=n as i64)
                .map(|id| arb_changed_row(EntityId::new(id)))
                .collect::<Vec<_>>()
        })
    }
}

// ============================================================================
// LOG CAPTURE
// ============================================================================

pub mod logs {
    //! Capture tracing events in tests.
    //!
    //! ```ignore
    //! let capture = LogCapture::new();
    //! let _guard = capture.install();
    //! // ... code under test ...
    //! assert_eq!(capture.count(Level::ERROR, "catalog::emergency"), 1);
    //! ```

    use std::collections::BTreeMap;
    use std::fmt;
    use std::sync::{Arc, Mutex};
    use tracing::field::{Field, Visit};
    use tracing::subscriber::DefaultGuard;
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::Layer;

    /// One captured event.
    #[derive(Debug, Clone)]
    pub struct CapturedEvent {
        pub level: Level,
        pub target: String,
        pub fields: BTreeMap<String, String>,
    }

    impl CapturedEvent {
        pub fn field(&self, name: &str) -> Option<&str> {
            self.fields.get(name).map(String::as_str)
        }
    }

    #[derive(Default)]
    struct FieldVisitor(BTreeMap<String, String>);

    impl Visit for FieldVisitor {
        fn record_str(&mut self, field: &Field, value: &str) {
            self.0.insert(field.name().to_string(), value.to_string());
        }

        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            self.0
                .insert(field.name().to_string(), format!("{value:?}"));
        }
    }

    /// Tracing layer that records every event it sees.
    #[derive(Clone, Default)]
    pub struct LogCapture {
        events: Arc<Mutex<Vec<CapturedEvent>>>,
    }

    impl LogCapture {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make a subscriber with this layer the thread default until the
        /// guard drops.
        pub fn install(&self) -> DefaultGuard {
            let subscriber = tracing_subscriber::registry().with(self.clone());
            tracing::subscriber::set_default(subscriber)
        }

        pub fn events(&self) -> Vec<CapturedEvent> {
            self.events
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone()
        }

        /// Events at exactly `level` with exactly `target`.
        pub fn matching(&self, level: Level, target: &str) -> Vec<CapturedEvent> {
            self.events()
                .into_iter()
                .filter(|e| e.level == level && e.target == target)
                .collect()
        }

        pub fn count(&self, level: Level, target: &str) -> usize {
            self.matching(level, target).len()
        }

        pub fn count_level(&self, level: Level) -> usize {
            self.events().iter().filter(|e| e.level == level).count()
        }
    }

    impl<S: Subscriber> Layer<S> for LogCapture {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            let mut visitor = FieldVisitor::default();
            event.record(&mut visitor);
            let captured = CapturedEvent {
                level: *event.metadata().level(),
                target: event.metadata().target().to_string(),
                fields: visitor.0,
            };
            self.events
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(captured);
        }
    }
}

pub use fixtures::{changed_row, epoch, MemoryStores};
pub use logs::{CapturedEvent, LogCapture};
