//! Coherence policy: which cache actions each committed event requires.
//!
//! Deletion and hiding are the only transitions that can expose forbidden
//! data if left stale, so they resolve with immediate region clears and no
//! lazy mark. Everything else pairs a cheap immediate eviction with a dirty
//! mark that guarantees convergence if the immediate step is lost.

use catalog_core::{Action, DomainEvent, Region, UpdateKind};

/// Stateless mapping from event to actions.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoherencePolicy;

impl CoherencePolicy {
    /// Actions for `event`, immediate ones first.
    pub fn decide(event: &DomainEvent) -> Vec<Action> {
        match event {
            DomainEvent::Created { visible: false, .. } => Vec::new(),
            DomainEvent::Created { admin_owned, .. } => {
                let mut actions = vec![Action::evict_region(Region::SEARCH_RESULTS)];
                if *admin_owned {
                    actions.push(Action::mark_dirty(Region::ADMIN_LISTING));
                }
                actions
            }
            DomainEvent::Deleted { entity_id } => vec![
                Action::evict_detail(*entity_id),
                Action::evict_region(Region::SEARCH_RESULTS),
            ],
            DomainEvent::Updated { entity_id, change } => match change {
                UpdateKind::Price { .. } => vec![
                    Action::evict_detail(*entity_id),
                    Action::evict_region(Region::SEARCH_RESULTS),
                    Action::evict_region(Region::ADMIN_LISTING),
                    Action::mark_dirty(Region::SEARCH_RESULTS),
                    Action::mark_dirty(Region::ADMIN_LISTING),
                ],
                UpdateKind::Visibility { new: true, .. } => vec![
                    Action::evict_detail(*entity_id),
                    Action::mark_dirty(Region::SEARCH_RESULTS),
                    Action::mark_dirty(Region::ADMIN_LISTING),
                ],
                UpdateKind::Visibility { new: false, .. } => vec![
                    Action::evict_detail(*entity_id),
                    Action::evict_region(Region::SEARCH_RESULTS),
                    Action::evict_region(Region::ADMIN_LISTING),
                ],
                UpdateKind::BasicInfo => vec![
                    Action::evict_detail(*entity_id),
                    Action::mark_dirty(Region::SEARCH_RESULTS),
                    Action::mark_dirty(Region::ADMIN_LISTING),
                ],
                UpdateKind::RelatedFiles => vec![Action::evict_detail(*entity_id)],
            },
            DomainEvent::RelatedAggregateChanged { entity_id, .. } => vec![
                Action::evict_detail(*entity_id),
                Action::mark_dirty(Region::SEARCH_RESULTS),
                Action::mark_dirty(Region::ADMIN_LISTING),
            ],
        }
    }

    /// Events whose invalidation must never be deferred.
    pub fn is_strict(event: &DomainEvent) -> bool {
        matches!(
            event,
            DomainEvent::Deleted { .. }
                | DomainEvent::Updated {
                    change: UpdateKind::Visibility { new: false, .. },
                    ..
                }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_core::{AggregateChange, EntityId};

    fn id(n: i64) -> EntityId {
        EntityId::new(n)
    }

    #[test]
    fn test_price_change_evicts_and_marks() {
        let actions = CoherencePolicy::decide(&DomainEvent::price_changed(id(42), 1000, 1200));
        assert_eq!(
            actions,
            vec![
                Action::EvictKeyNow {
                    region: Region::ENTITY_DETAIL,
                    key: "42".to_string()
                },
                Action::EvictRegionNow {
                    region: Region::SEARCH_RESULTS
                },
                Action::EvictRegionNow {
                    region: Region::ADMIN_LISTING
                },
                Action::MarkDirty {
                    region: Region::SEARCH_RESULTS
                },
                Action::MarkDirty {
                    region: Region::ADMIN_LISTING
                },
            ]
        );
    }

    #[test]
    fn test_delete_is_strict_without_marks() {
        let event = DomainEvent::deleted(id(7));
        let actions = CoherencePolicy::decide(&event);
        assert_eq!(
            actions,
            vec![
                Action::evict_detail(id(7)),
                Action::evict_region(Region::SEARCH_RESULTS)
            ]
        );
        assert!(actions.iter().all(Action::is_immediate));
        assert!(CoherencePolicy::is_strict(&event));
    }

    #[test]
    fn test_hiding_is_strict() {
        let event = DomainEvent::visibility_changed(id(5), true, false);
        let actions = CoherencePolicy::decide(&event);
        assert_eq!(
            actions,
            vec![
                Action::evict_detail(id(5)),
                Action::evict_region(Region::SEARCH_RESULTS),
                Action::evict_region(Region::ADMIN_LISTING),
            ]
        );
        assert!(CoherencePolicy::is_strict(&event));
    }

    #[test]
    fn test_publishing_is_lazy() {
        let event = DomainEvent::visibility_changed(id(5), false, true);
        let actions = CoherencePolicy::decide(&event);
        assert_eq!(
            actions,
            vec![
                Action::evict_detail(id(5)),
                Action::mark_dirty(Region::SEARCH_RESULTS),
                Action::mark_dirty(Region::ADMIN_LISTING),
            ]
        );
        assert!(!CoherencePolicy::is_strict(&event));
    }

    #[test]
    fn test_created_visibility_and_ownership() {
        let hidden = DomainEvent::Created {
            entity_id: id(1),
            visible: false,
            admin_owned: true,
        };
        assert!(CoherencePolicy::decide(&hidden).is_empty());

        let public = DomainEvent::Created {
            entity_id: id(1),
            visible: true,
            admin_owned: false,
        };
        assert_eq!(
            CoherencePolicy::decide(&public),
            vec![Action::evict_region(Region::SEARCH_RESULTS)]
        );

        let admin = DomainEvent::Created {
            entity_id: id(1),
            visible: true,
            admin_owned: true,
        };
        assert_eq!(
            CoherencePolicy::decide(&admin),
            vec![
                Action::evict_region(Region::SEARCH_RESULTS),
                Action::mark_dirty(Region::ADMIN_LISTING)
            ]
        );
    }

    #[test]
    fn test_basic_info_files_and_reviews() {
        let basic = DomainEvent::Updated {
            entity_id: id(3),
            change: UpdateKind::BasicInfo,
        };
        assert_eq!(CoherencePolicy::decide(&basic).len(), 3);

        let files = DomainEvent::Updated {
            entity_id: id(3),
            change: UpdateKind::RelatedFiles,
        };
        assert_eq!(
            CoherencePolicy::decide(&files),
            vec![Action::evict_detail(id(3))]
        );

        let review = DomainEvent::RelatedAggregateChanged {
            entity_id: id(3),
            change: AggregateChange::ReviewRemoved,
        };
        assert_eq!(
            CoherencePolicy::decide(&review),
            CoherencePolicy::decide(&basic)
        );
    }
}
