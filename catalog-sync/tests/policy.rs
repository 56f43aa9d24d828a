//! Policy table properties over generated events.

use catalog_core::{Action, DomainEvent, Region, UpdateKind};
use catalog_sync::CoherencePolicy;
use catalog_test_utils::generators::arb_domain_event;
use proptest::prelude::*;

proptest! {
    #[test]
    fn prop_strict_events_never_defer(event in arb_domain_event()) {
        let actions = CoherencePolicy::decide(&event);
        if CoherencePolicy::is_strict(&event) {
            prop_assert!(actions.iter().all(Action::is_immediate));
            prop_assert!(actions.contains(&Action::evict_detail(event.entity_id())));
            prop_assert!(actions.contains(&Action::evict_region(Region::SEARCH_RESULTS)));
        }
    }

    #[test]
    fn prop_every_update_evicts_the_detail_key(event in arb_domain_event()) {
        let actions = CoherencePolicy::decide(&event);
        match &event {
            DomainEvent::Created { .. } => {
                prop_assert!(actions.iter().all(|a| a.region() != &Region::ENTITY_DETAIL));
            }
            _ => prop_assert_eq!(&actions[0], &Action::evict_detail(event.entity_id())),
        }
    }

    #[test]
    fn prop_immediate_actions_come_first(event in arb_domain_event()) {
        let actions = CoherencePolicy::decide(&event);
        let first_lazy = actions.iter().position(|a| !a.is_immediate()).unwrap_or(actions.len());
        prop_assert!(actions[first_lazy..].iter().all(|a| !a.is_immediate()));
    }

    #[test]
    fn prop_lazy_marks_only_for_listing_regions(event in arb_domain_event()) {
        for action in CoherencePolicy::decide(&event) {
            if let Action::MarkDirty { region } = &action {
                prop_assert!(region == &Region::SEARCH_RESULTS || region == &Region::ADMIN_LISTING);
            }
        }
    }
}

#[test]
fn test_related_files_touch_only_detail() {
    let event = DomainEvent::Updated {
        entity_id: catalog_core::EntityId::new(3),
        change: UpdateKind::RelatedFiles,
    };
    assert_eq!(
        CoherencePolicy::decide(&event),
        vec![Action::evict_detail(catalog_core::EntityId::new(3))]
    );
}
