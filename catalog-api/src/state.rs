//! Shared application state for Axum routers.

use std::time::Instant;

use catalog_events::EventDispatcher;
use catalog_sync::CoherenceServices;

use crate::impl_from_ref;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    /// Coherence components over the configured stores.
    pub services: CoherenceServices,
    /// Running dispatcher; held for its metrics and for in-process publishers.
    pub dispatcher: EventDispatcher,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(services: CoherenceServices, dispatcher: EventDispatcher) -> Self {
        Self {
            services,
            dispatcher,
            start_time: Instant::now(),
        }
    }
}

impl_from_ref!(CoherenceServices, services);
impl_from_ref!(EventDispatcher, dispatcher);
