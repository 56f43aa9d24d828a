use crate::dispatcher::EventDispatcher;
use catalog_core::DomainEvent;

/// Events raised inside a unit of work, held back until it commits.
///
/// `commit` publishes everything in order; dropping the buffer without
/// committing discards the events, which is what a rolled-back
/// transaction needs.
pub struct PendingEvents {
    dispatcher: EventDispatcher,
    events: Vec<DomainEvent>,
}

impl PendingEvents {
    pub fn new(dispatcher: &EventDispatcher) -> Self {
        Self {
            dispatcher: dispatcher.clone(),
            events: Vec::new(),
        }
    }

    pub fn push(&mut self, event: DomainEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Publish the buffered events. Returns how many were published.
    pub fn commit(mut self) -> usize {
        let events = std::mem::take(&mut self.events);
        let count = events.len();
        for event in events {
            self.dispatcher.publish(event);
        }
        count
    }
}

impl Drop for PendingEvents {
    fn drop(&mut self) {
        if !self.events.is_empty() {
            tracing::debug!(
                discarded = self.events.len(),
                "Discarding events from uncommitted unit of work"
            );
        }
    }
}
