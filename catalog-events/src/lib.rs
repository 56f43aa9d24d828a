//! Catalog Events - Post-Commit Dispatch
//!
//! Delivers committed `DomainEvent`s to subscribers registered per event
//! variant. Publishing never blocks the caller: events are queued to a
//! background worker which runs each subscriber call as its own task, so a
//! failing or panicking subscriber cannot affect the others or the
//! publisher.
//!
//! Delivery is at-least-once up to process lifetime; there is no durable
//! outbox. Subscribers must be idempotent.

mod dispatcher;
mod pending;

pub use dispatcher::{
    DispatcherBuilder, DispatcherMetrics, DispatcherSnapshot, EventDispatcher, EventSubscriber,
};
pub use pending::PendingEvents;
