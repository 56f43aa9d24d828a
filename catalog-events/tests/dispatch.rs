//! Dispatcher delivery and isolation tests.

use async_trait::async_trait;
use catalog_core::{
    AggregateChange, CatalogError, CatalogResult, DomainEvent, EntityId, EventEnvelope, EventKind,
};
use catalog_events::{DispatcherBuilder, EventSubscriber, PendingEvents};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<EventKind>>,
}

#[async_trait]
impl EventSubscriber for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    async fn handle(&self, envelope: &EventEnvelope) -> CatalogResult<()> {
        self.seen.lock().unwrap().push(envelope.event.kind());
        Ok(())
    }
}

struct Failing;

#[async_trait]
impl EventSubscriber for Failing {
    fn name(&self) -> &str {
        "failing"
    }

    async fn handle(&self, _envelope: &EventEnvelope) -> CatalogResult<()> {
        Err(CatalogError::operation_failed("handle", "boom"))
    }
}

struct Panicking;

#[async_trait]
impl EventSubscriber for Panicking {
    fn name(&self) -> &str {
        "panicking"
    }

    async fn handle(&self, _envelope: &EventEnvelope) -> CatalogResult<()> {
        panic!("subscriber bug");
    }
}

#[derive(Default)]
struct Counter {
    calls: AtomicU64,
}

#[async_trait]
impl EventSubscriber for Counter {
    fn name(&self) -> &str {
        "counter"
    }

    async fn handle(&self, _envelope: &EventEnvelope) -> CatalogResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_routes_by_event_kind() {
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let deletes = Arc::new(Recorder::default());
    let everything = Arc::new(Recorder::default());

    let (dispatcher, _handle) = DispatcherBuilder::new()
        .subscribe(EventKind::Deleted, deletes.clone())
        .subscribe_all(everything.clone())
        .start(shutdown_rx);

    dispatcher.publish(DomainEvent::deleted(EntityId::new(7)));
    dispatcher.publish(DomainEvent::price_changed(EntityId::new(42), 1000, 1200));
    dispatcher.publish(DomainEvent::RelatedAggregateChanged {
        entity_id: EntityId::new(42),
        change: AggregateChange::ReviewAdded,
    });
    dispatcher.wait_idle().await;

    assert_eq!(*deletes.seen.lock().unwrap(), vec![EventKind::Deleted]);
    assert_eq!(everything.seen.lock().unwrap().len(), 3);
    assert_eq!(dispatcher.metrics().published, 3);
}

#[tokio::test]
async fn test_failing_and_panicking_subscribers_are_isolated() {
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let counter = Arc::new(Counter::default());

    let (dispatcher, _handle) = DispatcherBuilder::new()
        .subscribe(EventKind::Deleted, Arc::new(Failing))
        .subscribe(EventKind::Deleted, Arc::new(Panicking))
        .subscribe(EventKind::Deleted, counter.clone())
        .start(shutdown_rx);

    dispatcher.publish(DomainEvent::deleted(EntityId::new(1)));
    dispatcher.publish(DomainEvent::deleted(EntityId::new(2)));
    dispatcher.wait_idle().await;

    assert_eq!(counter.calls.load(Ordering::SeqCst), 2);
    let metrics = dispatcher.metrics();
    assert_eq!(metrics.delivered, 2);
    assert_eq!(metrics.failed, 2);
    assert_eq!(metrics.panicked, 2);
}

#[tokio::test]
async fn test_event_without_subscribers_is_settled() {
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let (dispatcher, _handle) = DispatcherBuilder::new().start(shutdown_rx);

    dispatcher.publish(DomainEvent::deleted(EntityId::new(3)));
    dispatcher.wait_idle().await;
    assert_eq!(dispatcher.metrics().delivered, 0);
}

#[tokio::test]
async fn test_pending_events_publish_only_on_commit() {
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let counter = Arc::new(Counter::default());
    let (dispatcher, _handle) = DispatcherBuilder::new()
        .subscribe_all(counter.clone())
        .start(shutdown_rx);

    {
        let mut rolled_back = PendingEvents::new(&dispatcher);
        rolled_back.push(DomainEvent::deleted(EntityId::new(1)));
    }

    let mut committed = PendingEvents::new(&dispatcher);
    committed.push(DomainEvent::deleted(EntityId::new(2)));
    committed.push(DomainEvent::visibility_changed(EntityId::new(3), true, false));
    assert_eq!(committed.commit(), 2);

    dispatcher.wait_idle().await;
    assert_eq!(counter.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_shutdown_drains_queue_then_rejects() {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let counter = Arc::new(Counter::default());
    let (dispatcher, handle) = DispatcherBuilder::new()
        .subscribe_all(counter.clone())
        .start(shutdown_rx);

    dispatcher.publish(DomainEvent::deleted(EntityId::new(1)));
    shutdown_tx.send(true).expect("worker should be listening");
    handle.await.expect("worker should exit cleanly");

    assert_eq!(counter.calls.load(Ordering::SeqCst), 1);

    dispatcher.publish(DomainEvent::deleted(EntityId::new(2)));
    assert_eq!(dispatcher.metrics().dropped, 1);
    dispatcher.wait_idle().await;
}
