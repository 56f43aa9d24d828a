use async_trait::async_trait;
use catalog_core::constants::DEFAULT_EVENT_WORKERS;
use catalog_core::{CatalogResult, Clock, DomainEvent, EventEnvelope, EventKind, SystemClock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Notify, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use uuid::Uuid;

// ============================================================================
// SUBSCRIBER
// ============================================================================

/// A handler for committed domain events.
///
/// Handlers re-derive full state from the event rather than applying
/// deltas, so duplicate or reordered delivery is harmless.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    async fn handle(&self, envelope: &EventEnvelope) -> CatalogResult<()>;
}

// ============================================================================
// METRICS
// ============================================================================

/// Counters for dispatch activity.
#[derive(Debug, Default)]
pub struct DispatcherMetrics {
    /// Events accepted by `publish`
    pub published: AtomicU64,

    /// Subscriber calls that returned Ok
    pub delivered: AtomicU64,

    /// Subscriber calls that returned an error
    pub failed: AtomicU64,

    /// Subscriber calls that panicked
    pub panicked: AtomicU64,

    /// Events dropped because the worker had stopped
    pub dropped: AtomicU64,
}

impl DispatcherMetrics {
    pub fn snapshot(&self) -> DispatcherSnapshot {
        DispatcherSnapshot {
            published: self.published.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of dispatcher metrics at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherSnapshot {
    pub published: u64,
    pub delivered: u64,
    pub failed: u64,
    pub panicked: u64,
    pub dropped: u64,
}

// ============================================================================
// SHARED STATE
// ============================================================================

/// Outstanding work: queued envelopes plus running subscriber calls.
#[derive(Debug, Default)]
struct Shared {
    pending: AtomicU64,
    idle: Notify,
    metrics: DispatcherMetrics,
}

impl Shared {
    fn begin(&self, n: u64) {
        self.pending.fetch_add(n, Ordering::SeqCst);
    }

    fn finish(&self, n: u64) {
        if self.pending.fetch_sub(n, Ordering::SeqCst) == n {
            self.idle.notify_waiters();
        }
    }
}

/// Settles one subscriber call, including when the call panics.
struct Delivery {
    shared: Arc<Shared>,
    subscriber: String,
    event_id: Uuid,
    settled: bool,
}

impl Drop for Delivery {
    fn drop(&mut self) {
        if !self.settled {
            self.shared.metrics.panicked.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                subscriber = %self.subscriber,
                event_id = %self.event_id,
                "Event subscriber panicked"
            );
        }
        self.shared.finish(1);
    }
}

// ============================================================================
// DISPATCHER
// ============================================================================

type Routes = HashMap<EventKind, Vec<Arc<dyn EventSubscriber>>>;

/// Registers subscribers and starts the dispatch worker.
pub struct DispatcherBuilder {
    routes: Routes,
    workers: usize,
    clock: Arc<dyn Clock>,
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self {
            routes: HashMap::new(),
            workers: DEFAULT_EVENT_WORKERS,
            clock: Arc::new(SystemClock),
        }
    }
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maximum subscriber calls running at once.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Register `subscriber` for one event variant.
    pub fn subscribe(mut self, kind: EventKind, subscriber: Arc<dyn EventSubscriber>) -> Self {
        self.routes.entry(kind).or_default().push(subscriber);
        self
    }

    /// Register `subscriber` for every event variant.
    pub fn subscribe_all(mut self, subscriber: Arc<dyn EventSubscriber>) -> Self {
        for kind in EventKind::ALL {
            self.routes
                .entry(kind)
                .or_default()
                .push(Arc::clone(&subscriber));
        }
        self
    }

    /// Spawn the dispatch worker on the current runtime.
    ///
    /// The worker stops accepting events when `shutdown_rx` flips to true,
    /// delivers what was already queued, waits for running calls, then
    /// exits.
    pub fn start(self, shutdown_rx: watch::Receiver<bool>) -> (EventDispatcher, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::default());

        let subscriber_count: usize = self.routes.values().map(Vec::len).sum();
        tracing::info!(
            workers = self.workers,
            subscriptions = subscriber_count,
            "Event dispatcher started"
        );

        let worker = Worker {
            routes: self.routes,
            semaphore: Arc::new(Semaphore::new(self.workers)),
            shared: Arc::clone(&shared),
        };
        let handle = tokio::spawn(worker.run(rx, shutdown_rx));

        let dispatcher = EventDispatcher {
            tx,
            clock: self.clock,
            shared,
        };
        (dispatcher, handle)
    }
}

/// Handle used by write-side code to publish committed events.
#[derive(Clone)]
pub struct EventDispatcher {
    tx: mpsc::UnboundedSender<EventEnvelope>,
    clock: Arc<dyn Clock>,
    shared: Arc<Shared>,
}

impl EventDispatcher {
    /// Queue an event for delivery. Must only be called after the
    /// originating transaction has committed. Never blocks.
    pub fn publish(&self, event: DomainEvent) {
        let envelope = EventEnvelope::new(event, self.clock.now());
        let kind = envelope.event.kind();
        let entity_id = envelope.event.entity_id();

        self.shared.begin(1);
        match self.tx.send(envelope) {
            Ok(()) => {
                self.shared.metrics.published.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(kind = %kind, entity_id = %entity_id, "Event published");
            }
            Err(_) => {
                self.shared.finish(1);
                self.shared.metrics.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    kind = %kind,
                    entity_id = %entity_id,
                    "Event dispatcher stopped, dropping event"
                );
            }
        }
    }

    /// Resolve once every published event has been handled by all of its
    /// subscribers.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            if self.shared.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    pub fn metrics(&self) -> DispatcherSnapshot {
        self.shared.metrics.snapshot()
    }
}

struct Worker {
    routes: Routes,
    semaphore: Arc<Semaphore>,
    shared: Arc<Shared>,
}

impl Worker {
    async fn run(
        self,
        mut rx: mpsc::UnboundedReceiver<EventEnvelope>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut tasks = JoinSet::new();
        let mut closing = false;

        loop {
            let next = tokio::select! {
                changed = shutdown_rx.changed(), if !closing => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        tracing::info!("Event dispatcher draining");
                        rx.close();
                        closing = true;
                    }
                    None
                }

                received = rx.recv() => match received {
                    Some(envelope) => Some(envelope),
                    None => break,
                },

                Some(_) = tasks.join_next(), if !tasks.is_empty() => None,
            };

            if let Some(envelope) = next {
                self.dispatch(envelope, &mut tasks).await;
            }
        }

        while tasks.join_next().await.is_some() {}

        let snapshot = self.shared.metrics.snapshot();
        tracing::info!(
            published = snapshot.published,
            delivered = snapshot.delivered,
            failed = snapshot.failed,
            panicked = snapshot.panicked,
            "Event dispatcher stopped"
        );
    }

    async fn dispatch(&self, envelope: EventEnvelope, tasks: &mut JoinSet<()>) {
        let kind = envelope.event.kind();
        let subscribers = self.routes.get(&kind).cloned().unwrap_or_default();
        if subscribers.is_empty() {
            tracing::debug!(kind = %kind, "No subscribers for event");
            self.shared.finish(1);
            return;
        }

        self.shared.begin(subscribers.len() as u64);
        self.shared.finish(1);

        let envelope = Arc::new(envelope);
        for subscriber in subscribers {
            let Ok(permit) = Arc::clone(&self.semaphore).acquire_owned().await else {
                self.shared.finish(1);
                continue;
            };
            let envelope = Arc::clone(&envelope);
            let mut delivery = Delivery {
                shared: Arc::clone(&self.shared),
                subscriber: subscriber.name().to_string(),
                event_id: envelope.event_id,
                settled: false,
            };

            tasks.spawn(async move {
                let _permit = permit;
                let result = subscriber.handle(&envelope).await;
                match result {
                    Ok(()) => {
                        delivery
                            .shared
                            .metrics
                            .delivered
                            .fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        delivery.shared.metrics.failed.fetch_add(1, Ordering::Relaxed);
                        tracing::error!(
                            subscriber = %delivery.subscriber,
                            event_id = %envelope.event_id,
                            kind = %envelope.event.kind(),
                            entity_id = %envelope.event.entity_id(),
                            error = %e,
                            "Event subscriber failed"
                        );
                    }
                }
                delivery.settled = true;
            });
        }
    }
}
