//! Type-routed event bus with asynchronous delivery.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::{Notify, broadcast};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::error::{BusError, BusResult};
use crate::event::{EventKind, HuntEvent};
use crate::subscriber::{EventSubscriber, SubscriberId, SubscriberRegistry};

/// Capacity of the delivery-failure channel.
pub const FAILURE_CAPACITY: usize = 256;

/// A subscriber invocation that returned an error or panicked.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryFailure {
    /// Name of the failing subscriber.
    pub subscriber: String,
    /// Kind of the event being handled.
    pub kind: EventKind,
    /// ID of the event being handled.
    pub event_id: Uuid,
    /// Error or panic message.
    pub reason: String,
    /// Whether the subscriber panicked rather than returning an error.
    pub panicked: bool,
}

/// Collects subscriptions before the bus starts.
///
/// The registry is frozen by [`EventBusBuilder::build`]; a running bus
/// cannot gain or lose subscribers.
#[derive(Debug)]
pub struct EventBusBuilder {
    registry: SubscriberRegistry,
}

impl Default for EventBusBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBusBuilder {
    /// Create a builder with an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: SubscriberRegistry::new(),
        }
    }

    /// Subscribe to one event kind.
    pub fn subscribe(
        &mut self,
        kind: EventKind,
        subscriber: Arc<dyn EventSubscriber>,
    ) -> SubscriberId {
        self.registry.register(kind, subscriber)
    }

    /// Subscribe the same subscriber to several kinds.
    pub fn subscribe_many(
        &mut self,
        kinds: &[EventKind],
        subscriber: &Arc<dyn EventSubscriber>,
    ) -> Vec<SubscriberId> {
        kinds
            .iter()
            .map(|kind| self.registry.register(*kind, Arc::clone(subscriber)))
            .collect()
    }

    /// Remove a subscription made on this builder.
    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        self.registry.unregister(id)
    }

    /// Freeze the registry and start the bus on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::NoRuntime`] when called outside a tokio runtime.
    pub fn build(self) -> BusResult<EventBus> {
        let handle = Handle::try_current().map_err(|e| BusError::NoRuntime(e.to_string()))?;
        Ok(self.build_with_handle(handle))
    }

    /// Freeze the registry and start the bus on an explicit runtime.
    #[must_use]
    pub fn build_with_handle(self, runtime: Handle) -> EventBus {
        let (failures, _) = broadcast::channel(FAILURE_CAPACITY);
        debug!(
            subscriber_count = self.registry.len(),
            "Event bus started"
        );
        EventBus {
            shared: Arc::new(BusShared {
                registry: self.registry,
                runtime,
                in_flight: AtomicUsize::new(0),
                idle: Notify::new(),
                failures,
            }),
        }
    }
}

struct BusShared {
    registry: SubscriberRegistry,
    runtime: Handle,
    in_flight: AtomicUsize,
    idle: Notify,
    failures: broadcast::Sender<DeliveryFailure>,
}

/// Event bus delivering each event to every subscriber of its kind.
///
/// `publish` schedules one task per matching subscriber, in registration
/// order, and returns immediately. Deliveries run concurrently on the
/// runtime captured at build time; the bus keeps no event history.
///
/// Clones share the same registry and delivery state.
#[derive(Clone)]
pub struct EventBus {
    shared: Arc<BusShared>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("registry", &self.shared.registry)
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

impl EventBus {
    /// Start building a bus.
    #[must_use]
    pub fn builder() -> EventBusBuilder {
        EventBusBuilder::new()
    }

    /// Publish an event.
    ///
    /// Never blocks on subscribers. Safe to call from inside a subscriber.
    /// Returns the number of deliveries scheduled.
    pub fn publish(&self, event: HuntEvent) -> usize {
        let event = Arc::new(event);
        let kind = event.kind();

        trace!(event_kind = %kind, event_id = %event.metadata.event_id, "Publishing event");

        let mut scheduled: usize = 0;
        for subscriber in self.shared.registry.subscribers_for(kind) {
            if !subscriber.accepts(&event) {
                trace!(
                    subscriber_name = %subscriber.name(),
                    event_kind = %kind,
                    "Subscriber declined event"
                );
                continue;
            }

            let guard = InFlightGuard::acquire(&self.shared);
            let bus = self.clone();
            let subscriber = Arc::clone(subscriber);
            let event = Arc::clone(&event);
            self.shared.runtime.spawn(async move {
                let _guard = guard;
                bus.deliver(subscriber, event).await;
            });
            scheduled = scheduled.saturating_add(1);
        }

        if scheduled == 0 {
            trace!(event_kind = %kind, "No subscribers for event");
        } else {
            debug!(event_kind = %kind, deliveries = scheduled, "Event published");
        }

        scheduled
    }

    async fn deliver(&self, subscriber: Arc<dyn EventSubscriber>, event: Arc<HuntEvent>) {
        trace!(
            subscriber_name = %subscriber.name(),
            event_kind = %event.kind(),
            "Notifying subscriber"
        );

        // Catch panics to prevent one subscriber from affecting others
        let outcome = AssertUnwindSafe(subscriber.on_event(Arc::clone(&event), self))
            .catch_unwind()
            .await;

        let (reason, panicked) = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(e)) => (e.to_string(), false),
            Err(payload) => (panic_message(payload.as_ref()), true),
        };

        warn!(
            subscriber_name = %subscriber.name(),
            event_kind = %event.kind(),
            event_id = %event.metadata.event_id,
            error = %reason,
            panicked,
            "Subscriber failed"
        );

        // No receivers is fine
        let _ = self.shared.failures.send(DeliveryFailure {
            subscriber: subscriber.name().to_string(),
            kind: event.kind(),
            event_id: event.metadata.event_id,
            reason,
            panicked,
        });
    }

    /// Receive delivery failures published after this call.
    #[must_use]
    pub fn failures(&self) -> broadcast::Receiver<DeliveryFailure> {
        self.shared.failures.subscribe()
    }

    /// Wait until no delivery is in flight.
    ///
    /// Returns `false` if `timeout` elapsed first. Deliveries scheduled by
    /// subscribers while handling count as in flight, so a `true` result
    /// means the whole cascade settled.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let settle = async {
            loop {
                let notified = self.shared.idle.notified();
                let mut notified = std::pin::pin!(notified);
                notified.as_mut().enable();
                if self.in_flight() == 0 {
                    break;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, settle).await.is_ok()
    }

    /// Number of deliveries scheduled but not yet finished.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::SeqCst)
    }

    /// The frozen subscriber registry.
    #[must_use]
    pub fn registry(&self) -> &SubscriberRegistry {
        &self.shared.registry
    }

    /// Number of registrations.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.shared.registry.len()
    }
}

struct InFlightGuard(Arc<BusShared>);

impl InFlightGuard {
    fn acquire(shared: &Arc<BusShared>) -> Self {
        shared.in_flight.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(shared))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.0.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "subscriber panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventPayload, Target};
    use crate::subscriber::{FilterSubscriber, SubscriberResult};
    use async_trait::async_trait;
    use std::sync::Mutex;

    const SETTLE: Duration = Duration::from_secs(5);

    fn seed() -> HuntEvent {
        HuntEvent::seed(Target::new("mockKubernetes", Some(443), "https"), None)
    }

    fn derived(trigger: &HuntEvent, namespaces: &[&str]) -> HuntEvent {
        HuntEvent::derive(
            trigger,
            "test",
            None,
            EventPayload::NamespacesListed {
                namespaces: namespaces.iter().map(ToString::to_string).collect(),
            },
        )
    }

    fn counter(name: &str) -> (Arc<AtomicUsize>, Arc<dyn EventSubscriber>) {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        let subscriber = FilterSubscriber::new(name, move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        (count, Arc::new(subscriber))
    }

    #[tokio::test]
    async fn test_build_inside_runtime() {
        let bus = EventBus::builder().build().unwrap();
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.in_flight(), 0);
    }

    #[test]
    fn test_build_outside_runtime_fails() {
        let result = EventBus::builder().build();
        assert!(matches!(result, Err(BusError::NoRuntime(_))));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_noop() {
        let bus = EventBus::builder().build().unwrap();
        assert_eq!(bus.publish(seed()), 0);
        assert!(bus.wait_idle(SETTLE).await);
    }

    #[tokio::test]
    async fn test_delivers_only_to_exact_kind() {
        let (seeds, seed_sub) = counter("seeds");
        let (lists, list_sub) = counter("lists");

        let mut builder = EventBus::builder();
        builder.subscribe(EventKind::ApiServerFound, seed_sub);
        builder.subscribe(EventKind::NamespacesListed, list_sub);
        let bus = builder.build().unwrap();

        let trigger = seed();
        assert_eq!(bus.publish(trigger.clone()), 1);
        assert_eq!(bus.publish(derived(&trigger, &["hello"])), 1);
        assert_eq!(bus.publish(derived(&trigger, &["world"])), 1);
        assert!(bus.wait_idle(SETTLE).await);

        assert_eq!(seeds.load(Ordering::SeqCst), 1);
        assert_eq!(lists.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_declined_events_are_not_scheduled() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        let subscriber = FilterSubscriber::new("token_only", move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        })
        .with_filter(|e| e.credential().is_some());

        let mut builder = EventBus::builder();
        builder.subscribe(EventKind::ApiServerFound, Arc::new(subscriber));
        let bus = builder.build().unwrap();

        assert_eq!(bus.publish(seed()), 0);
        let token_seed = HuntEvent::seed(Target::new("h", Some(443), "https"), Some("t".into()));
        assert_eq!(bus.publish(token_seed), 1);
        assert!(bus.wait_idle(SETTLE).await);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_registration_order_per_event() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut builder = EventBus::builder();
        for name in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            builder.subscribe(
                EventKind::ApiServerFound,
                Arc::new(FilterSubscriber::new(name, move |_| {
                    order.lock().unwrap().push(name);
                })),
            );
        }
        let bus = builder.build().unwrap();

        bus.publish(seed());
        assert!(bus.wait_idle(SETTLE).await);

        // Single-threaded test runtime runs spawned deliveries in FIFO order
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    struct Slow {
        done: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EventSubscriber for Slow {
        async fn on_event(&self, _event: Arc<HuntEvent>, _bus: &EventBus) -> SubscriberResult {
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.done.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_publish_does_not_wait_for_subscribers() {
        let done = Arc::new(AtomicUsize::new(0));
        let mut builder = EventBus::builder();
        builder.subscribe(
            EventKind::ApiServerFound,
            Arc::new(Slow {
                done: Arc::clone(&done),
            }),
        );
        let bus = builder.build().unwrap();

        bus.publish(seed());
        assert_eq!(done.load(Ordering::SeqCst), 0);
        assert_eq!(bus.in_flight(), 1);

        assert!(bus.wait_idle(SETTLE).await);
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_wait_idle_times_out() {
        let done = Arc::new(AtomicUsize::new(0));
        let mut builder = EventBus::builder();
        builder.subscribe(EventKind::ApiServerFound, Arc::new(Slow { done }));
        let bus = builder.build().unwrap();

        bus.publish(seed());
        assert!(!bus.wait_idle(Duration::from_millis(1)).await);
        assert!(bus.wait_idle(SETTLE).await);
    }

    /// Publishes one namespace listing for every seed it handles.
    struct Chaining;

    #[async_trait]
    impl EventSubscriber for Chaining {
        async fn on_event(&self, event: Arc<HuntEvent>, bus: &EventBus) -> SubscriberResult {
            bus.publish(derived(&event, &["a"]));
            bus.publish(derived(&event, &["b"]));
            Ok(())
        }

        fn name(&self) -> &str {
            "chaining"
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_reentrant_publish_settles() {
        let (lists, list_sub) = counter("lists");
        let mut builder = EventBus::builder();
        builder.subscribe(EventKind::ApiServerFound, Arc::new(Chaining));
        builder.subscribe(EventKind::NamespacesListed, list_sub);
        let bus = builder.build().unwrap();

        for _ in 0..10 {
            bus.publish(seed());
        }
        assert!(bus.wait_idle(SETTLE).await);
        assert_eq!(lists.load(Ordering::SeqCst), 20);
    }

    struct Failing {
        panic: bool,
    }

    #[async_trait]
    impl EventSubscriber for Failing {
        async fn on_event(&self, _event: Arc<HuntEvent>, _bus: &EventBus) -> SubscriberResult {
            if self.panic {
                panic!("boom");
            }
            Err("probe exploded".into())
        }

        fn name(&self) -> &str {
            if self.panic { "panicking" } else { "erroring" }
        }
    }

    #[tokio::test]
    async fn test_failures_are_isolated_and_reported() {
        let (count, sibling) = counter("sibling");
        let mut builder = EventBus::builder();
        builder.subscribe(EventKind::ApiServerFound, Arc::new(Failing { panic: true }));
        builder.subscribe(EventKind::ApiServerFound, Arc::new(Failing { panic: false }));
        builder.subscribe(EventKind::ApiServerFound, sibling);
        let bus = builder.build().unwrap();
        let mut failures = bus.failures();

        assert_eq!(bus.publish(seed()), 3);
        assert!(bus.wait_idle(SETTLE).await);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let mut reported = Vec::new();
        while let Ok(failure) = failures.try_recv() {
            reported.push(failure);
        }
        assert_eq!(reported.len(), 2);

        let panicked = reported.iter().find(|f| f.panicked).unwrap();
        assert_eq!(panicked.subscriber, "panicking");
        assert_eq!(panicked.reason, "boom");
        assert_eq!(panicked.kind, EventKind::ApiServerFound);

        let errored = reported.iter().find(|f| !f.panicked).unwrap();
        assert_eq!(errored.subscriber, "erroring");
        assert_eq!(errored.reason, "probe exploded");

        // The bus keeps working after failures
        assert_eq!(bus.publish(seed()), 3);
        assert!(bus.wait_idle(SETTLE).await);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_subscribe_many_and_unsubscribe() {
        let (count, subscriber) = counter("many");
        let mut builder = EventBus::builder();
        let ids = builder.subscribe_many(
            &[EventKind::ApiServerFound, EventKind::NamespacesListed],
            &subscriber,
        );
        assert_eq!(ids.len(), 2);
        assert!(builder.unsubscribe(ids[0]));
        let bus = builder.build().unwrap();

        let trigger = seed();
        assert_eq!(bus.publish(trigger.clone()), 0);
        assert_eq!(bus.publish(derived(&trigger, &["x"])), 1);
        assert!(bus.wait_idle(SETTLE).await);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cloned_bus_shares_state() {
        let (count, subscriber) = counter("shared");
        let mut builder = EventBus::builder();
        builder.subscribe(EventKind::ApiServerFound, subscriber);
        let bus = builder.build().unwrap();
        let cloned = bus.clone();

        cloned.publish(seed());
        assert!(bus.wait_idle(SETTLE).await);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(cloned.subscriber_count(), 1);
    }
}
