//! Event subscriber trait and registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use crate::bus::EventBus;
use crate::event::{EventKind, HuntEvent};

/// Error type a subscriber may return from [`EventSubscriber::on_event`].
pub type SubscriberError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for subscriber invocations.
pub type SubscriberResult = Result<(), SubscriberError>;

/// Filter function type for [`FilterSubscriber`].
pub type EventFilter = Box<dyn Fn(&HuntEvent) -> bool + Send + Sync>;

/// A component that handles dispatched events.
///
/// Each delivery runs on its own task, so `on_event` may block on network
/// I/O without holding up other subscribers. Returning an error (or
/// panicking) only fails this delivery.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// Handle one event. `bus` may be used to publish derived events.
    async fn on_event(&self, event: Arc<HuntEvent>, bus: &EventBus) -> SubscriberResult;

    /// Optional predicate evaluated at publish time.
    ///
    /// Return `false` to skip this delivery. Default accepts everything.
    fn accepts(&self, event: &HuntEvent) -> bool {
        let _ = event;
        true
    }

    /// Optional name for logs and failure reports.
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "anonymous"
    }
}

/// Registration handle for a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

struct Registration {
    id: SubscriberId,
    subscriber: Arc<dyn EventSubscriber>,
}

/// Routing table from event kind to subscribers in registration order.
///
/// Mutable only while the bus is being built; an [`EventBus`] holds it
/// behind an `Arc` and never changes it afterwards.
#[derive(Default)]
pub struct SubscriberRegistry {
    routes: HashMap<EventKind, Vec<Registration>>,
}

impl fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("kinds", &self.routes.len())
            .field("subscriber_count", &self.len())
            .finish()
    }
}

impl SubscriberRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }

    /// Register a subscriber for one event kind.
    pub fn register(
        &mut self,
        kind: EventKind,
        subscriber: Arc<dyn EventSubscriber>,
    ) -> SubscriberId {
        let id = SubscriberId::new();
        debug!(
            subscriber_name = %subscriber.name(),
            event_kind = %kind,
            "Subscriber registered"
        );
        self.routes
            .entry(kind)
            .or_default()
            .push(Registration { id, subscriber });
        id
    }

    /// Remove a registration.
    ///
    /// Returns `true` if it was found.
    pub fn unregister(&mut self, id: SubscriberId) -> bool {
        let mut removed = false;
        for registrations in self.routes.values_mut() {
            let before = registrations.len();
            registrations.retain(|r| r.id != id);
            removed |= registrations.len() != before;
        }
        self.routes.retain(|_, registrations| !registrations.is_empty());
        if removed {
            debug!("Subscriber unregistered");
        }
        removed
    }

    /// Subscribers of `kind`, in registration order.
    pub fn subscribers_for(
        &self,
        kind: EventKind,
    ) -> impl Iterator<Item = &Arc<dyn EventSubscriber>> {
        self.routes
            .get(&kind)
            .into_iter()
            .flat_map(|registrations| registrations.iter().map(|r| &r.subscriber))
    }

    /// Number of subscribers registered for `kind`.
    #[must_use]
    pub fn count_for(&self, kind: EventKind) -> usize {
        self.routes.get(&kind).map_or(0, Vec::len)
    }

    /// Total number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// A closure-based subscriber.
pub struct FilterSubscriber<F>
where
    F: Fn(&HuntEvent) + Send + Sync,
{
    name: String,
    filter: Option<EventFilter>,
    handler: F,
}

impl<F> FilterSubscriber<F>
where
    F: Fn(&HuntEvent) + Send + Sync,
{
    /// Create a new filter subscriber.
    pub fn new(name: impl Into<String>, handler: F) -> Self {
        Self {
            name: name.into(),
            filter: None,
            handler,
        }
    }

    /// Add a filter to this subscriber.
    #[must_use]
    pub fn with_filter<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&HuntEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }
}

#[async_trait]
impl<F> EventSubscriber for FilterSubscriber<F>
where
    F: Fn(&HuntEvent) + Send + Sync,
{
    async fn on_event(&self, event: Arc<HuntEvent>, _bus: &EventBus) -> SubscriberResult {
        (self.handler)(&event);
        Ok(())
    }

    fn accepts(&self, event: &HuntEvent) -> bool {
        match &self.filter {
            Some(f) => f(event),
            None => true,
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventPayload, Target};

    struct NamedSubscriber(&'static str);

    #[async_trait]
    impl EventSubscriber for NamedSubscriber {
        async fn on_event(&self, _event: Arc<HuntEvent>, _bus: &EventBus) -> SubscriberResult {
            Ok(())
        }

        fn name(&self) -> &str {
            self.0
        }
    }

    fn names(registry: &SubscriberRegistry, kind: EventKind) -> Vec<String> {
        registry
            .subscribers_for(kind)
            .map(|s| s.name().to_string())
            .collect()
    }

    #[test]
    fn test_registry_register_unregister() {
        let mut registry = SubscriberRegistry::new();
        assert!(registry.is_empty());

        let id = registry.register(EventKind::ApiServerFound, Arc::new(NamedSubscriber("a")));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.count_for(EventKind::ApiServerFound), 1);

        assert!(registry.unregister(id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_registration_order_is_kept() {
        let mut registry = SubscriberRegistry::new();
        registry.register(EventKind::PodsListed, Arc::new(NamedSubscriber("first")));
        registry.register(EventKind::PodsListed, Arc::new(NamedSubscriber("second")));
        registry.register(EventKind::RolesListed, Arc::new(NamedSubscriber("other")));
        registry.register(EventKind::PodsListed, Arc::new(NamedSubscriber("third")));

        assert_eq!(
            names(&registry, EventKind::PodsListed),
            vec!["first", "second", "third"]
        );
        assert_eq!(names(&registry, EventKind::RolesListed), vec!["other"]);
        assert!(names(&registry, EventKind::NamespacesListed).is_empty());
    }

    #[test]
    fn test_unregister_nonexistent() {
        let mut registry = SubscriberRegistry::new();
        registry.register(EventKind::PodsListed, Arc::new(NamedSubscriber("a")));
        assert!(!registry.unregister(SubscriberId::new()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_filter_subscriber_accepts() {
        let subscriber = FilterSubscriber::new("token_only", |_event| {})
            .with_filter(|e| e.credential().is_some());

        let target = Target::new("h", Some(443), "https");
        let anon = HuntEvent::seed(target.clone(), None);
        let token = HuntEvent::seed(target, Some("t".into()));

        assert!(!subscriber.accepts(&anon));
        assert!(subscriber.accepts(&token));
        assert_eq!(subscriber.name(), "token_only");
        assert_eq!(anon.payload, EventPayload::ApiServerFound);
    }
}
