//! The hunter execution contract and its bus adapter.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use kubehunt_events::{
    EventBus, EventBusBuilder, EventKind, EventSubscriber, HuntEvent, SubscriberId,
    SubscriberResult,
};
use tracing::{Instrument, debug, info_span};

use crate::client::ApiClient;
use crate::error::HuntResult;
use crate::passive::{AccessApiServer, AccessApiServerWithToken};

/// A unit of probing work bound to one triggering event.
///
/// Construction has no side effects. [`Hunter::execute`] consumes the
/// hunter, so each instance runs at most once.
#[async_trait]
pub trait Hunter: Send + Sized + 'static {
    /// Name used in logs and as the source of derived events.
    const NAME: &'static str;

    /// Bind a hunter to its trigger.
    fn from_event(event: Arc<HuntEvent>, client: ApiClient) -> Self;

    /// Probe and publish derived events to `bus`.
    async fn execute(self, bus: &EventBus) -> HuntResult<()>;
}

/// A read-only hunter that may be wired to the bus.
pub trait PassiveHunter: Hunter {
    /// Event kinds that trigger this hunter.
    fn subscriptions() -> &'static [EventKind];

    /// Narrow the triggers further. Default accepts every subscribed event.
    fn accepts(event: &HuntEvent) -> bool {
        let _ = event;
        true
    }
}

/// Bus subscriber that builds and runs a fresh `H` per delivery.
pub struct HunterSubscriber<H: PassiveHunter> {
    client: ApiClient,
    _hunter: PhantomData<fn() -> H>,
}

impl<H: PassiveHunter> HunterSubscriber<H> {
    /// Create a subscriber sharing `client` across runs.
    #[must_use]
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            _hunter: PhantomData,
        }
    }
}

impl<H: PassiveHunter> std::fmt::Debug for HunterSubscriber<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HunterSubscriber")
            .field("hunter", &H::NAME)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<H: PassiveHunter> EventSubscriber for HunterSubscriber<H> {
    async fn on_event(&self, event: Arc<HuntEvent>, bus: &EventBus) -> SubscriberResult {
        let span = info_span!(
            "hunter",
            hunter = H::NAME,
            event_kind = %event.kind(),
            target = %event.target,
        );
        let hunter = H::from_event(event, self.client.clone());
        hunter.execute(bus).instrument(span).await?;
        Ok(())
    }

    fn accepts(&self, event: &HuntEvent) -> bool {
        H::accepts(event)
    }

    fn name(&self) -> &str {
        H::NAME
    }
}

/// Subscribe a passive hunter to each of its trigger kinds.
pub fn register<H: PassiveHunter>(
    builder: &mut EventBusBuilder,
    client: &ApiClient,
) -> Vec<SubscriberId> {
    let subscriber: Arc<dyn EventSubscriber> =
        Arc::new(HunterSubscriber::<H>::new(client.clone()));
    let ids = builder.subscribe_many(H::subscriptions(), &subscriber);
    debug!(hunter = H::NAME, triggers = ids.len(), "Hunter registered");
    ids
}

/// Subscribe every built-in passive hunter.
pub fn register_passive_hunters(
    builder: &mut EventBusBuilder,
    client: &ApiClient,
) -> Vec<SubscriberId> {
    let mut ids = register::<AccessApiServer>(builder, client);
    ids.extend(register::<AccessApiServerWithToken>(builder, client));
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientConfig;
    use crate::error::HuntError;
    use kubehunt_events::{EventPayload, Target};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    static RUNS: AtomicUsize = AtomicUsize::new(0);

    struct Echo {
        event: Arc<HuntEvent>,
    }

    #[async_trait]
    impl Hunter for Echo {
        const NAME: &'static str = "echo";

        fn from_event(event: Arc<HuntEvent>, _client: ApiClient) -> Self {
            Self { event }
        }

        async fn execute(self, bus: &EventBus) -> HuntResult<()> {
            RUNS.fetch_add(1, Ordering::SeqCst);
            if self.event.credential().is_some() {
                return Err(HuntError::Client("refusing credentialed seed".into()));
            }
            bus.publish(HuntEvent::derive(
                &self.event,
                Self::NAME,
                None,
                EventPayload::ApiServerAccess {
                    response: "{}".into(),
                },
            ));
            Ok(())
        }
    }

    impl PassiveHunter for Echo {
        fn subscriptions() -> &'static [EventKind] {
            &[EventKind::ApiServerFound]
        }
    }

    #[tokio::test]
    async fn test_subscriber_runs_hunter_and_reports_errors() {
        let client = ApiClient::new(&ClientConfig::default()).unwrap();
        let mut builder = EventBus::builder();
        let ids = register::<Echo>(&mut builder, &client);
        assert_eq!(ids.len(), 1);
        let bus = builder.build().unwrap();
        let mut failures = bus.failures();

        let target = Target::new("h", Some(443), "https");
        bus.publish(HuntEvent::seed(target.clone(), None));
        bus.publish(HuntEvent::seed(target, Some("t".into())));
        assert!(bus.wait_idle(Duration::from_secs(5)).await);

        assert_eq!(RUNS.load(Ordering::SeqCst), 2);
        let failure = failures.try_recv().unwrap();
        assert_eq!(failure.subscriber, "echo");
        assert!(failure.reason.contains("refusing"));
    }

    #[test]
    fn test_register_passive_hunters() {
        let client = ApiClient::new(&ClientConfig::default()).unwrap();
        let mut builder = EventBus::builder();
        let ids = register_passive_hunters(&mut builder, &client);
        assert_eq!(ids.len(), 2);
    }
}
