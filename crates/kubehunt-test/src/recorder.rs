//! Recording subscriber for observing bus traffic in tests.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use kubehunt_events::{
    EventBus, EventBusBuilder, EventKind, EventSubscriber, HuntEvent, SubscriberResult,
};

/// Interval between checks in [`wait_for_events`].
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Subscriber that stores every event it receives.
///
/// Clones share the same storage, so a test keeps one handle and registers
/// another on the bus.
#[derive(Debug, Clone)]
pub struct RecordingSubscriber {
    name: String,
    events: Arc<Mutex<Vec<Arc<HuntEvent>>>>,
}

impl Default for RecordingSubscriber {
    fn default() -> Self {
        Self::new("recorder")
    }
}

impl RecordingSubscriber {
    /// Create an empty recorder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Register this recorder for each of `kinds`.
    pub fn subscribe_to(&self, builder: &mut EventBusBuilder, kinds: &[EventKind]) {
        let subscriber: Arc<dyn EventSubscriber> = Arc::new(self.clone());
        builder.subscribe_many(kinds, &subscriber);
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<HuntEvent>>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Everything recorded so far, in arrival order.
    #[must_use]
    pub fn events(&self) -> Vec<Arc<HuntEvent>> {
        self.lock().clone()
    }

    /// Recorded events of one kind.
    #[must_use]
    pub fn of_kind(&self, kind: EventKind) -> Vec<Arc<HuntEvent>> {
        self.lock()
            .iter()
            .filter(|e| e.kind() == kind)
            .cloned()
            .collect()
    }

    /// Number of recorded events.
    #[must_use]
    pub fn count(&self) -> usize {
        self.lock().len()
    }

    /// Number of recorded events of one kind.
    #[must_use]
    pub fn count_of(&self, kind: EventKind) -> usize {
        self.lock().iter().filter(|e| e.kind() == kind).count()
    }

    /// Kinds of the recorded events, sorted.
    #[must_use]
    pub fn kinds(&self) -> Vec<EventKind> {
        let mut kinds: Vec<EventKind> = self.lock().iter().map(|e| e.kind()).collect();
        kinds.sort();
        kinds
    }

    /// Forget everything recorded.
    pub fn clear(&self) {
        self.lock().clear();
    }
}

#[async_trait]
impl EventSubscriber for RecordingSubscriber {
    async fn on_event(&self, event: Arc<HuntEvent>, _bus: &EventBus) -> SubscriberResult {
        self.lock().push(event);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Poll until `recorder` holds at least `count` events.
///
/// Returns `false` if `timeout` elapsed first.
pub async fn wait_for_events(
    recorder: &RecordingSubscriber,
    count: usize,
    timeout: Duration,
) -> bool {
    wait_until(timeout, || recorder.count() >= count).await
}

/// Poll until `recorder` holds at least `count` events of `kind`.
pub async fn wait_for_kind(
    recorder: &RecordingSubscriber,
    kind: EventKind,
    count: usize,
    timeout: Duration,
) -> bool {
    wait_until(timeout, || recorder.count_of(kind) >= count).await
}

async fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let poll = async {
        while !done() {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    };
    tokio::time::timeout(timeout, poll).await.is_ok()
}
