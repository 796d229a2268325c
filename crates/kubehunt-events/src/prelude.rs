//! Prelude module - commonly used types for convenient import.
//!
//! Use `use kubehunt_events::prelude::*;` to import all essential types.

// Event bus
pub use crate::{BusError, BusResult, DeliveryFailure, EventBus, EventBusBuilder};

// Events
pub use crate::{
    Category, EventKind, EventMetadata, EventPayload, HuntEvent, Identity, PodRef, Target,
};

// Subscriber system
pub use crate::{EventSubscriber, FilterSubscriber, SubscriberId, SubscriberResult};
