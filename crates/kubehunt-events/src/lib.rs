//! Kubehunt Events - Event model and type-routed event bus.
//!
//! This crate provides:
//! - [`HuntEvent`], the immutable record hunters exchange
//! - [`EventBus`], which routes each event to the subscribers of its kind
//! - [`EventSubscriber`] and the registry the bus is frozen from
//!
//! # Architecture
//!
//! Subscriptions are made on an [`EventBusBuilder`] at startup. Once built,
//! the registry is read-only. `publish` spawns one delivery task per
//! matching subscriber and returns at once; subscribers receive the bus so
//! they can publish derived events. Failing subscribers are isolated and
//! reported on [`EventBus::failures`].
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use kubehunt_events::{EventBus, EventKind, FilterSubscriber, HuntEvent, Target};
//!
//! # async fn example() {
//! let mut builder = EventBus::builder();
//! builder.subscribe(
//!     EventKind::ApiServerFound,
//!     Arc::new(FilterSubscriber::new("printer", |event| {
//!         println!("{}", event.name());
//!     })),
//! );
//! let bus = builder.build().unwrap();
//!
//! bus.publish(HuntEvent::seed(Target::new("10.0.0.1", Some(6443), "https"), None));
//! assert!(bus.wait_idle(Duration::from_secs(1)).await);
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod bus;
mod error;
mod event;
mod subscriber;

pub use bus::{DeliveryFailure, EventBus, EventBusBuilder, FAILURE_CAPACITY};
pub use error::{BusError, BusResult};
pub use event::{
    Category, EventKind, EventMetadata, EventPayload, HuntEvent, Identity, PodRef, Target,
};
pub use subscriber::{
    EventFilter, EventSubscriber, FilterSubscriber, SubscriberError, SubscriberId,
    SubscriberRegistry, SubscriberResult,
};
