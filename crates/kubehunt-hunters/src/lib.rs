//! Kubehunt Hunters - Probes for the cluster API server.
//!
//! This crate provides:
//! - [`ApiClient`], a `reqwest` client that opens per-identity sessions
//! - the [`Hunter`] contract and [`HunterSubscriber`], which wires a
//!   [`PassiveHunter`] to the event bus
//! - the passive chain: [`AccessApiServer`] and [`AccessApiServerWithToken`]
//! - the active gate: [`ApiServerActiveHunter`], buildable only with an
//!   [`ActiveAuthorization`]
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use kubehunt_events::{EventBus, HuntEvent, Target};
//! use kubehunt_hunters::{ApiClient, ClientConfig, register_passive_hunters};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ApiClient::new(&ClientConfig::default())?;
//! let mut builder = EventBus::builder();
//! register_passive_hunters(&mut builder, &client);
//! let bus = builder.build()?;
//!
//! bus.publish(HuntEvent::seed(Target::new("10.0.0.1", Some(6443), "https"), None));
//! bus.wait_idle(Duration::from_secs(30)).await;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod api;
mod active;
mod client;
mod error;
mod hunter;
mod passive;

pub use active::{ActiveAuthorization, ApiServerActiveHunter, DEFAULT_NAMESPACE_PREFIX};
pub use client::{ApiClient, ApiSession, ClientConfig, DEFAULT_TIMEOUT, JSON_PATCH_CONTENT_TYPE};
pub use error::{HuntError, HuntResult};
pub use hunter::{Hunter, HunterSubscriber, PassiveHunter, register, register_passive_hunters};
pub use passive::{AccessApiServer, AccessApiServerWithToken};
