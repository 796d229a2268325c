//! Kubehunt Test - Shared test utilities.
//!
//! This crate provides a recording subscriber, a mock API server and
//! fixtures that can be used across kubehunt crates as a dev-dependency.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! kubehunt-test.workspace = true
//! ```
//!
//! ```rust,ignore
//! use kubehunt_test::{MockApiServer, RecordingSubscriber, wait_for_events};
//!
//! #[tokio::test]
//! async fn test_scan() {
//!     let server = MockApiServer::start().await;
//!     server.mount_passive_cluster(&[]).await;
//!
//!     let recorder = RecordingSubscriber::new("recorder");
//!     let mut builder = EventBus::builder();
//!     recorder.subscribe_to(&mut builder, EventKind::DERIVED);
//!     // ... register hunters, publish the seed
//!     assert!(wait_for_events(&recorder, 4, Duration::from_secs(5)).await);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod fixtures;
pub mod harness;
pub mod mock_api;
pub mod recorder;

pub use fixtures::*;
pub use harness::*;
pub use mock_api::*;
pub use recorder::*;
