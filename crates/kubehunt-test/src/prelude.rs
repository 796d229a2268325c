//! Prelude module - commonly used test utilities.

pub use crate::fixtures::{
    created_body, deleted_body, empty_list_body, finished_event, named_list_body, pods_body,
    seed_event, test_target,
};
pub use crate::harness::{setup_test_logging, setup_test_logging_default, test_file};
pub use crate::mock_api::MockApiServer;
pub use crate::recorder::{RecordingSubscriber, wait_for_events, wait_for_kind};
