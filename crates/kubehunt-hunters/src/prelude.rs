//! Prelude module - commonly used types for convenient import.
//!
//! Use `use kubehunt_hunters::prelude::*;` to import all essential types.

// Client
pub use crate::{ApiClient, ClientConfig};

// Errors
pub use crate::{HuntError, HuntResult};

// Hunters
pub use crate::{
    AccessApiServer, AccessApiServerWithToken, ActiveAuthorization, ApiServerActiveHunter, Hunter,
    PassiveHunter, register_passive_hunters,
};
