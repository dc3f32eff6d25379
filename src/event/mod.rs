//! Election Event Module
//!
//! Campaign-scoped election events (simulations and the real election day)
//! and the registry that manages their lifecycle.

mod model;
mod registry;

pub use model::{ElectionEvent, EventSummary, EventType, NewElectionEvent};
pub use registry::EventRegistry;

pub(crate) use registry::load;
