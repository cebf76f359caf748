//! Background coordination: the periodic cache-to-store flush loops and the
//! endpoint lifecycle tracker that raises synthetic down events.

pub mod manager;
pub mod tracker;

pub use manager::{SyncConfig, SyncManager};
pub use tracker::{EndpointKind, EndpointState, EndpointStatus, EndpointTracker};
