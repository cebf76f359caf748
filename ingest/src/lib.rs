//! Agent stream intake.
//!
//! Agents hold one TCP connection each and stream newline-delimited JSON
//! frames. Within a connection, frames are applied strictly in order:
//! caches first, then the long-term stores, then rule evaluation. Across
//! connections there is no ordering guarantee.

pub mod error;
pub mod frame;
pub mod pipeline;
pub mod server;

pub use error::IngestError;
pub use frame::WireFrame;
pub use pipeline::IngestPipeline;
pub use server::IngestServer;
