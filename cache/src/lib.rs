//! Concurrent in-memory indices over the live telemetry stream.
//!
//! Each cache owns one reader-writer lock covering all of its maps; no lock
//! is ever held across store I/O (flushes snapshot under the lock, then write
//! outside it). Ingest fans out to the caches sequentially, so none of them
//! calls into another.

pub mod audit;
pub mod logs;
pub mod metrics;
pub mod primitives;
pub mod processes;
pub mod resources;
pub mod tags;

pub use audit::{audit_caches, CacheAuditReport, LabelCardinality};
pub use logs::LogCache;
pub use metrics::{MetricCache, MetricEntry};
pub use primitives::{LabelIndex, StringSet};
pub use processes::ProcessCache;
pub use resources::{ResourceCache, ResourceCacheConfig};
pub use tags::TagCache;
