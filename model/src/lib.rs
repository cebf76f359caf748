//! Shared data model for the GoSight telemetry server.
//!
//! Everything that crosses a crate boundary lives here: the wire payloads
//! agents stream in, the cache-resident index entries derived from them, the
//! alert rule/instance/event records, and the monitored-resource model.

pub mod alert;
pub mod log;
pub mod meta;
pub mod metric;
pub mod process;
pub mod resource;
pub mod rule;

pub use alert::{AlertEvent, AlertInstance, AlertState};
pub use log::{LogEntry, LogPayload};
pub use meta::Meta;
pub use metric::{DataPoint, Metric, MetricKind, MetricPayload};
pub use process::{ProcessInfo, ProcessSnapshot};
pub use resource::{container_resource_id, host_resource_id, Resource};
pub use rule::{AlertLevel, AlertRule, CompareOp, Expression, MatchCriteria, MetricScope, RuleKind};
