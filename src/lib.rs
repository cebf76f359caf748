//! Pipeline wiring for the GoSight server.
//!
//! Composes the caches, stores, rule evaluation, alert lifecycle, sync loops,
//! and the ingest listener into one startable unit. The binary in
//! `bins/gosight-server` is a thin CLI shell around [`Server`].

pub mod server;

pub use server::{Server, ServerHandle};
