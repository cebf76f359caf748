//! Shared configuration primitives for the GoSight server.

pub mod config;

pub use config::{load, ConfigError, ConfigOverrides, ServerConfig};
