use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use config::{Config, ConfigError as BuilderError, Environment, File, FileFormat};
use serde::Deserialize;
use thiserror::Error;

const DEFAULT_CONFIG_DIR: &str = "config";

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub server: ServerSection,
    pub ingest: IngestSection,
    pub cache: CacheSection,
    pub sync: SyncSection,
    pub rules: RulesSection,
    pub observability: ObservabilitySection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    /// Worker threads for the runtime; 0 means one per core.
    pub workers: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestSection {
    pub host: String,
    pub port: u16,
}

impl IngestSection {
    pub fn bind_address(&self) -> std::result::Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    pub metric_retention_hours: i64,
    pub tag_retention_hours: i64,
    pub process_window_minutes: i64,
    pub log_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncSection {
    pub interval_secs: u64,
    pub lifecycle_interval_secs: u64,
    pub resource_flush_interval_secs: u64,
    pub flush_timeout_secs: u64,
    pub endpoint_offline_after_secs: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RulesSection {
    /// JSON or YAML rule document, chosen by extension.
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilitySection {
    pub log_level: String,
    pub log_format: String,
    pub metrics_bind: String,
    /// 0 disables the Prometheus listener.
    pub metrics_port: u16,
}

impl ObservabilitySection {
    pub fn metrics_socket_addr(&self) -> std::result::Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.metrics_bind, self.metrics_port).parse()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub profile: Option<String>,
    pub ingest_host: Option<String>,
    pub ingest_port: Option<u16>,
    pub workers: Option<usize>,
    pub rules_path: Option<PathBuf>,
    pub log_level: Option<String>,
    pub log_format: Option<String>,
    pub metrics_port: Option<u16>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Builder(#[from] BuilderError),
}

impl From<std::net::AddrParseError> for ConfigError {
    fn from(err: std::net::AddrParseError) -> Self {
        ConfigError::Message(err.to_string())
    }
}

pub fn load(overrides: ConfigOverrides) -> std::result::Result<ServerConfig, ConfigError> {
    let mut builder = Config::builder()
        .set_default("server.workers", 0i64)?
        .set_default("ingest.host", "127.0.0.1")?
        .set_default("ingest.port", 4317i64)?
        .set_default("cache.metric_retention_hours", 24i64)?
        .set_default("cache.tag_retention_hours", 24i64)?
        .set_default("cache.process_window_minutes", 30i64)?
        .set_default("cache.log_capacity", 10_000i64)?
        .set_default("sync.interval_secs", 60i64)?
        .set_default("sync.lifecycle_interval_secs", 30i64)?
        .set_default("sync.resource_flush_interval_secs", 30i64)?
        .set_default("sync.flush_timeout_secs", 30i64)?
        .set_default("sync.endpoint_offline_after_secs", 300i64)?
        .set_default("rules.path", "config/rules.yaml")?
        .set_default("observability.log_level", "info")?
        .set_default("observability.log_format", "pretty")?
        .set_default("observability.metrics_bind", "127.0.0.1")?
        .set_default("observability.metrics_port", 9100i64)?;

    builder = builder.add_source(optional_file(DEFAULT_CONFIG_DIR, "default.toml"));

    if let Some(profile) = overrides.profile.as_deref() {
        let profile_file = format!("{profile}.toml");
        builder = builder.add_source(optional_file(DEFAULT_CONFIG_DIR, &profile_file));
    }

    if let Some(path) = overrides.config_path {
        builder = builder.add_source(File::from(path));
    }

    builder = builder.add_source(Environment::with_prefix("GOSIGHT").separator("__"));

    if let Some(host) = overrides.ingest_host {
        builder = builder.set_override("ingest.host", host)?;
    }
    if let Some(port) = overrides.ingest_port {
        builder = builder.set_override("ingest.port", port as i64)?;
    }
    if let Some(workers) = overrides.workers {
        builder = builder.set_override("server.workers", workers as i64)?;
    }
    if let Some(path) = overrides.rules_path {
        builder = builder.set_override(
            "rules.path",
            path.to_string_lossy().to_string(),
        )?;
    }
    if let Some(log_level) = overrides.log_level {
        builder = builder.set_override("observability.log_level", log_level)?;
    }
    if let Some(log_format) = overrides.log_format {
        builder = builder.set_override("observability.log_format", log_format)?;
    }
    if let Some(metrics_port) = overrides.metrics_port {
        builder = builder.set_override("observability.metrics_port", metrics_port as i64)?;
    }

    let config = builder.build()?;
    Ok(config.try_deserialize()?)
}

fn optional_file(dir: &str, name: &str) -> File<config::FileSourceFile, FileFormat> {
    File::from(Path::new(dir).join(name))
        .required(false)
        .format(FileFormat::Toml)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_load_without_files() {
        let config = load(ConfigOverrides::default()).expect("config loads");
        assert_eq!(config.ingest.port, 4317);
        assert_eq!(config.cache.metric_retention_hours, 24);
        assert_eq!(config.observability.log_format, "pretty");
        assert!(config.ingest.bind_address().is_ok());
    }

    #[test]
    fn cli_overrides_win() {
        let overrides = ConfigOverrides {
            ingest_port: Some(9999),
            log_level: Some("debug".into()),
            workers: Some(4),
            ..Default::default()
        };
        let config = load(overrides).expect("config loads with overrides");
        assert_eq!(config.ingest.port, 9999);
        assert_eq!(config.observability.log_level, "debug");
        assert_eq!(config.server.workers, 4);
    }

    #[test]
    fn explicit_file_layers_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gosight.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[ingest]\nhost = \"0.0.0.0\"\nport = 5000").unwrap();

        let overrides = ConfigOverrides {
            config_path: Some(path),
            ..Default::default()
        };
        let config = load(overrides).unwrap();
        assert_eq!(config.ingest.host, "0.0.0.0");
        assert_eq!(config.ingest.port, 5000);
        // Untouched sections keep their defaults.
        assert_eq!(config.sync.interval_secs, 60);
    }
}
