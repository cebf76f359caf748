use anyhow::Context;
use clap::Parser;
use gosight_observability::{init_tracing, install_metrics_exporter, LogFormat, TracingConfig};
use gosight_pipeline::Server;
use gosight_server_core::{load, ConfigOverrides};
use std::path::PathBuf;
use tokio::runtime::Builder;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "GoSight telemetry server", long_about = None)]
struct Cli {
    /// Extra configuration file layered over config/default.toml.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Profile name resolving to config/<profile>.toml.
    #[arg(long)]
    profile: Option<String>,

    /// Ingest listener host.
    #[arg(long)]
    host: Option<String>,

    /// Ingest listener port.
    #[arg(long)]
    port: Option<u16>,

    /// Runtime worker threads; defaults to one per core.
    #[arg(long)]
    workers: Option<usize>,

    /// Alert rule document (JSON or YAML).
    #[arg(long)]
    rules: Option<PathBuf>,

    #[arg(long)]
    log_level: Option<String>,

    #[arg(long)]
    log_format: Option<String>,

    /// Prometheus scrape port; 0 disables the exporter.
    #[arg(long)]
    metrics_port: Option<u16>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load(ConfigOverrides {
        config_path: cli.config,
        profile: cli.profile,
        ingest_host: cli.host,
        ingest_port: cli.port,
        workers: cli.workers,
        rules_path: cli.rules,
        log_level: cli.log_level,
        log_format: cli.log_format,
        metrics_port: cli.metrics_port,
    })
    .context("failed to load configuration")?;

    let tracing_config = TracingConfig {
        log_format: config
            .observability
            .log_format
            .parse()
            .unwrap_or(LogFormat::Pretty),
        log_level: config.observability.log_level.clone(),
    };
    if init_tracing(&tracing_config).is_err() {
        warn!("tracing subscriber already initialised");
    }

    let workers = if config.server.workers == 0 {
        num_cpus::get().max(1)
    } else {
        config.server.workers
    };
    let runtime = Builder::new_multi_thread()
        .enable_all()
        .worker_threads(workers)
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(async move {
        if config.observability.metrics_port != 0 {
            let addr = config
                .observability
                .metrics_socket_addr()
                .context("invalid metrics listen address")?;
            install_metrics_exporter(addr)?;
            info!(%addr, "prometheus exporter listening");
        }

        let server = Server::build(config).context("failed to initialise server")?;
        let handle = server.start().await?;
        info!(addr = %handle.ingest_addr, "gosight server ready");

        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for shutdown signal")?;
        info!("shutdown signal received");
        handle.shutdown().await
    })
}
