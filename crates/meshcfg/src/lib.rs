//! meshcfg daemon
//!
//! Wires the filesystem source and the sink server to a shared handler chain
//! and runs until shutdown.

pub mod config;
pub mod schemas;

pub use config::{ConfigError, FsConfig, LoggingConfig, MeshcfgConfig, MetricsConfig, SinkConfig};

use anyhow::{Context, Result};
use meshcfg_event::{handler_fn, CancellationToken, Event, Handler, Schemas, Source};
use meshcfg_sink::{
    EventUpdater, ListAuthChecker, RateLimiter, Server, ServerOptions, Sink, SinkOptions,
    TokenBucket, Unlimited, SINK_METRICS,
};
use meshcfg_source::{ApiServerSource, FsOptions, FsSource, SOURCE_METRICS};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

#[derive(clap::Parser, Debug, Default)]
#[command(name = "meshcfg", about = "Mesh configuration distribution daemon")]
pub struct Args {
    /// TOML config file
    #[arg(long, short = 'c', env = "MESHCFG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory of YAML config files (overrides fs.root)
    #[arg(long)]
    pub fs_root: Option<PathBuf>,

    /// Reload when files under the root change (overrides fs.watch)
    #[arg(long)]
    pub watch: bool,

    /// Namespace for resources that do not declare one
    #[arg(long)]
    pub default_namespace: Option<String>,

    /// Sink server listen address, e.g. 127.0.0.1:9901 (overrides sink.bind)
    #[arg(long)]
    pub sink_bind: Option<String>,

    /// Debug logging for meshcfg crates
    #[arg(long, short = 'v')]
    pub verbose: bool,

    /// Log to stderr only
    #[arg(long)]
    pub no_log_file: bool,
}

impl Args {
    /// Load the config file (if any) and apply command line overrides.
    pub fn resolve(&self) -> std::result::Result<MeshcfgConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => MeshcfgConfig::read(path)?,
            None => MeshcfgConfig::default(),
        };
        if let Some(root) = &self.fs_root {
            config.fs.root = Some(root.clone());
        }
        if self.watch {
            config.fs.watch = true;
        }
        if let Some(ns) = &self.default_namespace {
            config.fs.default_namespace = ns.clone();
        }
        if let Some(bind) = &self.sink_bind {
            config.sink.bind = Some(bind.clone());
        }
        if self.verbose {
            config.logging.verbose = true;
        }
        if self.no_log_file {
            config.logging.log_to_file = false;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Downstream stand-in: every event becomes a log line.
pub fn logging_handler() -> Arc<dyn Handler> {
    handler_fn(|event: &Event| match &event.resource {
        Some(resource) => info!(
            kind = %event.kind,
            schema = %event.source,
            name = %resource.full_name(),
            version = %resource.metadata.version,
            "Config event"
        ),
        None => info!(kind = %event.kind, schema = %event.source, "Config event"),
    })
}

/// API server source carrying the configured revision filter. Watchers are
/// registered by the embedding application, which owns the Kubernetes client.
pub fn api_server_source(config: &MeshcfgConfig) -> ApiServerSource {
    ApiServerSource::new(config.revision_filter())
}

pub fn fs_source(config: &MeshcfgConfig, schemas: &Schemas) -> Option<FsSource> {
    let root = config.fs.root.as_ref()?;
    Some(FsSource::new(
        root.clone(),
        schemas.clone(),
        FsOptions {
            watch_config_files: config.fs.watch,
            default_namespace: config.fs.default_namespace.clone(),
            ..FsOptions::default()
        },
    ))
}

pub fn sink_server(config: &SinkConfig, schemas: &Schemas, handler: Arc<dyn Handler>) -> Server {
    let collections = if config.collections.is_empty() {
        schemas.names()
    } else {
        config.collections.clone()
    };
    let sink = Sink::new(SinkOptions {
        collections,
        updater: Arc::new(EventUpdater::new(schemas.clone(), handler)),
        id: config.id.clone(),
        annotations: BTreeMap::new(),
    });
    let rate_limiter: Arc<dyn RateLimiter> = if config.rate_limit > 0.0 {
        Arc::new(TokenBucket::new(config.rate_limit, config.burst))
    } else {
        Arc::new(Unlimited)
    };
    Server::new(
        Arc::new(sink),
        ServerOptions {
            auth_checker: Arc::new(ListAuthChecker::with_ids(
                config.auth_mode,
                config.allowed_identities.iter().cloned(),
            )),
            rate_limiter,
        },
    )
}

/// Both counter sets in Prometheus text format.
pub fn prometheus_text() -> String {
    format!(
        "{}{}",
        SOURCE_METRICS.prometheus_format(),
        SINK_METRICS.prometheus_format()
    )
}

/// Atomically replace `path` with the current counters.
pub fn write_metrics_textfile(path: &Path) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    std::fs::write(&tmp, prometheus_text())?;
    std::fs::rename(&tmp, path)
}

async fn export_metrics(path: PathBuf, every: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(every);
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }
        if let Err(e) = write_metrics_textfile(&path) {
            warn!(path = %path.display(), "Failed to write metrics: {}", e);
        }
    }
}

/// Run until `shutdown` is cancelled.
pub async fn run(config: MeshcfgConfig, shutdown: CancellationToken) -> Result<()> {
    let schemas = schemas::builtin().context("Failed to build schema registry")?;
    let handler = logging_handler();

    let listener = match &config.sink.bind {
        Some(bind) => Some(
            TcpListener::bind(bind)
                .await
                .with_context(|| format!("Failed to bind sink server to {}", bind))?,
        ),
        None => None,
    };

    let mut sources: Vec<Box<dyn Source>> = Vec::new();
    if let Some(fs) = fs_source(&config, &schemas) {
        info!(source = %fs.name(), root = %fs.root().display(), "Filesystem source configured");
        sources.push(Box::new(fs));
    }
    let api = api_server_source(&config);
    debug!(revision = %api.filter().revision, "API server source configured");
    sources.push(Box::new(api));

    for source in &sources {
        source.dispatch(Arc::clone(&handler));
        source.start();
    }

    let server_task = listener.map(|listener| {
        let server = Arc::new(sink_server(&config.sink, &schemas, Arc::clone(&handler)));
        tokio::spawn(server.serve(listener, shutdown.clone()))
    });

    let metrics_task = config.metrics.textfile.clone().map(|path| {
        let every = Duration::from_secs(config.metrics.interval_secs.max(1));
        tokio::spawn(export_metrics(path, every, shutdown.clone()))
    });

    shutdown.cancelled().await;
    info!("Shutting down");

    for source in &sources {
        source.stop();
    }
    if let Some(task) = server_task {
        task.await.context("Sink server task failed")?;
    }
    if let Some(task) = metrics_task {
        task.await.context("Metrics task failed")?;
    }
    if let Some(path) = &config.metrics.textfile {
        write_metrics_textfile(path)
            .with_context(|| format!("Failed to write metrics to {}", path.display()))?;
    }

    info!("{}", SOURCE_METRICS.snapshot().summary());
    info!("{}", SINK_METRICS.snapshot().summary());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_overrides() {
        let args = Args::parse_from([
            "meshcfg",
            "--fs-root",
            "/data",
            "--watch",
            "--default-namespace",
            "istio-system",
            "--no-log-file",
        ]);
        let config = args.resolve().unwrap();
        assert_eq!(config.fs.root, Some(PathBuf::from("/data")));
        assert!(config.fs.watch);
        assert_eq!(config.fs.default_namespace, "istio-system");
        assert!(!config.logging.log_to_file);
        assert!(config.sink.bind.is_none());
    }

    #[test]
    fn test_cli_overrides_config_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("meshcfg.toml");
        std::fs::write(&path, "[sink]\nid = \"edge\"\nburst = 3\n").unwrap();

        let args = Args::parse_from([
            "meshcfg",
            "--config",
            path.to_str().unwrap(),
            "--sink-bind",
            "127.0.0.1:9901",
        ]);
        let config = args.resolve().unwrap();
        assert_eq!(config.sink.id, "edge");
        assert_eq!(config.sink.burst, 3);
        assert_eq!(config.sink.bind.as_deref(), Some("127.0.0.1:9901"));
    }

    #[test]
    fn test_resolve_reports_bad_config_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("meshcfg.toml");
        std::fs::write(&path, "[sink\n").unwrap();

        let args = Args {
            config: Some(path),
            fs_root: Some(PathBuf::from("/data")),
            ..Args::default()
        };
        assert!(matches!(args.resolve(), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_resolve_requires_something_to_run() {
        assert!(Args::default().resolve().is_err());
    }
}
