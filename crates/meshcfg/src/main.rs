//! meshcfg daemon
//!
//! Usage:
//!     meshcfg --fs-root /etc/meshcfg/config --watch
//!     meshcfg --config meshcfg.toml --sink-bind 127.0.0.1:9901

use clap::Parser;
use meshcfg::Args;
use meshcfg_event::CancellationToken;
use meshcfg_logging::{init_logging, LogConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = args.resolve()?;

    init_logging(LogConfig {
        app_name: "meshcfg",
        verbose: config.logging.verbose,
        log_to_file: config.logging.log_to_file,
    })?;

    tracing::info!("Starting meshcfg");
    if let Some(root) = &config.fs.root {
        tracing::info!("  Config root: {}", root.display());
    }
    if let Some(bind) = &config.sink.bind {
        tracing::info!("  Sink bind: {}", bind);
    }

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
            return;
        }
        signal_token.cancel();
    });

    meshcfg::run(config, shutdown).await
}
