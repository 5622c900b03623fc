//! SALTED curator binary.
//!
//! Reads `curator.toml` (or the path given with `--config`) and `SALTED__*`
//! environment overrides, connects to the context broker and serves the
//! ingest endpoints until interrupted.
//!
//! ```text
//! SALTED__BROKER__URL=http://scorpio:9090 curator --config curator.toml
//! ```

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::Parser;
use salted_broker::HttpBroker;
use salted_curator::{Curator, Settings, config::CuratorConfig, ground_truth::ReferenceStations};
use salted_quality::registry::DetectorRegistry;
use tokio::{net::TcpListener, signal, sync::Mutex};
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "SALTED data curator")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "curator.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config.clone()).required(false))
    .add_source(
      config::Environment::with_prefix("SALTED")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("broker.types"),
    )
    .build()
    .with_context(|| format!("failed to read config from {:?}", cli.config))?;

  let cfg: CuratorConfig = settings
    .try_deserialize()
    .context("failed to deserialise CuratorConfig")?;

  let broker = HttpBroker::new(&cfg.broker, cfg.assessment.limits())
    .with_context(|| format!("failed to build broker client for {}", cfg.broker.url))?;
  let stations = ReferenceStations::new(cfg.ground_truth.clone())
    .context("failed to build ground truth client")?;
  let detectors = DetectorRegistry::load(&cfg.detector).with_context(|| {
    format!("failed to load detector snapshots from {:?}", cfg.detector.snapshot_dir)
  })?;
  info!(
    broker = %cfg.broker.url,
    models = detectors.len(),
    scope = ?detectors.scope(),
    "curator ready"
  );

  let curator = Curator::new(Arc::new(broker), stations, detectors, Settings::from_config(&cfg));
  let app = salted_curator::router(Arc::new(Mutex::new(curator)));
  let address = format!("{}:{}", cfg.host, cfg.port);

  info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

  info!("curator stopped");
  Ok(())
}

/// Resolves on Ctrl+C or SIGTERM. A handler that cannot be installed never
/// fires.
async fn shutdown_signal() {
  let ctrl_c = async {
    if let Err(e) = signal::ctrl_c().await {
      error!(error = %e, "failed to install Ctrl+C handler");
      std::future::pending::<()>().await;
    }
  };

  #[cfg(unix)]
  let terminate = async {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
      Ok(mut stream) => {
        stream.recv().await;
      }
      Err(e) => {
        error!(error = %e, "failed to install SIGTERM handler");
        std::future::pending::<()>().await;
      }
    }
  };

  #[cfg(not(unix))]
  let terminate = std::future::pending::<()>();

  tokio::select! {
    _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
    _ = terminate => info!("Received terminate signal, shutting down"),
  }
}
