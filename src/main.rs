//! seismic-ingest binary entrypoint.
//! Loads the pipeline config, runs the catalog or feed pipeline, prints the run summary.
//!
//! Usage: `seismic-ingest [config.toml|config.json]`
//! Exit status: 0 when the run completed (window failures included),
//! 2 on configuration errors, 1 on any other fatal error.

use anyhow::Context;
use seismic_ingest::metrics::Metrics;
use seismic_ingest::{Orchestrator, PipelineConfig, RunSummary};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Compact logs by default; `LOG_FORMAT=json` switches to one JSON object per line.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ingest=info,seismic_ingest=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .ok()
        .is_some_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    match run().await {
        Ok(summary) => {
            print!("{}", summary.render());
            ExitCode::SUCCESS
        }
        Err(e) => {
            let fatal_config = e
                .downcast_ref::<seismic_ingest::Error>()
                .is_some_and(seismic_ingest::Error::is_fatal);
            error!(error = ?e, "run aborted");
            eprintln!("error: {e:#}");
            if fatal_config {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

async fn run() -> anyhow::Result<RunSummary> {
    let mut cfg = match std::env::args_os().nth(1) {
        Some(p) => PipelineConfig::load_from(&PathBuf::from(p))?,
        None => PipelineConfig::load_default()?,
    };
    cfg.apply_env_overrides()?;

    let metrics = match cfg.metrics_textfile {
        Some(_) => Some(Metrics::init()?),
        None => None,
    };

    let orch = Orchestrator::new(cfg)?;

    let cancel = orch.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!(target: "ingest", "interrupt received, finishing in-flight windows");
            cancel.cancel();
        }
    });

    let summary = orch.run().await?;

    if let (Some(m), Some(path)) = (metrics, orch.config().metrics_textfile.as_deref()) {
        m.write_textfile(path)
            .await
            .with_context(|| format!("writing metrics to {}", path.display()))
            .unwrap_or_else(|e| warn!(error = ?e, "metrics export failed"));
    }

    Ok(summary)
}
