//! The Tempo coordinator operator.

mod app;
#[cfg(test)]
mod app_test;
mod config;
mod coordinator;
mod error;
#[cfg(test)]
mod fixtures;
mod reconcile;
mod requests;
#[cfg(test)]
mod requests_test;
mod server;
mod tempo;
mod workload;

use std::io::Write;
use std::mem::MaybeUninit;
use std::sync::{Arc, Once};

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusRecorder};
use tracing_subscriber::prelude::*;

use crate::app::App;
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Setup tracing/logging system.
    tracing_subscriber::registry()
        // Filter spans based on the RUST_LOG env var.
        .with(tracing_subscriber::EnvFilter::from_default_env())
        // Send a copy of all spans to stdout in compact form.
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_ansi(true)
        )
        // Install this registry as the global tracing registry.
        .try_init()
        .context("error initializing logging/tracing system")?;

    let cfg = Arc::new(Config::new()?);
    let recorder = get_metrics_recorder(&cfg);
    metrics::set_recorder(recorder).context("error setting prometheus metrics recorder")?;

    tracing::info!(
        http_listen_port = %cfg.http_listen_port,
        grpc_listen_port = %cfg.grpc_listen_port,
        metrics_port = %cfg.metrics_port,
        hostname = %cfg.hostname,
        tempo_config_path = %cfg.tempo_config_path,
        "starting Tempo operator",
    );
    let (app, _channels) = App::new(cfg)?;
    if let Err(err) = app.spawn().await {
        tracing::error!(error = ?err);
    }

    // Ensure any pending output is flushed.
    let _ = std::io::stdout().flush();
    let _ = std::io::stderr().flush();

    Ok(())
}

/// Get a handle to the metrics recorder, initializing it as needed.
pub fn get_metrics_recorder(config: &Config) -> &'static PrometheusRecorder {
    static mut RECORDER: MaybeUninit<PrometheusRecorder> = MaybeUninit::uninit();
    static ONCE: Once = Once::new();
    unsafe {
        ONCE.call_once(|| {
            RECORDER.write(PrometheusBuilder::new().add_global_label("hostname", config.hostname.clone()).build());
        });
        RECORDER.assume_init_ref()
    }
}
