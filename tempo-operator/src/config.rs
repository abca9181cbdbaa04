//! Runtime configuration.

use anyhow::{Context, Result};
use serde::Deserialize;

/// Runtime configuration data.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// The server's logging config, which uses Rust's `env_logger` directives.
    pub rust_log: String,

    /// The port the workload serves its HTTP API on.
    #[serde(default = "Config::default_http_listen_port")]
    pub http_listen_port: u16,
    /// The port the workload serves its gRPC API on.
    ///
    /// The upstream default is 9095, which clashes with promtail.
    #[serde(default = "Config::default_grpc_listen_port")]
    pub grpc_listen_port: u16,
    /// The port the operator's own status/metrics server listens on.
    #[serde(default = "Config::default_metrics_port")]
    pub metrics_port: u16,

    /// The hostname peers and clients use to reach the workload.
    pub hostname: String,

    /// Whether the operator ships its own spans to the workload.
    ///
    /// Keeps the OTLP gRPC receiver active even with no consumers connected.
    #[serde(default = "Config::default_self_monitoring")]
    pub self_monitoring: bool,

    /// Path of the Tempo binary.
    #[serde(default = "Config::default_tempo_bin")]
    pub tempo_bin: String,
    /// Path the workload configuration is written to.
    #[serde(default = "Config::default_tempo_config_path")]
    pub tempo_config_path: String,
    /// Local path used for trace block storage when no object storage is configured.
    #[serde(default = "Config::default_storage_local_path")]
    pub storage_local_path: String,
    /// Path of the workload's write-ahead log.
    #[serde(default = "Config::default_storage_wal_path")]
    pub storage_wal_path: String,

    /// Path the workload's TLS certificate is written to.
    #[serde(default = "Config::default_tls_cert_path")]
    pub tls_cert_path: String,
    /// Path the workload's TLS private key is written to.
    #[serde(default = "Config::default_tls_key_path")]
    pub tls_key_path: String,
    /// Path the CA certificate is written to.
    #[serde(default = "Config::default_tls_ca_path")]
    pub tls_ca_path: String,
}

impl Config {
    /// Create a new config instance.
    ///
    /// Currently this routine just parses the runtime environment and builds
    /// the application config from that. In the future, this may take into
    /// account an optional config file as well.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Result<Self> {
        envy::from_env().context("error building config from env")
    }

    fn default_http_listen_port() -> u16 {
        3200
    }

    fn default_self_monitoring() -> bool {
        true
    }

    fn default_grpc_listen_port() -> u16 {
        9096
    }

    fn default_metrics_port() -> u16 {
        8080
    }

    fn default_tempo_bin() -> String {
        "/tempo".into()
    }

    fn default_tempo_config_path() -> String {
        "/etc/tempo/tempo.yaml".into()
    }

    fn default_storage_local_path() -> String {
        "/traces".into()
    }

    fn default_storage_wal_path() -> String {
        "/etc/tempo/wal".into()
    }

    fn default_tls_cert_path() -> String {
        "/etc/tempo/tls/server.crt".into()
    }

    fn default_tls_key_path() -> String {
        "/etc/tempo/tls/server.key".into()
    }

    fn default_tls_ca_path() -> String {
        "/etc/tempo/tls/ca.crt".into()
    }
}
