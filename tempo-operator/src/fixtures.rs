//! Shared test fixtures.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};

use crate::config::Config;
use crate::reconcile::{ReadinessProbe, RetryPolicy, Workload, WorkloadTarget};
use crate::tempo::TlsMaterial;

/// Build a runtime config pointing at fixed throwaway paths.
pub fn test_config() -> Arc<Config> {
    Arc::new(Config {
        rust_log: "error".into(),
        http_listen_port: 3200,
        grpc_listen_port: 9096,
        metrics_port: 8080,
        hostname: "tempo-0".into(),
        self_monitoring: true,
        tempo_bin: "/tempo".into(),
        tempo_config_path: "/etc/tempo/tempo.yaml".into(),
        storage_local_path: "/traces".into(),
        storage_wal_path: "/etc/tempo/wal".into(),
        tls_cert_path: "/etc/tempo/tls/server.crt".into(),
        tls_key_path: "/etc/tempo/tls/server.key".into(),
        tls_ca_path: "/etc/tempo/tls/ca.crt".into(),
    })
}

/// Complete object storage credentials with an insecure endpoint.
pub fn s3_remote_data() -> crate::coordinator::RawS3Credentials {
    crate::coordinator::RawS3Credentials {
        bucket: Some("tempo".into()),
        endpoint: Some("http://1.2.3.4:9000".into()),
        access_key: Some("key".into()),
        secret_key: Some("soverysecret".into()),
    }
}

/// Placeholder TLS material.
pub fn tls_material() -> TlsMaterial {
    TlsMaterial {
        cert: "SERVER_CERT-foo".into(),
        key: "PRIVATE_KEY-foo".into(),
        ca: "CA_CERT-foo".into(),
    }
}

/// A retry policy with delays small enough for tests running in real time.
pub fn fast_retry(max_attempts: usize) -> RetryPolicy {
    RetryPolicy {
        initial_interval: Duration::from_millis(1),
        multiplier: 2.0,
        max_interval: Duration::from_millis(4),
        max_attempts,
    }
}

/// A readiness probe bound small enough for tests running in real time.
pub fn fast_probe() -> ReadinessProbe {
    ReadinessProbe {
        attempts: 2,
        interval: Duration::from_millis(1),
    }
}

/// An in-memory workload double recording every interaction.
#[derive(Default)]
pub struct MockWorkload {
    pub connectable: AtomicBool,
    pub ready: AtomicBool,
    /// Number of restart calls which fail before one succeeds.
    pub restart_failures: AtomicUsize,
    pub restarts: AtomicUsize,
    pub stops: AtomicUsize,
    pub stored: Mutex<Option<String>>,
    pub tls: Mutex<Option<TlsMaterial>>,
    pub target: Mutex<Option<WorkloadTarget>>,
}

impl MockWorkload {
    /// A reachable, immediately ready workload.
    pub fn connectable() -> Self {
        let workload = Self::default();
        workload.connectable.store(true, Ordering::SeqCst);
        workload.ready.store(true, Ordering::SeqCst);
        workload
    }

    /// A workload which cannot be reached at all.
    pub fn unreachable() -> Self {
        Self::default()
    }

    /// A reachable workload whose first `failures` restarts fail.
    pub fn failing_restarts(failures: usize) -> Self {
        let workload = Self::connectable();
        workload.restart_failures.store(failures, Ordering::SeqCst);
        workload
    }

    pub fn restart_count(&self) -> usize {
        self.restarts.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Workload for MockWorkload {
    async fn can_connect(&self) -> bool {
        self.connectable.load(Ordering::SeqCst)
    }

    async fn read_config(&self) -> Result<Option<String>> {
        Ok(self.stored.lock().unwrap().clone())
    }

    async fn push_config(&self, config: &str) -> Result<()> {
        *self.stored.lock().unwrap() = Some(config.to_string());
        Ok(())
    }

    async fn push_tls(&self, material: &TlsMaterial) -> Result<()> {
        *self.tls.lock().unwrap() = Some(material.clone());
        Ok(())
    }

    async fn set_target(&self, target: WorkloadTarget) {
        *self.target.lock().unwrap() = Some(target);
    }

    async fn restart(&self) -> Result<()> {
        if self.restart_failures.load(Ordering::SeqCst) > 0 {
            self.restart_failures.fetch_sub(1, Ordering::SeqCst);
            bail!("error starting workload process: port already in use");
        }
        self.restarts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}
