//! Local workload process management.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, Result};
use regex::Regex;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::config::Config;
use crate::reconcile::{Workload, WorkloadTarget};
use crate::tempo::TlsMaterial;

/// A locally supervised Tempo process.
pub struct LocalWorkload {
    config: Arc<Config>,
    /// The supervised process, if one has been started.
    child: Mutex<Option<Child>>,
    /// The target selected for the next (re)start.
    target: std::sync::Mutex<WorkloadTarget>,
    /// HTTP client used for readiness probes.
    http: reqwest::Client,
}

impl LocalWorkload {
    /// Create a new instance.
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            child: Mutex::new(None),
            target: std::sync::Mutex::new(WorkloadTarget::Monolith),
            http: reqwest::Client::new(),
        }
    }

    /// Detect the workload version from its CLI.
    pub async fn version(&self) -> Option<String> {
        let output = Command::new(&self.config.tempo_bin).arg("-version").output().await.ok()?;
        let out = String::from_utf8_lossy(&output.stdout);
        parse_version(&out)
    }

    fn current_target(&self) -> WorkloadTarget {
        match self.target.lock() {
            Ok(target) => *target,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    async fn kill_current(&self, child: &mut Option<Child>) {
        if let Some(mut proc) = child.take() {
            let _res = proc.kill().await;
            let _res = proc.wait().await;
        }
    }
}

#[async_trait::async_trait]
impl Workload for LocalWorkload {
    async fn can_connect(&self) -> bool {
        // The workload is manageable once its binary is present on disk.
        tokio::fs::metadata(&self.config.tempo_bin).await.is_ok()
    }

    async fn read_config(&self) -> Result<Option<String>> {
        match tokio::fs::read_to_string(&self.config.tempo_config_path).await {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).context("error reading workload config"),
        }
    }

    async fn push_config(&self, config: &str) -> Result<()> {
        if let Some(parent) = Path::new(&self.config.tempo_config_path).parent() {
            tokio::fs::create_dir_all(parent).await.context("error creating workload config directory")?;
        }
        tokio::fs::write(&self.config.tempo_config_path, config).await.context("error writing workload config")
    }

    async fn push_tls(&self, material: &TlsMaterial) -> Result<()> {
        for (path, pem) in [
            (&self.config.tls_cert_path, &material.cert),
            (&self.config.tls_key_path, &material.key),
            (&self.config.tls_ca_path, &material.ca),
        ] {
            if let Some(parent) = Path::new(path).parent() {
                tokio::fs::create_dir_all(parent).await.context("error creating TLS directory")?;
            }
            tokio::fs::write(path, pem).await.with_context(|| format!("error writing TLS material to {}", path))?;
        }
        Ok(())
    }

    async fn set_target(&self, target: WorkloadTarget) {
        match self.target.lock() {
            Ok(mut current) => *current = target,
            Err(poisoned) => *poisoned.into_inner() = target,
        }
    }

    async fn restart(&self) -> Result<()> {
        let mut child = self.child.lock().await;
        self.kill_current(&mut child).await;
        let target = self.current_target();
        let spawned = Command::new(&self.config.tempo_bin)
            .arg(format!("-config.file={}", self.config.tempo_config_path))
            .arg("-target")
            .arg(target.flag())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .context("error starting workload process")?;
        tracing::debug!(target = target.flag(), "workload process started");
        *child = Some(spawned);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let mut child = self.child.lock().await;
        self.kill_current(&mut child).await;
        Ok(())
    }

    async fn is_ready(&self) -> bool {
        let url = format!("http://{}:{}/ready", self.config.hostname, self.config.http_listen_port);
        match self.http.get(&url).send().await {
            Ok(response) => match response.text().await {
                Ok(body) => body.trim() == "ready",
                Err(_) => false,
            },
            Err(_) => false,
        }
    }
}

lazy_static::lazy_static! {
    static ref VERSION_FULL: Regex =
        Regex::new(r"tempo, version (.*) \(branch: (.*), revision: (.*)\)").expect("invalid workload version regex");
    static ref VERSION_HEADLESS: Regex = Regex::new(r"tempo, version (\S+)").expect("invalid workload version regex");
}

/// Parse the version string printed by `tempo -version`.
///
/// Example output:
///
/// ```text
/// tempo, version 2.3.1 (branch: HEAD, revision: fd5743d5d)
///   build user:
///   build date:
///   go version:       go1.18.5
///   platform:         linux/amd64
/// ```
pub fn parse_version(out: &str) -> Option<String> {
    if let Some(caps) = VERSION_FULL.captures(out) {
        return Some(format!("{}:{}/{}", &caps[1], &caps[2], &caps[3]));
    }
    if let Some(caps) = VERSION_HEADLESS.captures(out) {
        return Some(caps[1].to_string());
    }
    tracing::warn!("unable to determine workload version, output does not match any known pattern");
    None
}
