//! Restart/reconciliation controller.
//!
//! The on-disk config document and the workload process are the only mutable
//! shared state in the system, and both are owned exclusively by the
//! [`Reconciler`]; no other component reads or writes them.

use std::time::Duration;

use anyhow::Result;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;

use crate::error::ReconcileError;
use crate::tempo::{TempoConfig, TlsMaterial};

/// Handle to the external workload process.
#[async_trait::async_trait]
pub trait Workload: Send + Sync {
    /// Whether the workload environment is reachable at all.
    async fn can_connect(&self) -> bool;
    /// The config document as it currently exists on disk, if any.
    async fn read_config(&self) -> Result<Option<String>>;
    /// Durably write the given config document.
    async fn push_config(&self, config: &str) -> Result<()>;
    /// Write the workload's TLS material to its expected paths.
    async fn push_tls(&self, material: &TlsMaterial) -> Result<()>;
    /// Select the process target for the next (re)start.
    async fn set_target(&self, target: WorkloadTarget);
    /// Stop-then-start the workload process, or start it if not running.
    async fn restart(&self) -> Result<()>;
    /// Stop the workload process. A no-op if already stopped.
    async fn stop(&self) -> Result<()>;
    /// Whether the workload's own readiness check reports ready.
    async fn is_ready(&self) -> bool;
}

/// The process target a workload node runs as.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkloadTarget {
    /// Run every role in-process.
    Monolith,
    /// Coordinate an external worker cluster.
    Coordinator,
}

impl WorkloadTarget {
    /// The value passed to the workload's `-target` flag.
    pub fn flag(&self) -> &'static str {
        match self {
            Self::Monolith => "all",
            Self::Coordinator => "scalable-single-binary",
        }
    }
}

/// Outcome of one reconciliation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileResult {
    /// The on-disk config already matches; nothing was done.
    Unchanged,
    /// The config changed but the workload is unreachable; the caller must
    /// retry on the next lifecycle signal.
    DeferredRetry,
    /// The config was pushed and the workload restarted.
    Restarted {
        /// Whether the workload reported ready after the restart. A workload
        /// that started but is not yet serving is not a failure.
        ready: bool,
    },
}

/// The retry policy applied to workload restarts.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub multiplier: f64,
    pub max_interval: Duration,
    pub max_attempts: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(3),
            multiplier: 2.0,
            max_interval: Duration::from_secs(40),
            max_attempts: 20,
        }
    }
}

impl RetryPolicy {
    /// Build the backoff source for one restart operation.
    ///
    /// Randomization is disabled so the delay curve is exact.
    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.initial_interval,
            initial_interval: self.initial_interval,
            randomization_factor: 0.0,
            multiplier: self.multiplier,
            max_interval: self.max_interval,
            max_elapsed_time: None,
            ..Default::default()
        }
    }

    /// The delay schedule this policy produces, one entry per retry.
    pub fn delays(&self) -> Vec<Duration> {
        let mut backoff = self.backoff();
        (0..self.max_attempts.saturating_sub(1)).filter_map(|_| backoff.next_backoff()).collect()
    }
}

/// Readiness probe bounds applied after a successful restart.
#[derive(Clone, Debug)]
pub struct ReadinessProbe {
    pub attempts: usize,
    pub interval: Duration,
}

impl Default for ReadinessProbe {
    fn default() -> Self {
        Self {
            attempts: 10,
            interval: Duration::from_secs(1),
        }
    }
}

/// Reconciles generated config documents against the running workload.
pub struct Reconciler<W> {
    workload: W,
    retry: RetryPolicy,
    probe: ReadinessProbe,
}

impl<W: Workload> Reconciler<W> {
    /// Create a new instance with the default retry policy.
    pub fn new(workload: W) -> Self {
        Self {
            workload,
            retry: RetryPolicy::default(),
            probe: ReadinessProbe::default(),
        }
    }

    /// Create a new instance with explicit retry and probe bounds.
    pub fn with_policies(workload: W, retry: RetryPolicy, probe: ReadinessProbe) -> Self {
        Self { workload, retry, probe }
    }

    /// The workload handle owned by this reconciler.
    pub fn workload(&self) -> &W {
        &self.workload
    }

    /// Reconcile the given document against the workload.
    ///
    /// The comparison runs against what is durably on disk, never an
    /// in-memory guess, so calling this twice with the same document is a
    /// no-op the second time even while the first restart is still settling.
    #[tracing::instrument(level = "debug", skip(self, new_config))]
    pub async fn reconcile(&self, new_config: &TempoConfig) -> Result<ReconcileResult, ReconcileError> {
        let rendered = new_config.to_yaml().map_err(ReconcileError::Render)?;

        if !self.workload.can_connect().await {
            tracing::debug!("workload not yet reachable, deferring reconciliation");
            return Ok(ReconcileResult::DeferredRetry);
        }

        let current = self.workload.read_config().await.map_err(ReconcileError::Workload)?;
        if current.as_deref() == Some(rendered.as_str()) {
            tracing::debug!("workload config unchanged");
            return Ok(ReconcileResult::Unchanged);
        }

        self.workload.push_config(&rendered).await.map_err(ReconcileError::Workload)?;
        self.restart_with_retry().await?;
        let ready = self.await_ready().await;
        tracing::info!(ready, "workload config pushed and workload restarted");
        Ok(ReconcileResult::Restarted { ready })
    }

    /// Restart the workload, retrying transient failures with backoff.
    async fn restart_with_retry(&self) -> Result<(), ReconcileError> {
        let mut backoff = self.retry.backoff();
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.workload.restart().await {
                Ok(()) => return Ok(()),
                Err(source) if attempts >= self.retry.max_attempts => {
                    return Err(ReconcileError::RestartAttemptsExhausted { attempts, source });
                }
                Err(err) => {
                    // Transient failures are expected here, e.g. the old
                    // process still holding its ports.
                    let delay = backoff.next_backoff().unwrap_or(self.retry.max_interval);
                    tracing::warn!(error = ?err, attempt = attempts, delay_ms = %delay.as_millis(), "workload restart failed, retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Poll the workload's readiness endpoint after a restart.
    async fn await_ready(&self) -> bool {
        for _ in 0..self.probe.attempts {
            if self.workload.is_ready().await {
                return true;
            }
            tokio::time::sleep(self.probe.interval).await;
        }
        false
    }
}
