//! The operator application.
//!
//! Single-threaded, event-driven, run-to-completion: each reconciliation
//! pass is triggered by one external signal and runs start-to-finish, always
//! over the most recent facts snapshot. Passes never overlap.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::stream::StreamExt;
use serde::Serialize;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::{BroadcastStream, ReceiverStream, SignalStream};
use tokio_stream::StreamMap;

use crate::config::Config;
use crate::coordinator::{aggregate_roles, check, frontend_address, gather_addresses, DeploymentFacts, RawS3Credentials, WorkerDeclaration};
use crate::error::ReconcileError;
use crate::reconcile::{ReconcileResult, Reconciler, Workload, WorkloadTarget};
use crate::requests::{aggregate, receiver_endpoints, self_needs, ReceiverEndpoint, RelationRequest};
use crate::server::spawn_status_server;
use crate::tempo::{GenerateParams, Tempo, TlsMaterial};
use crate::workload::LocalWorkload;
use tempo_core::ReceiverSet;

/// The interval between periodic re-checks of the current snapshot.
const RECHECK_INTERVAL: Duration = Duration::from_secs(60);

const METRIC_RECONCILE_PASSES: &str = "tempo_operator_reconcile_passes";
const METRIC_WORKLOAD_RESTARTS: &str = "tempo_operator_workload_restarts";
const METRIC_DEFERRED_PASSES: &str = "tempo_operator_deferred_passes";
const METRIC_CONSISTENCY_FAILURES: &str = "tempo_operator_consistency_failures";

/// A snapshot of all external facts a reconciliation pass runs over.
///
/// Assembled by the integration layer and recomputed fresh for every event;
/// the operator never caches one beyond the pass that replaces it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReconcileEvent {
    /// Tracing consumer requests, one per connected consumer.
    pub requests: Vec<RelationRequest>,
    /// Connected worker applications.
    pub workers: Vec<WorkerDeclaration>,
    /// The number of peer replicas of this node.
    pub peer_units: usize,
    /// Addresses to join for cluster membership.
    pub peers: Vec<String>,
    /// Raw object storage credentials, if a storage integration is present.
    pub s3: Option<RawS3Credentials>,
    /// TLS material for the workload, if a certificates integration is present.
    pub tls: Option<TlsMaterial>,
    /// Whether this node runs worker duties itself.
    pub is_worker_node: bool,
}

/// Operator status, published for the status-reporting layer.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StatusUpdate {
    /// No pass has completed yet.
    Starting,
    /// The deployment is consistent and the workload is configured.
    Active { receivers: Vec<ReceiverEndpoint>, ready: bool },
    /// Consistency violations keep the workload stopped.
    Blocked { violations: Vec<String> },
    /// Waiting on the workload to become reachable.
    Waiting { reason: String },
}

/// The outputs of one reconciliation pass.
#[derive(Clone, Debug, PartialEq)]
pub struct PassOutcome {
    pub status: StatusUpdate,
    /// Receiver endpoints to publish back to v2 consumers.
    pub receivers: Vec<ReceiverEndpoint>,
    /// Rendered workload config for worker distribution, when clustered.
    pub worker_config: Option<String>,
}

/// Channels connecting the app to the integration layer.
pub struct AppChannels {
    /// Feed of fact snapshots into the app.
    pub events_tx: mpsc::Sender<ReconcileEvent>,
    /// Published operator status.
    pub status_rx: watch::Receiver<StatusUpdate>,
    /// Published receiver endpoints for v2 consumers.
    pub receivers_rx: watch::Receiver<Vec<ReceiverEndpoint>>,
    /// Published workload config for worker distribution.
    pub worker_config_rx: watch::Receiver<Option<String>>,
}

/// The application object for when the operator is running as a daemon.
pub struct App {
    /// The application's runtime config.
    _config: Arc<Config>,
    /// The workload config generator.
    tempo: Tempo,
    /// The reconciliation controller.
    reconciler: Reconciler<LocalWorkload>,

    /// The most recent facts snapshot.
    current: Option<ReconcileEvent>,
    /// Inbound snapshots from the integration layer.
    events_rx: ReceiverStream<ReconcileEvent>,

    /// Published operator status.
    status_tx: watch::Sender<StatusUpdate>,
    /// Published receiver endpoints.
    receivers_tx: watch::Sender<Vec<ReceiverEndpoint>>,
    /// Published workload config for workers.
    worker_config_tx: watch::Sender<Option<String>>,

    /// A channel used for triggering graceful shutdown.
    shutdown_tx: broadcast::Sender<()>,
    /// A channel used for triggering graceful shutdown.
    shutdown_rx: BroadcastStream<()>,

    /// The join handle of the status/metrics server.
    server: JoinHandle<Result<()>>,
}

impl App {
    /// Create a new instance.
    pub fn new(config: Arc<Config>) -> Result<(Self, AppChannels)> {
        metrics::register_counter!(METRIC_RECONCILE_PASSES, metrics::Unit::Count, "reconciliation passes run");
        metrics::register_counter!(METRIC_WORKLOAD_RESTARTS, metrics::Unit::Count, "workload restarts performed");
        metrics::register_counter!(METRIC_DEFERRED_PASSES, metrics::Unit::Count, "passes deferred on an unreachable workload");
        metrics::register_counter!(METRIC_CONSISTENCY_FAILURES, metrics::Unit::Count, "passes blocked on deployment inconsistencies");

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (events_tx, events_rx) = mpsc::channel(1000);
        let (status_tx, status_rx) = watch::channel(StatusUpdate::Starting);
        let (receivers_tx, receivers_rx) = watch::channel(Vec::new());
        let (worker_config_tx, worker_config_rx) = watch::channel(None);

        let reconciler = Reconciler::new(LocalWorkload::new(config.clone()));
        let server = spawn_status_server(&config, status_rx.clone(), shutdown_tx.subscribe());

        Ok((
            Self {
                tempo: Tempo::new(config.clone()),
                _config: config,
                reconciler,
                current: None,
                events_rx: ReceiverStream::new(events_rx),
                status_tx,
                receivers_tx,
                worker_config_tx,
                shutdown_rx: BroadcastStream::new(shutdown_rx),
                shutdown_tx,
                server,
            },
            AppChannels {
                events_tx,
                status_rx,
                receivers_rx,
                worker_config_rx,
            },
        ))
    }

    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) -> Result<()> {
        let mut signals = StreamMap::new();
        signals.insert("sigterm", SignalStream::new(signal(SignalKind::terminate()).context("error building signal stream")?));
        signals.insert("sigint", SignalStream::new(signal(SignalKind::interrupt()).context("error building signal stream")?));
        let mut recheck = tokio::time::interval(RECHECK_INTERVAL);

        if let Some(version) = self.reconciler.workload().version().await {
            tracing::info!(%version, "detected workload version");
        }
        tracing::info!("tempo operator initialized");
        let run_res = loop {
            tokio::select! {
                Some(event) = self.events_rx.next() => {
                    self.current = Some(event);
                    if let Err(err) = self.pass().await {
                        break Err(err);
                    }
                }
                _ = recheck.tick() => {
                    if let Err(err) = self.pass().await {
                        break Err(err);
                    }
                }
                Some((_, sig)) = signals.next() => {
                    tracing::debug!(signal = ?sig, "signal received, beginning graceful shutdown");
                    let _ = self.shutdown_tx.send(());
                    break Ok(());
                }
                _ = self.shutdown_rx.next() => break Ok(()),
            }
        };

        // Begin shutdown routine.
        tracing::debug!("tempo operator shutting down");
        let _ = self.shutdown_tx.send(());
        if let Err(err) = self.server.await.context("error joining status server handle").and_then(|res| res) {
            tracing::error!(error = ?err, "error shutting down status server");
        }

        tracing::debug!("tempo operator shutdown complete");
        run_res
    }

    /// Run one reconciliation pass over the most recent snapshot.
    async fn pass(&mut self) -> Result<()> {
        let event = match &self.current {
            Some(event) => event,
            None => return Ok(()),
        };
        match run_pass(&self.tempo, &self.reconciler, event).await {
            Ok(outcome) => {
                let _res = self.receivers_tx.send(outcome.receivers.clone());
                let _res = self.worker_config_tx.send(outcome.worker_config.clone());
                let _res = self.status_tx.send(outcome.status);
                Ok(())
            }
            Err(err @ ReconcileError::RestartAttemptsExhausted { .. }) => {
                // A persistent environment problem; the caller must see this.
                Err(err).context("fatal reconciliation failure")
            }
            Err(err) => {
                tracing::error!(error = ?err, "error during reconciliation pass");
                Ok(())
            }
        }
    }
}

/// Run one reconciliation pass over the given snapshot.
///
/// Config generation and diffing always complete before any restart decision
/// is made; the workload is never restarted speculatively.
pub async fn run_pass<W: Workload>(tempo: &Tempo, reconciler: &Reconciler<W>, event: &ReconcileEvent) -> Result<PassOutcome, ReconcileError> {
    metrics::increment_counter!(METRIC_RECONCILE_PASSES);

    let s3 = event.s3.as_ref().and_then(RawS3Credentials::validate);
    let roles = aggregate_roles(&event.workers, event.is_worker_node);
    let facts = DeploymentFacts {
        has_object_storage: s3.is_some(),
        is_horizontally_scaled: event.peer_units > 0,
        is_clustered: !event.workers.is_empty(),
        is_worker_node: event.is_worker_node,
        cluster_role_counts: roles.counts.clone(),
    };

    let violations = check(&facts);
    if !violations.is_empty() {
        metrics::increment_counter!(METRIC_CONSISTENCY_FAILURES);
        // The workload stays down while the deployment is unsound; this is
        // re-checked on every pass, not just once.
        reconciler.workload().stop().await.map_err(ReconcileError::Workload)?;
        tracing::warn!(violations = ?violations, "deployment is inconsistent, workload blocked");
        return Ok(PassOutcome {
            status: StatusUpdate::Blocked { violations },
            receivers: Vec::new(),
            worker_config: None,
        });
    }
    if !roles.is_recommended {
        tracing::info!("deployment is consistent but below the recommended role allocation");
    }

    let needs = if tempo.runtime_config().self_monitoring { self_needs() } else { ReceiverSet::new() };
    let active = aggregate(&event.requests, &needs);
    if active.is_empty() {
        // Valid but degenerate: the workload runs with nothing to ingest.
        tracing::warn!("no receivers active, workload is up but not functional");
    }
    let receivers = receiver_endpoints(&active);

    if let Some(material) = &event.tls {
        reconciler.workload().push_tls(material).await.map_err(ReconcileError::Workload)?;
    }
    let target = if facts.is_clustered { WorkloadTarget::Coordinator } else { WorkloadTarget::Monolith };
    reconciler.workload().set_target(target).await;

    // Cluster membership spans this node's replicas and every worker unit.
    let mut peers = event.peers.clone();
    peers.extend(gather_addresses(&event.workers));
    let frontend = frontend_address(&event.workers).map(|addr| format!("{}:{}", addr, tempo.runtime_config().grpc_listen_port));
    let document = tempo.generate(&GenerateParams {
        active: &active,
        s3: s3.as_ref(),
        peers: &peers,
        tls: event.tls.as_ref(),
        frontend_address: frontend.as_deref(),
    });

    match reconciler.reconcile(&document).await? {
        ReconcileResult::DeferredRetry => {
            metrics::increment_counter!(METRIC_DEFERRED_PASSES);
            Ok(PassOutcome {
                status: StatusUpdate::Waiting {
                    reason: "workload not yet reachable".into(),
                },
                receivers,
                worker_config: None,
            })
        }
        result => {
            if matches!(result, ReconcileResult::Restarted { .. }) {
                metrics::increment_counter!(METRIC_WORKLOAD_RESTARTS);
            }
            let ready = match result {
                ReconcileResult::Restarted { ready } => ready,
                _ => reconciler.workload().is_ready().await,
            };
            let worker_config = match facts.is_clustered {
                true => Some(document.to_yaml().map_err(ReconcileError::Render)?),
                false => None,
            };
            Ok(PassOutcome {
                status: StatusUpdate::Active {
                    receivers: receivers.clone(),
                    ready,
                },
                receivers,
                worker_config,
            })
        }
    }
}
