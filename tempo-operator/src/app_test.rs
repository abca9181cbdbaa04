use anyhow::Result;

use crate::app::{run_pass, ReconcileEvent, StatusUpdate};
use crate::coordinator::WorkerDeclaration;
use crate::fixtures::{fast_probe, fast_retry, s3_remote_data, test_config, MockWorkload};
use crate::reconcile::{Reconciler, WorkloadTarget};
use crate::requests::RelationRequest;
use crate::tempo::Tempo;
use tempo_core::{ReceiverProtocol, Role};

fn reconciler(workload: MockWorkload) -> Reconciler<MockWorkload> {
    Reconciler::with_policies(workload, fast_retry(20), fast_probe())
}

fn monolith_event() -> ReconcileEvent {
    ReconcileEvent {
        is_worker_node: true,
        ..Default::default()
    }
}

#[tokio::test]
async fn inconsistent_deployment_blocks_and_stops_the_workload() -> Result<()> {
    let tempo = Tempo::new(test_config());
    let reconciler = reconciler(MockWorkload::connectable());
    // Scaled out with no object storage.
    let event = ReconcileEvent {
        is_worker_node: true,
        peer_units: 2,
        ..Default::default()
    };

    let outcome = run_pass(&tempo, &reconciler, &event).await?;

    assert!(
        outcome.status == StatusUpdate::Blocked { violations: vec!["scaled without object storage".into()] },
        "unexpected status, got {:?}",
        outcome.status
    );
    assert!(outcome.receivers.is_empty(), "a blocked pass must publish no receivers, got {:?}", outcome.receivers);
    assert!(outcome.worker_config.is_none(), "a blocked pass must publish no worker config");
    assert!(reconciler.workload().stop_count() == 1, "the workload must be stopped while blocked");
    assert!(reconciler.workload().restart_count() == 0, "a blocked pass must not restart the workload");
    Ok(())
}

#[tokio::test]
async fn consistent_monolith_reconciles_and_publishes_receivers() -> Result<()> {
    let tempo = Tempo::new(test_config());
    let reconciler = reconciler(MockWorkload::connectable());

    let outcome = run_pass(&tempo, &reconciler, &monolith_event()).await?;

    match &outcome.status {
        StatusUpdate::Active { receivers, ready } => {
            assert!(*ready, "expected a ready workload");
            // Self-monitoring keeps otlp_grpc active with no consumers.
            assert!(
                receivers.iter().any(|endpoint| endpoint.protocol == ReceiverProtocol::OtlpGrpc),
                "expected the self-monitoring receiver, got {:?}",
                receivers
            );
        }
        other => panic!("unexpected status, got {:?}", other),
    }
    assert!(outcome.worker_config.is_none(), "a monolith publishes no worker config");
    assert!(
        *reconciler.workload().target.lock().unwrap() == Some(WorkloadTarget::Monolith),
        "unexpected workload target, got {:?}",
        reconciler.workload().target.lock().unwrap()
    );
    assert!(reconciler.workload().restart_count() == 1, "the first pass must restart the workload");
    Ok(())
}

#[tokio::test]
async fn clustered_pass_distributes_worker_config() -> Result<()> {
    let tempo = Tempo::new(test_config());
    let reconciler = reconciler(MockWorkload::connectable());
    let event = ReconcileEvent {
        requests: vec![RelationRequest::V2 {
            receivers: vec!["otlp_http".into()],
        }],
        workers: vec![WorkerDeclaration {
            role: Role::Monolithic,
            units: 3,
            addresses: vec!["10.0.0.2".into(), "10.0.0.3".into(), "10.0.0.4".into()],
        }],
        peers: vec!["10.0.0.2".into(), "10.0.0.3".into(), "10.0.0.4".into()],
        s3: Some(s3_remote_data()),
        ..Default::default()
    };

    let outcome = run_pass(&tempo, &reconciler, &event).await?;

    assert!(matches!(outcome.status, StatusUpdate::Active { .. }), "unexpected status, got {:?}", outcome.status);
    let worker_config = outcome.worker_config.expect("a clustered pass must publish a worker config");
    assert!(worker_config.contains("backend: s3"), "worker config must carry the s3 backend:\n{}", worker_config);
    assert!(worker_config.contains("join_members"), "worker config must carry the memberlist:\n{}", worker_config);
    assert!(
        *reconciler.workload().target.lock().unwrap() == Some(WorkloadTarget::Coordinator),
        "unexpected workload target, got {:?}",
        reconciler.workload().target.lock().unwrap()
    );
    Ok(())
}

#[tokio::test]
async fn unreachable_workload_yields_waiting_status() -> Result<()> {
    let tempo = Tempo::new(test_config());
    let reconciler = reconciler(MockWorkload::unreachable());

    let outcome = run_pass(&tempo, &reconciler, &monolith_event()).await?;

    assert!(
        matches!(outcome.status, StatusUpdate::Waiting { .. }),
        "unexpected status, got {:?}",
        outcome.status
    );
    assert!(reconciler.workload().restart_count() == 0, "an unreachable workload must not be restarted");
    Ok(())
}

#[tokio::test]
async fn incomplete_s3_credentials_leave_the_deployment_inconsistent() -> Result<()> {
    let tempo = Tempo::new(test_config());
    let reconciler = reconciler(MockWorkload::connectable());
    let mut s3 = s3_remote_data();
    s3.secret_key = None;
    let event = ReconcileEvent {
        is_worker_node: true,
        peer_units: 1,
        s3: Some(s3),
        ..Default::default()
    };

    let outcome = run_pass(&tempo, &reconciler, &event).await?;

    assert!(
        outcome.status == StatusUpdate::Blocked { violations: vec!["scaled without object storage".into()] },
        "incomplete credentials must not count as object storage, got {:?}",
        outcome.status
    );
    Ok(())
}

#[test]
fn status_serializes_with_a_state_tag() -> Result<()> {
    let status = StatusUpdate::Blocked {
        violations: vec!["scaled without object storage".into()],
    };

    let value = serde_json::to_value(&status)?;

    assert!(value["state"] == "blocked", "unexpected state tag, got {}", value);
    assert!(
        value["violations"][0] == "scaled without object storage",
        "violations must be surfaced verbatim, got {}",
        value
    );
    Ok(())
}

#[tokio::test]
async fn tls_material_is_pushed_before_reconfiguration() -> Result<()> {
    let tempo = Tempo::new(test_config());
    let reconciler = reconciler(MockWorkload::connectable());
    let event = ReconcileEvent {
        tls: Some(crate::fixtures::tls_material()),
        ..monolith_event()
    };

    let outcome = run_pass(&tempo, &reconciler, &event).await?;

    assert!(matches!(outcome.status, StatusUpdate::Active { .. }), "unexpected status, got {:?}", outcome.status);
    assert!(reconciler.workload().tls.lock().unwrap().is_some(), "TLS material must reach the workload");
    let stored = reconciler.workload().stored.lock().unwrap().clone().unwrap_or_default();
    assert!(stored.contains("http_tls_config"), "the pushed config must carry server TLS:\n{}", stored);
    Ok(())
}
