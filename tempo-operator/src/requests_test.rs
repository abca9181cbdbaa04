use crate::requests::*;
use tempo_core::{ReceiverProtocol, ReceiverSet, TransportProtocol, LEGACY_RECEIVER_PROTOCOLS};

fn v2(receivers: &[&str]) -> RelationRequest {
    RelationRequest::V2 {
        receivers: receivers.iter().map(|name| name.to_string()).collect(),
    }
}

fn set(protos: &[ReceiverProtocol]) -> ReceiverSet {
    protos.iter().copied().collect()
}

#[test]
fn explicit_request_matching_self_needs_yields_single_receiver() {
    let requests = vec![v2(&["otlp_http"])];
    let needs = set(&[ReceiverProtocol::OtlpHttp]);

    let active = aggregate(&requests, &needs);

    let expected = set(&[ReceiverProtocol::OtlpHttp]);
    assert!(active == expected, "unexpected active set, got {:?}, expected {:?}", active, expected);
}

#[test]
fn legacy_request_activates_whole_bundle() {
    let active = aggregate(&[RelationRequest::Legacy], &ReceiverSet::new());

    let expected: ReceiverSet = LEGACY_RECEIVER_PROTOCOLS.into_iter().collect();
    assert!(active == expected, "unexpected active set, got {:?}, expected {:?}", active, expected);
}

#[test]
fn many_legacy_requests_contribute_the_same_bundle_as_one() {
    let one = aggregate(&[RelationRequest::Legacy], &ReceiverSet::new());
    let many = aggregate(&[RelationRequest::Legacy, RelationRequest::Legacy, RelationRequest::Legacy], &ReceiverSet::new());

    assert!(one == many, "legacy bundle contribution differs between 1 and N requests, got {:?} and {:?}", one, many);
}

#[test]
fn unsupported_protocol_names_are_dropped() {
    let requests = vec![v2(&["otlp_http", "quic_dump", "smoke_signals"])];

    let active = aggregate(&requests, &ReceiverSet::new());

    let expected = set(&[ReceiverProtocol::OtlpHttp]);
    assert!(active == expected, "unexpected active set, got {:?}, expected {:?}", active, expected);
}

#[test]
fn deprecated_aliases_canonicalize() {
    let requests = vec![v2(&["tempo", "jaeger_http_thrift"])];

    let active = aggregate(&requests, &ReceiverSet::new());

    let expected = set(&[ReceiverProtocol::TempoHttp, ReceiverProtocol::JaegerThriftHttp]);
    assert!(active == expected, "unexpected active set, got {:?}, expected {:?}", active, expected);
}

#[test]
fn aggregation_is_order_independent() {
    let a = v2(&["otlp_grpc", "zipkin"]);
    let b = v2(&["jaeger_grpc"]);
    let c = RelationRequest::Legacy;
    let needs = set(&[ReceiverProtocol::OtlpGrpc]);

    let forward = aggregate(&[a.clone(), b.clone(), c.clone()], &needs);
    let backward = aggregate(&[c, b, a], &needs);

    assert!(forward == backward, "aggregation depends on request order, got {:?} and {:?}", forward, backward);
}

#[test]
fn aggregation_is_idempotent() {
    let requests = vec![v2(&["otlp_http", "zipkin"]), RelationRequest::Legacy];
    let needs = self_needs();

    let first = aggregate(&requests, &needs);
    let second = aggregate(&requests, &needs);

    assert!(first == second, "aggregation is not referentially transparent, got {:?} and {:?}", first, second);
}

#[test]
fn explicit_and_legacy_overlap_yields_single_entry() {
    // otlp_grpc is in the legacy bundle and explicitly requested; sets, not
    // multisets.
    let requests = vec![v2(&["otlp_grpc"]), RelationRequest::Legacy];

    let active = aggregate(&requests, &ReceiverSet::new());

    let expected: ReceiverSet = LEGACY_RECEIVER_PROTOCOLS.into_iter().collect();
    assert!(active == expected, "unexpected active set, got {:?}, expected {:?}", active, expected);
}

#[test]
fn endpoints_carry_catalog_ports_and_transports() {
    let active = set(&[ReceiverProtocol::OtlpGrpc, ReceiverProtocol::Zipkin]);

    let endpoints = receiver_endpoints(&active);

    assert!(endpoints.len() == 2, "unexpected endpoint count, got {}, expected {}", endpoints.len(), 2);
    let otlp = &endpoints[0];
    assert!(otlp.protocol == ReceiverProtocol::OtlpGrpc, "unexpected protocol ordering, got {:?}", otlp.protocol);
    assert!(otlp.port == 4317, "unexpected otlp_grpc port, got {}, expected {}", otlp.port, 4317);
    assert!(otlp.transport == TransportProtocol::Grpc, "unexpected otlp_grpc transport, got {:?}", otlp.transport);
    let zipkin = &endpoints[1];
    assert!(zipkin.port == 9411, "unexpected zipkin port, got {}, expected {}", zipkin.port, 9411);
    assert!(zipkin.transport == TransportProtocol::Http, "unexpected zipkin transport, got {:?}", zipkin.transport);
}
