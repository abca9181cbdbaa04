//! Protocol negotiation for tracing consumers.
//!
//! Each connected consumer is snapshotted into one [`RelationRequest`] at the
//! start of a reconciliation pass; the aggregate of all requests decides
//! which receivers the workload activates. Requests are never persisted, only
//! their effect on the rendered config is.

use serde::{Deserialize, Serialize};

use tempo_core::{ReceiverProtocol, ReceiverSet, TransportProtocol, LEGACY_RECEIVER_PROTOCOLS};

/// Protocols the operator itself always needs.
///
/// The operator's own spans are shipped over OTLP gRPC, so that receiver is
/// active even with no consumers connected.
pub fn self_needs() -> ReceiverSet {
    [ReceiverProtocol::OtlpGrpc].into_iter().collect()
}

/// One connected tracing consumer, snapshotted at the start of a pass.
///
/// A consumer is treated as legacy if and only if it publishes no explicit
/// receiver list: the presence of that list is the v2 version marker.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum RelationRequest {
    /// A v2 consumer with an explicit receiver list.
    ///
    /// Names are kept raw: consumers on newer or older protocol versions may
    /// request receivers this catalog does not know about.
    V2 { receivers: Vec<String> },
    /// A v0/v1 consumer. Carries no receiver list and implies the whole
    /// legacy bundle.
    Legacy,
}

/// Compute the set of receivers to activate for the given requests.
///
/// Pure union over the inputs: the order of requests never affects the
/// result, and unknown protocol names are dropped rather than rejected,
/// since version skew across consumers is an expected state.
pub fn aggregate(requests: &[RelationRequest], self_needs: &ReceiverSet) -> ReceiverSet {
    let mut active = self_needs.clone();
    let mut legacy = false;
    for request in requests {
        match request {
            RelationRequest::V2 { receivers } => {
                for name in receivers {
                    match name.parse::<ReceiverProtocol>() {
                        Ok(proto) => {
                            active.insert(proto);
                        }
                        Err(err) => tracing::debug!(%err, "dropping unsupported receiver request"),
                    }
                }
            }
            RelationRequest::Legacy => legacy = true,
        }
    }
    if legacy {
        // All or nothing: one legacy consumer activates the whole bundle.
        active.extend(LEGACY_RECEIVER_PROTOCOLS);
    }
    active
}

/// The publication payload for one active receiver.
///
/// URL composition is left to the ingress layer; the operator only publishes
/// the protocol, its port and its transport.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct ReceiverEndpoint {
    pub protocol: ReceiverProtocol,
    pub port: u16,
    pub transport: TransportProtocol,
}

/// Build the publication payload for the given active set.
pub fn receiver_endpoints(active: &ReceiverSet) -> Vec<ReceiverEndpoint> {
    active
        .iter()
        .map(|proto| ReceiverEndpoint {
            protocol: *proto,
            port: proto.default_port(),
            transport: proto.transport(),
        })
        .collect()
}
