//! Receiver protocol catalog.
//!
//! Every protocol name used anywhere in the system must resolve against this
//! catalog; names which do not are rejected at the parse boundary.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::UnknownProtocol;

/// A set of receiver protocols.
///
/// `BTreeSet` so that iteration order is stable and downstream rendering is
/// deterministic regardless of insertion order.
pub type ReceiverSet = BTreeSet<ReceiverProtocol>;

/// The protocols which older v0/v1 consumers assume are always active.
///
/// Activation is all or nothing: as soon as one legacy consumer is connected,
/// the whole bundle must be served.
pub const LEGACY_RECEIVER_PROTOCOLS: [ReceiverProtocol; 6] = [
    ReceiverProtocol::TempoHttp,
    ReceiverProtocol::OtlpGrpc,
    ReceiverProtocol::OtlpHttp,
    ReceiverProtocol::Zipkin,
    ReceiverProtocol::JaegerThriftHttp,
    ReceiverProtocol::JaegerGrpc,
];

/// A trace ingestion protocol which the Tempo workload can accept spans over.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReceiverProtocol {
    /// OTLP over gRPC.
    OtlpGrpc,
    /// OTLP over HTTP.
    OtlpHttp,
    /// Zipkin's HTTP span ingestion API.
    Zipkin,
    /// The OpenCensus gRPC receiver.
    Opencensus,
    /// Jaeger's gRPC span ingestion API.
    JaegerGrpc,
    /// Jaeger thrift over HTTP.
    #[serde(alias = "jaeger_http_thrift")]
    JaegerThriftHttp,
    /// Jaeger thrift in binary encoding.
    JaegerThriftBinary,
    /// Jaeger thrift in compact encoding.
    JaegerThriftCompact,
    /// Tempo's own HTTP API, served by the server block directly.
    #[serde(alias = "tempo")]
    TempoHttp,
    /// Tempo's own gRPC API, served by the server block directly.
    TempoGrpc,
}

impl ReceiverProtocol {
    /// Every protocol in the catalog.
    pub const ALL: [ReceiverProtocol; 10] = [
        Self::OtlpGrpc,
        Self::OtlpHttp,
        Self::Zipkin,
        Self::Opencensus,
        Self::JaegerGrpc,
        Self::JaegerThriftHttp,
        Self::JaegerThriftBinary,
        Self::JaegerThriftCompact,
        Self::TempoHttp,
        Self::TempoGrpc,
    ];

    /// The default port the workload listens on for this protocol.
    ///
    /// Ports source: the upstream Tempo docker-compose examples. The tempo
    /// HTTP/gRPC ports mirror the server listen ports.
    pub fn default_port(&self) -> u16 {
        match self {
            Self::OtlpGrpc => 4317,
            Self::OtlpHttp => 4318,
            Self::Zipkin => 9411,
            Self::Opencensus => 55678,
            Self::JaegerGrpc => 14250,
            Self::JaegerThriftHttp => 14268,
            Self::JaegerThriftBinary => 6832,
            Self::JaegerThriftCompact => 6831,
            Self::TempoHttp => 3200,
            Self::TempoGrpc => 9096,
        }
    }

    /// The wire transport family of this protocol.
    pub fn transport(&self) -> TransportProtocol {
        match self {
            Self::OtlpGrpc | Self::Opencensus | Self::JaegerGrpc | Self::TempoGrpc => TransportProtocol::Grpc,
            Self::OtlpHttp
            | Self::Zipkin
            | Self::JaegerThriftHttp
            | Self::JaegerThriftBinary
            | Self::JaegerThriftCompact
            | Self::TempoHttp => TransportProtocol::Http,
        }
    }

    /// The canonical wire name of this protocol.
    pub fn name(&self) -> &'static str {
        match self {
            Self::OtlpGrpc => "otlp_grpc",
            Self::OtlpHttp => "otlp_http",
            Self::Zipkin => "zipkin",
            Self::Opencensus => "opencensus",
            Self::JaegerGrpc => "jaeger_grpc",
            Self::JaegerThriftHttp => "jaeger_thrift_http",
            Self::JaegerThriftBinary => "jaeger_thrift_binary",
            Self::JaegerThriftCompact => "jaeger_thrift_compact",
            Self::TempoHttp => "tempo_http",
            Self::TempoGrpc => "tempo_grpc",
        }
    }
}

impl fmt::Display for ReceiverProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ReceiverProtocol {
    type Err = UnknownProtocol;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let proto = match s {
            "otlp_grpc" => Self::OtlpGrpc,
            "otlp_http" => Self::OtlpHttp,
            "zipkin" => Self::Zipkin,
            "opencensus" => Self::Opencensus,
            "jaeger_grpc" => Self::JaegerGrpc,
            "jaeger_thrift_http" => Self::JaegerThriftHttp,
            "jaeger_thrift_binary" => Self::JaegerThriftBinary,
            "jaeger_thrift_compact" => Self::JaegerThriftCompact,
            "tempo_http" => Self::TempoHttp,
            "tempo_grpc" => Self::TempoGrpc,
            // Deprecated aliases kept for backwards compatibility with
            // older consumers.
            "tempo" => {
                tracing::warn!("receiver protocol name `tempo` is deprecated, use `tempo_http`");
                Self::TempoHttp
            }
            "jaeger_http_thrift" => {
                tracing::warn!("receiver protocol name `jaeger_http_thrift` is deprecated, use `jaeger_thrift_http`");
                Self::JaegerThriftHttp
            }
            _ => return Err(UnknownProtocol(s.into())),
        };
        Ok(proto)
    }
}

/// The wire transport family of a receiver protocol.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TransportProtocol {
    Http,
    Grpc,
}

impl fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Http => "http",
                Self::Grpc => "grpc",
            }
        )
    }
}
