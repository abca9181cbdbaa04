//! Tempo workload configuration.
//!
//! Everything in this module is a pure function of its inputs: generating a
//! config twice from identical inputs yields byte-identical YAML. The
//! reconciliation controller relies on that property to decide no-op vs
//! restart.


use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use tempo_core::{ReceiverProtocol, ReceiverSet, MEMBERLIST_PORT};

// Ingestion tuning: cut the head block when it hits this number of traces
// or this much time passes.
const TRACE_IDLE_PERIOD: &str = "10s";
const MAX_BLOCK_BYTES: u64 = 100;
const MAX_BLOCK_DURATION: &str = "5m";

// Compaction tuning. Blocks within the compaction window are compacted
// together.
const COMPACTION_WINDOW: &str = "1h";
const MAX_COMPACTION_OBJECTS: u64 = 1_000_000;
const BLOCK_RETENTION: &str = "720h";
const COMPACTED_BLOCK_RETENTION: &str = "1h";
const FLUSH_SIZE_BYTES: u64 = 5_242_880;

// Storage pool tuning.
const POOL_MAX_WORKERS: u64 = 100;
const POOL_QUEUE_DEPTH: u64 = 10_000;

const TLS_MIN_VERSION: &str = "VersionTLS12";

/// TLS material for the workload, PEM encoded.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct TlsMaterial {
    pub cert: String,
    pub key: String,
    pub ca: String,
}

/// Object storage credentials, validated upstream.
///
/// Construction implies every field is present; the storage builder below is
/// total over this type and never fails.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct S3Credentials {
    pub bucket: String,
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
}

/// The inputs one config generation runs over.
#[derive(Clone, Debug)]
pub struct GenerateParams<'a> {
    /// The receivers to activate.
    pub active: &'a ReceiverSet,
    /// Object storage credentials, if configured.
    pub s3: Option<&'a S3Credentials>,
    /// Peer addresses for cluster membership.
    pub peers: &'a [String],
    /// TLS material, if the workload should serve TLS.
    pub tls: Option<&'a TlsMaterial>,
    /// The query-frontend address workers should pull queries from, if known.
    pub frontend_address: Option<&'a str>,
}

/// Generator for the Tempo workload configuration.
pub struct Tempo {
    config: Arc<Config>,
}

impl Tempo {
    /// Create a new instance.
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// The operator's runtime config.
    pub fn runtime_config(&self) -> &Config {
        &self.config
    }

    /// Generate the workload configuration for the given inputs.
    pub fn generate(&self, params: &GenerateParams) -> TempoConfig {
        TempoConfig {
            auth_enabled: false,
            search_enabled: true,
            server: ServerConfig {
                http_listen_port: self.config.http_listen_port,
                grpc_listen_port: self.config.grpc_listen_port,
                http_tls_config: params.tls.map(|_| self.server_tls()),
                grpc_tls_config: params.tls.map(|_| self.server_tls()),
            },
            distributor: DistributorConfig {
                receivers: self.render_receivers(params.active, params.tls),
            },
            ingester: IngesterConfig {
                trace_idle_period: TRACE_IDLE_PERIOD.into(),
                max_block_bytes: MAX_BLOCK_BYTES,
                max_block_duration: MAX_BLOCK_DURATION.into(),
            },
            compactor: CompactorConfig {
                compaction: CompactionConfig {
                    compaction_window: COMPACTION_WINDOW.into(),
                    max_compaction_objects: MAX_COMPACTION_OBJECTS,
                    block_retention: BLOCK_RETENTION.into(),
                    compacted_block_retention: COMPACTED_BLOCK_RETENTION.into(),
                    flush_size_bytes: FLUSH_SIZE_BYTES,
                },
            },
            storage: StorageConfig {
                trace: self.build_storage(params.s3),
            },
            memberlist: self.build_memberlist(params.peers),
            querier: params.frontend_address.map(|address| QuerierConfig {
                frontend_worker: FrontendWorkerConfig {
                    frontend_address: address.into(),
                },
            }),
        }
    }

    /// Render the receivers sub-document for the given active set.
    ///
    /// Inactive families are omitted entirely; active protocols render their
    /// TLS block when material is present and an empty placeholder otherwise.
    pub fn render_receivers(&self, active: &ReceiverSet, tls: Option<&TlsMaterial>) -> ReceiversConfig {
        let slot = || -> ReceiverSlot { tls.map(|_| self.receiver_tls()) };

        let mut receivers = ReceiversConfig::default();
        if active.contains(&ReceiverProtocol::Zipkin) {
            receivers.zipkin = Some(slot());
        }
        if active.contains(&ReceiverProtocol::Opencensus) {
            receivers.opencensus = Some(slot());
        }

        let otlp_http = active.contains(&ReceiverProtocol::OtlpHttp);
        let otlp_grpc = active.contains(&ReceiverProtocol::OtlpGrpc);
        if otlp_http || otlp_grpc {
            receivers.otlp = Some(OtlpReceiverConfig {
                protocols: OtlpProtocolsConfig {
                    http: otlp_http.then(slot),
                    grpc: otlp_grpc.then(slot),
                },
            });
        }

        let thrift_http = active.contains(&ReceiverProtocol::JaegerThriftHttp);
        let jaeger_grpc = active.contains(&ReceiverProtocol::JaegerGrpc);
        let thrift_binary = active.contains(&ReceiverProtocol::JaegerThriftBinary);
        let thrift_compact = active.contains(&ReceiverProtocol::JaegerThriftCompact);
        if thrift_http || jaeger_grpc || thrift_binary || thrift_compact {
            receivers.jaeger = Some(JaegerReceiverConfig {
                protocols: JaegerProtocolsConfig {
                    thrift_http: thrift_http.then(slot),
                    grpc: jaeger_grpc.then(slot),
                    thrift_binary: thrift_binary.then(slot),
                    thrift_compact: thrift_compact.then(slot),
                },
            });
        }

        // The tempo_http/tempo_grpc protocols are served by the server block
        // directly and render no distributor receiver.
        receivers
    }

    /// Build the trace storage sub-document.
    ///
    /// Local disk when no object storage is configured, an s3 backend
    /// otherwise. Total over its inputs; malformed credentials must be
    /// filtered out before reaching this builder.
    pub fn build_storage(&self, s3: Option<&S3Credentials>) -> TraceStorageConfig {
        let (backend, local, s3) = match s3 {
            Some(s3) => {
                // Bucket backends reject scheme-qualified endpoints.
                let endpoint = strip_scheme(&s3.endpoint).to_string();
                let insecure = s3.endpoint.starts_with("http://");
                (
                    "s3".to_string(),
                    None,
                    Some(S3StorageConfig {
                        bucket: s3.bucket.clone(),
                        endpoint,
                        access_key: s3.access_key.clone(),
                        secret_key: s3.secret_key.clone(),
                        insecure,
                    }),
                )
            }
            None => (
                "local".to_string(),
                Some(LocalStorageConfig {
                    path: self.config.storage_local_path.clone(),
                }),
                None,
            ),
        };
        TraceStorageConfig {
            backend,
            local,
            s3,
            wal: WalConfig {
                path: self.config.storage_wal_path.clone(),
            },
            pool: PoolConfig {
                max_workers: POOL_MAX_WORKERS,
                queue_depth: POOL_QUEUE_DEPTH,
            },
        }
    }

    /// Build the cluster membership block, if this node has peers.
    fn build_memberlist(&self, peers: &[String]) -> Option<MemberlistConfig> {
        if peers.is_empty() {
            return None;
        }
        let mut join_members: Vec<String> = peers.iter().map(|addr| format!("{}:{}", addr, MEMBERLIST_PORT)).collect();
        join_members.sort();
        join_members.dedup();
        Some(MemberlistConfig {
            abort_if_cluster_join_fails: false,
            bind_port: MEMBERLIST_PORT,
            join_members,
        })
    }

    fn server_tls(&self) -> ServerTlsConfig {
        ServerTlsConfig {
            cert_file: self.config.tls_cert_path.clone(),
            key_file: self.config.tls_key_path.clone(),
            client_ca_file: self.config.tls_ca_path.clone(),
        }
    }

    fn receiver_tls(&self) -> ReceiverTlsConfig {
        ReceiverTlsConfig {
            tls: TlsSettings {
                ca_file: self.config.tls_ca_path.clone(),
                cert_file: self.config.tls_cert_path.clone(),
                key_file: self.config.tls_key_path.clone(),
                min_version: TLS_MIN_VERSION.into(),
            },
        }
    }
}

/// Strip the URL scheme from the given endpoint.
fn strip_scheme(endpoint: &str) -> &str {
    endpoint
        .strip_prefix("https://")
        .or_else(|| endpoint.strip_prefix("http://"))
        .unwrap_or(endpoint)
}

/// The full rendered workload configuration document.
///
/// Two documents are equal iff their canonical YAML forms are byte-equal;
/// `to_yaml` is that canonical form.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct TempoConfig {
    pub auth_enabled: bool,
    pub search_enabled: bool,
    pub server: ServerConfig,
    pub distributor: DistributorConfig,
    pub ingester: IngesterConfig,
    pub compactor: CompactorConfig,
    pub storage: StorageConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memberlist: Option<MemberlistConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub querier: Option<QuerierConfig>,
}

impl TempoConfig {
    /// Render this document to its canonical YAML form.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("error serializing workload config")
    }
}

/// The workload's server listener block.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ServerConfig {
    pub http_listen_port: u16,
    pub grpc_listen_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_tls_config: Option<ServerTlsConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grpc_tls_config: Option<ServerTlsConfig>,
}

/// TLS settings for a server listener.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ServerTlsConfig {
    pub cert_file: String,
    pub key_file: String,
    pub client_ca_file: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct DistributorConfig {
    pub receivers: ReceiversConfig,
}

/// A single receiver entry: `None` renders the protocol's empty placeholder,
/// `Some` attaches the TLS block.
pub type ReceiverSlot = Option<ReceiverTlsConfig>;

/// The `distributor.receivers` sub-document.
///
/// Families absent from the active set are omitted from the serialized form
/// entirely.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct ReceiversConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zipkin: Option<ReceiverSlot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opencensus: Option<ReceiverSlot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otlp: Option<OtlpReceiverConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jaeger: Option<JaegerReceiverConfig>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct OtlpReceiverConfig {
    pub protocols: OtlpProtocolsConfig,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct OtlpProtocolsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<ReceiverSlot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grpc: Option<ReceiverSlot>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct JaegerReceiverConfig {
    pub protocols: JaegerProtocolsConfig,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct JaegerProtocolsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thrift_http: Option<ReceiverSlot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grpc: Option<ReceiverSlot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thrift_binary: Option<ReceiverSlot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thrift_compact: Option<ReceiverSlot>,
}

/// The TLS block attached to an active receiver when material is present.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ReceiverTlsConfig {
    pub tls: TlsSettings,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct TlsSettings {
    pub ca_file: String,
    pub cert_file: String,
    pub key_file: String,
    pub min_version: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct IngesterConfig {
    pub trace_idle_period: String,
    pub max_block_bytes: u64,
    pub max_block_duration: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct CompactorConfig {
    pub compaction: CompactionConfig,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct CompactionConfig {
    pub compaction_window: String,
    pub max_compaction_objects: u64,
    pub block_retention: String,
    pub compacted_block_retention: String,
    pub flush_size_bytes: u64,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct StorageConfig {
    pub trace: TraceStorageConfig,
}

/// The trace storage backend configuration.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct TraceStorageConfig {
    /// One of `local` or `s3`.
    pub backend: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local: Option<LocalStorageConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3: Option<S3StorageConfig>,
    pub wal: WalConfig,
    pub pool: PoolConfig,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct LocalStorageConfig {
    pub path: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct S3StorageConfig {
    pub bucket: String,
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub insecure: bool,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct WalConfig {
    pub path: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct PoolConfig {
    pub max_workers: u64,
    pub queue_depth: u64,
}

/// The cluster membership/gossip block.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct MemberlistConfig {
    pub abort_if_cluster_join_fails: bool,
    pub bind_port: u16,
    pub join_members: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct QuerierConfig {
    pub frontend_worker: FrontendWorkerConfig,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct FrontendWorkerConfig {
    pub frontend_address: String,
}
