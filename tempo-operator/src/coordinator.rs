//! Deployment consistency checking and cluster role aggregation.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::tempo::S3Credentials;
use tempo_core::role::{Role, MINIMAL_DEPLOYMENT, RECOMMENDED_DEPLOYMENT};

/// Raw object storage credentials, as received from the storage integration.
///
/// Fields may be missing while the integration is still settling; `validate`
/// filters incomplete data out before it can reach the storage builder.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct RawS3Credentials {
    pub bucket: Option<String>,
    pub endpoint: Option<String>,
    #[serde(rename = "access-key")]
    pub access_key: Option<String>,
    #[serde(rename = "secret-key")]
    pub secret_key: Option<String>,
}

impl RawS3Credentials {
    /// Validate into usable credentials.
    ///
    /// Incomplete credentials are dropped here, not treated as an error: a
    /// storage integration mid-setup is an expected state.
    pub fn validate(&self) -> Option<S3Credentials> {
        match (&self.bucket, &self.endpoint, &self.access_key, &self.secret_key) {
            (Some(bucket), Some(endpoint), Some(access_key), Some(secret_key)) => Some(S3Credentials {
                bucket: bucket.clone(),
                endpoint: endpoint.clone(),
                access_key: access_key.clone(),
                secret_key: secret_key.clone(),
            }),
            _ => {
                tracing::info!("incomplete object storage credentials, ignoring");
                None
            }
        }
    }
}

/// One connected worker application, snapshotted at the start of a pass.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct WorkerDeclaration {
    /// The role every unit of this application declares.
    pub role: Role,
    /// The number of units holding the declaration.
    pub units: usize,
    /// The network addresses of those units.
    pub addresses: Vec<String>,
}

/// Aggregated cluster role information.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RolesSummary {
    /// Units per concrete role, across the whole cluster.
    pub counts: BTreeMap<Role, usize>,
    /// Roles the minimal deployment table requires but no unit holds.
    pub missing_roles: BTreeSet<Role>,
    /// Whether the allocated roles cover the minimal deployment table.
    pub is_coherent: bool,
    /// Whether every role count meets the recommended deployment table.
    pub is_recommended: bool,
}

/// Sum role declarations across all connected workers.
///
/// A `monolithic` declaration expands into one count against every concrete
/// role per unit; a node running worker duties itself contributes one of
/// each concrete role.
pub fn aggregate_roles(workers: &[WorkerDeclaration], is_worker_node: bool) -> RolesSummary {
    let mut counts: BTreeMap<Role, usize> = BTreeMap::new();
    if is_worker_node {
        for role in Role::ALL_NONMETA {
            *counts.entry(role).or_default() += 1;
        }
    }
    for worker in workers {
        if worker.units == 0 {
            continue;
        }
        match worker.role {
            Role::Monolithic => {
                for role in Role::ALL_NONMETA {
                    *counts.entry(role).or_default() += worker.units;
                }
            }
            role => *counts.entry(role).or_default() += worker.units,
        }
    }

    let missing_roles: BTreeSet<Role> = MINIMAL_DEPLOYMENT.keys().filter(|role| !counts.contains_key(role)).copied().collect();
    let is_coherent = missing_roles.is_empty();
    let is_recommended = RECOMMENDED_DEPLOYMENT
        .iter()
        .all(|(role, min)| counts.get(role).copied().unwrap_or(0) >= *min);

    RolesSummary {
        counts,
        missing_roles,
        is_coherent,
        is_recommended,
    }
}

/// Collect all worker addresses, deduplicated and sorted, for cluster
/// membership.
pub fn gather_addresses(workers: &[WorkerDeclaration]) -> Vec<String> {
    let addresses: BTreeSet<&String> = workers.iter().flat_map(|worker| worker.addresses.iter()).collect();
    addresses.into_iter().cloned().collect()
}

/// The address of a unit able to serve the query-frontend, if any.
pub fn frontend_address(workers: &[WorkerDeclaration]) -> Option<String> {
    let addresses: BTreeSet<&String> = workers
        .iter()
        .filter(|worker| matches!(worker.role, Role::QueryFrontend | Role::Monolithic))
        .flat_map(|worker| worker.addresses.iter())
        .collect();
    addresses.into_iter().next().cloned()
}

/// The deployment facts one consistency check runs over.
///
/// Computed fresh each reconciliation pass from current external state,
/// never cached across passes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeploymentFacts {
    pub has_object_storage: bool,
    pub is_horizontally_scaled: bool,
    pub is_clustered: bool,
    pub is_worker_node: bool,
    pub cluster_role_counts: BTreeMap<Role, usize>,
}

/// Determine whether the deployment as a whole is consistent.
///
/// Every rule is evaluated independently and all failures are collected; an
/// empty list is the only "go" signal. This function never errors.
pub fn check(facts: &DeploymentFacts) -> Vec<String> {
    let mut failures = Vec::new();

    if !facts.is_worker_node && !facts.is_clustered {
        failures.push("must either run a worker or have workers attached".to_string());
    }
    if !facts.has_object_storage {
        // Shared local-disk storage across replicas is unsafe.
        if facts.is_horizontally_scaled {
            failures.push("scaled without object storage".to_string());
        }
        if facts.is_clustered {
            failures.push("clustered without object storage".to_string());
        }
    } else {
        let missing: Vec<&str> = MINIMAL_DEPLOYMENT
            .keys()
            .filter(|role| !facts.cluster_role_counts.contains_key(role))
            .map(Role::name)
            .collect();
        if !missing.is_empty() {
            failures.push(format!("incoherent coordinator: missing roles {{{}}}", missing.join(", ")));
        }
    }

    failures
}
