//! Worker role definitions and deployment tables.
//!
//! References:
//!  arch:
//!   -> https://grafana.com/docs/tempo/latest/operations/architecture/
//!  config:
//!   -> https://grafana.com/docs/tempo/latest/configuration/#server

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::UnknownRole;

lazy_static::lazy_static! {
    /// The minimal set of role allocations needed for the deployment to be
    /// considered coherent.
    pub static ref MINIMAL_DEPLOYMENT: BTreeMap<Role, usize> = [
        (Role::Querier, 1),
        (Role::QueryFrontend, 1),
        (Role::Ingester, 3),
        (Role::Distributor, 1),
        (Role::Compactor, 1),
        (Role::MetricsGenerator, 1),
    ]
    .into_iter()
    .collect();

    /// The stricter role allocations recommended for production deployments.
    pub static ref RECOMMENDED_DEPLOYMENT: BTreeMap<Role, usize> = [
        (Role::Querier, 2),
        (Role::QueryFrontend, 2),
        (Role::Ingester, 3),
        (Role::Distributor, 2),
        (Role::Compactor, 2),
        (Role::MetricsGenerator, 2),
    ]
    .into_iter()
    .collect();
}

/// A processing responsibility which a cluster member can declare.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// Meta-role: acts as every concrete role simultaneously.
    #[serde(rename = "scalable-single-binary")]
    Monolithic,

    Querier,
    QueryFrontend,
    Ingester,
    Distributor,
    Compactor,
    MetricsGenerator,
}

impl Role {
    /// Every concrete (non-meta) role.
    pub const ALL_NONMETA: [Role; 6] = [
        Self::Querier,
        Self::QueryFrontend,
        Self::Ingester,
        Self::Distributor,
        Self::Compactor,
        Self::MetricsGenerator,
    ];

    /// The wire name of this role.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Monolithic => "scalable-single-binary",
            Self::Querier => "querier",
            Self::QueryFrontend => "query-frontend",
            Self::Ingester => "ingester",
            Self::Distributor => "distributor",
            Self::Compactor => "compactor",
            Self::MetricsGenerator => "metrics-generator",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scalable-single-binary" => Ok(Self::Monolithic),
            "querier" => Ok(Self::Querier),
            "query-frontend" => Ok(Self::QueryFrontend),
            "ingester" => Ok(Self::Ingester),
            "distributor" => Ok(Self::Distributor),
            "compactor" => Ok(Self::Compactor),
            "metrics-generator" => Ok(Self::MetricsGenerator),
            _ => Err(UnknownRole(s.into())),
        }
    }
}
