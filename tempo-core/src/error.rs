//! Core error abstractions.

use thiserror::Error;

/// Error returned when a receiver protocol name is not part of the catalog.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unknown receiver protocol: {0}")]
pub struct UnknownProtocol(pub String);

/// Error returned when a worker role name is not recognized.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unknown worker role: {0}")]
pub struct UnknownRole(pub String);
