//! Operator error abstractions.
//!
//! Expected variation (unreachable workload, empty receiver sets, unknown
//! protocol names, incomplete storage credentials) is encoded in return
//! values throughout the crate; only genuine failures land here.

use thiserror::Error;

/// Errors surfaced by the restart/reconciliation controller.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The workload config could not be rendered.
    #[error("error rendering workload config")]
    Render(#[source] anyhow::Error),
    /// An interaction with the workload failed outright.
    #[error("error communicating with workload")]
    Workload(#[source] anyhow::Error),
    /// The restart retry ceiling was exhausted.
    ///
    /// This indicates a persistent environment problem and must not be
    /// swallowed by callers.
    #[error("workload restart attempts exhausted after {attempts} attempts")]
    RestartAttemptsExhausted {
        attempts: usize,
        #[source]
        source: anyhow::Error,
    },
}
