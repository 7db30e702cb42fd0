//! Crate-wide error taxonomy.
//!
//! Fetch errors never escape the reconcile function as `Result::Err` — they
//! are folded into [`crate::status::ComponentHealth`] instead. `Error` is
//! reserved for failures that abort a reconcile pass outright: apply
//! conflicts the outer controller should retry, and internal invariant
//! violations.

use std::sync::Arc;

use kube::ResourceExt;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Any error originating from the `kube-rs` crate (§7 category 2,
    /// infrastructure failure, when it reaches this far).
    #[error("Kubernetes reported error: {0}")]
    KubeError(#[from] kube::Error),

    /// §7 category 1: a referenced resource does not exist.
    #[error("missing upstream dependency: {0}")]
    MissingUpstreamDependency(String),

    /// §7 category 3: GPU model doesn't exist in the cluster, insufficient
    /// VRAM, malformed source URI, etc.
    #[error("user misconfiguration: {0}")]
    UserMisconfiguration(String),

    /// §7 category 4: discovery job's pod crashed, logs were unparseable,
    /// or the image could not be pulled.
    #[error("discovery failed: {0}")]
    DiscoveryFailure(String),

    /// §7 category 5: apply or status update returned a version conflict.
    /// Callers treat this as "retry on next reconcile", never as fatal.
    #[error("planning conflict: {0}")]
    PlanningConflict(String),

    /// Template resource missing a required field the type system can't
    /// statically rule out (e.g. no namespace on a namespaced resource).
    #[error("invalid template: {0}")]
    UserInputError(String),

    /// An internal invariant was violated. Indicates an operator bug, not a
    /// user or cluster condition; intentionally distinct from the above so
    /// it is never silently folded into `ComponentHealth`.
    #[error("internal invariant violated: {0}")]
    Invariant(String),
}

impl Error {
    /// Stable low-cardinality label for metrics.
    pub fn metric_label(&self) -> String {
        match self {
            Error::KubeError(_) => "kube_error",
            Error::MissingUpstreamDependency(_) => "missing_upstream_dependency",
            Error::UserMisconfiguration(_) => "user_misconfiguration",
            Error::DiscoveryFailure(_) => "discovery_failure",
            Error::PlanningConflict(_) => "planning_conflict",
            Error::UserInputError(_) => "user_input_error",
            Error::Invariant(_) => "invariant",
        }
        .to_string()
    }

    /// Whether this error, if surfaced as a fetch error, indicates the
    /// infrastructure-failure category rather than a well-formed "not
    /// found" condition — used by the component-health rollup (§4.1).
    pub fn is_infrastructure_failure(&self) -> bool {
        matches!(self, Error::KubeError(source) if !matches!(source, kube::Error::Api(e) if e.code == 404))
    }

    pub fn set_failure_label<K: ResourceExt>(obj: &Arc<K>, error: &Error) -> (String, String) {
        (obj.name_any(), error.metric_label())
    }
}
