//! Error taxonomy for the deployment pipeline.

use std::time::Duration;

use alloy_core::primitives::B256;

use crate::ResultLedger;

/// Errors raised while validating configuration or executing a deployment plan.
///
/// None of these are retried automatically. A [`DeployError::ConfirmationTimeout`]
/// in particular leaves the on-chain outcome unknown and must be checked by hand.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// Invalid compiler profile, artifact/profile divergence, malformed plan or
    /// chain id mismatch. Always raised before any transaction is submitted.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The active network has no signing account.
    #[error("no signing account available on chain {chain_id}")]
    NoSignerAvailable { chain_id: u64 },

    /// The creation transaction could not be submitted.
    #[error("failed to submit {kind}: {reason}")]
    SubmissionFailed { kind: String, reason: String },

    /// The creation transaction was mined but execution reverted.
    #[error("deployment of {kind} rejected in transaction {tx_hash}: {reason}")]
    DeploymentRejected {
        kind: String,
        tx_hash: B256,
        reason: String,
    },

    /// No terminal status was observed in time. The transaction may still confirm.
    #[error(
        "no confirmation for {kind} (transaction {tx_hash}) after {waited:?}; verify chain state before retrying"
    )]
    ConfirmationTimeout {
        kind: String,
        tx_hash: B256,
        waited: Duration,
    },

    /// A step referenced a result that is not in the ledger.
    #[error("{kind} depends on {missing}, which has not been deployed")]
    UnresolvedDependency { kind: String, missing: String },

    /// A read-only query against the node failed.
    #[error("{method} failed: {reason}")]
    Rpc { method: String, reason: String },

    /// A contract kind was recorded twice within one run.
    #[error("contract kind {0} is already recorded in this run")]
    DuplicateKind(String),
}

/// Tag identifying a [`DeployError`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum DeployErrorKind {
    Configuration,
    NoSignerAvailable,
    SubmissionFailed,
    DeploymentRejected,
    ConfirmationTimeout,
    UnresolvedDependency,
    Rpc,
    DuplicateKind,
}

impl DeployError {
    /// Shorthand for a [`DeployError::Configuration`] error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn kind(&self) -> DeployErrorKind {
        match self {
            Self::Configuration(_) => DeployErrorKind::Configuration,
            Self::NoSignerAvailable { .. } => DeployErrorKind::NoSignerAvailable,
            Self::SubmissionFailed { .. } => DeployErrorKind::SubmissionFailed,
            Self::DeploymentRejected { .. } => DeployErrorKind::DeploymentRejected,
            Self::ConfirmationTimeout { .. } => DeployErrorKind::ConfirmationTimeout,
            Self::UnresolvedDependency { .. } => DeployErrorKind::UnresolvedDependency,
            Self::Rpc { .. } => DeployErrorKind::Rpc,
            Self::DuplicateKind(_) => DeployErrorKind::DuplicateKind,
        }
    }
}

/// A plan that stopped before completing.
///
/// Contracts in `ledger` are already published on-chain even though the plan failed.
#[derive(Debug, thiserror::Error)]
#[error("deployment plan aborted at step {step} ({kind}): {error}")]
pub struct PlanFailure {
    /// Zero-based index of the failed step.
    pub step: usize,
    /// Contract kind of the failed step.
    pub kind: String,
    #[source]
    pub error: DeployError,
    /// Results of every step that succeeded before the failure.
    pub ledger: ResultLedger,
}
