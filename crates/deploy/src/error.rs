//! Error taxonomy for deployment runs.

use std::{fmt, time::Duration};

use serde_json::Value;
use thiserror::Error;

use crate::{NetworkId, client::ClientError, client::Receipt};

/// What a failure is attributed to: an artifact deployment or a wiring step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Artifact(String),
    Step { index: usize, id: String },
}

impl Target {
    /// The artifact name or step id.
    pub fn name(&self) -> &str {
        match self {
            Target::Artifact(name) => name,
            Target::Step { id, .. } => id,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Artifact(name) => write!(f, "artifact `{}`", name),
            Target::Step { index, id } => write!(f, "wiring step #{} `{}`", index, id),
        }
    }
}

/// Problems in the manifest or the environment, detected before any transaction is sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("artifact `{0}` is declared more than once")]
    DuplicateArtifact(String),

    #[error("artifact name `{0}` is invalid (use letters, digits, `_`, `-` or `.`)")]
    InvalidName(String),

    #[error("dependency cycle between artifacts: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    #[error(
        "artifact `{artifact}` depends on `{dependency}`, which is neither declared nor deployed"
    )]
    MissingDependency { artifact: String, dependency: String },

    #[error("{target} references unknown artifact `{artifact}`")]
    UnknownArtifact { target: Target, artifact: String },

    #[error("wiring step `{step}` references `{reference}`, which is not an earlier step with output")]
    UnknownStepReference { step: String, reference: String },

    #[error("artifact `{0}` uses a wiring step output as a constructor argument")]
    OutputInConstructor(String),

    #[error("unknown named account `{0}`")]
    UnknownAccount(String),

    #[error("account `{name}` maps to index {index} but the node only exposes {available} account(s)")]
    AccountIndexOutOfRange {
        name: String,
        index: usize,
        available: usize,
    },

    #[error("compiled artifact `{name}` could not be loaded: {reason}")]
    MissingArtifact { name: String, reason: String },

    #[error("wiring step `{step}` is invalid: {reason}")]
    InvalidStep { step: String, reason: String },

    #[error("network `{network}` is configured with chain id {expected} but the node reports {actual}")]
    NetworkMismatch {
        network: String,
        expected: NetworkId,
        actual: NetworkId,
    },

    #[error("unknown network `{0}`")]
    UnknownNetwork(String),
}

/// Errors that abort a deployment or wiring run.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("{target} failed on-chain{}", failure_detail(.reason, .receipt))]
    TransactionFailed {
        target: Target,
        reason: Option<String>,
        receipt: Option<Receipt>,
    },

    #[error(
        "{target}: transaction {tx_hash} was not confirmed within {waited:?}; its outcome is unknown"
    )]
    Timeout {
        target: Target,
        tx_hash: String,
        waited: Duration,
    },

    #[error("{target}: expected {expected}, got {actual}")]
    ExpectationFailed {
        target: Target,
        expected: Value,
        actual: Value,
    },

    #[error("{target}: deployment receipt {} carries no contract address", .receipt.transaction_hash)]
    MissingAddress { target: Target, receipt: Receipt },

    #[error("{target}: network client error")]
    Client {
        target: Target,
        #[source]
        source: anyhow::Error,
    },

    #[error("deployment registry failure")]
    Registry(#[source] anyhow::Error),

    #[error("could not query the network")]
    Network(#[source] ClientError),
}

impl OrchestrationError {
    /// Attribute a network client error to the artifact or step that triggered it.
    pub(crate) fn from_client(target: Target, err: ClientError) -> Self {
        match err {
            ClientError::Reverted { reason } => OrchestrationError::TransactionFailed {
                target,
                reason,
                receipt: None,
            },
            ClientError::Timeout {
                tx_hash, waited, ..
            } => OrchestrationError::Timeout {
                target,
                tx_hash,
                waited,
            },
            ClientError::Rpc(source) => OrchestrationError::Client { target, source },
        }
    }

    /// The receipt of the failing transaction, when one was mined.
    pub fn receipt(&self) -> Option<&Receipt> {
        match self {
            OrchestrationError::TransactionFailed { receipt, .. } => receipt.as_ref(),
            OrchestrationError::MissingAddress { receipt, .. } => Some(receipt),
            _ => None,
        }
    }

    /// The artifact or step the failure is attributed to.
    pub fn target(&self) -> Option<&Target> {
        match self {
            OrchestrationError::TransactionFailed { target, .. }
            | OrchestrationError::Timeout { target, .. }
            | OrchestrationError::ExpectationFailed { target, .. }
            | OrchestrationError::MissingAddress { target, .. }
            | OrchestrationError::Client { target, .. } => Some(target),
            OrchestrationError::Configuration(_)
            | OrchestrationError::Registry(_)
            | OrchestrationError::Network(_) => None,
        }
    }
}

fn failure_detail(reason: &Option<String>, receipt: &Option<Receipt>) -> String {
    let mut detail = String::new();
    if let Some(reason) = reason {
        detail.push_str(&format!(": {}", reason));
    }
    if let Some(receipt) = receipt {
        detail.push_str(&format!(
            " (tx {} in block {}, status reverted)",
            receipt.transaction_hash, receipt.block_number
        ));
    }
    detail
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_display() {
        assert_eq!(
            Target::Artifact("Governance".to_string()).to_string(),
            "artifact `Governance`"
        );
        assert_eq!(
            Target::Step {
                index: 2,
                id: "purchase".to_string()
            }
            .to_string(),
            "wiring step #2 `purchase`"
        );
    }

    #[test]
    fn test_cycle_message_lists_path() {
        let err = ConfigurationError::Cycle(vec![
            "A".to_string(),
            "B".to_string(),
            "A".to_string(),
        ]);
        assert_eq!(err.to_string(), "dependency cycle between artifacts: A -> B -> A");
    }

    #[test]
    fn test_revert_maps_to_transaction_failure() {
        let err = OrchestrationError::from_client(
            Target::Artifact("RewardToken".to_string()),
            ClientError::Reverted {
                reason: Some("execution reverted: already registered".to_string()),
            },
        );

        assert!(matches!(err, OrchestrationError::TransactionFailed { .. }));
        assert_eq!(
            err.to_string(),
            "artifact `RewardToken` failed on-chain: execution reverted: already registered"
        );
    }

    #[test]
    fn test_timeout_is_distinct_from_revert() {
        let err = OrchestrationError::from_client(
            Target::Step {
                index: 0,
                id: "register".to_string(),
            },
            ClientError::Timeout {
                tx_hash: "0xabc".to_string(),
                confirmations: 5,
                waited: Duration::from_secs(30),
            },
        );

        assert!(matches!(err, OrchestrationError::Timeout { .. }));
        assert!(err.receipt().is_none());
    }
}
