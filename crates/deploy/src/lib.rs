//! chainwire-deploy - Contract deployment and wiring library for EVM networks.
//!
//! This crate deploys a set of interdependent contracts in dependency order,
//! records where each one landed, and then runs the post-deployment
//! transactions that wire them together.

use serde::{Deserialize, Serialize};

mod accounts;
mod args;
mod artifact;
pub mod client;
mod config;
mod deployer;
mod error;
mod fingerprint;
mod orchestrator;
mod plan;
mod registry;
mod report;
mod rpc;
mod wiring;

pub use accounts::{AccountRef, Accounts};
pub use args::Arg;
pub use artifact::{ArtifactDescriptor, ArtifactSource, ArtifactStore, CompiledArtifact};
pub use client::{
    CallRequest, ClientError, NetworkClient, Receipt, RpcClient, TransactionKind,
    TransactionRequest, TxHandle,
};
pub use config::{CONFIG_FILENAME, ENV_PREFIX, NetworkConfig, ProjectConfig};
pub use deployer::{ArtifactDeployer, DeploymentReport};
pub use error::{ConfigurationError, OrchestrationError, Target};
pub use fingerprint::DeploymentFingerprint;
pub use orchestrator::{Orchestrator, RpcOrchestrator, RunReport};
pub use plan::{DeploymentPlan, PlanEntry, PlannedAction, Selection};
pub use registry::{DeploymentRecord, DeploymentRegistry, FileRegistry, MemoryRegistry};
pub use report::records_table;
pub use wiring::{StepKind, StepOutcome, WiringReport, WiringSequencer, WiringStep};

pub use alloy_core::primitives::Address;

/// Identifier of the ledger a deployment lives on (the EVM chain id).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::From,
)]
#[serde(transparent)]
pub struct NetworkId(pub u64);
