//! Argument values for constructors and wiring steps, and their resolution.

use std::collections::BTreeMap;

use alloy_core::primitives::Address;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    Accounts, ConfigurationError, DeploymentRegistry, NetworkId, OrchestrationError, Target,
    client::abi_literal,
};

/// An argument as written in the manifest.
///
/// In TOML: `"KK"` or `100` are literals, `{ address_of = "RewardToken" }`
/// is the address of a deployed artifact, `{ account = "player" }` a named
/// account, and `{ output_of = "register", index = 0 }` a value produced by an
/// earlier wiring step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Arg {
    AddressOf {
        address_of: String,
    },
    Account {
        account: String,
    },
    OutputOf {
        output_of: String,
        #[serde(default)]
        index: usize,
    },
    Literal(Value),
}

impl Arg {
    pub fn literal(value: impl Into<Value>) -> Self {
        Arg::Literal(value.into())
    }

    pub fn address_of(artifact: impl Into<String>) -> Self {
        Arg::AddressOf {
            address_of: artifact.into(),
        }
    }

    pub fn account(name: impl Into<String>) -> Self {
        Arg::Account {
            account: name.into(),
        }
    }

    pub fn output_of(step: impl Into<String>, index: usize) -> Self {
        Arg::OutputOf {
            output_of: step.into(),
            index,
        }
    }

    /// The artifact whose address this argument needs, if any.
    pub fn artifact_reference(&self) -> Option<&str> {
        match self {
            Arg::AddressOf { address_of } => Some(address_of),
            _ => None,
        }
    }
}

/// Resolves [`Arg`]s against the registry, the named accounts and prior step outputs.
pub(crate) struct Resolver<'a, R: ?Sized> {
    pub registry: &'a R,
    pub network: NetworkId,
    pub accounts: &'a Accounts,
    pub outputs: &'a BTreeMap<String, Vec<Value>>,
}

impl<R: DeploymentRegistry + ?Sized> Resolver<'_, R> {
    /// Address of a deployed artifact on the current network.
    pub fn address_of(&self, target: &Target, artifact: &str) -> Result<Address, OrchestrationError> {
        self.registry
            .get(artifact, self.network)
            .map_err(OrchestrationError::Registry)?
            .map(|record| record.address)
            .ok_or_else(|| {
                ConfigurationError::UnknownArtifact {
                    target: target.clone(),
                    artifact: artifact.to_string(),
                }
                .into()
            })
    }

    pub fn resolve(&self, target: &Target, arg: &Arg) -> Result<Value, OrchestrationError> {
        match arg {
            Arg::Literal(value) => Ok(value.clone()),
            Arg::AddressOf { address_of } => Ok(Value::String(
                self.address_of(target, address_of)?.to_checksum(None),
            )),
            Arg::Account { account } => {
                Ok(Value::String(self.accounts.get(account)?.to_checksum(None)))
            }
            Arg::OutputOf { output_of, index } => self
                .outputs
                .get(output_of)
                .and_then(|values| values.get(*index))
                .cloned()
                .ok_or_else(|| {
                    ConfigurationError::UnknownStepReference {
                        step: target.name().to_string(),
                        reference: format!("{}[{}]", output_of, index),
                    }
                    .into()
                }),
        }
    }

    pub fn resolve_all(&self, target: &Target, args: &[Arg]) -> Result<Vec<Value>, OrchestrationError> {
        args.iter().map(|arg| self.resolve(target, arg)).collect()
    }
}

/// Compare an expected value with a decoded one.
///
/// Addresses compare regardless of casing; everything else by its ABI literal form,
/// so `100` matches the decoded `"100"`.
pub(crate) fn values_match(expected: &Value, actual: &Value) -> bool {
    let expected = abi_literal(expected);
    let actual = abi_literal(actual);

    match (expected.parse::<Address>(), actual.parse::<Address>()) {
        (Ok(expected), Ok(actual)) => expected == actual,
        _ => expected == actual,
    }
}
