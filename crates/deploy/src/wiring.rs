//! Post-deployment wiring: an ordered list of calls against deployed artifacts.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    Accounts, Arg, CallRequest, ConfigurationError, DeploymentRegistry, NetworkClient,
    NetworkId, OrchestrationError, Target, TransactionKind, TransactionRequest,
    args::{Resolver, values_match},
};

/// Whether a step sends a transaction or only reads state.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StepKind {
    /// State-changing transaction, waited on until confirmed.
    #[default]
    Transact,
    /// Read-only call; its outputs can be checked and referenced by later steps.
    Read,
}

/// One post-deployment call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WiringStep {
    /// Unique label, used in logs and by `output_of` references.
    pub id: String,
    /// Name of the deployed artifact to call.
    pub target: String,
    /// Method name, or full signature to disambiguate overloads.
    pub method: String,
    #[serde(default)]
    pub args: Vec<Arg>,
    /// Named account sending the call (defaults to `deployer`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// Overrides the network's confirmation count for this step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmations: Option<u64>,
    #[serde(default)]
    pub kind: StepKind,
    /// For transactions: simulate first and keep the return values for later steps.
    #[serde(default)]
    pub capture: bool,
    /// For reads: value the (single) output must match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect: Option<Arg>,
}

impl WiringStep {
    pub fn transact(
        id: impl Into<String>,
        target: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            target: target.into(),
            method: method.into(),
            args: Vec::new(),
            from: None,
            confirmations: None,
            kind: StepKind::Transact,
            capture: false,
            expect: None,
        }
    }

    pub fn read(id: impl Into<String>, target: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            kind: StepKind::Read,
            ..Self::transact(id, target, method)
        }
    }

    pub fn arg(mut self, arg: Arg) -> Self {
        self.args.push(arg);
        self
    }

    pub fn sender(mut self, account: impl Into<String>) -> Self {
        self.from = Some(account.into());
        self
    }

    pub fn capture(mut self) -> Self {
        self.capture = true;
        self
    }

    pub fn expect(mut self, expected: Arg) -> Self {
        self.expect = Some(expected);
        self
    }

    /// Whether later steps may reference this step's outputs.
    pub fn produces_output(&self) -> bool {
        self.kind == StepKind::Read || self.capture
    }
}

/// Result of one executed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    pub index: usize,
    pub id: String,
    pub kind: StepKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    /// Decoded return values (reads and captured transactions).
    pub outputs: Vec<Value>,
}

/// Steps executed by a wiring run, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WiringReport {
    pub network: NetworkId,
    pub steps: Vec<StepOutcome>,
}

/// Runs wiring steps one at a time, each confirmed before the next is submitted.
///
/// The first failing step stops the run. Steps are not recorded, so running the
/// sequence again replays it from the start.
pub struct WiringSequencer<'a, C, R: ?Sized> {
    client: &'a C,
    registry: &'a R,
    accounts: &'a Accounts,
    network: NetworkId,
    confirmations: u64,
}

impl<'a, C, R> WiringSequencer<'a, C, R>
where
    C: NetworkClient,
    R: DeploymentRegistry + ?Sized,
{
    pub fn new(client: &'a C, registry: &'a R, accounts: &'a Accounts, network: NetworkId) -> Self {
        Self {
            client,
            registry,
            accounts,
            network,
            confirmations: 1,
        }
    }

    /// Default number of blocks to wait for after each transaction.
    pub fn with_confirmations(mut self, confirmations: u64) -> Self {
        self.confirmations = confirmations.max(1);
        self
    }

    pub async fn run(&self, steps: &[WiringStep]) -> Result<WiringReport, OrchestrationError> {
        validate(steps, self.accounts, |name| {
            self.registry
                .exists(name, self.network)
                .map_err(OrchestrationError::Registry)
        })?;

        tracing::info!(network = %self.network, steps = steps.len(), "Starting wiring");

        let mut outputs: BTreeMap<String, Vec<Value>> = BTreeMap::new();
        let mut report = WiringReport {
            network: self.network,
            steps: Vec::with_capacity(steps.len()),
        };

        for (index, step) in steps.iter().enumerate() {
            let outcome = self.run_step(index, step, &outputs).await?;
            if step.produces_output() {
                outputs.insert(step.id.clone(), outcome.outputs.clone());
            }
            report.steps.push(outcome);
        }

        tracing::info!(steps = report.steps.len(), "Wiring complete");

        Ok(report)
    }

    async fn run_step(
        &self,
        index: usize,
        step: &WiringStep,
        outputs: &BTreeMap<String, Vec<Value>>,
    ) -> Result<StepOutcome, OrchestrationError> {
        let target = Target::Step {
            index,
            id: step.id.clone(),
        };
        let resolver = Resolver {
            registry: self.registry,
            network: self.network,
            accounts: self.accounts,
            outputs,
        };

        let record = self
            .registry
            .get(&step.target, self.network)
            .map_err(OrchestrationError::Registry)?
            .ok_or_else(|| ConfigurationError::UnknownArtifact {
                target: target.clone(),
                artifact: step.target.clone(),
            })?;
        let args = resolver.resolve_all(&target, &step.args)?;

        tracing::info!(
            step = index,
            id = %step.id,
            kind = %step.kind,
            target = %step.target,
            method = %step.method,
            args = ?args,
            "Running wiring step"
        );

        let mut outcome = StepOutcome {
            index,
            id: step.id.clone(),
            kind: step.kind,
            tx_hash: None,
            block_number: None,
            outputs: Vec::new(),
        };

        match step.kind {
            StepKind::Read => {
                let from = step
                    .from
                    .as_deref()
                    .map(|name| self.accounts.get(name))
                    .transpose()?;
                outcome.outputs = self
                    .client
                    .call(CallRequest {
                        from,
                        to: record.address,
                        interface: record.interface,
                        method: step.method.clone(),
                        args,
                    })
                    .await
                    .map_err(|err| OrchestrationError::from_client(target.clone(), err))?;

                if let Some(expected) = &step.expect {
                    let expected = resolver.resolve(&target, expected)?;
                    let actual = match outcome.outputs.as_slice() {
                        [single] => single.clone(),
                        many => Value::Array(many.to_vec()),
                    };
                    if !values_match(&expected, &actual) {
                        return Err(OrchestrationError::ExpectationFailed {
                            target,
                            expected,
                            actual,
                        });
                    }
                }
            }
            StepKind::Transact => {
                let request = TransactionRequest {
                    from: self.accounts.sender(step.from.as_deref())?,
                    kind: TransactionKind::Invoke {
                        to: record.address,
                        interface: record.interface,
                        method: step.method.clone(),
                        args,
                    },
                };

                if step.capture {
                    if let Some(simulation) = CallRequest::simulate(&request) {
                        outcome.outputs = self
                            .client
                            .call(simulation)
                            .await
                            .map_err(|err| OrchestrationError::from_client(target.clone(), err))?;
                    }
                }

                let handle = self
                    .client
                    .submit(request)
                    .await
                    .map_err(|err| OrchestrationError::from_client(target.clone(), err))?;
                let receipt = self
                    .client
                    .wait_for_confirmations(&handle, step.confirmations.unwrap_or(self.confirmations))
                    .await
                    .map_err(|err| OrchestrationError::from_client(target.clone(), err))?;

                if !receipt.success {
                    return Err(OrchestrationError::TransactionFailed {
                        target,
                        reason: None,
                        receipt: Some(receipt),
                    });
                }

                tracing::info!(
                    id = %step.id,
                    tx_hash = %receipt.transaction_hash,
                    block = receipt.block_number,
                    "Wiring step confirmed"
                );

                outcome.tx_hash = Some(receipt.transaction_hash);
                outcome.block_number = Some(receipt.block_number);
            }
        }

        Ok(outcome)
    }
}

/// Check every step before the first one runs.
///
/// `is_known` decides whether an artifact name can be targeted or referenced
/// with `address_of`: recorded on the network, or about to be deployed.
pub(crate) fn validate<F>(
    steps: &[WiringStep],
    accounts: &Accounts,
    is_known: F,
) -> Result<(), OrchestrationError>
where
    F: Fn(&str) -> Result<bool, OrchestrationError>,
{
    let invalid = |step: &WiringStep, reason: &str| ConfigurationError::InvalidStep {
        step: step.id.clone(),
        reason: reason.to_string(),
    };

    // Steps seen so far, and whether they produce output.
    let mut earlier: HashMap<&str, bool> = HashMap::new();

    for (index, step) in steps.iter().enumerate() {
        if step.id.is_empty() {
            return Err(invalid(step, "step id is empty").into());
        }
        if earlier.contains_key(step.id.as_str()) {
            return Err(invalid(step, "step id is used more than once").into());
        }
        if step.method.is_empty() {
            return Err(invalid(step, "method is empty").into());
        }
        if step.expect.is_some() && step.kind != StepKind::Read {
            return Err(invalid(step, "`expect` is only supported on read steps").into());
        }
        if step.capture && step.kind == StepKind::Read {
            return Err(invalid(step, "`capture` only applies to transact steps").into());
        }
        if step.confirmations == Some(0) {
            return Err(invalid(step, "confirmations must be at least 1").into());
        }

        let target = Target::Step {
            index,
            id: step.id.clone(),
        };

        if !is_known(&step.target)? {
            return Err(ConfigurationError::UnknownArtifact {
                target,
                artifact: step.target.clone(),
            }
            .into());
        }

        if step.kind == StepKind::Transact || step.from.is_some() {
            accounts.sender(step.from.as_deref())?;
        }

        for arg in step.args.iter().chain(step.expect.iter()) {
            match arg {
                Arg::Account { account } => {
                    accounts.get(account)?;
                }
                Arg::AddressOf { address_of } => {
                    if !is_known(address_of)? {
                        return Err(ConfigurationError::UnknownArtifact {
                            target: target.clone(),
                            artifact: address_of.clone(),
                        }
                        .into());
                    }
                }
                Arg::OutputOf { output_of, index } => {
                    if earlier.get(output_of.as_str()) != Some(&true) {
                        return Err(ConfigurationError::UnknownStepReference {
                            step: step.id.clone(),
                            reference: format!("{}[{}]", output_of, index),
                        }
                        .into());
                    }
                }
                Arg::Literal(_) => {}
            }
        }

        earlier.insert(step.id.as_str(), step.produces_output());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DeploymentRecord, MemoryRegistry};
    use serde_json::json;

    const NETWORK: NetworkId = NetworkId(31337);

    fn registry() -> MemoryRegistry {
        let mut registry = MemoryRegistry::default();
        registry
            .put(DeploymentRecord::new(
                "RewardToken",
                NETWORK,
                "0x5fbdb2315678afecb367f032d93f642f64180aa3".parse().unwrap(),
                json!([]),
            ))
            .unwrap();
        registry
    }

    fn accounts() -> Accounts {
        Accounts::from_addresses([(
            "deployer".to_string(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266".parse().unwrap(),
        )])
    }

    fn check(steps: &[WiringStep]) -> Result<(), OrchestrationError> {
        let registry = registry();
        validate(steps, &accounts(), |name| {
            registry
                .exists(name, NETWORK)
                .map_err(OrchestrationError::Registry)
        })
    }

    #[test]
    fn test_step_kind_parsing() {
        assert_eq!("read".parse::<StepKind>().unwrap(), StepKind::Read);
        assert_eq!(StepKind::Transact.to_string(), "transact");
    }

    #[test]
    fn test_valid_sequence() {
        let steps = vec![
            WiringStep::read("balance", "RewardToken", "balanceOf")
                .arg(Arg::account("deployer")),
            WiringStep::transact("register", "RewardToken", "registerUser").capture(),
            WiringStep::transact("purchase", "RewardToken", "purchaseItem")
                .arg(Arg::output_of("register", 0))
                .arg(Arg::output_of("balance", 0)),
        ];

        check(&steps).unwrap();
    }

    #[test]
    fn test_forward_reference_is_rejected() {
        let steps = vec![
            WiringStep::transact("purchase", "RewardToken", "purchaseItem")
                .arg(Arg::output_of("register", 0)),
            WiringStep::transact("register", "RewardToken", "registerUser").capture(),
        ];

        assert!(matches!(
            check(&steps),
            Err(OrchestrationError::Configuration(
                ConfigurationError::UnknownStepReference { .. }
            ))
        ));
    }

    #[test]
    fn test_reference_to_uncaptured_transaction_is_rejected() {
        let steps = vec![
            WiringStep::transact("register", "RewardToken", "registerUser"),
            WiringStep::transact("purchase", "RewardToken", "purchaseItem")
                .arg(Arg::output_of("register", 0)),
        ];

        assert!(matches!(
            check(&steps),
            Err(OrchestrationError::Configuration(
                ConfigurationError::UnknownStepReference { .. }
            ))
        ));
    }

    #[test]
    fn test_unknown_target_is_rejected() {
        let steps = vec![WiringStep::transact("grant", "Governance", "grant")];

        let err = check(&steps).unwrap_err();
        assert_eq!(
            err.to_string(),
            "wiring step #0 `grant` references unknown artifact `Governance`"
        );
    }

    #[test]
    fn test_duplicate_ids_and_misplaced_options() {
        let duplicate = vec![
            WiringStep::transact("register", "RewardToken", "registerUser"),
            WiringStep::transact("register", "RewardToken", "registerUser"),
        ];
        assert!(matches!(
            check(&duplicate),
            Err(OrchestrationError::Configuration(ConfigurationError::InvalidStep { .. }))
        ));

        let expect_on_transaction = vec![
            WiringStep::transact("register", "RewardToken", "registerUser")
                .expect(Arg::literal(true)),
        ];
        assert!(matches!(
            check(&expect_on_transaction),
            Err(OrchestrationError::Configuration(ConfigurationError::InvalidStep { .. }))
        ));
    }

    #[test]
    fn test_unknown_sender_is_rejected() {
        let steps =
            vec![WiringStep::transact("purchase", "RewardToken", "purchaseItem").sender("player")];

        assert!(matches!(
            check(&steps),
            Err(OrchestrationError::Configuration(
                ConfigurationError::UnknownAccount(_)
            ))
        ));
    }
}
