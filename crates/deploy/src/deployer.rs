//! Dependency-ordered deployment of artifacts.

use std::collections::{BTreeMap, HashMap};

use crate::{
    Accounts, Arg, ArtifactDescriptor, ArtifactSource, CompiledArtifact, ConfigurationError,
    DeploymentFingerprint, DeploymentPlan, DeploymentRecord, DeploymentRegistry, NetworkClient,
    NetworkId, OrchestrationError, PlannedAction, Selection, Target, TransactionKind,
    TransactionRequest, args::Resolver,
};

/// What a deployment run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentReport {
    pub network: NetworkId,
    /// Records written by this run, in deployment order.
    pub deployed: Vec<DeploymentRecord>,
    /// Records found in the registry and left untouched.
    pub reused: Vec<DeploymentRecord>,
}

impl DeploymentReport {
    pub fn new(network: NetworkId) -> Self {
        Self {
            network,
            deployed: Vec::new(),
            reused: Vec::new(),
        }
    }
}

/// Deploys artifacts in dependency order and records each one.
///
/// An artifact is only deployed once its dependencies have a confirmed
/// deployment, and its record is written before the next one starts. A failure
/// stops the run; everything recorded before it stays recorded, so the next run
/// picks up where this one stopped.
pub struct ArtifactDeployer<'a, C, R: ?Sized, A: ?Sized> {
    client: &'a C,
    registry: &'a mut R,
    artifacts: &'a A,
    accounts: &'a Accounts,
    network: NetworkId,
    confirmations: u64,
}

impl<'a, C, R, A> ArtifactDeployer<'a, C, R, A>
where
    C: NetworkClient,
    R: DeploymentRegistry + ?Sized,
    A: ArtifactSource + ?Sized,
{
    pub fn new(
        client: &'a C,
        registry: &'a mut R,
        artifacts: &'a A,
        accounts: &'a Accounts,
        network: NetworkId,
    ) -> Self {
        Self {
            client,
            registry,
            artifacts,
            accounts,
            network,
            confirmations: 1,
        }
    }

    /// Blocks to wait for after each deployment transaction.
    pub fn with_confirmations(mut self, confirmations: u64) -> Self {
        self.confirmations = confirmations.max(1);
        self
    }

    /// Compute what [`Self::deploy`] would do, without touching the network.
    pub fn plan(
        &self,
        descriptors: &[ArtifactDescriptor],
        selection: &Selection,
        force: bool,
    ) -> Result<DeploymentPlan, OrchestrationError> {
        DeploymentPlan::build(descriptors, selection, &*self.registry, self.network, force)
    }

    /// Deploy the selected artifacts and whatever they depend on.
    pub async fn deploy(
        &mut self,
        descriptors: &[ArtifactDescriptor],
        selection: &Selection,
        force: bool,
    ) -> Result<DeploymentReport, OrchestrationError> {
        let plan = self.plan(descriptors, selection, force)?;
        self.execute(plan).await
    }

    /// Run a plan computed against the same registry and network.
    pub async fn execute(
        &mut self,
        plan: DeploymentPlan,
    ) -> Result<DeploymentReport, OrchestrationError> {
        let mut report = DeploymentReport::new(self.network);

        let mut compiled = self.preflight(&plan)?;

        tracing::info!(
            network = %self.network,
            to_deploy = plan.to_deploy().count(),
            total = plan.entries.len(),
            "Starting deployment"
        );

        for entry in plan.entries {
            match entry.action {
                PlannedAction::Reuse(record) => {
                    tracing::info!(
                        artifact = %record.artifact_name,
                        address = %record.address,
                        "Reusing existing deployment"
                    );
                    if entry.selected {
                        self.warn_if_stale(&entry.descriptor, &record);
                    }
                    report.reused.push(record);
                }
                PlannedAction::Deploy => {
                    let artifact = match compiled.remove(&entry.descriptor.name) {
                        Some(artifact) => artifact,
                        None => self.load_artifact(&entry.descriptor)?,
                    };
                    let record = self.deploy_one(&entry.descriptor, artifact).await?;
                    report.deployed.push(record);
                }
            }
        }

        tracing::info!(
            deployed = report.deployed.len(),
            reused = report.reused.len(),
            "Deployment complete"
        );

        Ok(report)
    }

    /// Load every compiled artifact and check every sender before the first submission.
    fn preflight(
        &self,
        plan: &DeploymentPlan,
    ) -> Result<HashMap<String, CompiledArtifact>, OrchestrationError> {
        let mut compiled = HashMap::new();

        for entry in plan.to_deploy() {
            let descriptor = &entry.descriptor;
            self.accounts.sender(descriptor.from.as_deref())?;
            for arg in &descriptor.args {
                if let Arg::Account { account } = arg {
                    self.accounts.get(account)?;
                }
            }
            compiled.insert(descriptor.name.clone(), self.load_artifact(descriptor)?);
        }

        Ok(compiled)
    }

    fn load_artifact(
        &self,
        descriptor: &ArtifactDescriptor,
    ) -> Result<CompiledArtifact, ConfigurationError> {
        let name = descriptor.contract_name();
        self.artifacts
            .load(name)
            .map_err(|err| ConfigurationError::MissingArtifact {
                name: name.to_string(),
                reason: format!("{:#}", err),
            })
    }

    async fn deploy_one(
        &mut self,
        descriptor: &ArtifactDescriptor,
        artifact: CompiledArtifact,
    ) -> Result<DeploymentRecord, OrchestrationError> {
        let target = Target::Artifact(descriptor.name.clone());

        let outputs = BTreeMap::new();
        let args = Resolver {
            registry: &*self.registry,
            network: self.network,
            accounts: self.accounts,
            outputs: &outputs,
        }
        .resolve_all(&target, &descriptor.args)?;

        let from = self.accounts.sender(descriptor.from.as_deref())?;
        let fingerprint = DeploymentFingerprint::new(&artifact, &args).compute_hash();

        tracing::info!(
            artifact = %descriptor.name,
            contract = %descriptor.contract_name(),
            from = %from,
            args = ?args,
            "Deploying artifact"
        );

        let request = TransactionRequest {
            from,
            kind: TransactionKind::Deploy {
                artifact: descriptor.name.clone(),
                interface: artifact.abi.clone(),
                bytecode: artifact.bytecode.clone(),
                args: args.clone(),
            },
        };

        let handle = self
            .client
            .submit(request)
            .await
            .map_err(|err| OrchestrationError::from_client(target.clone(), err))?;

        tracing::debug!(artifact = %descriptor.name, tx_hash = %handle.tx_hash, "Deployment submitted");

        let receipt = self
            .client
            .wait_for_confirmations(&handle, self.confirmations)
            .await
            .map_err(|err| OrchestrationError::from_client(target.clone(), err))?;

        if !receipt.success {
            return Err(OrchestrationError::TransactionFailed {
                target,
                reason: None,
                receipt: Some(receipt),
            });
        }

        let Some(address) = receipt.contract_address else {
            return Err(OrchestrationError::MissingAddress { target, receipt });
        };

        let mut record =
            DeploymentRecord::new(&descriptor.name, self.network, address, artifact.abi);
        record.transaction_hash = Some(receipt.transaction_hash.clone());
        record.deployed_at_block = Some(receipt.block_number);
        record.args = args;
        record.fingerprint = Some(fingerprint);

        self.registry
            .put(record.clone())
            .map_err(OrchestrationError::Registry)?;

        tracing::info!(
            artifact = %descriptor.name,
            address = %address,
            tx_hash = %receipt.transaction_hash,
            block = receipt.block_number,
            gas_used = ?receipt.gas_used,
            "Artifact deployed"
        );

        Ok(record)
    }

    /// Tell the user when the manifest no longer matches what was deployed.
    fn warn_if_stale(&self, descriptor: &ArtifactDescriptor, record: &DeploymentRecord) {
        let Some(recorded) = &record.fingerprint else {
            return;
        };
        let Ok(artifact) = self.load_artifact(descriptor) else {
            return;
        };

        let outputs = BTreeMap::new();
        let resolver = Resolver {
            registry: &*self.registry,
            network: self.network,
            accounts: self.accounts,
            outputs: &outputs,
        };
        let Ok(args) = resolver.resolve_all(&Target::Artifact(descriptor.name.clone()), &descriptor.args)
        else {
            return;
        };

        if DeploymentFingerprint::new(&artifact, &args).compute_hash() != *recorded {
            tracing::warn!(
                artifact = %descriptor.name,
                address = %record.address,
                "Bytecode or constructor arguments changed since the recorded deployment; use --force to redeploy"
            );
        }
    }
}
