//! Entry point tying a manifest, a network client, a registry and compiled artifacts together.

use anyhow::{Context, Result};

use crate::{
    Accounts, ArtifactDeployer, ArtifactSource, ArtifactStore, ConfigurationError,
    DeploymentPlan, DeploymentRecord, DeploymentRegistry, DeploymentReport, FileRegistry,
    NetworkClient, NetworkConfig, NetworkId, OrchestrationError, ProjectConfig, RpcClient,
    Selection, WiringReport, WiringSequencer, wiring,
};

/// A deployment followed by the wiring sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub deployment: DeploymentReport,
    pub wiring: WiringReport,
}

/// Runs deployments and wiring for one network of a project.
pub struct Orchestrator<C, R, A> {
    config: ProjectConfig,
    network_name: String,
    client: C,
    registry: R,
    artifacts: A,
}

/// The orchestrator used by the command line: JSON-RPC node, records on disk,
/// artifacts from the build output directory.
pub type RpcOrchestrator = Orchestrator<RpcClient, FileRegistry, ArtifactStore>;

impl RpcOrchestrator {
    /// Build the default stack for `network` (or the manifest's default network).
    pub fn from_config(config: ProjectConfig, network: Option<&str>) -> Result<Self> {
        let network_name = network.unwrap_or(config.default_network.as_str()).to_string();
        let network_config = config.network(&network_name)?;

        let client = RpcClient::new(network_config)
            .with_context(|| format!("Failed to create RPC client for network {}", network_name))?;
        let registry = FileRegistry::new(config.deployments_dir.clone());
        let artifacts = ArtifactStore::new(config.artifacts_dir.clone());

        tracing::debug!(
            network = %network_name,
            url = %network_config.url,
            deployments = %config.deployments_dir.display(),
            artifacts = %config.artifacts_dir.display(),
            "Orchestrator configured"
        );

        Ok(Self::new(config, network_name, client, registry, artifacts)?)
    }
}

impl<C, R, A> Orchestrator<C, R, A>
where
    C: NetworkClient,
    R: DeploymentRegistry,
    A: ArtifactSource,
{
    pub fn new(
        config: ProjectConfig,
        network_name: impl Into<String>,
        client: C,
        registry: R,
        artifacts: A,
    ) -> Result<Self, ConfigurationError> {
        let network_name = network_name.into();
        config.network(&network_name)?;

        Ok(Self {
            config,
            network_name,
            client,
            registry,
            artifacts,
        })
    }

    pub fn network_name(&self) -> &str {
        &self.network_name
    }

    fn network_config(&self) -> Result<&NetworkConfig, ConfigurationError> {
        self.config.network(&self.network_name)
    }

    /// Chain id the selected network is configured with.
    pub fn network_id(&self) -> Result<NetworkId, ConfigurationError> {
        Ok(self.network_config()?.network_id())
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Check the node serves the configured chain and resolve the named accounts.
    async fn connect(&self) -> Result<(NetworkId, Accounts), OrchestrationError> {
        let expected = self.network_id()?;
        let actual = self
            .client
            .network_id()
            .await
            .map_err(OrchestrationError::Network)?;

        if actual != expected {
            return Err(ConfigurationError::NetworkMismatch {
                network: self.network_name.clone(),
                expected,
                actual,
            }
            .into());
        }

        let available = self
            .client
            .accounts()
            .await
            .map_err(OrchestrationError::Network)?;
        let accounts = Accounts::resolve(&self.config.accounts, &available)?;

        tracing::debug!(
            network = %self.network_name,
            chain_id = %actual,
            accounts = available.len(),
            "Connected to network"
        );

        Ok((actual, accounts))
    }

    /// What [`Self::deploy`] would do, computed from the registry alone.
    pub fn plan(
        &self,
        selection: &Selection,
        force: bool,
    ) -> Result<DeploymentPlan, OrchestrationError> {
        DeploymentPlan::build(
            &self.config.artifacts,
            selection,
            &self.registry,
            self.network_id()?,
            force,
        )
    }

    /// Deploy the selected artifacts and their missing dependencies.
    pub async fn deploy(
        &mut self,
        selection: &Selection,
        force: bool,
    ) -> Result<DeploymentReport, OrchestrationError> {
        // Configuration problems surface before the node is contacted.
        let plan = self.plan(selection, force)?;
        let (network, accounts) = self.connect().await?;
        self.execute(plan, network, &accounts).await
    }

    async fn execute(
        &mut self,
        plan: DeploymentPlan,
        network: NetworkId,
        accounts: &Accounts,
    ) -> Result<DeploymentReport, OrchestrationError> {
        let confirmations = self.network_config()?.block_confirmations;

        ArtifactDeployer::new(
            &self.client,
            &mut self.registry,
            &self.artifacts,
            accounts,
            network,
        )
        .with_confirmations(confirmations)
        .execute(plan)
        .await
    }

    /// Run the wiring sequence against recorded deployments.
    pub async fn wire(&self) -> Result<WiringReport, OrchestrationError> {
        let (network, accounts) = self.connect().await?;
        self.sequence(network, &accounts).await
    }

    async fn sequence(
        &self,
        network: NetworkId,
        accounts: &Accounts,
    ) -> Result<WiringReport, OrchestrationError> {
        let confirmations = self.network_config()?.block_confirmations;

        WiringSequencer::new(&self.client, &self.registry, accounts, network)
            .with_confirmations(confirmations)
            .run(&self.config.wiring)
            .await
    }

    /// Deploy, then wire.
    ///
    /// The wiring steps are checked against the plan before anything is sent:
    /// a step may target an artifact that is recorded or about to be deployed.
    pub async fn run(
        &mut self,
        selection: &Selection,
        force: bool,
    ) -> Result<RunReport, OrchestrationError> {
        let plan = self.plan(selection, force)?;
        let (network, accounts) = self.connect().await?;

        wiring::validate(&self.config.wiring, &accounts, |name| {
            if plan.entries.iter().any(|entry| entry.descriptor.name == name) {
                return Ok(true);
            }
            self.registry
                .exists(name, network)
                .map_err(OrchestrationError::Registry)
        })?;

        let deployment = self.execute(plan, network, &accounts).await?;
        let wiring = self.sequence(network, &accounts).await?;
        Ok(RunReport { deployment, wiring })
    }

    /// Every record on the selected network.
    pub fn records(&self) -> Result<Vec<DeploymentRecord>, OrchestrationError> {
        self.registry
            .list(self.network_id()?)
            .map_err(OrchestrationError::Registry)
    }
}
