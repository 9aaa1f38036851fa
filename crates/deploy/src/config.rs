//! Project manifest: networks, named accounts, artifacts and wiring steps.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{AccountRef, ArtifactDescriptor, ConfigurationError, NetworkId, WiringStep};

/// The default name for the project manifest.
pub const CONFIG_FILENAME: &str = "Chainwire.toml";

/// Prefix of environment variables overriding manifest values.
///
/// Nested keys are separated by a double underscore, e.g.
/// `CHAINWIRE_NETWORKS__SEPOLIA__URL`.
pub const ENV_PREFIX: &str = "CHAINWIRE_";

fn default_network() -> String {
    "localhost".to_string()
}

fn default_artifacts_dir() -> PathBuf {
    PathBuf::from("artifacts")
}

fn default_deployments_dir() -> PathBuf {
    PathBuf::from("deployments")
}

fn default_block_confirmations() -> u64 {
    1
}

fn default_confirmation_timeout_secs() -> u64 {
    300
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_rpc_timeout_secs() -> u64 {
    10
}

/// Connection settings for one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// JSON-RPC endpoint.
    pub url: Url,
    /// Expected chain id; the node must report the same one.
    pub chain_id: u64,
    /// Confirmations to wait for after each transaction.
    #[serde(default = "default_block_confirmations")]
    pub block_confirmations: u64,
    /// Upper bound on a single confirmation wait.
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,
    /// Delay between receipt polls.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Timeout of a single HTTP request.
    #[serde(default = "default_rpc_timeout_secs")]
    pub rpc_timeout_secs: u64,
}

impl NetworkConfig {
    pub fn network_id(&self) -> NetworkId {
        NetworkId(self.chain_id)
    }
}

/// The project manifest, usually loaded from `Chainwire.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Network used when none is selected on the command line.
    #[serde(default = "default_network")]
    pub default_network: String,
    /// Directory holding compiled artifacts.
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: PathBuf,
    /// Directory holding deployment records.
    #[serde(default = "default_deployments_dir")]
    pub deployments_dir: PathBuf,
    /// Known networks by name.
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkConfig>,
    /// Named accounts (`deployer`, `player`, ...).
    #[serde(default)]
    pub accounts: BTreeMap<String, AccountRef>,
    /// Deployable artifacts, in declaration order.
    #[serde(default, rename = "artifact")]
    pub artifacts: Vec<ArtifactDescriptor>,
    /// Post-deployment steps, in execution order.
    #[serde(default)]
    pub wiring: Vec<WiringStep>,
}

impl ProjectConfig {
    /// Load the manifest from a file (or a directory containing `Chainwire.toml`),
    /// merged with `CHAINWIRE_*` environment overrides.
    ///
    /// Relative directories in the manifest are resolved against the manifest's directory.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Configuration file or directory not found: {}", path.display());
        }

        let config_path = if path.is_dir() {
            path.join(CONFIG_FILENAME)
        } else {
            path.to_path_buf()
        };

        let config: Self = Figment::new()
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

        let base = config_path.parent().unwrap_or(Path::new("."));
        tracing::info!(path = %config_path.display(), "Configuration loaded");

        Ok(config.with_base_dir(base))
    }

    /// Parse a manifest from a TOML string, without environment overrides.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Figment::from(Toml::string(content))
            .extract()
            .context("Failed to parse config as TOML")
    }

    fn with_base_dir(mut self, base: &Path) -> Self {
        if self.artifacts_dir.is_relative() {
            self.artifacts_dir = base.join(&self.artifacts_dir);
        }
        if self.deployments_dir.is_relative() {
            self.deployments_dir = base.join(&self.deployments_dir);
        }
        self
    }

    /// Look up a network by name.
    pub fn network(&self, name: &str) -> Result<&NetworkConfig, ConfigurationError> {
        self.networks
            .get(name)
            .ok_or_else(|| ConfigurationError::UnknownNetwork(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Arg, StepKind};
    use serde_json::json;
    use tempdir::TempDir;

    const MANIFEST: &str = r#"
default_network = "localhost"

[networks.localhost]
url = "http://127.0.0.1:8545/"
chain_id = 31337

[networks.sepolia]
url = "https://ethereum-sepolia-rpc.publicnode.com"
chain_id = 11155111
block_confirmations = 5

[accounts]
deployer = 0
player = 1

[[artifact]]
name = "RewardToken"
args = ["KK", "KK"]
tags = ["all", "RewardToken"]

[[artifact]]
name = "Governance"
args = [{ address_of = "RewardToken" }]
tags = ["all", "Governance"]

[[wiring]]
id = "transfer-ownership"
target = "RewardToken"
method = "transferOwnership"
args = [{ address_of = "Governance" }]

[[wiring]]
id = "check-owner"
target = "RewardToken"
method = "owner"
kind = "read"
expect = { address_of = "Governance" }
"#;

    #[test]
    fn test_parse_manifest() {
        let config = ProjectConfig::from_toml_str(MANIFEST).unwrap();

        assert_eq!(config.default_network, "localhost");
        assert_eq!(config.artifacts_dir, PathBuf::from("artifacts"));
        assert_eq!(config.networks["localhost"].block_confirmations, 1);
        assert_eq!(config.networks["sepolia"].block_confirmations, 5);
        assert_eq!(config.networks["sepolia"].confirmation_timeout_secs, 300);
        assert_eq!(config.accounts["player"], AccountRef::Index(1));

        assert_eq!(config.artifacts.len(), 2);
        assert_eq!(
            config.artifacts[0].args,
            vec![Arg::Literal(json!("KK")), Arg::Literal(json!("KK"))]
        );
        assert_eq!(
            config.artifacts[1].args,
            vec![Arg::AddressOf {
                address_of: "RewardToken".to_string()
            }]
        );

        assert_eq!(config.wiring.len(), 2);
        assert_eq!(config.wiring[0].kind, StepKind::Transact);
        assert_eq!(config.wiring[1].kind, StepKind::Read);
        assert!(config.wiring[1].expect.is_some());
    }

    #[test]
    fn test_unknown_network() {
        let config = ProjectConfig::from_toml_str(MANIFEST).unwrap();
        assert_eq!(
            config.network("mainnet").unwrap_err(),
            ConfigurationError::UnknownNetwork("mainnet".to_string())
        );
        assert_eq!(
            config.network("sepolia").unwrap().network_id(),
            NetworkId(11155111)
        );
    }

    #[test]
    fn test_load_resolves_relative_dirs() {
        let temp_dir = TempDir::new("chainwire-test").expect("Failed to create temp dir");
        std::fs::write(temp_dir.path().join(CONFIG_FILENAME), MANIFEST)
            .expect("Failed to write manifest");

        let config = ProjectConfig::load(temp_dir.path()).expect("Failed to load manifest");

        assert_eq!(config.artifacts_dir, temp_dir.path().join("artifacts"));
        assert_eq!(config.deployments_dir, temp_dir.path().join("deployments"));
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new("chainwire-test").expect("Failed to create temp dir");
        assert!(ProjectConfig::load(&temp_dir.path().join("missing.toml")).is_err());
    }
}
