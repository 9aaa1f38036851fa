//! Deployment registry: where each artifact lives on each network.
//!
//! A missing record is the normal "must deploy" signal and is returned as
//! `Ok(None)`. Only IO and parse failures are errors.
//!
//! The registry assumes a single writer. Two runs against the same network and
//! the same registry directory can race; no locking is attempted.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::NetworkId;

/// Persisted fact that an artifact has an address on a network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub artifact_name: String,
    pub network_id: NetworkId,
    pub address: Address,
    /// ABI of the deployed contract.
    pub interface: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployed_at_block: Option<u64>,
    /// Resolved constructor arguments.
    #[serde(default)]
    pub args: Vec<Value>,
    /// Hash of bytecode and arguments, see [`crate::DeploymentFingerprint`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    /// Unix timestamp when this record was written.
    #[serde(default)]
    pub deployed_at: u64,
    /// Version of chainwire that wrote the record.
    #[serde(default)]
    pub chainwire_version: String,
}

impl DeploymentRecord {
    /// Create a record with the required fields; the rest can be filled in afterwards.
    pub fn new(
        artifact_name: impl Into<String>,
        network_id: NetworkId,
        address: Address,
        interface: Value,
    ) -> Self {
        Self {
            artifact_name: artifact_name.into(),
            network_id,
            address,
            interface,
            transaction_hash: None,
            deployed_at_block: None,
            args: Vec::new(),
            fingerprint: None,
            deployed_at: chrono::Utc::now().timestamp().max(0) as u64,
            chainwire_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Storage for [`DeploymentRecord`]s, keyed by artifact name and network.
pub trait DeploymentRegistry {
    /// Fetch the live record, if any.
    fn get(&self, name: &str, network: NetworkId) -> Result<Option<DeploymentRecord>>;

    /// Insert or replace the record for `(record.artifact_name, record.network_id)`.
    fn put(&mut self, record: DeploymentRecord) -> Result<()>;

    /// All records on a network, ordered by artifact name.
    fn list(&self, network: NetworkId) -> Result<Vec<DeploymentRecord>>;

    fn exists(&self, name: &str, network: NetworkId) -> Result<bool> {
        Ok(self.get(name, network)?.is_some())
    }
}

/// In-process registry, for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryRegistry {
    records: BTreeMap<(NetworkId, String), DeploymentRecord>,
}

impl DeploymentRegistry for MemoryRegistry {
    fn get(&self, name: &str, network: NetworkId) -> Result<Option<DeploymentRecord>> {
        Ok(self.records.get(&(network, name.to_string())).cloned())
    }

    fn put(&mut self, record: DeploymentRecord) -> Result<()> {
        self.records.insert(
            (record.network_id, record.artifact_name.clone()),
            record,
        );
        Ok(())
    }

    fn list(&self, network: NetworkId) -> Result<Vec<DeploymentRecord>> {
        Ok(self
            .records
            .iter()
            .filter(|((id, _), _)| *id == network)
            .map(|(_, record)| record.clone())
            .collect())
    }
}

/// File-backed registry: one JSON file per record at `<root>/<network id>/<artifact>.json`.
#[derive(Debug, Clone)]
pub struct FileRegistry {
    root: PathBuf,
}

impl FileRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn network_dir(&self, network: NetworkId) -> PathBuf {
        self.root.join(network.to_string())
    }

    fn record_path(&self, name: &str, network: NetworkId) -> PathBuf {
        self.network_dir(network).join(format!("{}.json", name))
    }

    fn load(path: &Path) -> Result<DeploymentRecord> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read deployment record {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse deployment record {}", path.display()))
    }
}

impl DeploymentRegistry for FileRegistry {
    fn get(&self, name: &str, network: NetworkId) -> Result<Option<DeploymentRecord>> {
        let path = self.record_path(name, network);
        if !path.exists() {
            return Ok(None);
        }
        Self::load(&path).map(Some)
    }

    fn put(&mut self, record: DeploymentRecord) -> Result<()> {
        let dir = self.network_dir(record.network_id);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create deployments directory {}", dir.display()))?;

        let path = self.record_path(&record.artifact_name, record.network_id);
        let tmp_path = dir.join(format!(".{}.json.tmp", record.artifact_name));

        let json = serde_json::to_string_pretty(&record)
            .context("Failed to serialize deployment record")?;

        // Write then rename so an interrupted run never leaves a truncated record.
        std::fs::write(&tmp_path, json)
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &path)
            .with_context(|| format!("Failed to move record into {}", path.display()))?;

        tracing::debug!(path = %path.display(), "Deployment record saved");
        Ok(())
    }

    fn list(&self, network: NetworkId) -> Result<Vec<DeploymentRecord>> {
        let dir = self.network_dir(network);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(&dir)
            .with_context(|| format!("Failed to read deployments directory {}", dir.display()))?
        {
            let path = entry?.path();
            let is_record = path.extension().is_some_and(|ext| ext == "json")
                && !path
                    .file_name()
                    .is_some_and(|name| name.to_string_lossy().starts_with('.'));
            if is_record {
                paths.push(path);
            }
        }
        paths.sort();

        paths.iter().map(|path| Self::load(path)).collect()
    }
}
