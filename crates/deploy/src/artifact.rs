//! Artifact descriptors and compiled artifact loading.

use std::{
    collections::{BTreeSet, HashMap},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use walkdir::WalkDir;

use crate::Arg;

/// A deployable contract as declared in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    /// Unique name; also the key of its deployment record.
    pub name: String,
    /// Compiled artifact to deploy, when it differs from `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract: Option<String>,
    /// Constructor arguments, in order.
    #[serde(default)]
    pub args: Vec<Arg>,
    /// Labels used to select this artifact.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Named account sending the deployment (defaults to `deployer`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

impl ArtifactDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contract: None,
            args: Vec::new(),
            tags: BTreeSet::new(),
            from: None,
        }
    }

    pub fn arg(mut self, arg: Arg) -> Self {
        self.args.push(arg);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn contract(mut self, contract: impl Into<String>) -> Self {
        self.contract = Some(contract.into());
        self
    }

    /// Name of the compiled artifact to load.
    pub fn contract_name(&self) -> &str {
        self.contract.as_deref().unwrap_or(&self.name)
    }

    /// Artifacts whose addresses the constructor needs, in argument order.
    pub fn dependencies(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        self.args
            .iter()
            .filter_map(Arg::artifact_reference)
            .filter(|name| seen.insert(*name))
            .collect()
    }

    /// Whether the artifact is selected by `selector` (a tag or its own name).
    pub fn has_tag(&self, selector: &str) -> bool {
        self.name == selector || self.tags.contains(selector)
    }
}

/// Output of the external build step for one contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledArtifact {
    pub name: String,
    /// ABI of the contract.
    pub abi: Value,
    /// `0x`-prefixed creation bytecode.
    pub bytecode: String,
}

/// Somewhere compiled artifacts can be loaded from.
pub trait ArtifactSource {
    fn load(&self, name: &str) -> Result<CompiledArtifact>;
}

impl ArtifactSource for HashMap<String, CompiledArtifact> {
    fn load(&self, name: &str) -> Result<CompiledArtifact> {
        self.get(name)
            .cloned()
            .with_context(|| format!("No compiled artifact named {}", name))
    }
}

/// Bytecode is a plain hex string in Hardhat artifacts and an object in Foundry ones.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BytecodeField {
    Hex(String),
    Object { object: String },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArtifactFile {
    #[serde(default)]
    contract_name: Option<String>,
    abi: Value,
    bytecode: BytecodeField,
}

/// Directory of compiled artifacts (Hardhat `artifacts/` or Foundry `out/`).
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Look for `<root>/<name>.json`, then for `<name>.json` anywhere below the root.
    fn find(&self, name: &str) -> Result<PathBuf> {
        let file_name = format!("{}.json", name);

        let direct = self.root.join(&file_name);
        if direct.is_file() {
            return Ok(direct);
        }

        Self::search(&self.root, &file_name)?.with_context(|| {
            format!(
                "Artifact {} not found under {}",
                file_name,
                self.root.display()
            )
        })
    }

    fn search(dir: &Path, file_name: &str) -> Result<Option<PathBuf>> {
        if !dir.is_dir() {
            return Ok(None);
        }

        // Hardhat keeps compiler inputs under build-info, never artifacts.
        let entries = WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !(e.file_type().is_dir() && e.file_name() == "build-info"));

        for entry in entries {
            let entry = entry.with_context(|| {
                format!("Failed to read artifacts directory {}", dir.display())
            })?;
            if entry.file_type().is_file() && entry.file_name() == file_name {
                return Ok(Some(entry.into_path()));
            }
        }

        Ok(None)
    }
}

impl ArtifactSource for ArtifactStore {
    fn load(&self, name: &str) -> Result<CompiledArtifact> {
        let path = self.find(name)?;
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read artifact {}", path.display()))?;
        let file: ArtifactFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse artifact {}", path.display()))?;

        let bytecode = match file.bytecode {
            BytecodeField::Hex(hex) => hex,
            BytecodeField::Object { object } => object,
        };
        let bytecode = if bytecode.starts_with("0x") {
            bytecode
        } else {
            format!("0x{}", bytecode)
        };

        if bytecode == "0x" {
            anyhow::bail!(
                "Artifact {} has no bytecode (abstract contract or interface?)",
                path.display()
            );
        }

        tracing::debug!(artifact = name, path = %path.display(), "Loaded compiled artifact");

        Ok(CompiledArtifact {
            name: file.contract_name.unwrap_or_else(|| name.to_string()),
            abi: file.abi,
            bytecode,
        })
    }
}
