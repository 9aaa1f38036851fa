use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::CompiledArtifact;

/// Inputs that determine what a deployment puts on chain.
///
/// When any of them change, the recorded deployment no longer matches the
/// manifest. The deployer reports this but only redeploys when forced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentFingerprint {
    /// Creation bytecode, lowercase hex.
    pub bytecode: String,
    /// Resolved constructor arguments.
    pub args: Vec<Value>,
}

impl DeploymentFingerprint {
    pub fn new(artifact: &CompiledArtifact, args: &[Value]) -> Self {
        Self {
            bytecode: artifact.bytecode.to_ascii_lowercase(),
            args: args.to_vec(),
        }
    }

    /// Compute a SHA-256 hash of these inputs.
    ///
    /// The hash is deterministic: the same bytecode and arguments always produce the same hash.
    pub fn compute_hash(&self) -> String {
        let json = serde_json::to_string(self)
            .expect("DeploymentFingerprint serialization should never fail");

        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn artifact(bytecode: &str) -> CompiledArtifact {
        CompiledArtifact {
            name: "RewardToken".to_string(),
            abi: json!([]),
            bytecode: bytecode.to_string(),
        }
    }

    #[test]
    fn test_hash_determinism() {
        let fingerprint = DeploymentFingerprint::new(&artifact("0x6080"), &[json!("KK"), json!("KK")]);

        let hash1 = fingerprint.compute_hash();
        let hash2 = fingerprint.compute_hash();

        assert_eq!(hash1, hash2, "Hash should be deterministic");
        assert_eq!(hash1.len(), 64, "SHA-256 hash should be 64 hex characters");
    }

    #[test]
    fn test_hash_changes_with_args() {
        let first = DeploymentFingerprint::new(&artifact("0x6080"), &[json!("KK"), json!("KK")]);
        let second = DeploymentFingerprint::new(&artifact("0x6080"), &[json!("MM"), json!("MM")]);

        assert_ne!(
            first.compute_hash(),
            second.compute_hash(),
            "Hash should change when constructor arguments change"
        );
    }

    #[test]
    fn test_hash_changes_with_bytecode() {
        let first = DeploymentFingerprint::new(&artifact("0x6080"), &[]);
        let second = DeploymentFingerprint::new(&artifact("0x6081"), &[]);

        assert_ne!(
            first.compute_hash(),
            second.compute_hash(),
            "Hash should change when bytecode changes"
        );
    }

    #[test]
    fn test_hash_ignores_bytecode_casing() {
        let lower = DeploymentFingerprint::new(&artifact("0xabcd"), &[]);
        let upper = DeploymentFingerprint::new(&artifact("0xABCD"), &[]);

        assert_eq!(lower.compute_hash(), upper.compute_hash());
    }
}
