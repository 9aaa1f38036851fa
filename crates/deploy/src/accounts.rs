//! Named accounts (`deployer`, `player`, ...) mapped onto node accounts.

use std::collections::BTreeMap;

use alloy_core::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::ConfigurationError;

/// The account sending transactions when none is named.
pub const DEFAULT_SENDER: &str = "deployer";

/// How a named account is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AccountRef {
    /// Index into the accounts exposed by the node (`eth_accounts`).
    Index(usize),
    /// A fixed address the node can sign for.
    Address(Address),
}

/// Named accounts resolved to addresses for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Accounts {
    named: BTreeMap<String, Address>,
}

impl Accounts {
    /// Resolve the configured names against the node's accounts.
    ///
    /// Without any configuration, `deployer` is account 0 and `player` account 1.
    pub fn resolve(
        configured: &BTreeMap<String, AccountRef>,
        available: &[Address],
    ) -> Result<Self, ConfigurationError> {
        let defaults: BTreeMap<String, AccountRef> = [
            (DEFAULT_SENDER.to_string(), AccountRef::Index(0)),
            ("player".to_string(), AccountRef::Index(1)),
        ]
        .into_iter()
        .collect();

        let explicit = !configured.is_empty();
        let source = if explicit { configured } else { &defaults };

        let mut named = BTreeMap::new();
        for (name, account) in source {
            let address = match account {
                AccountRef::Address(address) => *address,
                AccountRef::Index(index) => match available.get(*index) {
                    Some(address) => *address,
                    // Defaults are best-effort: a node with a single account has no player.
                    None if !explicit => continue,
                    None => {
                        return Err(ConfigurationError::AccountIndexOutOfRange {
                            name: name.clone(),
                            index: *index,
                            available: available.len(),
                        });
                    }
                },
            };
            named.insert(name.clone(), address);
        }

        Ok(Self { named })
    }

    /// Build from already known addresses.
    pub fn from_addresses(named: impl IntoIterator<Item = (String, Address)>) -> Self {
        Self {
            named: named.into_iter().collect(),
        }
    }

    /// Address of a named account.
    pub fn get(&self, name: &str) -> Result<Address, ConfigurationError> {
        self.named
            .get(name)
            .copied()
            .ok_or_else(|| ConfigurationError::UnknownAccount(name.to_string()))
    }

    /// Address of the named sender, defaulting to `deployer`.
    pub fn sender(&self, name: Option<&str>) -> Result<Address, ConfigurationError> {
        self.get(name.unwrap_or(DEFAULT_SENDER))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.named.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_accounts() -> Vec<Address> {
        vec![
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266".parse().unwrap(),
            "0x70997970c51812dc3a010c7d01b50e0d17dc79c8".parse().unwrap(),
        ]
    }

    #[test]
    fn test_default_named_accounts() {
        let accounts = Accounts::resolve(&BTreeMap::new(), &node_accounts()).unwrap();

        assert_eq!(accounts.sender(None).unwrap(), node_accounts()[0]);
        assert_eq!(accounts.get("player").unwrap(), node_accounts()[1]);
    }

    #[test]
    fn test_defaults_tolerate_single_account() {
        let accounts = Accounts::resolve(&BTreeMap::new(), &node_accounts()[..1]).unwrap();

        assert!(accounts.contains("deployer"));
        assert_eq!(
            accounts.get("player").unwrap_err(),
            ConfigurationError::UnknownAccount("player".to_string())
        );
    }

    #[test]
    fn test_explicit_accounts() {
        let fixed: Address = "0x23618e81e3f5cdf7f54c3d65f7fbc0abf5b21e8f".parse().unwrap();
        let configured = BTreeMap::from([
            ("deployer".to_string(), AccountRef::Index(1)),
            ("treasury".to_string(), AccountRef::Address(fixed)),
        ]);

        let accounts = Accounts::resolve(&configured, &node_accounts()).unwrap();

        assert_eq!(accounts.sender(None).unwrap(), node_accounts()[1]);
        assert_eq!(accounts.get("treasury").unwrap(), fixed);
        assert!(!accounts.contains("player"));
    }

    #[test]
    fn test_explicit_index_out_of_range() {
        let configured = BTreeMap::from([("deployer".to_string(), AccountRef::Index(4))]);

        assert_eq!(
            Accounts::resolve(&configured, &node_accounts()).unwrap_err(),
            ConfigurationError::AccountIndexOutOfRange {
                name: "deployer".to_string(),
                index: 4,
                available: 2,
            }
        );
    }
}
