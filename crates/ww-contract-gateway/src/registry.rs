//! Static deployed-address registry. A chain with no entry is a legitimate
//! "not deployed here" state, not an error.

use serde::Deserialize;
use std::collections::HashMap;
use ww_api_types::{BoardError, ChainId, ContractAddress};

#[derive(Debug, Deserialize)]
struct DeploymentEntry {
    address: ContractAddress,
    #[allow(dead_code)]
    #[serde(default)]
    label: String,
}

#[derive(Debug, Clone, Default)]
pub struct DeployedAddresses {
    entries: HashMap<ChainId, ContractAddress>,
}

impl DeployedAddresses {
    /// The registry compiled into this build.
    pub fn bundled() -> Self {
        Self::from_json(include_str!("../deployments.json"))
            .expect("bundled deployment registry is valid")
    }

    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        let parsed: HashMap<String, DeploymentEntry> = serde_json::from_str(raw)?;
        let mut entries = HashMap::new();
        for (chain, entry) in parsed {
            let chain: u64 = chain
                .parse()
                .map_err(|_| anyhow::anyhow!("non-numeric chain id '{chain}' in registry"))?;
            entries.insert(ChainId(chain), entry.address);
        }
        Ok(Self { entries })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, chain: ChainId, address: ContractAddress) {
        self.entries.insert(chain, address);
    }

    pub fn resolve(&self, chain: ChainId) -> Option<&ContractAddress> {
        self.entries.get(&chain)
    }

    /// `resolve` with the miss expressed as the `Unconfigured` state, for
    /// callers that want an error value to report.
    pub fn require(&self, chain: ChainId) -> Result<&ContractAddress, BoardError> {
        self.resolve(chain).ok_or(BoardError::Unconfigured(chain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ww_api_types::SEPOLIA;

    #[test]
    fn bundled_registry_covers_sepolia() {
        let registry = DeployedAddresses::bundled();
        let address = registry.resolve(SEPOLIA).expect("sepolia entry");
        assert!(address.0.starts_with("0x"));
    }

    #[test]
    fn unknown_chain_resolves_to_none() {
        let registry = DeployedAddresses::bundled();
        assert!(registry.resolve(ChainId(31337)).is_none());
        assert_eq!(
            registry.require(ChainId(31337)).map(|_| ()).unwrap_err(),
            BoardError::Unconfigured(ChainId(31337))
        );
    }

    #[test]
    fn malformed_chain_key_is_an_error() {
        let err = DeployedAddresses::from_json(r#"{"sepolia": {"address": "0x1"}}"#).unwrap_err();
        assert!(err.to_string().contains("non-numeric"));
    }

    #[test]
    fn insert_overrides_for_local_deployments() {
        let mut registry = DeployedAddresses::empty();
        assert!(registry.resolve(ChainId(31337)).is_none());
        registry.insert(ChainId(31337), ContractAddress("0xlocal".to_owned()));
        assert_eq!(
            registry.resolve(ChainId(31337)).map(|a| a.0.as_str()),
            Some("0xlocal")
        );
    }
}
