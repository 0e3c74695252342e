use crate::types::EngineError;
use ethers::providers::{Http, Provider};
use ethers::types::Address;
use std::str::FromStr;

/// Settings a hub or client needs to validate channel updates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Address whose signature counts as the hub's.
    pub hub_address: Address,
    /// JSON-RPC endpoint used to confirm pending operations on-chain.
    pub rpc_url: Option<String>,
}

impl EngineConfig {
    pub const HUB_ADDRESS_VAR: &'static str = "HUB_ADDRESS";
    pub const RPC_URL_VAR: &'static str = "ETH_RPC_URL";

    pub fn new(hub_address: Address) -> Self {
        Self {
            hub_address,
            rpc_url: None,
        }
    }

    pub fn from_env() -> Result<Self, EngineError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, EngineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw = lookup(Self::HUB_ADDRESS_VAR).ok_or_else(|| {
            EngineError::Config(format!("{} is not set", Self::HUB_ADDRESS_VAR))
        })?;
        let hub_address = Address::from_str(raw.trim()).map_err(|e| {
            EngineError::Config(format!("{} is not an address: {}", Self::HUB_ADDRESS_VAR, e))
        })?;

        let rpc_url = lookup(Self::RPC_URL_VAR)
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());

        Ok(Self {
            hub_address,
            rpc_url,
        })
    }

    pub fn with_rpc_url(mut self, url: impl Into<String>) -> Self {
        self.rpc_url = Some(url.into());
        self
    }

    /// HTTP provider for the configured endpoint.
    pub fn provider(&self) -> Result<Provider<Http>, EngineError> {
        let url = self.rpc_url.as_deref().ok_or_else(|| {
            EngineError::Config(format!("{} is not set", Self::RPC_URL_VAR))
        })?;
        Provider::<Http>::try_from(url).map_err(|e| EngineError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_reads_hub_and_rpc() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("HUB_ADDRESS", "0x00000000000000000000000000000000000000AB"),
            ("ETH_RPC_URL", " http://localhost:8545 "),
        ]))
        .unwrap();

        assert_eq!(config.hub_address, Address::from_low_u64_be(0xab));
        assert_eq!(config.rpc_url.as_deref(), Some("http://localhost:8545"));
        assert!(config.provider().is_ok());
    }

    #[test]
    fn test_missing_or_bad_hub_address() {
        assert!(matches!(
            EngineConfig::from_lookup(lookup(&[])),
            Err(EngineError::Config(_))
        ));
        assert!(matches!(
            EngineConfig::from_lookup(lookup(&[("HUB_ADDRESS", "hub")])),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn test_rpc_url_is_optional() {
        let config = EngineConfig::from_lookup(lookup(&[(
            "HUB_ADDRESS",
            "0x0000000000000000000000000000000000000001",
        )]))
        .unwrap();
        assert!(config.rpc_url.is_none());
        assert!(matches!(config.provider(), Err(EngineError::Config(_))));
    }
}
