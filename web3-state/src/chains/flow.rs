//! Flow chain family.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::account::ChainId;
use crate::error::ParseError;
use crate::family::{Capabilities, ChainFamily, ChainResolver};

/// Well-known Flow chain ids.
pub mod chain {
    use crate::account::ChainId;

    /// Sentinel for "no valid chain".
    pub const INVALID: ChainId = ChainId(0);
    /// Flow mainnet.
    pub const MAINNET: ChainId = ChainId(1);
    /// Flow testnet.
    pub const TESTNET: ChainId = ChainId(2);
}

// 8-byte account address.
static ADDRESS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0x[0-9a-fA-F]{16}$").expect("valid Flow address regex"));

/// Marker type for the Flow family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flow;

impl ChainFamily for Flow {
    type ProviderType = ProviderType;
    type NetworkType = NetworkType;

    const NAME: &'static str = "flow";
    const PROVIDER_TYPES: &'static [ProviderType] = &ProviderType::ALL;
}

/// Flow wallet integrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderType {
    /// No wallet.
    None,
    /// Blocto.
    Blocto,
    /// Dapper.
    Dapper,
    /// Ledger hardware wallet.
    Ledger,
}

impl ProviderType {
    /// Every Flow provider type.
    pub const ALL: [Self; 4] = [Self::None, Self::Blocto, Self::Dapper, Self::Ledger];

    /// Canonical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Blocto => "Blocto",
            Self::Dapper => "Dapper",
            Self::Ledger => "Ledger",
        }
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        super::parse_name(s, &Self::ALL, Self::as_str)
            .ok_or_else(|| ParseError::new("Flow provider type", s))
    }
}

/// Flow networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetworkType {
    /// The Flow network.
    Flow,
}

impl std::fmt::Display for NetworkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Flow")
    }
}

/// Resolver for Flow chain ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlowChainResolver;

impl ChainResolver<NetworkType> for FlowChainResolver {
    fn network_type(&self, chain_id: ChainId) -> Option<NetworkType> {
        is_valid_chain_id(chain_id).then_some(NetworkType::Flow)
    }

    fn chain_name(&self, chain_id: ChainId) -> Option<&'static str> {
        match chain_id {
            chain::MAINNET => Some("Flow Mainnet"),
            chain::TESTNET => Some("Flow Testnet"),
            _ => None,
        }
    }
}

/// `0x` followed by 16 hex digits.
#[must_use]
pub fn is_valid_address(address: &str) -> bool {
    ADDRESS_RE.is_match(address)
}

/// Whether `chain_id` is a Flow chain.
#[must_use]
pub fn is_valid_chain_id(chain_id: ChainId) -> bool {
    matches!(chain_id, chain::MAINNET | chain::TESTNET)
}

/// Case-insensitive equality of two valid addresses.
#[must_use]
pub fn is_same_address(a: &str, b: &str) -> bool {
    is_valid_address(a) && is_valid_address(b) && a.eq_ignore_ascii_case(b)
}

/// Capabilities of the Flow family.
#[must_use]
pub fn capabilities() -> Capabilities<Flow> {
    Capabilities {
        default_chain_id: chain::MAINNET,
        invalid_chain_id: chain::INVALID,
        default_provider_type: ProviderType::Blocto,
        default_network_type: NetworkType::Flow,
        exclusive_providers: Vec::new(),
        is_valid_address,
        is_valid_chain_id,
        is_same_address,
        resolver: Arc::new(FlowChainResolver),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_validation() {
        assert!(is_valid_address("0x01cf0e2f2f715450"));
        assert!(!is_valid_address("01cf0e2f2f715450"));
        assert!(!is_valid_address("0x01cf0e2f2f7154"));
        assert!(is_same_address("0x01CF0E2F2F715450", "0x01cf0e2f2f715450"));
    }

    #[test]
    fn test_resolver() {
        let caps = capabilities();
        assert_eq!(caps.network_type(chain::TESTNET), NetworkType::Flow);
        assert_eq!(FlowChainResolver.network_type(ChainId(7)), None);
        assert_eq!(caps.network_type(ChainId(7)), NetworkType::Flow);
        assert_eq!(FlowChainResolver.chain_name(chain::MAINNET), Some("Flow Mainnet"));
    }

    #[test]
    fn test_provider_type_parse() {
        assert_eq!("blocto".parse(), Ok(ProviderType::Blocto));
        assert!("metamask".parse::<ProviderType>().is_err());
    }
}
