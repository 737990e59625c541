//! Solana chain family.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::account::ChainId;
use crate::error::ParseError;
use crate::family::{Capabilities, ChainFamily, ChainResolver};

/// Well-known Solana chain ids.
pub mod chain {
    use crate::account::ChainId;

    /// Sentinel for "no valid chain".
    pub const INVALID: ChainId = ChainId(0);
    /// Solana mainnet-beta.
    pub const MAINNET: ChainId = ChainId(101);
    /// Solana testnet.
    pub const TESTNET: ChainId = ChainId(102);
    /// Solana devnet.
    pub const DEVNET: ChainId = ChainId(103);
}

// Base58-encoded 32-byte public key.
static ADDRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[1-9A-HJ-NP-Za-km-z]{32,44}$").expect("valid Solana address regex")
});

/// Marker type for the Solana family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Solana;

impl ChainFamily for Solana {
    type ProviderType = ProviderType;
    type NetworkType = NetworkType;

    const NAME: &'static str = "solana";
    const PROVIDER_TYPES: &'static [ProviderType] = &ProviderType::ALL;
}

/// Solana wallet integrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderType {
    /// No wallet.
    None,
    /// Phantom.
    Phantom,
    /// Solflare.
    Solflare,
    /// Coin98.
    Coin98,
    /// Sollet.
    Sollet,
}

impl ProviderType {
    /// Every Solana provider type.
    pub const ALL: [Self; 5] = [
        Self::None,
        Self::Phantom,
        Self::Solflare,
        Self::Coin98,
        Self::Sollet,
    ];

    /// Canonical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Phantom => "Phantom",
            Self::Solflare => "Solflare",
            Self::Coin98 => "Coin98",
            Self::Sollet => "Sollet",
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
            .ok_or_else(|| ParseError::new("Solana provider type", s))
    }
}

/// Solana networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetworkType {
    /// The Solana network.
    Solana,
}

impl std::fmt::Display for NetworkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Solana")
    }
}

/// Resolver for Solana chain ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct SolanaChainResolver;

impl ChainResolver<NetworkType> for SolanaChainResolver {
    fn network_type(&self, chain_id: ChainId) -> Option<NetworkType> {
        is_valid_chain_id(chain_id).then_some(NetworkType::Solana)
    }

    fn chain_name(&self, chain_id: ChainId) -> Option<&'static str> {
        match chain_id {
            chain::MAINNET => Some("Solana Mainnet"),
            chain::TESTNET => Some("Solana Testnet"),
            chain::DEVNET => Some("Solana Devnet"),
            _ => None,
        }
    }
}

/// Base58 string of plausible public-key length.
#[must_use]
pub fn is_valid_address(address: &str) -> bool {
    ADDRESS_RE.is_match(address)
}

/// Whether `chain_id` is a Solana cluster.
#[must_use]
pub fn is_valid_chain_id(chain_id: ChainId) -> bool {
    matches!(chain_id, chain::MAINNET | chain::TESTNET | chain::DEVNET)
}

/// Exact equality; base58 is case-sensitive.
#[must_use]
pub fn is_same_address(a: &str, b: &str) -> bool {
    is_valid_address(a) && a == b
}

/// Capabilities of the Solana family.
#[must_use]
pub fn capabilities() -> Capabilities<Solana> {
    Capabilities {
        default_chain_id: chain::MAINNET,
        invalid_chain_id: chain::INVALID,
        default_provider_type: ProviderType::Phantom,
        default_network_type: NetworkType::Solana,
        exclusive_providers: Vec::new(),
        is_valid_address,
        is_valid_chain_id,
        is_same_address,
        resolver: Arc::new(SolanaChainResolver),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PUBKEY: &str = "7EcDhSYGxXyscszYEp35KHN8vvw3svAuLKTzXwCFLtV";

    #[test]
    fn test_address_validation() {
        assert!(is_valid_address(PUBKEY));
        assert!(!is_valid_address("0x2c7536e3605d9c16a7a3d7b1898e529396a65c23"));
        assert!(!is_valid_address("short"));
        assert!(is_same_address(PUBKEY, PUBKEY));
        assert!(!is_same_address(PUBKEY, &PUBKEY.to_lowercase()));
    }

    #[test]
    fn test_resolver() {
        let caps = capabilities();
        assert_eq!(caps.network_type(chain::DEVNET), NetworkType::Solana);
        assert_eq!(SolanaChainResolver.network_type(chain::INVALID), None);
        assert_eq!(SolanaChainResolver.chain_name(chain::TESTNET), Some("Solana Testnet"));
    }

    #[test]
    fn test_provider_type_parse() {
        assert_eq!("PHANTOM".parse(), Ok(ProviderType::Phantom));
        assert_eq!("coin98".parse(), Ok(ProviderType::Coin98));
    }
}
