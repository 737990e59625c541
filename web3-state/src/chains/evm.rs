//! EVM chain family.

use std::sync::Arc;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::account::ChainId;
use crate::error::ParseError;
use crate::family::{Capabilities, ChainFamily, ChainResolver};

/// Well-known EVM chain ids.
pub mod chain {
    use crate::account::ChainId;

    /// Sentinel for "no valid chain".
    pub const INVALID: ChainId = ChainId(0);
    /// Ethereum mainnet.
    pub const MAINNET: ChainId = ChainId(1);
    /// Ropsten testnet.
    pub const ROPSTEN: ChainId = ChainId(3);
    /// Rinkeby testnet.
    pub const RINKEBY: ChainId = ChainId(4);
    /// Görli testnet.
    pub const GOERLI: ChainId = ChainId(5);
    /// Optimism.
    pub const OPTIMISM: ChainId = ChainId(10);
    /// Kovan testnet.
    pub const KOVAN: ChainId = ChainId(42);
    /// BNB Smart Chain.
    pub const BSC: ChainId = ChainId(56);
    /// Optimism Kovan testnet.
    pub const OPTIMISM_KOVAN: ChainId = ChainId(69);
    /// BNB Smart Chain testnet.
    pub const BSC_TESTNET: ChainId = ChainId(97);
    /// Gnosis Chain (xDai).
    pub const XDAI: ChainId = ChainId(100);
    /// Polygon.
    pub const MATIC: ChainId = ChainId(137);
    /// Fantom Opera.
    pub const FANTOM: ChainId = ChainId(250);
    /// Astar.
    pub const ASTAR: ChainId = ChainId(592);
    /// Conflux eSpace.
    pub const CONFLUX: ChainId = ChainId(1030);
    /// Celo.
    pub const CELO: ChainId = ChainId(42220);
    /// Arbitrum One.
    pub const ARBITRUM: ChainId = ChainId(42161);
    /// Avalanche Fuji testnet.
    pub const AVALANCHE_FUJI: ChainId = ChainId(43113);
    /// Avalanche C-Chain.
    pub const AVALANCHE: ChainId = ChainId(43114);
    /// Polygon Mumbai testnet.
    pub const MUMBAI: ChainId = ChainId(80001);
    /// Arbitrum Rinkeby testnet.
    pub const ARBITRUM_RINKEBY: ChainId = ChainId(421_611);
    /// Aurora.
    pub const AURORA: ChainId = ChainId(1_313_161_554);
    /// Aurora testnet.
    pub const AURORA_TESTNET: ChainId = ChainId(1_313_161_555);
}

/// Marker type for the EVM family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Evm;

impl ChainFamily for Evm {
    type ProviderType = ProviderType;
    type NetworkType = NetworkType;

    const NAME: &'static str = "evm";
    const PROVIDER_TYPES: &'static [ProviderType] = &ProviderType::ALL;
}

/// EVM wallet integrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderType {
    /// No wallet.
    None,
    /// The in-app wallet.
    MaskWallet,
    /// MetaMask browser extension.
    MetaMask,
    /// WalletConnect remote signer.
    WalletConnect,
    /// Coin98 browser extension.
    Coin98,
    /// Coinbase Wallet (WalletLink).
    WalletLink,
    /// MathWallet browser extension.
    MathWallet,
    /// Fortmatic hosted wallet.
    Fortmatic,
    /// Opera built-in wallet.
    Opera,
    /// Clover browser extension.
    Clover,
}

impl ProviderType {
    /// Every EVM provider type.
    pub const ALL: [Self; 10] = [
        Self::None,
        Self::MaskWallet,
        Self::MetaMask,
        Self::WalletConnect,
        Self::Coin98,
        Self::WalletLink,
        Self::MathWallet,
        Self::Fortmatic,
        Self::Opera,
        Self::Clover,
    ];

    /// Canonical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::MaskWallet => "MaskWallet",
            Self::MetaMask => "MetaMask",
            Self::WalletConnect => "WalletConnect",
            Self::Coin98 => "Coin98",
            Self::WalletLink => "WalletLink",
            Self::MathWallet => "MathWallet",
            Self::Fortmatic => "Fortmatic",
            Self::Opera => "Opera",
            Self::Clover => "Clover",
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
            .ok_or_else(|| ParseError::new("EVM provider type", s))
    }
}

/// EVM networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetworkType {
    /// Ethereum and its testnets.
    Ethereum,
    /// BNB Smart Chain.
    Binance,
    /// Polygon.
    Polygon,
    /// Arbitrum.
    Arbitrum,
    /// Gnosis Chain.
    #[serde(rename = "xDai")]
    XDai,
    /// Optimism.
    Optimism,
    /// Avalanche.
    Avalanche,
    /// Celo.
    Celo,
    /// Fantom.
    Fantom,
    /// Aurora.
    Aurora,
    /// Conflux eSpace.
    Conflux,
    /// Astar.
    Astar,
}

impl std::fmt::Display for NetworkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Ethereum => "Ethereum",
            Self::Binance => "Binance",
            Self::Polygon => "Polygon",
            Self::Arbitrum => "Arbitrum",
            Self::XDai => "xDai",
            Self::Optimism => "Optimism",
            Self::Avalanche => "Avalanche",
            Self::Celo => "Celo",
            Self::Fantom => "Fantom",
            Self::Aurora => "Aurora",
            Self::Conflux => "Conflux",
            Self::Astar => "Astar",
        })
    }
}

/// Known chains with their display name and network.
const CHAINS: &[(ChainId, &str, NetworkType)] = &[
    (chain::MAINNET, "Ethereum Mainnet", NetworkType::Ethereum),
    (chain::ROPSTEN, "Ropsten", NetworkType::Ethereum),
    (chain::RINKEBY, "Rinkeby", NetworkType::Ethereum),
    (chain::GOERLI, "Görli", NetworkType::Ethereum),
    (chain::KOVAN, "Kovan", NetworkType::Ethereum),
    (chain::OPTIMISM, "Optimism", NetworkType::Optimism),
    (chain::OPTIMISM_KOVAN, "Optimism Kovan", NetworkType::Optimism),
    (chain::BSC, "BNB Smart Chain", NetworkType::Binance),
    (chain::BSC_TESTNET, "BNB Smart Chain Testnet", NetworkType::Binance),
    (chain::XDAI, "Gnosis", NetworkType::XDai),
    (chain::MATIC, "Polygon", NetworkType::Polygon),
    (chain::MUMBAI, "Polygon Mumbai", NetworkType::Polygon),
    (chain::FANTOM, "Fantom", NetworkType::Fantom),
    (chain::ASTAR, "Astar", NetworkType::Astar),
    (chain::CONFLUX, "Conflux eSpace", NetworkType::Conflux),
    (chain::CELO, "Celo", NetworkType::Celo),
    (chain::ARBITRUM, "Arbitrum One", NetworkType::Arbitrum),
    (chain::ARBITRUM_RINKEBY, "Arbitrum Rinkeby", NetworkType::Arbitrum),
    (chain::AVALANCHE, "Avalanche C-Chain", NetworkType::Avalanche),
    (chain::AVALANCHE_FUJI, "Avalanche Fuji", NetworkType::Avalanche),
    (chain::AURORA, "Aurora", NetworkType::Aurora),
    (chain::AURORA_TESTNET, "Aurora Testnet", NetworkType::Aurora),
];

/// Table-driven resolver for EVM chain ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvmChainResolver;

impl ChainResolver<NetworkType> for EvmChainResolver {
    fn network_type(&self, chain_id: ChainId) -> Option<NetworkType> {
        CHAINS
            .iter()
            .find(|(id, _, _)| *id == chain_id)
            .map(|(_, _, network)| *network)
    }

    fn chain_name(&self, chain_id: ChainId) -> Option<&'static str> {
        CHAINS
            .iter()
            .find(|(id, _, _)| *id == chain_id)
            .map(|(_, name, _)| *name)
    }
}

/// `0x`-prefixed, 20-byte hex address. Checksum casing is not enforced.
#[must_use]
pub fn is_valid_address(address: &str) -> bool {
    address.starts_with("0x") && address.parse::<Address>().is_ok()
}

/// Whether `chain_id` is a known EVM chain.
#[must_use]
pub fn is_valid_chain_id(chain_id: ChainId) -> bool {
    CHAINS.iter().any(|(id, _, _)| *id == chain_id)
}

/// Byte-wise address equality, ignoring checksum casing.
#[must_use]
pub fn is_same_address(a: &str, b: &str) -> bool {
    match (a.parse::<Address>(), b.parse::<Address>()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Capabilities of the EVM family.
///
/// WalletConnect sessions are torn down whenever another provider connects
/// so that a remote signer is never left paired in the background.
#[must_use]
pub fn capabilities() -> Capabilities<Evm> {
    Capabilities {
        default_chain_id: chain::MAINNET,
        invalid_chain_id: chain::INVALID,
        default_provider_type: ProviderType::MaskWallet,
        default_network_type: NetworkType::Ethereum,
        exclusive_providers: vec![ProviderType::WalletConnect],
        is_valid_address,
        is_valid_chain_id,
        is_same_address,
        resolver: Arc::new(EvmChainResolver),
    }
}
