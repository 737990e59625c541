//! web3-state - Multi-chain wallet provider state.
//!
//! This crate tracks, per chain family (EVM, Flow, Solana), which wallet
//! integration is active, on which chain, and with which account. The
//! choice is persisted, exposed as subscribable values, and kept consistent
//! when the user switches wallets.
//!
//! # Architecture
//!
//! - **Provider state** ([`state`]) - The per-family authority over the active
//!   provider, chain and account
//! - **Connectors** ([`connector`]) - Wallet integrations performing the
//!   actual handshake
//! - **Registry** ([`registry`]) - Provider type to connector lookup
//! - **Chain families** ([`family`], [`chains`]) - Types and validation rules
//!   of each ecosystem
//! - **Storage** ([`storage`]) - Persisted, observable fields over a
//!   key-value backend
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use web3_state::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let registry = ProviderRegistry::new().with(
//!         evm::ProviderType::MetaMask,
//!         WatchConnector::new("MetaMask", evm::is_valid_address),
//!     );
//!     let store = Arc::new(FileStore::new("./state"));
//!     let state = ProviderState::init(evm::capabilities(), registry, store).await?;
//!
//!     state
//!         .connect(evm::ProviderType::MetaMask, evm::chain::MAINNET, Some("0x..."), None, false)
//!         .await?;
//!     println!("{:?}", state.network_type().get());
//!     Ok(())
//! }
//! ```

// Core modules
pub mod account;
pub mod connector;
pub mod error;
pub mod family;
pub mod registry;
pub mod state;
pub mod storage;
pub mod subscription;

// Chain families and configuration
pub mod chains;
pub mod config;

/// Prelude module for convenient imports.
pub mod prelude {
    // Error types (centralized)
    pub use crate::error::{
        ConfigError, ConfigResult, ConnectorError, ConnectorResult, Error, ParseError,
        ProviderError, ProviderResult, Result, StorageError, StorageResult, SubscriptionClosed,
    };

    // Accounts
    pub use crate::account::{Account, ChainId, Owner};

    // Connectors
    pub use crate::connector::{
        ConnectionState, Connector, ConnectorBase, ConnectorEvent, ConnectorStatus,
        LocalWalletConnector, LocalWalletConnectorBuilder, SharedConnector, WatchConnector,
    };

    // Families
    pub use crate::chains::evm::{self, Evm};
    pub use crate::chains::flow::{self, Flow};
    pub use crate::chains::solana::{self, Solana};
    pub use crate::family::{Capabilities, ChainFamily, ChainResolver};

    // State
    pub use crate::registry::ProviderRegistry;
    pub use crate::state::{ProviderSnapshot, ProviderState};
    pub use crate::storage::{FileStore, KvStore, MemoryStore, ProviderStorage, StorageField};
    pub use crate::subscription::Subscription;

    // Config
    pub use crate::config::{
        ConfigIssue, FamilyConfig, IssueLevel, LocalWalletConfig, WalletConfig, config_path,
        init_config, load_config, save_config,
    };
}
