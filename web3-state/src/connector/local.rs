//! In-app EVM wallet connector.
//!
//! Keys live in this process: [`LocalWalletConnector`] derives an [`alloy`]
//! `PrivateKeySigner` from a BIP39 mnemonic ([`kobe`] + [`kobe_eth`]) or a
//! raw private key, and connects by exposing the signer's address on the
//! requested chain.

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::info;

use super::{ConnectionState, Connector, ConnectorBase, ConnectorEvent, ConnectorStatus};
use crate::account::{Account, ChainId, Owner};
use crate::error::{ConnectorError, ConnectorResult};

/// Builder for constructing a [`LocalWalletConnector`].
///
/// ```rust,ignore
/// let connector = LocalWalletConnector::builder()
///     .mnemonic("abandon abandon ...")
///     .index(0)
///     .build()?;
/// ```
#[derive(Default)]
pub struct LocalWalletConnectorBuilder {
    /// Connector name (default "MaskWallet").
    name: Option<String>,
    /// BIP39 mnemonic phrase.
    mnemonic: Option<String>,
    /// BIP39 passphrase.
    passphrase: Option<String>,
    /// HD derivation index (default 0).
    index: u32,
    /// Raw private key hex string.
    private_key: Option<String>,
}

impl std::fmt::Debug for LocalWalletConnectorBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalWalletConnectorBuilder")
            .field("name", &self.name)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

impl LocalWalletConnectorBuilder {
    /// Set the connector name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the BIP39 mnemonic phrase for HD key derivation.
    #[must_use]
    pub fn mnemonic(mut self, mnemonic: impl Into<String>) -> Self {
        self.mnemonic = Some(mnemonic.into());
        self
    }

    /// Set the BIP39 passphrase (optional "25th word").
    #[must_use]
    pub fn passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(passphrase.into());
        self
    }

    /// Set the HD derivation index (default 0).
    #[must_use]
    pub const fn index(mut self, index: u32) -> Self {
        self.index = index;
        self
    }

    /// Set the private key directly (hex string, with or without 0x prefix).
    #[must_use]
    pub fn private_key(mut self, key: impl Into<String>) -> Self {
        self.private_key = Some(key.into());
        self
    }

    /// Build the [`LocalWalletConnector`].
    ///
    /// # Errors
    ///
    /// Fails when neither `mnemonic` nor `private_key` is set, or when the key
    /// material is invalid.
    pub fn build(self) -> ConnectorResult<LocalWalletConnector> {
        let signer = if let Some(ref mnemonic) = self.mnemonic {
            self.signer_from_mnemonic(mnemonic)?
        } else if let Some(ref key) = self.private_key {
            Self::signer_from_private_key(key)?
        } else {
            return Err(ConnectorError::signer(
                "either mnemonic or private_key is required",
            ));
        };

        let name = self.name.unwrap_or_else(|| "MaskWallet".to_owned());
        info!(connector = %name, address = %signer.address(), "local wallet loaded");

        Ok(LocalWalletConnector {
            base: ConnectorBase::new(name),
            address: signer.address(),
            signer,
        })
    }

    fn signer_from_mnemonic(&self, mnemonic: &str) -> ConnectorResult<PrivateKeySigner> {
        let wallet = kobe::Wallet::from_mnemonic(mnemonic, self.passphrase.as_deref())
            .map_err(|e| ConnectorError::signer(format!("invalid mnemonic: {e}")))?;

        let deriver = kobe_eth::Deriver::new(&wallet);
        let derived = deriver
            .derive(self.index)
            .map_err(|e| ConnectorError::signer(format!("key derivation failed: {e}")))?;

        let key_hex = &*derived.private_key_hex;
        key_hex
            .parse::<PrivateKeySigner>()
            .map_err(|e| ConnectorError::signer(format!("signer creation failed: {e}")))
    }

    fn signer_from_private_key(key: &str) -> ConnectorResult<PrivateKeySigner> {
        let key = key.strip_prefix("0x").unwrap_or(key);
        key.parse::<PrivateKeySigner>()
            .map_err(|e| ConnectorError::signer(format!("invalid private key: {e}")))
    }
}

/// An in-app wallet whose keys are held locally.
pub struct LocalWalletConnector {
    base: ConnectorBase,
    signer: PrivateKeySigner,
    address: Address,
}

impl std::fmt::Debug for LocalWalletConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalWalletConnector")
            .field("address", &self.address)
            .field("base", &self.base)
            .finish_non_exhaustive()
    }
}

impl LocalWalletConnector {
    /// Create a builder for constructing a [`LocalWalletConnector`].
    #[must_use]
    pub fn builder() -> LocalWalletConnectorBuilder {
        LocalWalletConnectorBuilder::default()
    }

    /// The wallet's address.
    #[must_use]
    pub const fn address(&self) -> Address {
        self.address
    }

    /// The checksummed address string.
    #[must_use]
    pub fn address_string(&self) -> String {
        self.address.to_checksum(None)
    }

    /// The underlying signer.
    #[must_use]
    pub const fn signer(&self) -> &PrivateKeySigner {
        &self.signer
    }
}

#[async_trait]
impl Connector for LocalWalletConnector {
    fn name(&self) -> &str {
        self.base.name()
    }

    async fn connect(
        &self,
        chain_id: ChainId,
        address: Option<&str>,
        owner: Option<&Owner>,
        _silent: bool,
    ) -> ConnectorResult<Account> {
        self.base.set_state(ConnectionState::Connecting);

        if let Some(requested) = address
            && requested.parse::<Address>().ok() != Some(self.address)
        {
            let err = ConnectorError::AddressMismatch {
                requested: requested.to_owned(),
                actual: self.address_string(),
            };
            self.base.fail(&err);
            return Err(err);
        }

        let account = Account::new(chain_id, self.address_string()).with_owner(owner.cloned());
        self.base.establish(account.clone());
        info!(
            connector = %self.name(),
            chain_id = %chain_id,
            address = %account.address,
            "local wallet connected",
        );
        Ok(account)
    }

    async fn disconnect(&self) -> ConnectorResult<()> {
        if self.base.state() != ConnectionState::Disconnected {
            self.base.reset();
            info!(connector = %self.name(), "local wallet disconnected");
        }
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        self.base.state()
    }

    async fn switch_chain(&self, chain_id: ChainId) -> ConnectorResult<()> {
        if !self.connected() {
            return Err(ConnectorError::NotConnected);
        }
        self.base.update_account(|account| account.chain_id = chain_id);
        Ok(())
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<ConnectorEvent>> {
        Some(self.base.subscribe())
    }

    fn status(&self) -> ConnectorStatus {
        self.base.build_status()
    }
}
