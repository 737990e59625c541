//! Connector for wallets driven by the host application.
//!
//! Browser-injected wallets and remote signers live outside this process:
//! the host performs the real handshake and hands the resulting address to
//! a [`WatchConnector`], and forwards the wallet's own chain/account/session
//! changes through [`WatchConnector::change_chain`],
//! [`WatchConnector::change_accounts`] and [`WatchConnector::end_session`].

use async_trait::async_trait;
use tokio::sync::{RwLock, broadcast};
use tracing::info;

use super::{ConnectionState, Connector, ConnectorBase, ConnectorEvent, ConnectorStatus};
use crate::account::{Account, ChainId, Owner};
use crate::error::{ConnectorError, ConnectorResult};

/// A connector whose account is supplied from outside.
pub struct WatchConnector {
    base: ConnectorBase,
    preset: RwLock<Option<String>>,
    is_valid_address: fn(&str) -> bool,
}

impl std::fmt::Debug for WatchConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchConnector")
            .field("base", &self.base)
            .finish_non_exhaustive()
    }
}

impl WatchConnector {
    /// Create a connector that validates addresses with `is_valid_address`.
    #[must_use]
    pub fn new(name: impl Into<String>, is_valid_address: fn(&str) -> bool) -> Self {
        Self {
            base: ConnectorBase::new(name),
            preset: RwLock::new(None),
            is_valid_address,
        }
    }

    /// Address used when `connect` is called without one.
    #[must_use]
    pub fn with_address(self, address: impl Into<String>) -> Self {
        Self {
            preset: RwLock::new(Some(address.into())),
            ..self
        }
    }

    /// The wallet switched chains on its own.
    pub fn change_chain(&self, chain_id: ChainId) {
        self.base.update_account(|account| account.chain_id = chain_id);
        self.base.emit(ConnectorEvent::ChainChanged(chain_id));
    }

    /// The wallet exposes a new account list.
    pub fn change_accounts(&self, accounts: Vec<String>) {
        if let Some(first) = accounts.first() {
            let first = first.clone();
            self.base.update_account(|account| account.address = first);
        }
        self.base.emit(ConnectorEvent::AccountsChanged(accounts));
    }

    /// The wallet ended the session.
    pub fn end_session(&self) {
        self.base.reset();
        self.base.emit(ConnectorEvent::Disconnected);
    }
}

#[async_trait]
impl Connector for WatchConnector {
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

        let address = match address {
            Some(address) => address.to_owned(),
            None => match self.preset.read().await.clone() {
                Some(address) => address,
                None => {
                    let err = ConnectorError::AddressRequired(self.name().to_owned());
                    self.base.fail(&err);
                    return Err(err);
                }
            },
        };

        if !(self.is_valid_address)(&address) {
            let err = ConnectorError::failed(format!("invalid address {address:?}"));
            self.base.fail(&err);
            return Err(err);
        }

        *self.preset.write().await = Some(address.clone());
        let account = Account::new(chain_id, address).with_owner(owner.cloned());
        self.base.establish(account.clone());
        info!(
            connector = %self.name(),
            chain_id = %chain_id,
            address = %account.address,
            "watch connector connected",
        );
        Ok(account)
    }

    async fn disconnect(&self) -> ConnectorResult<()> {
        if self.base.state() != ConnectionState::Disconnected {
            self.base.reset();
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
