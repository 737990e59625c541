//! Wallet connector trait and shared connector plumbing.
//!
//! A connector is one wallet integration (browser-injected wallet, remote
//! signer, in-app wallet). It performs the actual handshake and owns the
//! transient connection; [`ProviderState`](crate::state::ProviderState)
//! only coordinates which connector is active.

mod local;
mod watch_only;

pub use local::{LocalWalletConnector, LocalWalletConnectorBuilder};
pub use watch_only::WatchConnector;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error};

use crate::account::{Account, ChainId, Owner};
use crate::error::{ConnectorError, ConnectorResult};

/// Capacity of a connector's event channel.
const EVENT_CAPACITY: usize = 32;

/// Connection state of a connector, or of a whole chain family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ConnectionState {
    /// No session.
    #[default]
    Disconnected,
    /// A connect call is in flight.
    Connecting,
    /// A session is established.
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        })
    }
}

/// A change reported by the wallet itself rather than requested by us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectorEvent {
    /// The wallet moved to another chain.
    ChainChanged(ChainId),
    /// The wallet exposes a new account list; the first entry is active.
    AccountsChanged(Vec<String>),
    /// The wallet ended the session.
    Disconnected,
}

/// Connector status information.
#[derive(Debug, Clone)]
pub struct ConnectorStatus {
    /// Connector name.
    pub name: String,
    /// Current state.
    pub state: ConnectionState,
    /// Account of the current session, if any.
    pub account: Option<Account>,
    /// Last error message, if any.
    pub last_error: Option<String>,
}

/// Trait for implementing wallet connectors.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Human-readable name of the integration.
    fn name(&self) -> &str;

    /// Establish a session on `chain_id`.
    ///
    /// `address` selects one of the wallet's accounts; `silent` asks the
    /// wallet not to prompt the user.
    async fn connect(
        &self,
        chain_id: ChainId,
        address: Option<&str>,
        owner: Option<&Owner>,
        silent: bool,
    ) -> ConnectorResult<Account>;

    /// End the session. Must be harmless when already disconnected.
    async fn disconnect(&self) -> ConnectorResult<()>;

    /// Current connection state.
    fn state(&self) -> ConnectionState;

    /// Whether a session is established.
    fn connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Move the session to another chain.
    async fn switch_chain(&self, chain_id: ChainId) -> ConnectorResult<()> {
        let _ = chain_id;
        Err(ConnectorError::SwitchChainUnsupported(self.name().to_owned()))
    }

    /// Wallet-initiated events, if the integration reports any.
    fn subscribe(&self) -> Option<broadcast::Receiver<ConnectorEvent>> {
        None
    }

    /// Get the current connector status.
    fn status(&self) -> ConnectorStatus {
        ConnectorStatus {
            name: self.name().to_owned(),
            state: self.state(),
            account: None,
            last_error: None,
        }
    }
}

/// Type alias for a shared connector.
pub type SharedConnector = Arc<dyn Connector>;

/// Base implementation helpers for connectors.
///
/// Holds the connection state, the session account and the event channel
/// that most connector implementations need.
pub struct ConnectorBase {
    name: String,
    state: watch::Sender<ConnectionState>,
    account: watch::Sender<Option<Account>>,
    last_error: watch::Sender<Option<String>>,
    events: broadcast::Sender<ConnectorEvent>,
}

impl std::fmt::Debug for ConnectorBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorBase")
            .field("name", &self.name)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl ConnectorBase {
    /// Create a new connector base.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            name: name.into(),
            state: watch::Sender::new(ConnectionState::default()),
            account: watch::Sender::new(None),
            last_error: watch::Sender::new(None),
            events,
        }
    }

    /// Get the connector name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Set the connection state.
    pub fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
        debug!(connector = %self.name, %state, "connector state changed");
    }

    /// Account of the current session.
    #[must_use]
    pub fn account(&self) -> Option<Account> {
        self.account.borrow().clone()
    }

    /// Mark the session established with `account`.
    pub fn establish(&self, account: Account) {
        self.account.send_replace(Some(account));
        self.last_error.send_replace(None);
        self.set_state(ConnectionState::Connected);
    }

    /// Drop the session.
    pub fn reset(&self) {
        self.account.send_replace(None);
        self.set_state(ConnectionState::Disconnected);
    }

    /// Update the session account in place. No-op without a session.
    pub fn update_account(&self, update: impl FnOnce(&mut Account)) {
        self.account.send_if_modified(|current| match current {
            Some(account) => {
                update(account);
                true
            }
            None => false,
        });
    }

    /// Record a failed operation and fall back to disconnected.
    pub fn fail(&self, error: &ConnectorError) {
        error!(connector = %self.name, %error, "connector error");
        self.last_error.send_replace(Some(error.to_string()));
        self.reset();
    }

    /// Publish a wallet-initiated event. Dropped when nobody listens.
    pub fn emit(&self, event: ConnectorEvent) {
        debug!(connector = %self.name, ?event, "connector event");
        let _ = self.events.send(event);
    }

    /// Receive future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectorEvent> {
        self.events.subscribe()
    }

    /// Build status from current state.
    #[must_use]
    pub fn build_status(&self) -> ConnectorStatus {
        ConnectorStatus {
            name: self.name.clone(),
            state: self.state(),
            account: self.account(),
            last_error: self.last_error.borrow().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connector_base_lifecycle() {
        let base = ConnectorBase::new("test");
        assert_eq!(base.name(), "test");
        assert_eq!(base.state(), ConnectionState::Disconnected);

        base.set_state(ConnectionState::Connecting);
        base.establish(Account::new(ChainId(1), "0xabc"));
        assert_eq!(base.state(), ConnectionState::Connected);

        base.update_account(|account| account.chain_id = ChainId(137));
        let status = base.build_status();
        assert_eq!(status.account.unwrap().chain_id, ChainId(137));
        assert!(status.last_error.is_none());

        base.fail(&ConnectorError::Rejected("test".into()));
        let status = base.build_status();
        assert_eq!(status.state, ConnectionState::Disconnected);
        assert!(status.account.is_none());
        assert!(status.last_error.unwrap().contains("rejected"));
    }

    #[test]
    fn test_update_account_without_session() {
        let base = ConnectorBase::new("test");
        base.update_account(|account| account.chain_id = ChainId(5));
        assert!(base.account().is_none());
    }

    #[tokio::test]
    async fn test_connector_base_events() {
        let base = ConnectorBase::new("test");
        base.emit(ConnectorEvent::Disconnected);

        let mut rx = base.subscribe();
        base.emit(ConnectorEvent::ChainChanged(ChainId(10)));
        assert_eq!(rx.recv().await.unwrap(), ConnectorEvent::ChainChanged(ChainId(10)));
    }

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
    }
}
