//! Per-family provider state.
//!
//! [`ProviderState`] is the single authority over which wallet integration,
//! which chain and which account are active for one chain family. It owns
//! the persisted [`ProviderStorage`], coordinates the registered connectors
//! so that at most one of them holds a session, and publishes the derived
//! values as [`Subscription`]s.
//!
//! ```rust,ignore
//! let registry = ProviderRegistry::new()
//!     .with(ProviderType::MetaMask, WatchConnector::new("MetaMask", evm::is_valid_address));
//! let state = ProviderState::init(evm::capabilities(), registry, store).await?;
//!
//! let account = state.connect(ProviderType::MetaMask, chain::MAINNET, Some(addr), None, false).await?;
//! assert_eq!(state.provider_type().get(), ProviderType::MetaMask);
//! ```

use std::sync::{Arc, Weak};

use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::account::{Account, ChainId, Owner};
use crate::connector::{ConnectionState, ConnectorEvent, SharedConnector};
use crate::error::{ProviderError, ProviderResult, StorageResult};
use crate::family::{Capabilities, ChainFamily};
use crate::registry::ProviderRegistry;
use crate::storage::{KvStore, ProviderStorage};
use crate::subscription::Subscription;

/// Point-in-time view of a [`ProviderState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderSnapshot<F: ChainFamily> {
    /// Chain family name.
    pub family: &'static str,
    /// Active provider type.
    pub provider_type: F::ProviderType,
    /// Network the active chain belongs to.
    pub network_type: F::NetworkType,
    /// Display name of the active chain, when known.
    pub chain_name: Option<&'static str>,
    /// Active account.
    pub account: Account,
    /// Family-level connection state.
    pub connection_state: ConnectionState,
}

struct StateInner<F: ChainFamily> {
    capabilities: Capabilities<F>,
    registry: ProviderRegistry<F::ProviderType>,
    storage: ProviderStorage<F::ProviderType>,
    connection: watch::Sender<ConnectionState>,
}

/// Wallet provider state of one chain family.
pub struct ProviderState<F: ChainFamily> {
    inner: Arc<StateInner<F>>,
    listeners: Vec<JoinHandle<()>>,
}

impl<F: ChainFamily> std::fmt::Debug for ProviderState<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderState")
            .field("family", &F::NAME)
            .field("provider_type", &self.inner.storage.provider_type.get())
            .field("account", &self.inner.storage.account.get())
            .field("connection", &*self.inner.connection.borrow())
            .finish_non_exhaustive()
    }
}

impl<F: ChainFamily> Drop for ProviderState<F> {
    fn drop(&mut self) {
        for listener in &self.listeners {
            listener.abort();
        }
    }
}

impl<F: ChainFamily> ProviderState<F> {
    /// Load the persisted state from `store` and start listening to every
    /// connector that reports wallet events.
    ///
    /// Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Fails when the stored values cannot be read or decoded.
    pub async fn init(
        capabilities: Capabilities<F>,
        registry: ProviderRegistry<F::ProviderType>,
        store: Arc<dyn KvStore>,
    ) -> ProviderResult<Self> {
        let storage = ProviderStorage::load(
            store,
            F::NAME,
            capabilities.default_account(),
            capabilities.default_provider_type,
        )
        .await?;

        let active = storage.provider_type.get();
        let initial = if registry.connected(active) {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        };

        let inner = Arc::new(StateInner {
            capabilities,
            registry,
            storage,
            connection: watch::Sender::new(initial),
        });

        let listeners = inner
            .registry
            .iter()
            .filter_map(|(provider_type, connector)| {
                connector
                    .subscribe()
                    .map(|rx| spawn_listener(Arc::downgrade(&inner), provider_type, rx))
            })
            .collect::<Vec<_>>();

        info!(
            family = F::NAME,
            provider = %active,
            connectors = inner.registry.len(),
            listeners = listeners.len(),
            "provider state initialized",
        );

        Ok(Self { inner, listeners })
    }

    /// Connect `provider_type` on `chain_id` and make it the active provider.
    ///
    /// A previously active provider that still holds a session is
    /// disconnected first, as is every connected exclusive-session
    /// provider. Failures of those disconnects are logged and ignored. If
    /// the handshake then fails after the previous session was closed, the
    /// stored account is reset so the abandoned provider is not restored.
    ///
    /// # Errors
    ///
    /// - [`ProviderError::UnsupportedProvider`] when nothing is registered
    ///   for `provider_type`.
    /// - [`ProviderError::Connection`] with the connector's own error when
    ///   the handshake fails.
    /// - [`ProviderError::InvalidAddress`] / [`ProviderError::InvalidChainId`]
    ///   when the connector reports an account the family cannot use.
    /// - [`ProviderError::Storage`] when persisting the result fails.
    pub async fn connect(
        &self,
        provider_type: F::ProviderType,
        chain_id: ChainId,
        address: Option<&str>,
        owner: Option<&Owner>,
        silent: bool,
    ) -> ProviderResult<Account> {
        let inner = &self.inner;
        let connector = inner.connector(provider_type)?;

        let previous = inner.storage.provider_type.get();
        let switching = previous != provider_type && inner.registry.connected(previous);
        if switching {
            inner.disconnect_quietly(previous).await;
        }
        let exclusive = inner
            .registry
            .provider_types()
            .into_iter()
            .filter(|&other| {
                other != provider_type
                    && other != previous
                    && inner.capabilities.is_exclusive(other)
                    && inner.registry.connected(other)
            })
            .collect::<Vec<_>>();
        for other in exclusive {
            inner.disconnect_quietly(other).await;
        }
        // The account stored for `previous` is stale once its session is gone.
        let abandoned = switching && !inner.registry.connected(previous);

        inner.set_connection(ConnectionState::Connecting);
        debug!(family = F::NAME, provider = %provider_type, %chain_id, silent, "connecting");

        let account = match connector.connect(chain_id, address, owner, silent).await {
            Ok(account) => account,
            Err(err) => {
                inner.abort_connect(abandoned).await;
                return Err(err.into());
            }
        };

        if let Err(err) = inner.check_account(&account) {
            warn!(
                family = F::NAME,
                provider = %provider_type,
                address = %account.address,
                chain_id = %account.chain_id,
                error = %err,
                "connector returned an unusable account",
            );
            inner.disconnect_quietly(provider_type).await;
            inner.abort_connect(abandoned).await;
            return Err(err);
        }

        inner.store_selection(provider_type, account.clone()).await?;
        inner.set_connection(ConnectionState::Connected);

        info!(
            family = F::NAME,
            provider = %provider_type,
            chain_id = %account.chain_id,
            address = %account.address,
            "provider connected",
        );
        Ok(account)
    }

    /// Re-establish the persisted session of the active provider without
    /// prompting the user.
    ///
    /// Returns `None` when no account is stored.
    ///
    /// # Errors
    ///
    /// See [`connect`](Self::connect).
    pub async fn restore(&self) -> ProviderResult<Option<Account>> {
        let stored = self.inner.storage.account.get();
        if stored.is_empty() {
            return Ok(None);
        }
        let provider_type = self.inner.storage.provider_type.get();
        if self.inner.registry.connected(provider_type) {
            return Ok(Some(stored));
        }
        debug!(family = F::NAME, provider = %provider_type, "restoring session");
        self.connect(
            provider_type,
            stored.chain_id,
            Some(stored.address.as_str()),
            stored.owner.as_ref(),
            true,
        )
        .await
        .map(Some)
    }

    /// Disconnect `provider_type`.
    ///
    /// Disconnecting the active provider resets the stored account to the
    /// family default; the provider type is kept. Disconnecting a provider
    /// without a session is harmless.
    ///
    /// # Errors
    ///
    /// - [`ProviderError::UnsupportedProvider`] when nothing is registered
    ///   for `provider_type`.
    /// - [`ProviderError::Connection`] when the connector fails to
    ///   disconnect.
    /// - [`ProviderError::Storage`] when resetting the account fails.
    pub async fn disconnect(&self, provider_type: F::ProviderType) -> ProviderResult<()> {
        let inner = &self.inner;
        let connector = inner.connector(provider_type)?;
        connector.disconnect().await?;

        if inner.is_active(provider_type) {
            inner.reset_account().await?;
            inner.set_connection(ConnectionState::Disconnected);
        }

        info!(family = F::NAME, provider = %provider_type, "provider disconnected");
        Ok(())
    }

    /// Ask `provider_type` to move its session to `chain_id`.
    ///
    /// # Errors
    ///
    /// - [`ProviderError::InvalidChainId`] when the family does not know
    ///   `chain_id`.
    /// - [`ProviderError::UnsupportedProvider`] when nothing is registered
    ///   for `provider_type`.
    /// - [`ProviderError::Connection`] when the connector refuses.
    pub async fn switch_chain(
        &self,
        provider_type: F::ProviderType,
        chain_id: ChainId,
    ) -> ProviderResult<()> {
        let inner = &self.inner;
        if !(inner.capabilities.is_valid_chain_id)(chain_id) {
            return Err(ProviderError::InvalidChainId(chain_id));
        }
        let connector = inner.connector(provider_type)?;
        connector.switch_chain(chain_id).await?;

        if inner.is_active(provider_type) {
            inner.update_account(|account| account.chain_id = chain_id).await?;
        }

        info!(family = F::NAME, provider = %provider_type, %chain_id, "chain switched");
        Ok(())
    }

    /// Chain id of the active account.
    #[must_use]
    pub fn chain_id(&self) -> Subscription<ChainId> {
        Subscription::map(self.inner.storage.account.subscribe(), |account: &Account| {
            account.chain_id
        })
    }

    /// The active account.
    #[must_use]
    pub fn account(&self) -> Subscription<Account> {
        Subscription::from_watch(self.inner.storage.account.subscribe())
    }

    /// Address of the active account; empty when none.
    #[must_use]
    pub fn address(&self) -> Subscription<String> {
        Subscription::map(self.inner.storage.account.subscribe(), |account: &Account| {
            account.address.clone()
        })
    }

    /// Network the active chain belongs to.
    #[must_use]
    pub fn network_type(&self) -> Subscription<F::NetworkType> {
        let resolver = Arc::clone(&self.inner.capabilities.resolver);
        let fallback = self.inner.capabilities.default_network_type;
        Subscription::map(
            self.inner.storage.account.subscribe(),
            move |account: &Account| resolver.network_type(account.chain_id).unwrap_or(fallback),
        )
    }

    /// The active provider type.
    #[must_use]
    pub fn provider_type(&self) -> Subscription<F::ProviderType> {
        Subscription::from_watch(self.inner.storage.provider_type.subscribe())
    }

    /// Family-level connection state.
    #[must_use]
    pub fn connection_state(&self) -> Subscription<ConnectionState> {
        Subscription::from_watch(self.inner.connection.subscribe())
    }

    /// Current values of every derived subscription.
    #[must_use]
    pub fn snapshot(&self) -> ProviderSnapshot<F> {
        let account = self.inner.storage.account.get();
        let caps = &self.inner.capabilities;
        ProviderSnapshot {
            family: F::NAME,
            provider_type: self.inner.storage.provider_type.get(),
            network_type: caps.network_type(account.chain_id),
            chain_name: caps.resolver.chain_name(account.chain_id),
            connection_state: *self.inner.connection.borrow(),
            account,
        }
    }

    /// Address syntax check of this family.
    #[must_use]
    pub fn is_valid_address(&self, address: &str) -> bool {
        (self.inner.capabilities.is_valid_address)(address)
    }

    /// Address equality under this family's rules.
    #[must_use]
    pub fn is_same_address(&self, a: &str, b: &str) -> bool {
        (self.inner.capabilities.is_same_address)(a, b)
    }

    /// The family's capabilities.
    #[must_use]
    pub fn capabilities(&self) -> &Capabilities<F> {
        &self.inner.capabilities
    }

    /// The registered connectors.
    #[must_use]
    pub fn registry(&self) -> &ProviderRegistry<F::ProviderType> {
        &self.inner.registry
    }
}

impl<F: ChainFamily> StateInner<F> {
    fn connector(&self, provider_type: F::ProviderType) -> ProviderResult<SharedConnector> {
        self.registry
            .get(provider_type)
            .cloned()
            .ok_or_else(|| ProviderError::UnsupportedProvider(provider_type.to_string()))
    }

    fn is_active(&self, provider_type: F::ProviderType) -> bool {
        self.storage.provider_type.get() == provider_type
    }

    fn check_account(&self, account: &Account) -> ProviderResult<()> {
        if !(self.capabilities.is_valid_address)(&account.address) {
            return Err(ProviderError::InvalidAddress(account.address.clone()));
        }
        if !(self.capabilities.is_valid_chain_id)(account.chain_id) {
            return Err(ProviderError::InvalidChainId(account.chain_id));
        }
        Ok(())
    }

    async fn disconnect_quietly(&self, provider_type: F::ProviderType) {
        let Some(connector) = self.registry.get(provider_type) else {
            return;
        };
        match connector.disconnect().await {
            Ok(()) => debug!(family = F::NAME, provider = %provider_type, "previous provider disconnected"),
            Err(error) => warn!(
                family = F::NAME,
                provider = %provider_type,
                %error,
                "failed to disconnect previous provider",
            ),
        }
    }

    fn set_connection(&self, state: ConnectionState) {
        let changed = self.connection.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
        if changed {
            debug!(family = F::NAME, %state, "connection state changed");
        }
    }

    /// Derive the family state from the active connector.
    fn refresh_connection(&self) {
        let state = if self.registry.connected(self.storage.provider_type.get()) {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        };
        self.set_connection(state);
    }

    /// Settle the family state after a failed connect.
    async fn abort_connect(&self, abandoned: bool) {
        if abandoned && let Err(error) = self.reset_account().await {
            warn!(family = F::NAME, %error, "failed to clear the abandoned account");
        }
        self.refresh_connection();
    }

    /// Persist a new selection, account first so that provider type
    /// subscribers never observe the previous provider's account.
    async fn store_selection(
        &self,
        provider_type: F::ProviderType,
        account: Account,
    ) -> StorageResult<()> {
        let previous = self.storage.account.get();
        self.storage.account.set(account).await?;
        if let Err(err) = self.storage.provider_type.set(provider_type).await {
            if let Err(error) = self.storage.account.set(previous).await {
                warn!(family = F::NAME, %error, "failed to roll back the stored account");
            }
            return Err(err);
        }
        Ok(())
    }

    async fn reset_account(&self) -> StorageResult<bool> {
        self.storage.account.set(self.capabilities.default_account()).await
    }

    async fn update_account(&self, update: impl FnOnce(&mut Account)) -> StorageResult<bool> {
        let mut account = self.storage.account.get();
        update(&mut account);
        self.storage.account.set(account).await
    }

    async fn handle_event(&self, provider_type: F::ProviderType, event: ConnectorEvent) {
        if !self.is_active(provider_type) {
            debug!(family = F::NAME, provider = %provider_type, ?event, "event from inactive provider ignored");
            return;
        }

        let result = match event {
            ConnectorEvent::ChainChanged(chain_id) => {
                let chain_id = if (self.capabilities.is_valid_chain_id)(chain_id) {
                    chain_id
                } else {
                    warn!(family = F::NAME, provider = %provider_type, %chain_id, "wallet moved to an unknown chain");
                    self.capabilities.invalid_chain_id
                };
                self.update_account(|account| account.chain_id = chain_id).await
            }
            ConnectorEvent::AccountsChanged(accounts) => {
                let valid = accounts
                    .into_iter()
                    .find(|address| (self.capabilities.is_valid_address)(address));
                match valid {
                    Some(address) => {
                        self.update_account(|account| {
                            if !(self.capabilities.is_same_address)(&account.address, &address) {
                                account.owner = None;
                            }
                            account.address = address;
                        })
                        .await
                    }
                    None => {
                        warn!(family = F::NAME, provider = %provider_type, "wallet exposes no usable account");
                        self.reset_account().await
                    }
                }
            }
            ConnectorEvent::Disconnected => {
                self.set_connection(ConnectionState::Disconnected);
                self.reset_account().await
            }
        };

        match result {
            Ok(true) => debug!(family = F::NAME, provider = %provider_type, "account updated from wallet event"),
            Ok(false) => {}
            Err(error) => warn!(family = F::NAME, provider = %provider_type, %error, "failed to persist wallet event"),
        }
    }
}

fn spawn_listener<F: ChainFamily>(
    inner: Weak<StateInner<F>>,
    provider_type: F::ProviderType,
    mut rx: broadcast::Receiver<ConnectorEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let Some(inner) = inner.upgrade() else {
                        break;
                    };
                    inner.handle_event(provider_type, event).await;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(family = F::NAME, provider = %provider_type, skipped, "connector events lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::chains::evm::{self, Evm, NetworkType, ProviderType, chain};
    use crate::connector::{Connector, ConnectorBase, ConnectorStatus, WatchConnector};
    use crate::error::{ConnectorError, ConnectorResult};
    use crate::error::StorageError;
    use crate::storage::MemoryStore;

    const ALICE: &str = "0x2c7536E3605D9C16a7a3D7b1898e529396a65c23";
    const BOB: &str = "0x00000000000000000000000000000000000000b0";

    type CallLog = Arc<Mutex<Vec<String>>>;

    struct ScriptedConnector {
        base: ConnectorBase,
        address: String,
        fail_connect: AtomicBool,
        fail_disconnect: AtomicBool,
        log: CallLog,
    }

    impl ScriptedConnector {
        fn new(name: &str, address: &str, log: &CallLog) -> Arc<Self> {
            Arc::new(Self {
                base: ConnectorBase::new(name),
                address: address.to_owned(),
                fail_connect: AtomicBool::new(false),
                fail_disconnect: AtomicBool::new(false),
                log: Arc::clone(log),
            })
        }

        fn record(&self, call: &str) {
            self.log
                .lock()
                .unwrap()
                .push(format!("{call}:{}", self.base.name()));
        }
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
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
            self.record("connect");
            self.base.set_state(ConnectionState::Connecting);
            if self.fail_connect.load(Ordering::SeqCst) {
                let err = ConnectorError::Rejected(self.name().to_owned());
                self.base.fail(&err);
                return Err(err);
            }
            let account = Account::new(chain_id, address.unwrap_or(&self.address))
                .with_owner(owner.cloned());
            self.base.establish(account.clone());
            Ok(account)
        }

        async fn disconnect(&self) -> ConnectorResult<()> {
            self.record("disconnect");
            if self.fail_disconnect.load(Ordering::SeqCst) {
                return Err(ConnectorError::failed("session stuck"));
            }
            self.base.reset();
            Ok(())
        }

        fn state(&self) -> ConnectionState {
            self.base.state()
        }

        fn subscribe(&self) -> Option<broadcast::Receiver<ConnectorEvent>> {
            Some(self.base.subscribe())
        }

        fn status(&self) -> ConnectorStatus {
            self.base.build_status()
        }
    }

    /// Memory store whose provider type writes can be made to fail.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail_provider_type: AtomicBool,
    }

    #[async_trait]
    impl KvStore for FlakyStore {
        async fn load(&self, key: &str) -> StorageResult<Option<serde_json::Value>> {
            self.inner.load(key).await
        }

        async fn save(&self, key: &str, value: &serde_json::Value) -> StorageResult<()> {
            if key.ends_with(".providerType") && self.fail_provider_type.load(Ordering::SeqCst) {
                return Err(StorageError::Io(std::io::Error::other("disk full")));
            }
            self.inner.save(key, value).await
        }

        async fn delete(&self, key: &str) -> StorageResult<()> {
            self.inner.delete(key).await
        }

        async fn list_keys(&self) -> StorageResult<Vec<String>> {
            self.inner.list_keys().await
        }
    }

    struct Fixture {
        log: CallLog,
        mask: Arc<ScriptedConnector>,
        metamask: Arc<ScriptedConnector>,
        wallet_connect: Arc<ScriptedConnector>,
        store: Arc<dyn KvStore>,
    }

    impl Fixture {
        fn new() -> Self {
            let log = CallLog::default();
            Self {
                mask: ScriptedConnector::new("MaskWallet", ALICE, &log),
                metamask: ScriptedConnector::new("MetaMask", BOB, &log),
                wallet_connect: ScriptedConnector::new("WalletConnect", BOB, &log),
                store: Arc::new(MemoryStore::new()),
                log,
            }
        }

        fn registry(&self) -> ProviderRegistry<ProviderType> {
            let mut registry = ProviderRegistry::new();
            registry.register_shared(ProviderType::MaskWallet, self.mask.clone());
            registry.register_shared(ProviderType::MetaMask, self.metamask.clone());
            registry.register_shared(ProviderType::WalletConnect, self.wallet_connect.clone());
            registry
        }

        async fn state(&self) -> ProviderState<Evm> {
            ProviderState::init(evm::capabilities(), self.registry(), Arc::clone(&self.store))
                .await
                .unwrap()
        }

        fn calls(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    #[tokio::test]
    async fn test_init_defaults() {
        let fixture = Fixture::new();
        let state = fixture.state().await;

        let snapshot = state.snapshot();
        assert_eq!(snapshot.family, "evm");
        assert_eq!(snapshot.provider_type, ProviderType::MaskWallet);
        assert_eq!(snapshot.account, Account::empty(chain::MAINNET));
        assert_eq!(snapshot.network_type, NetworkType::Ethereum);
        assert_eq!(snapshot.connection_state, ConnectionState::Disconnected);
        assert_eq!(state.registry().len(), 3);
    }

    #[tokio::test]
    async fn test_connect_updates_derived_state() {
        let fixture = Fixture::new();
        let state = fixture.state().await;

        for provider_type in [ProviderType::MetaMask, ProviderType::MaskWallet] {
            let account = state
                .connect(provider_type, chain::MATIC, None, None, false)
                .await
                .unwrap();
            assert_eq!(state.provider_type().get(), provider_type);
            assert_eq!(state.account().get(), account);
            assert_eq!(state.chain_id().get(), chain::MATIC);
            assert_eq!(state.network_type().get(), NetworkType::Polygon);
            assert_eq!(state.connection_state().get(), ConnectionState::Connected);
        }
        assert_eq!(state.address().get(), ALICE);
    }

    #[tokio::test]
    async fn test_switch_disconnects_previous_provider_first() {
        let fixture = Fixture::new();
        let state = fixture.state().await;

        state
            .connect(ProviderType::MetaMask, chain::MAINNET, None, None, false)
            .await
            .unwrap();
        fixture.metamask.fail_disconnect.store(true, Ordering::SeqCst);

        let account = state
            .connect(ProviderType::MaskWallet, chain::MAINNET, None, None, false)
            .await
            .unwrap();
        assert_eq!(account.address, ALICE);
        assert_eq!(state.provider_type().get(), ProviderType::MaskWallet);
        assert_eq!(
            fixture.calls(),
            vec!["connect:MetaMask", "disconnect:MetaMask", "connect:MaskWallet"]
        );
    }

    #[tokio::test]
    async fn test_mask_wallet_to_wallet_connect() {
        for fail_disconnect in [false, true] {
            let fixture = Fixture::new();
            let state = fixture.state().await;
            state
                .connect(ProviderType::MaskWallet, chain::MAINNET, None, None, false)
                .await
                .unwrap();
            fixture.mask.fail_disconnect.store(fail_disconnect, Ordering::SeqCst);

            state
                .connect(ProviderType::WalletConnect, chain::MAINNET, None, None, false)
                .await
                .unwrap();
            assert_eq!(state.provider_type().get(), ProviderType::WalletConnect);
            assert_eq!(state.address().get(), BOB);
            assert_eq!(
                fixture.calls(),
                vec!["connect:MaskWallet", "disconnect:MaskWallet", "connect:WalletConnect"]
            );
        }
    }

    #[tokio::test]
    async fn test_connected_exclusive_provider_is_dropped() {
        let fixture = Fixture::new();
        let state = fixture.state().await;

        // A WalletConnect session that is not the active provider.
        fixture
            .wallet_connect
            .connect(chain::MAINNET, None, None, true)
            .await
            .unwrap();

        state
            .connect(ProviderType::MetaMask, chain::MAINNET, None, None, false)
            .await
            .unwrap();
        assert!(!fixture.wallet_connect.connected());
        assert_eq!(
            fixture.calls(),
            vec![
                "connect:WalletConnect",
                "disconnect:WalletConnect",
                "connect:MetaMask"
            ]
        );
    }

    #[tokio::test]
    async fn test_reconnect_same_provider_does_not_disconnect() {
        let fixture = Fixture::new();
        let state = fixture.state().await;

        for _ in 0..2 {
            state
                .connect(ProviderType::MetaMask, chain::MAINNET, None, None, false)
                .await
                .unwrap();
        }
        assert_eq!(fixture.calls(), vec!["connect:MetaMask", "connect:MetaMask"]);
    }

    #[tokio::test]
    async fn test_connect_failure_is_propagated() {
        let fixture = Fixture::new();
        let state = fixture.state().await;
        fixture.metamask.fail_connect.store(true, Ordering::SeqCst);

        let err = state
            .connect(ProviderType::MetaMask, chain::MAINNET, None, None, false)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProviderError::Connection(ConnectorError::Rejected(ref name)) if name == "MetaMask"
        ));
        assert_eq!(state.provider_type().get(), ProviderType::MaskWallet);
        assert!(state.account().get().is_empty());
        assert_eq!(state.connection_state().get(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_failed_switch_clears_abandoned_account() {
        let fixture = Fixture::new();
        let state = fixture.state().await;
        state
            .connect(ProviderType::MetaMask, chain::MAINNET, None, None, false)
            .await
            .unwrap();
        fixture.mask.fail_connect.store(true, Ordering::SeqCst);

        let err = state
            .connect(ProviderType::MaskWallet, chain::MAINNET, None, None, false)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Connection(ConnectorError::Rejected(_))));
        assert!(!fixture.metamask.connected());
        assert!(state.account().get().is_empty());
        assert_eq!(state.connection_state().get(), ConnectionState::Disconnected);

        // Nothing left to restore, so the abandoned provider stays closed.
        assert_eq!(state.restore().await.unwrap(), None);
        assert_eq!(
            fixture.calls(),
            vec!["connect:MetaMask", "disconnect:MetaMask", "connect:MaskWallet"]
        );
    }

    #[tokio::test]
    async fn test_stuck_previous_session_keeps_its_account() {
        let fixture = Fixture::new();
        let state = fixture.state().await;
        state
            .connect(ProviderType::MetaMask, chain::MAINNET, None, None, false)
            .await
            .unwrap();
        fixture.metamask.fail_disconnect.store(true, Ordering::SeqCst);
        fixture.mask.fail_connect.store(true, Ordering::SeqCst);

        assert!(
            state
                .connect(ProviderType::MaskWallet, chain::MAINNET, None, None, false)
                .await
                .is_err()
        );
        assert_eq!(state.provider_type().get(), ProviderType::MetaMask);
        assert_eq!(state.address().get(), BOB);
        assert_eq!(state.connection_state().get(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_storage_failure_keeps_selection_consistent() {
        let fixture = Fixture::new();
        let store = Arc::new(FlakyStore::default());
        let state = ProviderState::init(
            evm::capabilities(),
            fixture.registry(),
            Arc::clone(&store) as Arc<dyn KvStore>,
        )
        .await
        .unwrap();
        store.fail_provider_type.store(true, Ordering::SeqCst);

        let err = state
            .connect(ProviderType::MetaMask, chain::BSC, None, None, false)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Storage(StorageError::Io(_))));
        assert_eq!(state.provider_type().get(), ProviderType::MaskWallet);
        assert_eq!(state.account().get(), Account::empty(chain::MAINNET));
        assert_eq!(
            store.load("evm.account").await.unwrap(),
            Some(serde_json::to_value(Account::empty(chain::MAINNET)).unwrap())
        );
    }

    #[tokio::test]
    async fn test_provider_type_subscribers_see_new_account() {
        let fixture = Fixture::new();
        let state = fixture.state().await;
        let mut provider = state.provider_type();
        let account = state.account();

        state
            .connect(ProviderType::MetaMask, chain::BSC, None, None, false)
            .await
            .unwrap();
        assert_eq!(provider.changed().await.unwrap(), ProviderType::MetaMask);
        assert_eq!(account.get(), Account::new(chain::BSC, BOB));
    }

    #[tokio::test]
    async fn test_connect_rejects_unusable_account() {
        let fixture = Fixture::new();
        let state = fixture.state().await;

        let err = state
            .connect(ProviderType::MetaMask, chain::MAINNET, Some("0x1234"), None, false)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidAddress(_)));
        assert!(!fixture.metamask.connected());

        let err = state
            .connect(ProviderType::MetaMask, ChainId(31_337), None, None, false)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidChainId(ChainId(31_337))));
        assert_eq!(state.provider_type().get(), ProviderType::MaskWallet);
    }

    #[tokio::test]
    async fn test_unsupported_provider() {
        let fixture = Fixture::new();
        let state = fixture.state().await;

        let err = state
            .connect(ProviderType::Fortmatic, chain::MAINNET, None, None, false)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::UnsupportedProvider(ref p) if p == "Fortmatic"));
        assert!(state.disconnect(ProviderType::Opera).await.is_err());
    }

    #[tokio::test]
    async fn test_disconnect() {
        let fixture = Fixture::new();
        let state = fixture.state().await;

        // Disconnecting without a session is harmless.
        state.disconnect(ProviderType::MetaMask).await.unwrap();
        state.disconnect(ProviderType::MetaMask).await.unwrap();

        state
            .connect(ProviderType::MetaMask, chain::BSC, None, None, false)
            .await
            .unwrap();
        state.disconnect(ProviderType::MetaMask).await.unwrap();
        assert_eq!(state.account().get(), Account::empty(chain::MAINNET));
        assert_eq!(state.provider_type().get(), ProviderType::MetaMask);
        assert_eq!(state.connection_state().get(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_disconnect_errors_are_not_masked() {
        let fixture = Fixture::new();
        let state = fixture.state().await;
        state
            .connect(ProviderType::MetaMask, chain::MAINNET, None, None, false)
            .await
            .unwrap();
        fixture.metamask.fail_disconnect.store(true, Ordering::SeqCst);

        let err = state.disconnect(ProviderType::MetaMask).await.unwrap_err();
        assert!(matches!(err, ProviderError::Connection(ConnectorError::ConnectionFailed(_))));
        assert_eq!(state.address().get(), BOB);
    }

    #[tokio::test]
    async fn test_network_type_falls_back_to_default() {
        let fixture = Fixture::new();
        let state = fixture.state().await;
        let network = state.network_type();
        state
            .connect(ProviderType::MetaMask, chain::ARBITRUM, None, None, false)
            .await
            .unwrap();
        assert_eq!(network.get(), NetworkType::Arbitrum);

        let mut chain_id = state.chain_id();
        fixture.metamask.base.emit(ConnectorEvent::ChainChanged(ChainId(999_999)));
        let next = tokio::time::timeout(Duration::from_secs(1), chain_id.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next, chain::INVALID);
        assert_eq!(network.get(), NetworkType::Ethereum);
    }

    #[tokio::test]
    async fn test_switch_chain() {
        let state = ProviderState::init(
            evm::capabilities(),
            ProviderRegistry::new().with(
                ProviderType::MetaMask,
                WatchConnector::new("MetaMask", evm::is_valid_address),
            ),
            Arc::new(MemoryStore::new()),
        )
        .await
        .unwrap();

        let err = state
            .switch_chain(ProviderType::MetaMask, chain::OPTIMISM)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Connection(ConnectorError::NotConnected)));

        state
            .connect(ProviderType::MetaMask, chain::MAINNET, Some(ALICE), None, false)
            .await
            .unwrap();
        state
            .switch_chain(ProviderType::MetaMask, chain::OPTIMISM)
            .await
            .unwrap();
        assert_eq!(state.chain_id().get(), chain::OPTIMISM);
        assert_eq!(state.network_type().get(), NetworkType::Optimism);

        let err = state.switch_chain(ProviderType::MetaMask, ChainId(7)).await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidChainId(ChainId(7))));
    }

    #[tokio::test]
    async fn test_wallet_events_follow_active_provider() {
        let fixture = Fixture::new();
        let state = fixture.state().await;
        state
            .connect(
                ProviderType::MetaMask,
                chain::MAINNET,
                None,
                Some(&Owner::new(ALICE)),
                false,
            )
            .await
            .unwrap();
        let mut account = state.account();

        // Inactive connectors are ignored.
        fixture.mask.base.emit(ConnectorEvent::ChainChanged(chain::BSC));

        fixture.metamask.base.emit(ConnectorEvent::ChainChanged(chain::XDAI));
        let next = tokio::time::timeout(Duration::from_secs(1), account.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next.chain_id, chain::XDAI);

        fixture.metamask.base.emit(ConnectorEvent::AccountsChanged(vec![
            "garbage".into(),
            ALICE.into(),
        ]));
        let next = tokio::time::timeout(Duration::from_secs(1), account.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next.address, ALICE);
        assert!(next.owner.is_none());

        let mut connection = state.connection_state();
        fixture.metamask.base.emit(ConnectorEvent::Disconnected);
        let next = tokio::time::timeout(Duration::from_secs(1), account.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next, Account::empty(chain::MAINNET));
        assert_eq!(connection.changed().await.unwrap(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_restore_reconnects_silently() {
        let fixture = Fixture::new();
        let state = fixture.state().await;
        assert_eq!(state.restore().await.unwrap(), None);

        state
            .connect(ProviderType::MetaMask, chain::XDAI, Some(ALICE), None, false)
            .await
            .unwrap();
        assert_eq!(state.restore().await.unwrap().unwrap().address, ALICE);
        assert_eq!(fixture.calls(), vec!["connect:MetaMask"]);

        let fresh = Fixture {
            store: Arc::clone(&fixture.store),
            ..Fixture::new()
        };
        let state = fresh.state().await;
        let account = state.restore().await.unwrap().unwrap();
        assert_eq!(account, Account::new(chain::XDAI, ALICE));
        assert!(fresh.metamask.connected());
        assert_eq!(state.connection_state().get(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_state_survives_reload() {
        let fixture = Fixture::new();
        {
            let state = fixture.state().await;
            state
                .connect(ProviderType::WalletConnect, chain::AVALANCHE, None, None, true)
                .await
                .unwrap();
        }

        let state = fixture.state().await;
        let snapshot = state.snapshot();
        assert_eq!(snapshot.provider_type, ProviderType::WalletConnect);
        assert_eq!(snapshot.account, Account::new(chain::AVALANCHE, BOB));
        assert_eq!(snapshot.network_type, NetworkType::Avalanche);
        assert_eq!(snapshot.chain_name, Some("Avalanche C-Chain"));
        // The old connector instances still hold the session.
        assert_eq!(snapshot.connection_state, ConnectionState::Connected);
    }
}
