//! Provider registry.
//!
//! Maps each provider type of a family to the connector that implements it.
//! The registry is assembled before a
//! [`ProviderState`](crate::state::ProviderState) is built and is read-only
//! afterwards.

use std::fmt::Debug;
use std::sync::Arc;

use tracing::info;

use crate::connector::{Connector, ConnectorStatus, SharedConnector};

/// Connectors keyed by provider type, in registration order.
pub struct ProviderRegistry<P> {
    entries: Vec<(P, SharedConnector)>,
}

impl<P: Debug> Debug for ProviderRegistry<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(p, c)| (p, c.name())))
            .finish()
    }
}

impl<P> Default for ProviderRegistry<P> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<P> ProviderRegistry<P>
where
    P: Copy + Eq + Debug,
{
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `connector` for `provider_type`, builder style.
    #[must_use]
    pub fn with(mut self, provider_type: P, connector: impl Connector + 'static) -> Self {
        self.register(provider_type, connector);
        self
    }

    /// Register `connector` for `provider_type`, replacing any previous one.
    pub fn register(&mut self, provider_type: P, connector: impl Connector + 'static) {
        self.register_shared(provider_type, Arc::new(connector));
    }

    /// Register an already shared connector.
    pub fn register_shared(&mut self, provider_type: P, connector: SharedConnector) {
        info!(provider = ?provider_type, connector = %connector.name(), "connector registered");
        match self.entries.iter_mut().find(|(p, _)| *p == provider_type) {
            Some(entry) => entry.1 = connector,
            None => self.entries.push((provider_type, connector)),
        }
    }

    /// Connector registered for `provider_type`.
    #[must_use]
    pub fn get(&self, provider_type: P) -> Option<&SharedConnector> {
        self.entries
            .iter()
            .find(|(p, _)| *p == provider_type)
            .map(|(_, c)| c)
    }

    /// Whether a connector is registered for `provider_type`.
    #[must_use]
    pub fn contains(&self, provider_type: P) -> bool {
        self.get(provider_type).is_some()
    }

    /// Whether the connector for `provider_type` has a live session.
    #[must_use]
    pub fn connected(&self, provider_type: P) -> bool {
        self.get(provider_type).is_some_and(|c| c.connected())
    }

    /// Registered provider types.
    #[must_use]
    pub fn provider_types(&self) -> Vec<P> {
        self.entries.iter().map(|(p, _)| *p).collect()
    }

    /// Iterate over registered connectors.
    pub fn iter(&self) -> impl Iterator<Item = (P, &SharedConnector)> {
        self.entries.iter().map(|(p, c)| (*p, c))
    }

    /// Status of every registered connector.
    #[must_use]
    pub fn status(&self) -> Vec<(P, ConnectorStatus)> {
        self.iter().map(|(p, c)| (p, c.status())).collect()
    }

    /// Number of registered connectors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
