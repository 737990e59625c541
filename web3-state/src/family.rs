//! Chain family abstraction.
//!
//! A [`ChainFamily`] names the types of one ecosystem (its provider and
//! network enums). The chain-specific *behaviour* travels separately in a
//! [`Capabilities`] value supplied when a
//! [`ProviderState`](crate::state::ProviderState) is built.

use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::account::{Account, ChainId};
use crate::error::ParseError;

/// Type-level description of a blockchain ecosystem.
pub trait ChainFamily: Send + Sync + 'static {
    /// Wallet integrations available in this family.
    type ProviderType: Copy
        + Eq
        + Hash
        + Debug
        + Display
        + FromStr<Err = ParseError>
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static;

    /// Named networks chain ids resolve to.
    type NetworkType: Copy + Eq + Debug + Display + Serialize + Send + Sync + 'static;

    /// Short lowercase name, also the storage namespace.
    const NAME: &'static str;

    /// Every provider type of the family.
    const PROVIDER_TYPES: &'static [Self::ProviderType];
}

/// Classifies chain ids of one family.
pub trait ChainResolver<N>: Send + Sync {
    /// Network type of `chain_id`, or `None` when unknown.
    fn network_type(&self, chain_id: ChainId) -> Option<N>;

    /// Display name of `chain_id`.
    fn chain_name(&self, chain_id: ChainId) -> Option<&'static str>;
}

/// Chain-specific behaviour of a [`ProviderState`](crate::state::ProviderState).
pub struct Capabilities<F: ChainFamily> {
    /// Chain selected when nothing is stored.
    pub default_chain_id: ChainId,
    /// Sentinel for "no valid chain".
    pub invalid_chain_id: ChainId,
    /// Provider type selected when nothing is stored.
    pub default_provider_type: F::ProviderType,
    /// Network type used when the resolver has no answer.
    pub default_network_type: F::NetworkType,
    /// Provider types whose sessions must not outlive a switch to another
    /// provider, even when they are not the active one.
    pub exclusive_providers: Vec<F::ProviderType>,
    /// Address syntax check.
    pub is_valid_address: fn(&str) -> bool,
    /// Chain id membership check.
    pub is_valid_chain_id: fn(ChainId) -> bool,
    /// Address equality under the family's rules.
    pub is_same_address: fn(&str, &str) -> bool,
    /// Chain id classifier.
    pub resolver: Arc<dyn ChainResolver<F::NetworkType>>,
}

impl<F: ChainFamily> Capabilities<F> {
    /// Network type of `chain_id`, falling back to the family default.
    #[must_use]
    pub fn network_type(&self, chain_id: ChainId) -> F::NetworkType {
        self.resolver
            .network_type(chain_id)
            .unwrap_or(self.default_network_type)
    }

    /// The account used when nothing is connected.
    #[must_use]
    pub fn default_account(&self) -> Account {
        Account::empty(self.default_chain_id)
    }

    /// Whether `provider_type` requires an exclusive session.
    #[must_use]
    pub fn is_exclusive(&self, provider_type: F::ProviderType) -> bool {
        self.exclusive_providers.contains(&provider_type)
    }

    /// Override the default chain.
    #[must_use]
    pub fn with_default_chain_id(mut self, chain_id: ChainId) -> Self {
        self.default_chain_id = chain_id;
        self
    }
}

impl<F: ChainFamily> Clone for Capabilities<F> {
    fn clone(&self) -> Self {
        Self {
            default_chain_id: self.default_chain_id,
            invalid_chain_id: self.invalid_chain_id,
            default_provider_type: self.default_provider_type,
            default_network_type: self.default_network_type,
            exclusive_providers: self.exclusive_providers.clone(),
            is_valid_address: self.is_valid_address,
            is_valid_chain_id: self.is_valid_chain_id,
            is_same_address: self.is_same_address,
            resolver: Arc::clone(&self.resolver),
        }
    }
}

impl<F: ChainFamily> Debug for Capabilities<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capabilities")
            .field("family", &F::NAME)
            .field("default_chain_id", &self.default_chain_id)
            .field("default_provider_type", &self.default_provider_type)
            .field("default_network_type", &self.default_network_type)
            .field("exclusive_providers", &self.exclusive_providers)
            .finish_non_exhaustive()
    }
}
