//! Account and chain identifiers shared by every chain family.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Numeric chain identifier.
///
/// Every family defines its own known constants (see [`crate::chains`]);
/// the value itself carries no family.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ChainId(pub u64);

impl ChainId {
    /// Wrap a raw chain id.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw numeric value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ChainId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Accepts decimal (`137`) and `0x`-prefixed hex (`0x89`), the two forms
/// wallets report chain ids in.
impl FromStr for ChainId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u64::from_str_radix(hex, 16),
            None => s.parse::<u64>(),
        };
        parsed
            .map(Self)
            .map_err(|_| ParseError::new("chain id", s))
    }
}

/// Owner of a contract wallet account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    /// Owning externally-owned address.
    pub account: String,
    /// Persona key identifier that controls the owner, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
}

impl Owner {
    /// Create an owner without a key identifier.
    #[must_use]
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            identifier: None,
        }
    }

    /// Attach a persona key identifier.
    #[must_use]
    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }
}

/// The wallet account currently selected for a chain family.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Account {
    /// Active chain.
    pub chain_id: ChainId,
    /// Active address; empty when no account is selected.
    pub address: String,
    /// Owner, for contract wallets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<Owner>,
}

impl Account {
    /// Create an account without an owner.
    #[must_use]
    pub fn new(chain_id: ChainId, address: impl Into<String>) -> Self {
        Self {
            chain_id,
            address: address.into(),
            owner: None,
        }
    }

    /// An account with no address on `chain_id`.
    #[must_use]
    pub fn empty(chain_id: ChainId) -> Self {
        Self::new(chain_id, String::new())
    }

    /// Set or clear the owner.
    #[must_use]
    pub fn with_owner(mut self, owner: Option<Owner>) -> Self {
        self.owner = owner;
        self
    }

    /// Whether no address is selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.address.is_empty()
    }
}
