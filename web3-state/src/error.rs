//! Unified error types for web3-state.
//!
//! Every concern (connectors, provider state, storage, configuration) owns
//! its error enum. All of them convert into the umbrella [`Error`] type.

use crate::account::ChainId;

// ============================================================================
// Main Error Type
// ============================================================================

/// The main error type for web3-state operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Provider state error.
    #[error("provider: {0}")]
    Provider(#[from] ProviderError),

    /// Connector error.
    #[error("connector: {0}")]
    Connector(#[from] ConnectorError),

    /// Storage error.
    #[error("storage: {0}")]
    Storage(#[from] StorageError),

    /// Configuration error.
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    /// Unknown enum value in user input.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Serialization error.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic internal error.
    #[error("{0}")]
    Internal(String),
}

impl Error {
    /// Create an internal error.
    #[inline]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Result type alias for web3-state operations.
pub type Result<T> = std::result::Result<T, Error>;

// ============================================================================
// Connector Errors
// ============================================================================

/// Error raised by a wallet connector.
///
/// [`ProviderState`](crate::state::ProviderState) hands these back to the
/// caller untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectorError {
    /// The handshake with the wallet failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The user or the wallet rejected the request.
    #[error("request rejected by {0}")]
    Rejected(String),

    /// No address was supplied and the connector has none to offer.
    #[error("an account address is required to connect {0}")]
    AddressRequired(String),

    /// The requested address is not controlled by this connector.
    #[error("address mismatch: requested {requested}, wallet holds {actual}")]
    AddressMismatch {
        /// Address the caller asked for.
        requested: String,
        /// Address the wallet controls.
        actual: String,
    },

    /// The connector cannot switch chains.
    #[error("{0} does not support switching chains")]
    SwitchChainUnsupported(String),

    /// Operation requires an established connection.
    #[error("not connected")]
    NotConnected,

    /// Key material could not be turned into a signer.
    #[error("signer: {0}")]
    Signer(String),
}

impl ConnectorError {
    /// Create a connection failed error.
    #[inline]
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed(msg.into())
    }

    /// Create a signer error.
    #[inline]
    pub fn signer(msg: impl Into<String>) -> Self {
        Self::Signer(msg.into())
    }
}

/// Result type for connector operations.
pub type ConnectorResult<T> = std::result::Result<T, ConnectorError>;

// ============================================================================
// Provider State Errors
// ============================================================================

/// Error type for [`ProviderState`](crate::state::ProviderState) operations.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The provider type has no connector in the registry.
    #[error("unsupported provider type: {0}")]
    UnsupportedProvider(String),

    /// The address is not valid for the chain family.
    #[error("invalid address: {0:?}")]
    InvalidAddress(String),

    /// The chain id is not valid for the chain family.
    #[error("invalid chain id: {0}")]
    InvalidChainId(ChainId),

    /// The connector failed; carried verbatim.
    #[error(transparent)]
    Connection(#[from] ConnectorError),

    /// Persisting state failed.
    #[error("storage: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for provider state operations.
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

// ============================================================================
// Storage Errors
// ============================================================================

/// Error type for key-value storage backends.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// IO error.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ============================================================================
// Configuration Errors
// ============================================================================

/// Error type for configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO error.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("parse: {0}")]
    Parse(#[from] serde_json::Error),

    /// Invalid value.
    #[error("invalid: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Create an invalid value error.
    #[inline]
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// ============================================================================
// Parse / Subscription Errors
// ============================================================================

/// An enum value that could not be parsed from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value:?}")]
pub struct ParseError {
    /// What was being parsed (e.g. "provider type").
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

impl ParseError {
    /// Create a parse error.
    #[inline]
    pub fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

/// The value source behind a [`Subscription`](crate::subscription::Subscription)
/// was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("subscription source closed")]
pub struct SubscriptionClosed;

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversions() {
        let err: Error = ConnectorError::NotConnected.into();
        assert!(matches!(err, Error::Connector(_)));

        let err: ProviderError = ConnectorError::Rejected("metamask".into()).into();
        assert!(matches!(
            err,
            ProviderError::Connection(ConnectorError::Rejected(_))
        ));
    }

    #[test]
    fn test_connection_error_is_transparent() {
        let inner = ConnectorError::failed("user closed the popup");
        let err = ProviderError::Connection(inner.clone());
        assert_eq!(err.to_string(), inner.to_string());
    }

    #[test]
    fn test_umbrella_messages() {
        let err: Error = ConfigError::invalid("storage_dir is empty").into();
        assert_eq!(err.to_string(), "config: invalid: storage_dir is empty");

        let err: Error = ParseError::new("provider type", "Netscape").into();
        assert_eq!(err.to_string(), "unknown provider type: \"Netscape\"");
    }
}
