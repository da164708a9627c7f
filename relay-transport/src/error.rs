//! Error types for the relay-transport crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    /// Initial connection could not be established.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// The broker rejected or dropped a publish.
    #[error("Publish failed: {0}")]
    Publish(String),

    /// No broker acknowledgement within the configured window.
    #[error("No acknowledgement within {0} seconds")]
    AckTimeout(u64),

    /// `publish` was called before `connect`.
    #[error("Transport not connected")]
    NotConnected,

    /// Consecutive reconnect attempts exceeded the configured maximum.
    #[error("Gave up reconnecting after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    /// The underlying client refused a request.
    #[error("Client error: {0}")]
    Client(String),
}

impl TransportError {
    /// Whether the relay can make no further progress without a restart
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::ReconnectExhausted { .. })
    }
}

impl From<rumqttc::ClientError> for TransportError {
    fn from(error: rumqttc::ClientError) -> Self {
        Self::Client(error.to_string())
    }
}
