use async_trait::async_trait;
use tokio::sync::{broadcast, watch};

use crate::TransportError;

/// Raw inbound payload, tagged by the topic it arrived on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// `<destination>|<status>|<error?>`
    Status(String),
    /// `<destination>|<text>|<deviceTimestamp>`
    Incoming(String),
}

/// Broker connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Connection lost; `attempt` consecutive reconnects have failed so far
    Reconnecting { attempt: u32 },
    /// Reconnect budget exhausted. Terminal.
    Failed { attempts: u32 },
}

impl ConnectionState {
    #[must_use]
    pub const fn is_failed(self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Publish/subscribe connection to the relay broker.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Establish the connection and subscribe to the inbound topics.
    ///
    /// Resolves once the broker has accepted the connection, or with
    /// [`TransportError::ReconnectExhausted`] if it never does.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Publish with at-least-once delivery; resolves after the broker
    /// acknowledges or the acknowledgement window elapses.
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), TransportError>;

    /// Inbound events from both subscribed topics
    fn subscribe(&self) -> broadcast::Receiver<InboundEvent>;

    /// Connection state updates
    fn state(&self) -> watch::Receiver<ConnectionState>;

    /// Close the connection
    async fn disconnect(&self) -> Result<(), TransportError>;
}
