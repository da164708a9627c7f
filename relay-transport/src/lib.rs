//! Transport between the relay and the device agent
//!
//! The relay talks to the device over a publish/subscribe broker: one control
//! topic outbound, a status topic and an incoming-message topic inbound.
//! [`Transport`] is the seam; [`MqttTransport`] is the production implementation
//! and [`MockTransport`] the one tests inject.

pub mod backoff;
pub mod config;
pub mod error;
pub mod mock;
pub mod mqtt;
pub mod r#trait;

pub use config::{ReconnectPolicy, Topics, TransportConfig};
pub use error::TransportError;
pub use mock::{MockTransport, PublishedMessage};
pub use mqtt::MqttTransport;
pub use r#trait::{ConnectionState, InboundEvent, Transport};
