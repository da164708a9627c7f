use std::sync::Arc;

use relay_common::{
    internal,
    logging::{self, LogConfig},
};
use relay_delivery::{RelayConfig, RelayService};
use relay_store::StoreConfig;
use relay_transport::{MqttTransport, Transport, TransportConfig};
use serde::Deserialize;

/// Top-level configuration, read from `relay.config.ron`.
#[derive(Debug, Default, Deserialize)]
pub struct Relay {
    #[serde(default)]
    store: StoreConfig,
    #[serde(alias = "mqtt", default)]
    transport: TransportConfig,
    #[serde(default)]
    relay: RelayConfig,
    #[serde(default)]
    logging: LogConfig,
}

async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!(level = INFO, "CTRL+C entered, shutting down");
        }
        _ = terminate.recv() => {
            internal!(level = INFO, "Terminate Signal received, shutting down");
        }
    };

    Ok(())
}

impl Relay {
    /// Relay settings with the control topic taken from the transport's topics.
    #[must_use]
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            control_topic: self.transport.topics.control.clone(),
            ..self.relay.clone()
        }
    }

    pub const fn transport_config(&self) -> &TransportConfig {
        &self.transport
    }

    pub const fn log_config(&self) -> &LogConfig {
        &self.logging
    }

    /// Assemble the service over the given transport.
    #[must_use]
    pub fn service(&self, transport: Arc<dyn Transport>) -> RelayService {
        RelayService::new(self.relay_config(), self.store.build(), transport)
    }

    /// Run the relay until a termination signal, or until the transport fails for good.
    ///
    /// # Errors
    ///
    /// Returns an error if the broker cannot be reached at startup or the
    /// connection is lost beyond the reconnect budget.
    pub async fn run(self) -> anyhow::Result<()> {
        logging::init(&self.logging);

        let transport = Arc::new(MqttTransport::new(self.transport.clone()));
        let service = self.service(transport);

        internal!(
            level = INFO,
            "Connecting to {}:{} as {}",
            self.transport.host,
            self.transport.port,
            self.transport.client_id
        );
        service.start().await?;

        let ret = tokio::select! {
            r = service.supervise() => r.map_err(anyhow::Error::from),
            r = shutdown() => r,
        };

        internal!("Shutting down...");
        service.stop().await?;

        ret
    }
}
