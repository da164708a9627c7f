use std::time::Duration;

use serde::Deserialize;

const fn default_port() -> u16 {
    1883
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_client_id() -> String {
    "sms-relay".to_string()
}

const fn default_keep_alive() -> u64 {
    30
}

const fn default_ack_timeout() -> u64 {
    5
}

const fn default_channel_capacity() -> usize {
    64
}

/// Broker connection settings
///
/// ```ron
/// transport: (
///     host: "broker.local",
///     port: 1883,
///     username: Some("relay"),
///     password: Some("secret"),
///     topics: (control: "sms/send"),
/// )
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// MQTT client identifier; must be unique per broker
    #[serde(default = "default_client_id")]
    pub client_id: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,

    /// How long `publish` waits for the broker's acknowledgement
    ///
    /// Default: 5 seconds
    #[serde(default = "default_ack_timeout")]
    pub ack_timeout_secs: u64,

    /// Capacity of the client request channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    #[serde(default)]
    pub topics: Topics,

    #[serde(default)]
    pub reconnect: ReconnectPolicy,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            client_id: default_client_id(),
            username: None,
            password: None,
            keep_alive_secs: default_keep_alive(),
            ack_timeout_secs: default_ack_timeout(),
            channel_capacity: default_channel_capacity(),
            topics: Topics::default(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl TransportConfig {
    #[must_use]
    pub const fn ack_timeout(&self) -> Duration {
        Duration::from_secs(self.ack_timeout_secs)
    }

    pub(crate) fn mqtt_options(&self) -> rumqttc::MqttOptions {
        let mut options =
            rumqttc::MqttOptions::new(self.client_id.clone(), self.host.clone(), self.port);
        options.set_keep_alive(Duration::from_secs(self.keep_alive_secs));
        options.set_clean_session(true);

        if let (Some(username), Some(password)) = (&self.username, &self.password) {
            options.set_credentials(username.clone(), password.clone());
        }

        options
    }
}

fn default_control_topic() -> String {
    "sms/send".to_string()
}

fn default_status_topic() -> String {
    "sms/status".to_string()
}

fn default_incoming_topic() -> String {
    "sms/incoming".to_string()
}

/// Topic names shared with the device agent
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Topics {
    /// Outbound `<destination>|<payload>` commands
    #[serde(default = "default_control_topic")]
    pub control: String,

    /// Inbound send status reports
    #[serde(default = "default_status_topic")]
    pub status: String,

    /// Inbound received messages
    #[serde(default = "default_incoming_topic")]
    pub incoming: String,
}

impl Default for Topics {
    fn default() -> Self {
        Self {
            control: default_control_topic(),
            status: default_status_topic(),
            incoming: default_incoming_topic(),
        }
    }
}

const fn default_max_attempts() -> u32 {
    10
}

const fn default_base_delay() -> u64 {
    1
}

const fn default_max_delay() -> u64 {
    30
}

const fn default_jitter_factor() -> f64 {
    0.2 // ±20%
}

/// Reconnect policy for a lost broker connection
#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectPolicy {
    /// Consecutive failed attempts before the transport is declared dead
    ///
    /// Default: 10
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First reconnect delay; doubles on each consecutive failure
    #[serde(default = "default_base_delay")]
    pub base_delay_secs: u64,

    /// Upper bound for the reconnect delay
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: u64,

    /// Randomisation applied to each delay (0.0 to 1.0)
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_secs: default_base_delay(),
            max_delay_secs: default_max_delay(),
            jitter_factor: default_jitter_factor(),
        }
    }
}

impl ReconnectPolicy {
    /// Whether `attempt` consecutive failures exhaust the budget
    #[must_use]
    pub const fn is_exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }

    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        crate::backoff::reconnect_delay(
            attempt,
            self.base_delay_secs,
            self.max_delay_secs,
            self.jitter_factor,
        )
    }
}
