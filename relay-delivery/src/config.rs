use serde::{Deserialize, Serialize};

use crate::{IntakeConfig, ProcessorConfig};

fn default_control_topic() -> String {
    "sms/send".to_string()
}

/// Relay behaviour, independent of store and transport choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    #[serde(default)]
    pub processor: ProcessorConfig,

    #[serde(default)]
    pub intake: IntakeConfig,

    /// Topic send instructions are published on
    ///
    /// Owned by the transport's topic settings and filled in when the relay is
    /// assembled, so it is never read from this section.
    ///
    /// Default: `sms/send`
    #[serde(skip, default = "default_control_topic")]
    pub control_topic: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            processor: ProcessorConfig::default(),
            intake: IntakeConfig::default(),
            control_topic: default_control_topic(),
        }
    }
}
