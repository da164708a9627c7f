use std::sync::Arc;

use serde::Deserialize;

use crate::{
    backends::{MemoryRecordStore, memory::DEFAULT_INCOMING_CAPACITY},
    r#trait::RecordStore,
};

const fn default_incoming_capacity() -> usize {
    DEFAULT_INCOMING_CAPACITY
}

/// Configuration for the record store
///
/// ```ron
/// Relay (
///     store: Memory(
///         capacity: Some(100000),
///         incoming_capacity: 10000,
///     ),
/// )
/// ```
#[derive(Debug, Clone, Deserialize)]
pub enum StoreConfig {
    /// In-process store; contents are lost on restart
    Memory {
        /// Maximum number of delivery records (omit for unlimited)
        #[serde(default)]
        capacity: Option<usize>,

        /// Incoming messages kept before the oldest is evicted
        ///
        /// Default: 10000
        #[serde(default = "default_incoming_capacity")]
        incoming_capacity: usize,
    },
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Memory {
            capacity: None,
            incoming_capacity: default_incoming_capacity(),
        }
    }
}

impl StoreConfig {
    /// Build the configured store
    #[must_use]
    pub fn build(&self) -> Arc<dyn RecordStore> {
        match self {
            Self::Memory {
                capacity,
                incoming_capacity,
            } => {
                let store = (*capacity)
                    .map_or_else(MemoryRecordStore::new, MemoryRecordStore::with_capacity);
                Arc::new(store.with_incoming_capacity(*incoming_capacity))
            }
        }
    }
}
