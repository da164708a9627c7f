//! Delivery processor orchestration

mod publish;
mod restore;

use std::{sync::Arc, time::Duration};

use relay_common::{
    Signal, internal,
    tracing::{debug, error, info, warn},
};
use relay_store::{RecordId, RecordStore, Transition};
use relay_transport::Transport;
use serde::{Deserialize, Serialize};
use tokio::{
    sync::broadcast::{self, error::TryRecvError},
    time::MissedTickBehavior,
};

pub(crate) use restore::restore_queued;

use crate::{
    error::RelayError,
    policy::PublishRetryPolicy,
    protocol::ControlCommand,
    queue::{DeliveryQueue, QueueEntry},
};

/// Reason recorded when the transport could not take a publish.
pub const RELAY_UNAVAILABLE: &str = "relay unavailable";

const fn default_tick_interval() -> u64 {
    5
}

const fn default_inter_send_delay() -> u64 {
    45
}

const fn default_restore_on_start() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// How often the queue is checked when nothing woke the processor (in seconds)
    ///
    /// Default: 5
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,

    /// Minimum gap after a successful publish before the next one (in seconds)
    ///
    /// The device modem accepts one message at a time; this keeps the relay
    /// from outrunning it.
    ///
    /// Default: 45
    #[serde(default = "default_inter_send_delay")]
    pub inter_send_delay_secs: u64,

    #[serde(default)]
    pub publish_retry: PublishRetryPolicy,

    /// Re-enqueue records persisted as `QUEUED` when the service starts
    ///
    /// Default: true
    #[serde(default = "default_restore_on_start")]
    pub restore_on_start: bool,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            inter_send_delay_secs: default_inter_send_delay(),
            publish_retry: PublishRetryPolicy::default(),
            restore_on_start: default_restore_on_start(),
        }
    }
}

impl ProcessorConfig {
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs.max(1))
    }

    #[must_use]
    pub const fn inter_send_delay(&self) -> Duration {
        Duration::from_secs(self.inter_send_delay_secs)
    }
}

/// Result of one processing cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing was waiting.
    Idle,
    /// Another send is still in flight.
    Busy,
    /// Handed to the transport; the record is `PENDING`.
    Published(RecordId),
    /// The transport refused every attempt; the record is `FAILED`.
    Failed(RecordId),
    /// The record could no longer be dispatched (deleted or already settled).
    Skipped(RecordId),
    /// Shutdown arrived before dispatch or during pacing.
    Stopped,
}

impl CycleOutcome {
    #[must_use]
    pub const fn is_published(&self) -> bool {
        matches!(self, Self::Published(_))
    }

    /// Whether the queue may still hold work for an immediate next cycle.
    #[must_use]
    pub const fn is_progress(&self) -> bool {
        matches!(
            self,
            Self::Published(_) | Self::Failed(_) | Self::Skipped(_)
        )
    }
}

/// Drains the delivery queue one record at a time.
///
/// Only one send is ever in flight. After a successful publish the flag stays
/// held for the inter-send delay; after a failed one it is released at once.
#[derive(Debug)]
pub struct DeliveryProcessor {
    config: ProcessorConfig,
    control_topic: String,
    queue: DeliveryQueue,
    store: Arc<dyn RecordStore>,
    transport: Arc<dyn Transport>,
}

impl DeliveryProcessor {
    #[must_use]
    pub fn new(
        config: ProcessorConfig,
        control_topic: impl Into<String>,
        queue: DeliveryQueue,
        store: Arc<dyn RecordStore>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            config,
            control_topic: control_topic.into(),
            queue,
            store,
            transport,
        }
    }

    pub const fn queue(&self) -> &DeliveryQueue {
        &self.queue
    }

    pub const fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Run the processor until a shutdown signal is received.
    ///
    /// The queue is drained on every tick and whenever intake enqueues work.
    /// A send already handed to the transport is allowed to finish; the pacing
    /// delay after it is cut short by shutdown.
    pub async fn serve(
        &self,
        mut shutdown: broadcast::Receiver<Signal>,
    ) -> Result<(), RelayError> {
        internal!(
            level = INFO,
            "Delivery processor starting (tick={}s, inter-send delay={}s)",
            self.config.tick_interval().as_secs(),
            self.config.inter_send_delay_secs
        );

        let mut ticker = tokio::time::interval(self.config.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                sig = shutdown.recv() => {
                    log_shutdown(sig);
                    break;
                }
                _ = ticker.tick() => {}
                () = self.queue.notified() => {}
            }

            if self.drain(&mut shutdown).await {
                break;
            }
        }

        internal!(level = INFO, "Delivery processor shutdown complete");
        Ok(())
    }

    /// Run a single cycle, pacing included.
    ///
    /// Claims the in-flight flag, dispatches the head of the queue and, after a
    /// successful publish, keeps the flag through the inter-send delay. A
    /// shutdown signal cuts the delay short and yields [`CycleOutcome::Stopped`].
    pub async fn run_cycle(&self, shutdown: &mut broadcast::Receiver<Signal>) -> CycleOutcome {
        if shutdown_requested(shutdown) {
            return CycleOutcome::Stopped;
        }

        let Some(_flight) = self.queue.begin_flight() else {
            return CycleOutcome::Busy;
        };
        let Some(entry) = self.queue.dequeue() else {
            return CycleOutcome::Idle;
        };

        let outcome = self.dispatch(entry).await;
        if outcome.is_published() {
            tokio::select! {
                biased;
                sig = shutdown.recv() => {
                    log_shutdown(sig);
                    return CycleOutcome::Stopped;
                }
                () = tokio::time::sleep(self.config.inter_send_delay()) => {}
            }
        }

        outcome
    }

    /// Returns `true` if shutdown was requested while draining.
    async fn drain(&self, shutdown: &mut broadcast::Receiver<Signal>) -> bool {
        loop {
            match self.run_cycle(shutdown).await {
                CycleOutcome::Stopped => return true,
                outcome if outcome.is_progress() => {}
                _ => return false,
            }
        }
    }

    async fn dispatch(&self, entry: QueueEntry) -> CycleOutcome {
        let id = entry.record_id;
        internal!(record = id, level = DEBUG, "Dispatching to {}", entry.destination);

        if let Err(e) = self.store.update_status(&id, Transition::Dequeued).await {
            warn!("Skipping {id}: {e}");
            return CycleOutcome::Skipped(id);
        }

        let command = ControlCommand::new(&entry.destination, &entry.payload).to_string();
        let result = publish::publish_with_retry(
            self.transport.as_ref(),
            &self.control_topic,
            &command,
            &self.config.publish_retry,
        )
        .await;

        match result {
            Ok(attempts) => {
                info!(
                    "Published {id} to {} after {attempts} attempt(s)",
                    entry.destination
                );
                CycleOutcome::Published(id)
            }
            Err(e) => {
                error!("Giving up on {id}: {e}");

                let failed = Transition::Failed {
                    reason: RELAY_UNAVAILABLE.to_string(),
                };
                if let Err(e) = self.store.update_status(&id, failed).await {
                    warn!("Could not mark {id} as failed: {e}");
                }

                CycleOutcome::Failed(id)
            }
        }
    }
}

fn shutdown_requested(shutdown: &mut broadcast::Receiver<Signal>) -> bool {
    match shutdown.try_recv() {
        Err(TryRecvError::Empty) => false,
        other => {
            log_shutdown(other.map_err(|e| e.to_string()));
            true
        }
    }
}

fn log_shutdown<E: std::fmt::Display>(sig: Result<Signal, E>) {
    match sig {
        Ok(Signal::Shutdown) => {
            internal!("Delivery processor received shutdown signal");
        }
        Err(e) => {
            debug!("Delivery processor shutdown channel error: {e}");
        }
    }
}
