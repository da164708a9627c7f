//! Relay service and the caller-facing API
//!
//! [`RelayService`] owns the queue and runs the processor and the correlator as
//! background tasks. Callers talk to it through [`RelayApi`], which keeps
//! whatever front end sits on top decoupled from the concrete service.

use std::sync::Arc;

use async_trait::async_trait;
use relay_common::{
    Signal, internal,
    tracing::{error, warn},
};
use relay_store::{DeliveryRecord, IncomingMessage, Page, RecordFilter, RecordId, RecordStore};
use relay_transport::{ConnectionState, Transport, TransportError};
use tokio::{
    sync::{Mutex, broadcast},
    task::JoinSet,
};

use crate::{
    BatchItem, Correlator, DeliveryProcessor, IntakeGate, QueueStatus, RelayConfig, RelayError,
    RetryReceipt, SubmitReceipt,
    processor::restore_queued,
    queue::DeliveryQueue,
};

/// Operations exposed to callers of the relay.
///
/// # Example
///
/// ```rust,ignore
/// async fn notify(api: &dyn RelayApi, to: &str) -> Result<RecordId, RelayError> {
///     Ok(api.submit(to, "Your code is 1234", "auth-service").await?.id)
/// }
/// ```
#[async_trait]
pub trait RelayApi: Send + Sync {
    /// Accept a single send. Returns once the record is `QUEUED`.
    async fn submit(
        &self,
        destination: &str,
        payload: &str,
        owner_id: &str,
    ) -> Result<SubmitReceipt, RelayError>;

    /// Accept one payload for many destinations, each judged on its own.
    async fn submit_batch(
        &self,
        destinations: &[String],
        payload: &str,
        owner_id: &str,
    ) -> Result<Vec<BatchItem>, RelayError>;

    /// Re-enqueue a `FAILED` record within its retry budget.
    async fn retry(&self, id: &RecordId) -> Result<RetryReceipt, RelayError>;

    fn queue_status(&self) -> QueueStatus;

    async fn get(&self, id: &RecordId) -> Result<DeliveryRecord, RelayError>;

    async fn list(
        &self,
        filter: &RecordFilter,
        page: Page,
    ) -> Result<Vec<DeliveryRecord>, RelayError>;

    async fn list_incoming(&self, page: Page) -> Result<Vec<IncomingMessage>, RelayError>;
}

/// The assembled relay.
#[derive(Debug)]
pub struct RelayService {
    config: RelayConfig,
    store: Arc<dyn RecordStore>,
    transport: Arc<dyn Transport>,
    intake: IntakeGate,
    processor: Arc<DeliveryProcessor>,
    correlator: Arc<Correlator>,
    shutdown: broadcast::Sender<Signal>,
    tasks: Mutex<Option<JoinSet<Result<(), RelayError>>>>,
}

impl RelayService {
    #[must_use]
    pub fn new(
        config: RelayConfig,
        store: Arc<dyn RecordStore>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let queue = DeliveryQueue::new();
        let intake = IntakeGate::new(
            config.intake.clone(),
            Arc::clone(&store),
            queue.clone(),
            config.processor.inter_send_delay_secs,
        );
        let processor = Arc::new(DeliveryProcessor::new(
            config.processor.clone(),
            config.control_topic.clone(),
            queue,
            Arc::clone(&store),
            Arc::clone(&transport),
        ));
        let correlator = Arc::new(Correlator::new(Arc::clone(&store)));
        let (shutdown, _) = broadcast::channel(4);

        Self {
            config,
            store,
            transport,
            intake,
            processor,
            correlator,
            shutdown,
            tasks: Mutex::new(None),
        }
    }

    pub const fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn queue(&self) -> &DeliveryQueue {
        self.processor.queue()
    }

    pub const fn processor(&self) -> &Arc<DeliveryProcessor> {
        &self.processor
    }

    pub const fn correlator(&self) -> &Arc<Correlator> {
        &self.correlator
    }

    /// Connect the transport, restore persisted work and spawn the background tasks.
    pub async fn start(&self) -> Result<(), RelayError> {
        let mut tasks = self.tasks.lock().await;
        if tasks.is_some() {
            return Err(RelayError::AlreadyRunning);
        }

        internal!(level = INFO, "Starting relay service");
        self.transport.connect().await?;

        // Subscribe before spawning so no report arrives unobserved.
        let events = self.transport.subscribe();

        if self.config.processor.restore_on_start {
            restore_queued(self.store.as_ref(), self.queue()).await?;
        }

        let mut set = JoinSet::new();

        let processor = Arc::clone(&self.processor);
        let shutdown = self.shutdown.subscribe();
        set.spawn(async move { processor.serve(shutdown).await });

        let correlator = Arc::clone(&self.correlator);
        let shutdown = self.shutdown.subscribe();
        set.spawn(async move { correlator.serve(events, shutdown).await });

        *tasks = Some(set);
        drop(tasks);

        internal!(level = INFO, "Relay service started");
        Ok(())
    }

    /// Signal the background tasks, wait for them and disconnect.
    pub async fn stop(&self) -> Result<(), RelayError> {
        let Some(mut set) = self.tasks.lock().await.take() else {
            return Err(RelayError::NotRunning);
        };

        internal!(level = INFO, "Stopping relay service");
        if self.shutdown.send(Signal::Shutdown).is_err() {
            warn!("No background task was listening for shutdown");
        }

        let mut first_error = None;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!("Relay task failed: {e}");
                    first_error.get_or_insert(e);
                }
                Err(e) => error!("Relay task panicked or was cancelled: {e}"),
            }
        }

        if let Err(e) = self.transport.disconnect().await {
            warn!("Transport disconnect failed: {e}");
        }

        internal!(level = INFO, "Relay service stopped");
        first_error.map_or(Ok(()), Err)
    }

    /// Resolves with [`RelayError::Fatal`] once the transport gives up for good.
    ///
    /// Returns `Ok(())` if the transport is dropped without failing.
    pub async fn supervise(&self) -> Result<(), RelayError> {
        let mut state = self.transport.state();

        let attempts = match state.wait_for(|state| state.is_failed()).await {
            Ok(failed) => match *failed {
                ConnectionState::Failed { attempts } => attempts,
                _ => 0,
            },
            Err(_) => return Ok(()),
        };

        internal!(
            level = ERROR,
            "Transport failed after {attempts} reconnect attempts, relay cannot continue"
        );
        Err(RelayError::Fatal(TransportError::ReconnectExhausted {
            attempts,
        }))
    }

    /// Whether background tasks are running.
    pub async fn is_running(&self) -> bool {
        self.tasks.lock().await.is_some()
    }
}

#[async_trait]
impl RelayApi for RelayService {
    async fn submit(
        &self,
        destination: &str,
        payload: &str,
        owner_id: &str,
    ) -> Result<SubmitReceipt, RelayError> {
        self.intake.submit(destination, payload, owner_id).await
    }

    async fn submit_batch(
        &self,
        destinations: &[String],
        payload: &str,
        owner_id: &str,
    ) -> Result<Vec<BatchItem>, RelayError> {
        self.intake
            .submit_batch(destinations, payload, owner_id)
            .await
    }

    async fn retry(&self, id: &RecordId) -> Result<RetryReceipt, RelayError> {
        self.intake.retry(id).await
    }

    fn queue_status(&self) -> QueueStatus {
        self.intake.queue_status()
    }

    async fn get(&self, id: &RecordId) -> Result<DeliveryRecord, RelayError> {
        Ok(self.store.get(id).await?)
    }

    async fn list(
        &self,
        filter: &RecordFilter,
        page: Page,
    ) -> Result<Vec<DeliveryRecord>, RelayError> {
        Ok(self.store.list(filter, page).await?)
    }

    async fn list_incoming(&self, page: Page) -> Result<Vec<IncomingMessage>, RelayError> {
        Ok(self.store.list_incoming(page).await?)
    }
}
