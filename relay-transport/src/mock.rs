use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::{
    sync::{Notify, broadcast, watch},
    time::Instant,
};

use crate::{ConnectionState, InboundEvent, Transport, TransportError};

/// A publish the mock accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: String,
    /// Tokio clock at acceptance, so paused-time tests can assert pacing
    pub at: Instant,
}

#[derive(Debug)]
struct Inner {
    published: Mutex<Vec<PublishedMessage>>,
    attempts: AtomicUsize,
    failures_remaining: AtomicU32,
    fail_all: AtomicBool,
    connects: AtomicUsize,
    events: broadcast::Sender<InboundEvent>,
    state: watch::Sender<ConnectionState>,
    notify: Notify,
}

/// In-process transport for tests
///
/// Completes publishes synchronously, records them with timestamps and lets the
/// test inject failures, inbound events and a fatal connection state.
#[derive(Debug, Clone)]
pub struct MockTransport {
    inner: Arc<Inner>,
}

impl Default for MockTransport {
    fn default() -> Self {
        let (events, _) = broadcast::channel(64);
        let (state, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            inner: Arc::new(Inner {
                published: Mutex::new(Vec::new()),
                attempts: AtomicUsize::new(0),
                failures_remaining: AtomicU32::new(0),
                fail_all: AtomicBool::new(false),
                connects: AtomicUsize::new(0),
                events,
                state,
                notify: Notify::new(),
            }),
        }
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every accepted publish, in order
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.inner.published.lock().clone()
    }

    pub fn publish_count(&self) -> usize {
        self.inner.published.lock().len()
    }

    /// Publish calls including rejected ones
    pub fn publish_attempts(&self) -> usize {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    pub fn connect_count(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    /// Reject the next `count` publishes
    pub fn fail_next(&self, count: u32) {
        self.inner.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Reject every publish until switched off
    pub fn fail_all(&self, fail: bool) {
        self.inner.fail_all.store(fail, Ordering::SeqCst);
    }

    /// Deliver a raw status-topic payload to subscribers
    pub fn emit_status(&self, payload: &str) {
        let _ = self
            .inner
            .events
            .send(InboundEvent::Status(payload.to_string()));
    }

    /// Deliver a raw incoming-topic payload to subscribers
    pub fn emit_incoming(&self, payload: &str) {
        let _ = self
            .inner
            .events
            .send(InboundEvent::Incoming(payload.to_string()));
    }

    /// Put the transport in its terminal failed state
    pub fn exhaust_reconnects(&self, attempts: u32) {
        self.inner
            .state
            .send_replace(ConnectionState::Failed { attempts });
    }

    /// Number of live inbound subscribers
    pub fn subscriber_count(&self) -> usize {
        self.inner.events.receiver_count()
    }

    /// Wait until at least `expected` publishes were accepted
    ///
    /// # Errors
    /// Returns an error if the timeout is reached first
    pub async fn wait_for_publishes(
        &self,
        expected: usize,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        self.wait_until(timeout, |mock| mock.publish_count() >= expected)
            .await
    }

    /// Wait until at least `expected` publish calls were made, accepted or not
    ///
    /// # Errors
    /// Returns an error if the timeout is reached first
    pub async fn wait_for_attempts(
        &self,
        expected: usize,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        self.wait_until(timeout, |mock| mock.publish_attempts() >= expected)
            .await
    }

    async fn wait_until<F>(&self, timeout: Duration, predicate: F) -> Result<(), TransportError>
    where
        F: Fn(&Self) -> bool,
    {
        tokio::time::timeout(timeout, async {
            loop {
                let mut notified = std::pin::pin!(self.inner.notify.notified());
                notified.as_mut().enable();

                if predicate(self) {
                    return;
                }
                notified.await;
            }
        })
        .await
        .map_err(|_| TransportError::AckTimeout(timeout.as_secs()))
    }

    fn should_fail(&self) -> bool {
        if self.inner.fail_all.load(Ordering::SeqCst) {
            return true;
        }

        self.inner
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        if let ConnectionState::Failed { attempts } = *self.inner.state.borrow() {
            return Err(TransportError::ReconnectExhausted { attempts });
        }

        self.inner.connects.fetch_add(1, Ordering::SeqCst);
        self.inner.state.send_replace(ConnectionState::Connected);
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &str) -> Result<(), TransportError> {
        self.inner.attempts.fetch_add(1, Ordering::SeqCst);

        let result = if self.should_fail() {
            Err(TransportError::Publish("injected failure".to_string()))
        } else {
            self.inner.published.lock().push(PublishedMessage {
                topic: topic.to_string(),
                payload: payload.to_string(),
                at: Instant::now(),
            });
            Ok(())
        };

        self.inner.notify.notify_waiters();
        result
    }

    fn subscribe(&self) -> broadcast::Receiver<InboundEvent> {
        self.inner.events.subscribe()
    }

    fn state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        if !self.inner.state.borrow().is_failed() {
            self.inner
                .state
                .send_replace(ConnectionState::Disconnected);
        }
        Ok(())
    }
}
