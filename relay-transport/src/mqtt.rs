//! MQTT implementation of [`Transport`]

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use relay_common::{
    incoming, internal, outgoing,
    tracing::{debug, error, info, warn},
};
use rumqttc::{AsyncClient, Event, EventLoop, Outgoing, Packet, QoS};
use tokio::{
    sync::{broadcast, oneshot, watch},
    task::JoinHandle,
};

use crate::{
    ConnectionState, InboundEvent, Transport, TransportConfig, TransportError,
};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Matches broker acknowledgements back to waiting publishers.
///
/// The client only learns a packet id once the event loop has sent the publish,
/// so waiters queue in publish order and are bound to an id when the loop
/// reports the outgoing packet. Publishes are serialized, which keeps the two
/// orders aligned.
#[derive(Debug, Default)]
struct AckTracker {
    unassigned: VecDeque<oneshot::Sender<()>>,
    in_flight: HashMap<u16, oneshot::Sender<()>>,
}

impl AckTracker {
    fn expect(&mut self, waiter: oneshot::Sender<()>) {
        self.unassigned.push_back(waiter);
    }

    fn assign(&mut self, pkid: u16) {
        if let Some(waiter) = self.unassigned.pop_front() {
            self.in_flight.insert(pkid, waiter);
        }
    }

    fn acknowledge(&mut self, pkid: u16) {
        if let Some(waiter) = self.in_flight.remove(&pkid) {
            let _ = waiter.send(());
        }
    }

    /// Take back the newest waiter when its publish never reached the event loop
    fn withdraw(&mut self) {
        self.unassigned.pop_back();
    }

    /// Drop bound waiters whose publisher has given up
    ///
    /// Abandoned waiters that are still unassigned stay queued: their packet is
    /// still pending in the client and will consume the next packet id.
    fn prune(&mut self) {
        self.in_flight.retain(|_, waiter| !waiter.is_closed());
    }
}

/// MQTT transport built on `rumqttc`
///
/// `connect` spawns a driver task that owns the event loop. The driver
/// resubscribes after every successful (re)connection, forwards inbound
/// publishes as [`InboundEvent`]s and reconnects with exponential backoff until
/// the policy's attempt budget is spent, at which point the state turns
/// [`ConnectionState::Failed`] and stays there.
#[derive(Debug)]
pub struct MqttTransport {
    config: TransportConfig,
    client: Mutex<Option<AsyncClient>>,
    driver: Mutex<Option<JoinHandle<()>>>,
    acks: Arc<Mutex<AckTracker>>,
    events: broadcast::Sender<InboundEvent>,
    state: watch::Sender<ConnectionState>,
    publish_lock: tokio::sync::Mutex<()>,
}

impl MqttTransport {
    #[must_use]
    pub fn new(config: TransportConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (state, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            config,
            client: Mutex::new(None),
            driver: Mutex::new(None),
            acks: Arc::new(Mutex::new(AckTracker::default())),
            events,
            state,
            publish_lock: tokio::sync::Mutex::new(()),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &TransportConfig {
        &self.config
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        {
            let mut driver = self.driver.lock();
            if driver.as_ref().is_some_and(|handle| !handle.is_finished()) {
                return Ok(());
            }

            internal!(
                level = INFO,
                "Connecting to broker {}:{} as {}",
                self.config.host,
                self.config.port,
                self.config.client_id
            );

            let (client, eventloop) =
                AsyncClient::new(self.config.mqtt_options(), self.config.channel_capacity);
            *self.client.lock() = Some(client.clone());
            self.state.send_replace(ConnectionState::Connecting);

            let task = Driver {
                client,
                eventloop,
                config: self.config.clone(),
                acks: Arc::clone(&self.acks),
                events: self.events.clone(),
                state: self.state.clone(),
            };
            *driver = Some(tokio::spawn(task.run()));
        }

        let mut state = self.state.subscribe();
        let settled = *state
            .wait_for(|s| matches!(s, ConnectionState::Connected | ConnectionState::Failed { .. }))
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        match settled {
            ConnectionState::Failed { attempts } => {
                Err(TransportError::ReconnectExhausted { attempts })
            }
            _ => Ok(()),
        }
    }

    async fn publish(&self, topic: &str, payload: &str) -> Result<(), TransportError> {
        let client = self
            .client
            .lock()
            .clone()
            .ok_or(TransportError::NotConnected)?;

        let _serial = self.publish_lock.lock().await;

        let (waiter, acked) = oneshot::channel();
        self.acks.lock().expect(waiter);

        if let Err(e) = client
            .publish(topic, QoS::AtLeastOnce, false, payload.as_bytes().to_vec())
            .await
        {
            drop(acked);
            self.acks.lock().withdraw();
            return Err(e.into());
        }

        outgoing!(topic = topic, "PUBLISH {payload}");

        match tokio::time::timeout(self.config.ack_timeout(), acked).await {
            Ok(Ok(())) => {
                debug!(topic, "Publish acknowledged");
                Ok(())
            }
            Ok(Err(_)) => {
                self.acks.lock().prune();
                Err(TransportError::Publish(
                    "acknowledgement channel closed".to_string(),
                ))
            }
            Err(_) => {
                self.acks.lock().prune();
                Err(TransportError::AckTimeout(self.config.ack_timeout_secs))
            }
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<InboundEvent> {
        self.events.subscribe()
    }

    fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let client = self.client.lock().take();
        let driver = self.driver.lock().take();

        if let Some(client) = client
            && let Err(e) = client.disconnect().await
        {
            warn!(error = %e, "Failed to send disconnect to broker");
        }

        if let Some(mut handle) = driver
            && tokio::time::timeout(self.config.ack_timeout(), &mut handle)
                .await
                .is_err()
        {
            handle.abort();
        }

        self.state.send_replace(ConnectionState::Disconnected);
        internal!(level = INFO, "Disconnected from broker");

        Ok(())
    }
}

struct Driver {
    client: AsyncClient,
    eventloop: EventLoop,
    config: TransportConfig,
    acks: Arc<Mutex<AckTracker>>,
    events: broadcast::Sender<InboundEvent>,
    state: watch::Sender<ConnectionState>,
}

impl Driver {
    async fn run(mut self) {
        let mut attempt: u32 = 0;

        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    if attempt > 0 {
                        info!(attempt, "Reconnected to broker");
                    }
                    attempt = 0;
                    self.state.send_replace(ConnectionState::Connected);
                    self.subscribe_inbound();
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let payload = String::from_utf8_lossy(&publish.payload).into_owned();
                    self.route(&publish.topic, payload);
                }
                Ok(Event::Incoming(Packet::PubAck(ack))) => {
                    self.acks.lock().acknowledge(ack.pkid);
                }
                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    debug!(pkid = ack.pkid, "Subscription acknowledged");
                }
                Ok(Event::Outgoing(Outgoing::Publish(pkid))) => {
                    self.acks.lock().assign(pkid);
                }
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    internal!("Driver stopping after disconnect");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    attempt += 1;

                    if self.config.reconnect.is_exhausted(attempt) {
                        error!(
                            attempts = attempt,
                            error = %e,
                            "Broker unreachable, reconnect budget exhausted"
                        );
                        self.state
                            .send_replace(ConnectionState::Failed { attempts: attempt });
                        break;
                    }

                    let delay = self.config.reconnect.delay(attempt);
                    warn!(
                        attempt,
                        max_attempts = self.config.reconnect.max_attempts,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "Broker connection lost, reconnecting"
                    );
                    self.state
                        .send_replace(ConnectionState::Reconnecting { attempt });
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Subscription failures are logged; the connection stays up either way.
    fn subscribe_inbound(&self) {
        let topics = &self.config.topics;
        for topic in [&topics.status, &topics.incoming] {
            match self.client.try_subscribe(topic.as_str(), QoS::AtLeastOnce) {
                Ok(()) => internal!(level = DEBUG, "Subscribed to {topic}"),
                Err(e) => warn!(topic = %topic, error = %e, "Failed to subscribe"),
            }
        }
    }

    fn route(&self, topic: &str, payload: String) {
        let topics = &self.config.topics;
        let event = if topic == topics.status {
            InboundEvent::Status(payload)
        } else if topic == topics.incoming {
            InboundEvent::Incoming(payload)
        } else {
            debug!(topic, "Ignoring publish on unexpected topic");
            return;
        };

        incoming!(topic = topic, "{event:?}");

        if self.events.send(event).is_err() {
            debug!(topic, "No subscribers for inbound event");
        }
    }
}
