//! Bus Client
//!
//! The connection container of a node: one TCP connection to the broker,
//! subscribed to the cluster topic filter. Received messages are pushed to
//! an inbound queue drained by the consumer; publishes go through a command
//! channel to the connection task.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::destination::{validate_destination, validate_filter};
use super::protocol::{encode_frame, write_frame, BusFrame, FrameReader, BUS_PROTOCOL_VERSION};
use super::BusError;

/// Registration and un-registration are polled this many times
const REGISTRATION_ATTEMPTS: u32 = 3;
/// Delay between two registration polls
const REGISTRATION_POLL: Duration = Duration::from_millis(200);
/// Keep-alive interval
const PING_INTERVAL: Duration = Duration::from_secs(15);

/// Parse `tcp://host:port` into a `host:port` socket address string
pub fn parse_broker_url(url: &str) -> Result<String, BusError> {
    let invalid = || BusError::InvalidUrl(url.to_string());
    let rest = url.trim().strip_prefix("tcp://").ok_or_else(invalid)?;
    let rest = rest.trim_end_matches('/');
    let (host, port) = rest.rsplit_once(':').ok_or_else(invalid)?;
    if host.is_empty() || host.contains('/') {
        return Err(invalid());
    }
    let port: u16 = port.parse().map_err(|_| invalid())?;
    if port == 0 {
        return Err(invalid());
    }
    Ok(format!("{}:{}", host, port))
}

/// Client settings
#[derive(Debug, Clone)]
pub struct BusClientConfig {
    /// `tcp://host:port` of the broker
    pub broker_url: String,
    /// Identifier announced to the broker
    pub client_id: String,
    /// Destination filter to subscribe to
    pub filter: String,
    /// Bound on connecting and on the handshake
    pub connect_timeout: Duration,
}

/// A message received from the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub destination: String,
    pub properties: BTreeMap<String, String>,
    pub payload: Bytes,
}

impl InboundMessage {
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

/// Commands sent to the connection task
#[derive(Debug)]
enum ClientCommand {
    /// An encoded `Publish` frame
    Publish { destination: String, frame: Vec<u8> },
    Shutdown,
}

/// Flags shared with the task of one connection. Every `connect` starts
/// with fresh flags, so a task that ends late cannot reset a newer link.
#[derive(Debug, Default)]
struct LinkState {
    running: AtomicBool,
    subscribed: AtomicBool,
}

impl LinkState {
    fn reset(&self) {
        self.running.store(false, Ordering::Release);
        self.subscribed.store(false, Ordering::Release);
    }
}

pub struct BusClient {
    config: RwLock<BusClientConfig>,
    state: RwLock<Arc<LinkState>>,
    command_tx: Mutex<Option<mpsc::Sender<ClientCommand>>>,
    inbound_tx: mpsc::Sender<InboundMessage>,
}

impl BusClient {
    /// Create a client delivering received messages to `inbound_tx`
    pub fn new(config: BusClientConfig, inbound_tx: mpsc::Sender<InboundMessage>) -> Self {
        Self {
            config: RwLock::new(config),
            state: RwLock::new(Arc::new(LinkState::default())),
            command_tx: Mutex::new(None),
            inbound_tx,
        }
    }

    pub fn config(&self) -> BusClientConfig {
        self.config.read().clone()
    }

    /// Takes effect on the next `connect`
    pub fn set_broker_url(&self, url: &str) {
        self.config.write().broker_url = url.to_string();
    }

    /// Takes effect on the next `connect`
    pub fn set_client_id(&self, client_id: &str) {
        self.config.write().client_id = client_id.to_string();
    }

    fn link(&self) -> Arc<LinkState> {
        self.state.read().clone()
    }

    pub fn is_running(&self) -> bool {
        self.link().running.load(Ordering::Acquire)
    }

    /// Whether the broker acknowledged the subscription
    pub fn is_subscribed(&self) -> bool {
        self.link().subscribed.load(Ordering::Acquire)
    }

    /// Connect, handshake and subscribe. Returns false when already running
    /// or when any step fails.
    pub async fn connect(&self) -> bool {
        if self.is_running() {
            info!("Bus client is already running");
            return false;
        }

        let config = self.config();
        let link = Arc::new(LinkState::default());
        *self.state.write() = link.clone();
        match self.establish(&config, link).await {
            Ok(()) => {
                info!(
                    "Bus client '{}' connected to {} (filter {})",
                    config.client_id, config.broker_url, config.filter
                );
                true
            }
            Err(e) => {
                error!("Unable to connect to {}: {}", config.broker_url, e);
                self.shutdown_link();
                false
            }
        }
    }

    async fn establish(
        &self,
        config: &BusClientConfig,
        link: Arc<LinkState>,
    ) -> Result<(), BusError> {
        let addr = parse_broker_url(&config.broker_url)?;
        validate_filter(&config.filter)
            .map_err(|e| BusError::Protocol(format!("{}: {}", e, config.filter)))?;

        let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| BusError::Timeout)?
            .map_err(|e| BusError::ConnectionLost(e.to_string()))?;
        let _ = stream.set_nodelay(true);
        debug!("Bus client: TCP connected to {}", addr);

        let (read_half, mut write_half) = stream.into_split();
        let mut reader = FrameReader::new(read_half);

        let hello = BusFrame::Hello {
            client_id: config.client_id.clone(),
            version: BUS_PROTOCOL_VERSION,
        };
        write_frame(&mut write_half, &hello).await?;

        let ack = tokio::time::timeout(config.connect_timeout, reader.next_frame())
            .await
            .map_err(|_| BusError::Timeout)??;
        match ack {
            Some(BusFrame::HelloAck { version }) if version == BUS_PROTOCOL_VERSION => {}
            Some(BusFrame::HelloAck { version }) => {
                return Err(BusError::Rejected(format!(
                    "Protocol version mismatch: {} vs {}",
                    version, BUS_PROTOCOL_VERSION
                )))
            }
            Some(BusFrame::Reject { reason }) => return Err(BusError::Rejected(reason)),
            Some(other) => {
                return Err(BusError::Protocol(format!(
                    "Expected HelloAck, got {}",
                    other.type_name()
                )))
            }
            None => {
                return Err(BusError::ConnectionLost(
                    "Connection closed during handshake".to_string(),
                ))
            }
        }

        write_frame(
            &mut write_half,
            &BusFrame::Subscribe {
                filter: config.filter.clone(),
            },
        )
        .await?;

        let (tx, rx) = mpsc::channel(1024);
        *self.command_tx.lock() = Some(tx);
        link.running.store(true, Ordering::Release);

        let state = link.clone();
        let inbound = self.inbound_tx.clone();
        let client_id = config.client_id.clone();
        tokio::spawn(async move {
            Self::connection_task(client_id, reader, write_half, rx, state, inbound).await;
        });

        if poll(|| link.subscribed.load(Ordering::Acquire)).await {
            Ok(())
        } else {
            Err(BusError::Timeout)
        }
    }

    /// Say goodbye and wait for the connection task to finish. Returns false
    /// when not running or when the connection did not close in time.
    pub async fn disconnect(&self) -> bool {
        if !self.is_running() {
            info!("Bus client is not running");
            return false;
        }

        let tx = self.command_tx.lock().take();
        if let Some(tx) = tx {
            let _ = tx.send(ClientCommand::Shutdown).await;
        }

        let link = self.link();
        if poll(|| !link.running.load(Ordering::Acquire)).await {
            info!("Bus client disconnected");
            true
        } else {
            warn!("Bus client did not shut down in time");
            false
        }
    }

    /// Queue a message for `destination`. A message too large for one frame
    /// fails with `Protocol` and leaves the connection up.
    pub async fn publish(
        &self,
        destination: &str,
        properties: &BTreeMap<String, String>,
        payload: Bytes,
    ) -> Result<(), BusError> {
        validate_destination(destination)
            .map_err(|e| BusError::Protocol(format!("{}: {}", e, destination)))?;
        if !self.is_running() {
            return Err(BusError::NotConnected);
        }
        let frame = encode_frame(&BusFrame::Publish {
            destination: destination.to_string(),
            properties: properties
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            payload: payload.to_vec(),
        })?;
        let tx = self.command_tx.lock().clone().ok_or(BusError::NotConnected)?;
        tx.send(ClientCommand::Publish {
            destination: destination.to_string(),
            frame,
        })
        .await
        .map_err(|_| BusError::ConnectionLost("Command channel closed".to_string()))
    }

    fn shutdown_link(&self) {
        self.command_tx.lock().take();
        self.link().reset();
    }

    async fn connection_task(
        client_id: String,
        reader: FrameReader<OwnedReadHalf>,
        writer: OwnedWriteHalf,
        commands: mpsc::Receiver<ClientCommand>,
        state: Arc<LinkState>,
        inbound: mpsc::Sender<InboundMessage>,
    ) {
        match Self::message_loop(reader, writer, commands, &state, &inbound).await {
            Ok(()) => info!("Bus client '{}': disconnected gracefully", client_id),
            Err(e) => warn!("Bus client '{}': connection lost: {}", client_id, e),
        }
        state.reset();
    }

    async fn message_loop(
        mut reader: FrameReader<OwnedReadHalf>,
        mut writer: OwnedWriteHalf,
        mut commands: mpsc::Receiver<ClientCommand>,
        state: &LinkState,
        inbound: &mpsc::Sender<InboundMessage>,
    ) -> Result<(), BusError> {
        let mut ping_timer = tokio::time::interval(PING_INTERVAL);
        ping_timer.reset();

        loop {
            tokio::select! {
                cmd = commands.recv() => {
                    match cmd {
                        Some(ClientCommand::Publish { destination, frame }) => {
                            debug!("Bus client: publishing {} bytes to '{}'", frame.len(), destination);
                            writer
                                .write_all(&frame)
                                .await
                                .map_err(|e| BusError::ConnectionLost(e.to_string()))?;
                        }
                        Some(ClientCommand::Shutdown) | None => {
                            let _ = write_frame(&mut writer, &BusFrame::Goodbye).await;
                            let _ = writer.shutdown().await;
                            return Ok(());
                        }
                    }
                }

                frame = reader.next_frame() => {
                    match frame? {
                        None => {
                            return Err(BusError::ConnectionLost("Connection closed by broker".to_string()));
                        }
                        Some(BusFrame::SubAck { filter }) => {
                            debug!("Bus client: subscription to '{}' registered", filter);
                            state.subscribed.store(true, Ordering::Release);
                        }
                        Some(BusFrame::UnsubAck { filter }) => {
                            debug!("Bus client: subscription to '{}' dropped", filter);
                            state.subscribed.store(false, Ordering::Release);
                        }
                        Some(BusFrame::Publish { destination, properties, payload }) => {
                            debug!("Bus client: received {} bytes on '{}'", payload.len(), destination);
                            let msg = InboundMessage {
                                destination,
                                properties: properties.into_iter().collect(),
                                payload: Bytes::from(payload),
                            };
                            if inbound.send(msg).await.is_err() {
                                warn!("Bus client: inbound queue closed, dropping message");
                            }
                        }
                        Some(BusFrame::Ping) => {
                            write_frame(&mut writer, &BusFrame::Pong).await?;
                        }
                        Some(BusFrame::Pong) => {
                            debug!("Bus client: pong received");
                        }
                        Some(BusFrame::Reject { reason }) => {
                            return Err(BusError::Rejected(reason));
                        }
                        Some(BusFrame::Goodbye) => {
                            return Err(BusError::ConnectionLost("Broker said goodbye".to_string()));
                        }
                        Some(other) => {
                            debug!("Bus client: ignoring unexpected {}", other.type_name());
                        }
                    }
                }

                _ = ping_timer.tick() => {
                    write_frame(&mut writer, &BusFrame::Ping).await?;
                }
            }
        }
    }
}

/// Check `done` up to `REGISTRATION_ATTEMPTS` times, `REGISTRATION_POLL` apart
async fn poll(done: impl Fn() -> bool) -> bool {
    for attempt in 1..=REGISTRATION_ATTEMPTS {
        if done() {
            return true;
        }
        debug!("Waiting for the broker ({}/{})", attempt, REGISTRATION_ATTEMPTS);
        tokio::time::sleep(REGISTRATION_POLL).await;
    }
    done()
}

impl Drop for BusClient {
    fn drop(&mut self) {
        if let Some(tx) = self.command_tx.get_mut().take() {
            let _ = tx.try_send(ClientCommand::Shutdown);
        }
    }
}
