//! Embedded Broker
//!
//! A topic broker that runs inside a node process so that a cluster needs
//! no external messaging server. Every connected client may publish; a
//! message is routed to all *other* clients holding a matching filter.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::client::parse_broker_url;
use super::destination::{destination_matches, validate_destination, validate_filter};
use super::protocol::{write_frame, BusFrame, FrameReader, BUS_PROTOCOL_VERSION};
use super::BusError;
use crate::config::Properties;

/// Property holding the listen address (`tcp://host:port` or `host:port`)
pub const BIND_ADDRESS_PROPERTY: &str = "bindAddress";
/// Property holding the client limit
pub const MAX_CONNECTIONS_PROPERTY: &str = "maxConnections";
/// Property holding the number of messages queued per client
pub const CLIENT_QUEUE_PROPERTY: &str = "clientQueue";

const DEFAULT_MAX_CONNECTIONS: usize = 64;
const DEFAULT_CLIENT_QUEUE: usize = 1024;
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedBrokerConfig {
    /// `host:port` to listen on
    pub bind_address: String,
    pub max_connections: usize,
    /// Messages queued for one client before it is disconnected as too slow
    pub client_queue: usize,
}

impl Default for EmbeddedBrokerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:61616".to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            client_queue: DEFAULT_CLIENT_QUEUE,
        }
    }
}

impl EmbeddedBrokerConfig {
    /// Read the broker settings from its properties file. Without a bind
    /// address the broker listens where the cluster broker URL points.
    pub fn from_properties(props: &Properties, broker_url: &str) -> Result<Self, BusError> {
        let bind_address = match props.get(BIND_ADDRESS_PROPERTY) {
            Some(addr) if addr.starts_with("tcp://") => parse_broker_url(addr)?,
            Some(addr) if !addr.trim().is_empty() => addr.trim().to_string(),
            _ => parse_broker_url(broker_url)?,
        };
        let max_connections =
            count_property(props, MAX_CONNECTIONS_PROPERTY, DEFAULT_MAX_CONNECTIONS)?;
        let client_queue = count_property(props, CLIENT_QUEUE_PROPERTY, DEFAULT_CLIENT_QUEUE)?;
        Ok(Self {
            bind_address,
            max_connections,
            client_queue,
        })
    }
}

fn count_property(props: &Properties, key: &str, default: usize) -> Result<usize, BusError> {
    match props.get(key) {
        Some(value) => match value.trim().parse() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(BusError::Protocol(format!("Invalid {}: {}", key, value))),
        },
        None => Ok(default),
    }
}

/// What the broker pushes to one client's connection task
#[derive(Debug)]
enum Outbound {
    Frame(BusFrame),
    Close,
}

struct BrokerClient {
    client_id: String,
    filters: Arc<RwLock<Vec<String>>>,
    tx: mpsc::Sender<Outbound>,
    /// Woken when the client fell behind and must be dropped
    evict: Arc<Notify>,
}

type ClientTable = Arc<DashMap<u64, BrokerClient>>;

struct RunningBroker {
    local_addr: SocketAddr,
    accept_task: JoinHandle<()>,
    clients: ClientTable,
}

pub struct EmbeddedBroker {
    config: EmbeddedBrokerConfig,
    running: Mutex<Option<RunningBroker>>,
}

impl EmbeddedBroker {
    pub fn new(config: EmbeddedBrokerConfig) -> Self {
        Self {
            config,
            running: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &EmbeddedBrokerConfig {
        &self.config
    }

    pub fn is_started(&self) -> bool {
        self.running.lock().is_some()
    }

    /// The bound address, useful when listening on port 0
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().as_ref().map(|r| r.local_addr)
    }

    pub fn client_count(&self) -> usize {
        self.running
            .lock()
            .as_ref()
            .map_or(0, |r| r.clients.len())
    }

    /// Bind and start accepting clients. Returns false when already started
    /// or when the address cannot be bound.
    pub async fn start(&self) -> bool {
        if self.is_started() {
            info!("Embedded broker is already started");
            return false;
        }

        let listener = match TcpListener::bind(&self.config.bind_address).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(
                    "Embedded broker failed to bind {}: {}",
                    self.config.bind_address, e
                );
                return false;
            }
        };
        let local_addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                error!("Embedded broker has no local address: {}", e);
                return false;
            }
        };

        let clients: ClientTable = Arc::new(DashMap::new());
        let accept_clients = clients.clone();
        let limits = self.config.clone();
        let accept_task = tokio::spawn(async move {
            Self::accept_loop(listener, accept_clients, limits).await;
        });

        let mut running = self.running.lock();
        if running.is_some() {
            accept_task.abort();
            return false;
        }
        *running = Some(RunningBroker {
            local_addr,
            accept_task,
            clients,
        });
        info!("Embedded broker listening on {}", local_addr);
        true
    }

    /// Stop accepting and close every client. Returns false when not started.
    pub async fn stop(&self) -> bool {
        let running = self.running.lock().take();
        let Some(running) = running else {
            info!("Embedded broker is not started");
            return false;
        };

        running.accept_task.abort();
        let senders: Vec<mpsc::Sender<Outbound>> =
            running.clients.iter().map(|c| c.tx.clone()).collect();
        for tx in senders {
            let _ = tx.send(Outbound::Close).await;
        }
        running.clients.clear();
        info!("Embedded broker on {} stopped", running.local_addr);
        true
    }

    async fn accept_loop(
        listener: TcpListener,
        clients: ClientTable,
        limits: EmbeddedBrokerConfig,
    ) {
        let next_id = AtomicU64::new(1);
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    debug!("Incoming bus connection from {}", addr);
                    let id = next_id.fetch_add(1, Ordering::Relaxed);
                    let clients = clients.clone();
                    let limits = limits.clone();
                    tokio::spawn(async move {
                        if let Err(e) =
                            Self::handle_client(id, stream, clients.clone(), &limits).await
                        {
                            debug!("Bus connection {} from {} ended: {}", id, addr, e);
                        }
                        clients.remove(&id);
                    });
                }
                Err(e) => {
                    error!("Failed to accept bus connection: {}", e);
                }
            }
        }
    }

    async fn handle_client(
        id: u64,
        stream: TcpStream,
        clients: ClientTable,
        limits: &EmbeddedBrokerConfig,
    ) -> Result<(), BusError> {
        let max_connections = limits.max_connections;
        let _ = stream.set_nodelay(true);
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = FrameReader::new(read_half);

        let hello = tokio::time::timeout(HANDSHAKE_TIMEOUT, reader.next_frame())
            .await
            .map_err(|_| BusError::Timeout)??;

        let client_id = match hello {
            Some(BusFrame::Hello { client_id, version }) => {
                if version != BUS_PROTOCOL_VERSION {
                    let reason = format!(
                        "Protocol version mismatch: {} vs {}",
                        version, BUS_PROTOCOL_VERSION
                    );
                    let _ = write_frame(&mut write_half, &BusFrame::Reject { reason: reason.clone() }).await;
                    return Err(BusError::Rejected(reason));
                }
                client_id
            }
            Some(other) => {
                return Err(BusError::Protocol(format!(
                    "Expected Hello, got {}",
                    other.type_name()
                )))
            }
            None => return Ok(()),
        };

        if clients.len() >= max_connections {
            let reason = format!("Connection limit of {} reached", max_connections);
            warn!("Embedded broker refused '{}': {}", client_id, reason);
            let _ = write_frame(&mut write_half, &BusFrame::Reject { reason: reason.clone() }).await;
            return Err(BusError::Rejected(reason));
        }

        let (tx, mut rx) = mpsc::channel(limits.client_queue.max(1));
        let filters = Arc::new(RwLock::new(Vec::new()));
        let evict = Arc::new(Notify::new());
        clients.insert(
            id,
            BrokerClient {
                client_id: client_id.clone(),
                filters: filters.clone(),
                tx,
                evict: evict.clone(),
            },
        );
        let too_slow = || BusError::ConnectionLost("client queue overflowed".to_string());

        write_frame(
            &mut write_half,
            &BusFrame::HelloAck {
                version: BUS_PROTOCOL_VERSION,
            },
        )
        .await?;
        info!("Bus client '{}' connected", client_id);

        loop {
            tokio::select! {
                _ = evict.notified() => {
                    let _ = write_frame(&mut write_half, &BusFrame::Goodbye).await;
                    return Err(too_slow());
                }

                out = rx.recv() => {
                    match out {
                        Some(Outbound::Frame(frame)) => {
                            // a peer that stopped reading blocks here
                            tokio::select! {
                                written = write_frame(&mut write_half, &frame) => written?,
                                _ = evict.notified() => return Err(too_slow()),
                            }
                        }
                        Some(Outbound::Close) | None => {
                            let _ = write_frame(&mut write_half, &BusFrame::Goodbye).await;
                            let _ = write_half.shutdown().await;
                            return Ok(());
                        }
                    }
                }

                frame = reader.next_frame() => {
                    match frame? {
                        None | Some(BusFrame::Goodbye) => {
                            info!("Bus client '{}' disconnected", client_id);
                            return Ok(());
                        }
                        Some(BusFrame::Subscribe { filter }) => {
                            let reply = match validate_filter(&filter) {
                                Ok(()) => {
                                    let mut subs = filters.write();
                                    if !subs.contains(&filter) {
                                        subs.push(filter.clone());
                                    }
                                    debug!("Bus client '{}' subscribed to '{}'", client_id, filter);
                                    BusFrame::SubAck { filter }
                                }
                                Err(e) => BusFrame::Reject {
                                    reason: format!("{}: {}", e, filter),
                                },
                            };
                            write_frame(&mut write_half, &reply).await?;
                        }
                        Some(BusFrame::Unsubscribe { filter }) => {
                            filters.write().retain(|f| f != &filter);
                            write_frame(&mut write_half, &BusFrame::UnsubAck { filter }).await?;
                        }
                        Some(BusFrame::Publish { destination, properties, payload }) => {
                            if let Err(e) = validate_destination(&destination) {
                                warn!("Bus client '{}' published to '{}': {}", client_id, destination, e);
                                continue;
                            }
                            Self::route(id, &clients, destination, properties, payload);
                        }
                        Some(BusFrame::Ping) => write_frame(&mut write_half, &BusFrame::Pong).await?,
                        Some(BusFrame::Pong) => {}
                        Some(other) => {
                            debug!("Bus client '{}': ignoring unexpected {}", client_id, other.type_name());
                        }
                    }
                }
            }
        }
    }

    /// Deliver a publish to every other client with a matching filter. A
    /// client whose queue is full is disconnected rather than left to miss
    /// the message silently.
    fn route(
        sender: u64,
        clients: &ClientTable,
        destination: String,
        properties: Vec<(String, String)>,
        payload: Vec<u8>,
    ) {
        let targets: Vec<(u64, String, mpsc::Sender<Outbound>, Arc<Notify>)> = clients
            .iter()
            .filter(|c| *c.key() != sender)
            .filter(|c| {
                c.filters
                    .read()
                    .iter()
                    .any(|f| destination_matches(&destination, f))
            })
            .map(|c| (*c.key(), c.client_id.clone(), c.tx.clone(), c.evict.clone()))
            .collect();

        debug!("Routing '{}' to {} client(s)", destination, targets.len());
        for (id, client_id, tx, evict) in targets {
            let frame = BusFrame::Publish {
                destination: destination.clone(),
                properties: properties.clone(),
                payload: payload.clone(),
            };
            match tx.try_send(Outbound::Frame(frame)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    error!(
                        "Queue of bus client '{}' is full, disconnecting it",
                        client_id
                    );
                    clients.remove(&id);
                    evict.notify_one();
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Bus client '{}' is gone, not routing '{}'", client_id, destination);
                }
            }
        }
    }
}

impl Drop for EmbeddedBroker {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.accept_task.abort();
            for client in running.clients.iter() {
                let _ = client.tx.try_send(Outbound::Close);
            }
        }
    }
}
