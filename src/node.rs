//! Cluster Node
//!
//! Wires the configuration store, replication context, publisher, consumer
//! chain, bus client and optional embedded broker into one cluster instance.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bus::{
    BusClient, BusClientConfig, EmbeddedBroker, EmbeddedBrokerConfig, InboundMessage,
};
use crate::catalog::{Catalog, DataDirectory, SettingsStore};
use crate::config::{
    ClusterConfiguration, ConfigState, Properties, Status, TimeoutConfig, CONNECTION_KEY,
    EMBEDDED_BROKER_KEY, READ_ONLY_KEY, TOGGLE_MASTER_KEY, TOGGLE_PRODUCER_KEY, TOGGLE_SLAVE_KEY,
};
use crate::consumer::EventConsumer;
use crate::controller::ClusterController;
use crate::error::Result;
use crate::event::{EventSerializer, JsonEventSerializer};
use crate::publisher::ClusterPublisher;
use crate::sync::{
    CatalogSynchronizer, ConfigurationSynchronizer, DocumentSynchronizer, HandlerChain,
};
use crate::toggle::ReplicationContext;

/// Local stores a node replicates
pub struct NodeStores {
    pub catalog: Arc<dyn Catalog>,
    pub settings: Arc<dyn SettingsStore>,
    pub data_dir: Arc<DataDirectory>,
}

pub struct ClusterNode {
    config: Arc<ClusterConfiguration>,
    ctx: Arc<ReplicationContext>,
    stores: NodeStores,
    serializer: Arc<dyn EventSerializer>,
    client: Arc<BusClient>,
    timeouts: TimeoutConfig,
    broker: Mutex<Option<Arc<EmbeddedBroker>>>,
    inbound: Mutex<Option<mpsc::Receiver<InboundMessage>>>,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl ClusterNode {
    /// Build a node over `stores`. Initializes the configuration store if
    /// that did not happen yet and registers the publisher on the catalog
    /// and settings.
    pub fn new(
        config: Arc<ClusterConfiguration>,
        stores: NodeStores,
        timeouts: TimeoutConfig,
        consumer_queue: usize,
    ) -> Self {
        if config.state() == ConfigState::Uninitialized {
            config.init();
        }

        let ctx = Arc::new(ReplicationContext::new(
            config.flag(TOGGLE_MASTER_KEY, true),
            config.flag(TOGGLE_SLAVE_KEY, true),
        ));
        if !config.flag(TOGGLE_PRODUCER_KEY, true) {
            info!("Producer disabled by configuration");
            ctx.disable();
        }
        stores
            .data_dir
            .set_read_only(config.status(READ_ONLY_KEY).is_enabled());

        let (inbound_tx, inbound_rx) = mpsc::channel(consumer_queue.max(1));
        let client = Arc::new(BusClient::new(
            BusClientConfig {
                broker_url: config.broker_url(),
                client_id: config.instance_name(),
                filter: config.topic_name(),
                connect_timeout: timeouts.connect,
            },
            inbound_tx,
        ));

        let serializer: Arc<dyn EventSerializer> = Arc::new(JsonEventSerializer::new());
        let publisher = Arc::new(
            ClusterPublisher::new(client.clone(), serializer.clone(), config.clone(), ctx.clone())
                .with_data_dir(stores.data_dir.clone()),
        );
        stores.catalog.add_listener(publisher.clone());
        stores.settings.add_listener(publisher);

        Self {
            config,
            ctx,
            stores,
            serializer,
            client,
            timeouts,
            broker: Mutex::new(None),
            inbound: Mutex::new(Some(inbound_rx)),
            consumer: Mutex::new(None),
        }
    }

    /// Start the embedded broker when enabled, the consumer, and the bus
    /// connection when enabled. A failed connection disables `connection`
    /// and stores the configuration; the node keeps running unconnected.
    pub async fn start(&self) -> Result<()> {
        if self.config.status(EMBEDDED_BROKER_KEY).is_enabled() {
            self.start_embedded_broker().await?;
        }

        self.start_consumer();

        if self.config.status(CONNECTION_KEY).is_enabled() {
            if !self.client.connect().await {
                warn!(
                    "Unable to connect to {}, disabling the connection",
                    self.config.broker_url()
                );
                self.config.set_status(CONNECTION_KEY, Status::Disabled);
                self.store_config();
            }
        } else {
            info!("Connection disabled by configuration, not connecting");
        }

        self.ctx.activate();
        info!(
            "Cluster node '{}' started (group {})",
            self.config.instance_name(),
            self.config.group()
        );
        Ok(())
    }

    async fn start_embedded_broker(&self) -> Result<()> {
        let props = match self.config.embedded_broker_properties_path() {
            Some(path) if path.is_file() => Properties::load(&path)?,
            Some(path) => {
                debug!("No embedded broker properties at {}", path.display());
                Properties::new()
            }
            None => Properties::new(),
        };
        let broker_config = EmbeddedBrokerConfig::from_properties(&props, &self.config.broker_url())?;
        let broker = Arc::new(EmbeddedBroker::new(broker_config));
        if broker.start().await {
            *self.broker.lock() = Some(broker);
        } else {
            warn!("Embedded broker did not start");
        }
        Ok(())
    }

    fn start_consumer(&self) {
        let Some(inbound) = self.inbound.lock().take() else {
            debug!("Consumer already started");
            return;
        };
        let chain = HandlerChain::new()
            .with(DocumentSynchronizer::new(
                self.stores.data_dir.clone(),
                self.timeouts.apply,
            ))
            .with(CatalogSynchronizer::new(
                self.stores.catalog.clone(),
                self.ctx.clone(),
                self.timeouts.apply,
            ))
            .with(ConfigurationSynchronizer::new(
                self.stores.settings.clone(),
                self.stores.catalog.clone(),
                self.ctx.clone(),
                self.timeouts.apply,
            ));
        debug!("Synchronizers: {:?}", chain.names());

        let consumer = Arc::new(EventConsumer::new(
            self.config.clone(),
            self.ctx.clone(),
            self.serializer.clone(),
            chain,
        ));
        *self.consumer.lock() = Some(tokio::spawn(consumer.run(inbound)));
    }

    /// Disconnect, stop the embedded broker and the consumer, and store the
    /// configuration
    pub async fn shutdown(&self) {
        self.ctx.deactivate();
        if self.client.is_running() && !self.client.disconnect().await {
            warn!("Bus client did not disconnect cleanly");
        }
        let broker = self.broker.lock().take();
        if let Some(broker) = broker {
            broker.stop().await;
        }
        let consumer = self.consumer.lock().take();
        if let Some(task) = consumer {
            task.abort();
        }
        self.store_config();
        info!("Cluster node '{}' stopped", self.config.instance_name());
    }

    fn store_config(&self) {
        match self.config.store() {
            Ok(Some(path)) => debug!("Cluster configuration stored to {}", path.display()),
            Ok(None) => {}
            Err(e) => error!("Failed to store cluster configuration: {}", e),
        }
    }

    pub fn controller(&self) -> ClusterController {
        ClusterController::new(
            self.config.clone(),
            self.ctx.clone(),
            self.client.clone(),
            Some(self.stores.data_dir.clone()),
        )
    }

    pub fn config(&self) -> &Arc<ClusterConfiguration> {
        &self.config
    }

    pub fn context(&self) -> &Arc<ReplicationContext> {
        &self.ctx
    }

    pub fn catalog(&self) -> &Arc<dyn Catalog> {
        &self.stores.catalog
    }

    pub fn settings(&self) -> &Arc<dyn SettingsStore> {
        &self.stores.settings
    }

    pub fn data_dir(&self) -> &Arc<DataDirectory> {
        &self.stores.data_dir
    }

    pub fn client(&self) -> &Arc<BusClient> {
        &self.client
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_running()
    }

    /// Whether this node runs a broker of its own
    pub fn is_embedded_broker_started(&self) -> bool {
        self.broker
            .lock()
            .as_ref()
            .is_some_and(|b| b.is_started())
    }

    pub fn embedded_broker(&self) -> Option<Arc<EmbeddedBroker>> {
        self.broker.lock().clone()
    }
}

