//! GeoCluster - catalog and configuration replication for map server clusters
//!
//! Every node publishes its local catalog and settings changes on a topic
//! bus and applies the changes published by its peers, re-resolving every
//! identity and cross-reference against its own catalog.

pub mod bus;
pub mod catalog;
pub mod config;
pub mod consumer;
pub mod controller;
pub mod error;
pub mod event;
pub mod node;
pub mod publisher;
pub mod sync;
pub mod toggle;

pub use bus::{BusClient, BusError, EmbeddedBroker};
pub use catalog::{Catalog, CatalogError, CatalogInfo, EntityKind, SettingsStore};
pub use config::{ClusterConfiguration, Config};
pub use consumer::EventConsumer;
pub use controller::ClusterController;
pub use error::{ClusterError, Result};
pub use event::{CatalogEvent, ClusterEvent, ConfigurationEvent, EventKind, EventSerializer};
pub use node::{ClusterNode, NodeStores};
pub use publisher::{ClusterPublisher, MessageSink};
pub use sync::{HandlerChain, Synchronizer};
pub use toggle::{ReplicationContext, ToggleType};
