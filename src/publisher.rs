//! Event Publisher
//!
//! The producer path: listens to local catalog and settings changes and
//! publishes them on the cluster topic. Publishing is gated by the
//! replication context, so changes applied on behalf of a peer are never
//! echoed back.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, error, warn};

use crate::bus::{publish_destination, BusClient, BusError};
use crate::catalog::{CatalogInfo, CatalogListener, DataDirectory};
use crate::config::{ClusterConfiguration, GROUP_KEY, INSTANCE_NAME_KEY};
use crate::error::Result;
use crate::event::{
    CatalogEvent, ClusterEvent, ConfigurationEvent, EventKind, EventSerializer, StyleDocument,
};
use crate::toggle::ReplicationContext;

/// Where serialized events are sent
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(
        &self,
        destination: &str,
        properties: &BTreeMap<String, String>,
        payload: Bytes,
    ) -> std::result::Result<(), BusError>;
}

#[async_trait]
impl MessageSink for BusClient {
    async fn send(
        &self,
        destination: &str,
        properties: &BTreeMap<String, String>,
        payload: Bytes,
    ) -> std::result::Result<(), BusError> {
        self.publish(destination, properties, payload).await
    }
}

#[async_trait]
impl<T: MessageSink> MessageSink for Arc<T> {
    async fn send(
        &self,
        destination: &str,
        properties: &BTreeMap<String, String>,
        payload: Bytes,
    ) -> std::result::Result<(), BusError> {
        (**self).send(destination, properties, payload).await
    }
}

pub struct ClusterPublisher {
    sink: Arc<dyn MessageSink>,
    serializer: Arc<dyn EventSerializer>,
    config: Arc<ClusterConfiguration>,
    ctx: Arc<ReplicationContext>,
    data_dir: Option<Arc<DataDirectory>>,
}

impl ClusterPublisher {
    pub fn new(
        sink: Arc<dyn MessageSink>,
        serializer: Arc<dyn EventSerializer>,
        config: Arc<ClusterConfiguration>,
        ctx: Arc<ReplicationContext>,
    ) -> Self {
        Self {
            sink,
            serializer,
            config,
            ctx,
            data_dir: None,
        }
    }

    /// Publish style documents read from `data_dir` along with style changes
    pub fn with_data_dir(mut self, data_dir: Arc<DataDirectory>) -> Self {
        self.data_dir = Some(data_dir);
        self
    }

    /// Serialize and send one event with the origin and group properties
    pub async fn publish(&self, event: &ClusterEvent) -> Result<()> {
        let payload = self.serializer.serialize(event)?;

        let group = self.config.group();
        let mut properties = BTreeMap::new();
        properties.insert(INSTANCE_NAME_KEY.to_string(), self.config.instance_name());
        properties.insert(GROUP_KEY.to_string(), group.clone());

        let destination = publish_destination(&self.config.topic_name(), &group);
        debug!("Publishing {} to '{}'", event, destination);
        self.sink.send(&destination, &properties, payload).await?;
        Ok(())
    }

    /// The document backing a style that is being added or modified
    async fn style_document(&self, event: &CatalogEvent) -> Option<StyleDocument> {
        let CatalogInfo::Style(style) = &event.source else {
            return None;
        };
        if event.kind == EventKind::Remove {
            return None;
        }
        let data_dir = self.data_dir.as_ref()?;
        let path = DataDirectory::style_document_path(style);
        match data_dir.read(&path).await {
            Ok(content) => Some(StyleDocument { path, content }),
            Err(e) => {
                warn!("Unable to read style document {}: {}", path, e);
                None
            }
        }
    }

    async fn publish_logged(&self, event: ClusterEvent) {
        if let Err(e) = self.publish(&event).await {
            error!("Failed to publish {}: {}", event, e);
        }
    }
}

#[async_trait]
impl CatalogListener for ClusterPublisher {
    async fn handle_catalog_event(&self, event: &CatalogEvent) {
        if !self.ctx.should_publish() {
            debug!("Producer disabled, not publishing {}", event);
            return;
        }
        if let Some(document) = self.style_document(event).await {
            self.publish_logged(document.into()).await;
        }
        self.publish_logged(event.clone().into()).await;
    }

    async fn handle_configuration_event(&self, event: &ConfigurationEvent) {
        if !self.ctx.should_publish() {
            debug!("Producer disabled, not publishing {}", event);
            return;
        }
        self.publish_logged(event.clone().into()).await;
    }
}
